//! Error types for perun-common.

use thiserror::Error;

/// Common error type for Perun operations.
#[derive(Debug, Error)]
pub enum Error {
    /// End of buffer reached while reading.
    #[error("unexpected end of buffer: needed {needed} bytes but only {available} available")]
    UnexpectedEof { needed: usize, available: usize },

    /// An absolute offset points outside the buffer.
    #[error("offset {offset} is outside buffer of length {len}")]
    OffsetOutOfBounds { offset: usize, len: usize },

    /// UTF-8 decoding error.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Missing null terminator in string.
    #[error("string at offset {0} missing null terminator")]
    MissingNullTerminator(usize),
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
