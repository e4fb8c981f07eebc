//! Error types for DXBC decoding and GLSL emission.

use perun_common::FourCC;
use thiserror::Error;

/// Errors that can occur when decoding a DXBC container.
///
/// Structural and malformed-input variants mean "this blob has no usable shader
/// code"; callers processing many files should log them and move on.
/// [`Error::BitRange`] signals a decoder bug rather than bad input.
#[derive(Debug, Error)]
pub enum Error {
    /// Common library error (short read, offset outside the buffer, bad UTF-8).
    #[error("{0}")]
    Common(#[from] perun_common::Error),

    /// Formatting error while emitting GLSL text.
    #[error("formatting error: {0}")]
    Fmt(#[from] std::fmt::Error),

    /// I/O error while writing a reconstructed container.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid container magic (not a DXBC blob).
    #[error("invalid DXBC magic: expected 'DXBC', got {0}")]
    InvalidMagic(FourCC),

    /// A chunk offset or size points outside the container.
    #[error("chunk {index} at offset {offset} exceeds container length {len}")]
    OffsetOutOfBounds { index: usize, offset: usize, len: usize },

    /// A chunk's payload could not be decoded.
    #[error("invalid {tag} chunk: {source}")]
    InvalidChunk {
        tag: FourCC,
        #[source]
        source: Box<Error>,
    },

    /// An instruction declared a length that is zero or runs past the program.
    #[error("instruction at dword {at} has invalid length {len} (program has {available} dwords)")]
    InvalidInstructionLength { at: usize, len: usize, available: usize },

    /// An instruction's operand tokens ran past its declared length.
    #[error("operand at dword {at} runs past the end of its instruction")]
    OperandOverrun { at: usize },

    /// Immediate constant buffer payload is not a whole number of float4 values.
    #[error("immediate constant buffer of {0} bytes is not a multiple of 16")]
    InvalidImmediateConstantBuffer(usize),

    /// A byte offset lies outside a constant buffer.
    #[error("offset {offset} is outside constant buffer '{buffer}' of {size} bytes")]
    ConstantBufferOffsetOutOfRange {
        buffer: String,
        offset: u32,
        size: u32,
    },

    /// A construct the decoder does not support.
    #[error("unsupported {what}: {value}")]
    Unsupported { what: &'static str, value: u32 },

    /// A uniform name that the constant buffer does not declare.
    #[error("constant buffer has no variable named '{0}'")]
    UnknownVariable(String),

    /// A uniform value whose std140 size does not match the declared variable.
    #[error("value for '{name}' needs {needed} bytes but the variable holds {available}")]
    UniformSizeMismatch {
        name: String,
        needed: usize,
        available: usize,
    },

    /// A bitfield request wider than the 32-bit token it reads from.
    #[error("internal decoder error: bitfield {shift}+{width} exceeds 32 bits")]
    BitRange { shift: u32, width: u32 },
}

impl Error {
    /// Wrap an error with the tag of the chunk being decoded.
    pub(crate) fn in_chunk(self, tag: FourCC) -> Self {
        Error::InvalidChunk {
            tag,
            source: Box::new(self),
        }
    }
}

/// Result type for DXBC operations.
pub type Result<T> = std::result::Result<T, Error>;
