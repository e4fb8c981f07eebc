//! Common utilities for Perun.
//!
//! This crate provides the foundational pieces shared by the Perun format crates:
//!
//! - [`BinaryReader`] - Bounds-checked, zero-copy reading from byte slices
//! - [`FourCC`] - Four-character chunk tags as found in DXBC containers
//! - [`Error`] - Structural errors (short reads, bad offsets, bad magic)

mod error;
mod fourcc;
mod reader;

pub use error::{Error, Result};
pub use fourcc::FourCC;
pub use reader::BinaryReader;

/// Re-export zerocopy traits for convenience
pub use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};
