//! DXBC shader container decoder and GLSL transpiler.
//!
//! Direct3D shader model 4 and 5 bytecode ships inside a chunked `DXBC`
//! container. This crate parses the container, the `RDEF` reflection data,
//! the input/output signatures and the `SHEX`/`SHDR` program, and renders the
//! program as readable GLSL.
//!
//! Containers serialize back to the exact bytes they were parsed from, so
//! unknown chunks and the digest survive a round trip.
//!
//! # Example
//!
//! ```no_run
//! use perun_dxbc::{BlockBindings, DxbcContainer, GlslOptions};
//!
//! let data = std::fs::read("shader.dxbc")?;
//! let container = DxbcContainer::parse(&data)?;
//!
//! let options = GlslOptions {
//!     bindings: BlockBindings::new(["PerView", "PerMaterial"]),
//!     ..GlslOptions::default()
//! };
//! println!("{}", container.to_glsl_with(&options)?);
//!
//! assert_eq!(container.serialize()?, data);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod program;

pub mod container;
pub mod glsl;
pub mod rdef;
pub mod scan;
pub mod shex;
pub mod signature;
pub mod uniform;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use container::{Chunk, DxbcContainer, DxbcHeader};
pub use error::{Error, Result};
pub use glsl::{BlockBindings, GlslOptions};
pub use perun_common::FourCC;
pub use program::ProgramType;
pub use scan::find_containers;
pub use uniform::{UniformBlock, UniformValue};
