//! Perun - DXBC shader extraction and transpilation library.
//!
//! This crate provides a unified interface to the Perun crates for working
//! with compiled Direct3D shaders pulled out of game files.
//!
//! # Crates
//!
//! - [`perun_common`] - Common utilities (binary reading, chunk tags)
//! - [`perun_dxbc`] - DXBC container parsing, reflection and GLSL output
//!
//! # Example
//!
//! ```no_run
//! use perun::prelude::*;
//!
//! let data = std::fs::read("Shaders.bin")?;
//!
//! // Transpile every shader embedded in the file
//! for range in find_containers(&data) {
//!     let container = DxbcContainer::parse(&data[range])?;
//!     println!("{}", container.to_glsl()?);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export all sub-crates
pub use perun_common as common;
pub use perun_dxbc as dxbc;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use perun_common::{BinaryReader, FourCC};
    pub use perun_dxbc::rdef::{ConstantBuffer, Rdef};
    pub use perun_dxbc::shex::Shex;
    pub use perun_dxbc::signature::Signature;
    pub use perun_dxbc::{
        find_containers, BlockBindings, DxbcContainer, GlslOptions, ProgramType, UniformBlock,
        UniformValue,
    };
}

// Re-export commonly used types at the crate root
pub use perun_dxbc::DxbcContainer;

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
