//! Shader stage shared by the RDEF and SHEX version tokens.

use crate::{Error, Result};

/// Pipeline stage a program was compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ProgramType {
    Pixel,
    Vertex,
    Geometry,
    Hull,
    Domain,
    Compute,
}

impl ProgramType {
    /// Decode the program type from the high half of a SHEX version token.
    pub fn from_raw(raw: u32) -> Result<Self> {
        Ok(match raw {
            0 => Self::Pixel,
            1 => Self::Vertex,
            2 => Self::Geometry,
            3 => Self::Hull,
            4 => Self::Domain,
            5 => Self::Compute,
            other => {
                return Err(Error::Unsupported {
                    what: "program type",
                    value: other,
                })
            }
        })
    }

    /// Decode the program type from the high half of an RDEF version token.
    pub fn from_rdef(raw: u16) -> Result<Self> {
        Ok(match raw {
            0xFFFF => Self::Pixel,
            0xFFFE => Self::Vertex,
            0x4753 => Self::Geometry,
            0x4853 => Self::Hull,
            0x4453 => Self::Domain,
            0x4353 => Self::Compute,
            other => {
                return Err(Error::Unsupported {
                    what: "RDEF program type",
                    value: other as u32,
                })
            }
        })
    }

    /// Value stored in the high half of a SHEX version token.
    pub fn raw(self) -> u32 {
        match self {
            Self::Pixel => 0,
            Self::Vertex => 1,
            Self::Geometry => 2,
            Self::Hull => 3,
            Self::Domain => 4,
            Self::Compute => 5,
        }
    }

    /// Value stored in the high half of an RDEF version token.
    pub fn rdef_raw(self) -> u16 {
        match self {
            Self::Pixel => 0xFFFF,
            Self::Vertex => 0xFFFE,
            Self::Geometry => 0x4753,
            Self::Hull => 0x4853,
            Self::Domain => 0x4453,
            Self::Compute => 0x4353,
        }
    }

    /// Profile prefix (`ps`, `vs`, ...).
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Pixel => "ps",
            Self::Vertex => "vs",
            Self::Geometry => "gs",
            Self::Hull => "hs",
            Self::Domain => "ds",
            Self::Compute => "cs",
        }
    }
}
