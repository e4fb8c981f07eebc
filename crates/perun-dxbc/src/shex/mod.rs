//! SHEX/SHDR shader program chunk.
//!
//! The program is a stream of little-endian dwords: a version token, a total
//! length token, then instructions. Every instruction declares its own dword
//! length in its opcode token, which bounds operand decoding.

mod decode;
pub mod opcode;
pub mod operand;
pub(crate) mod token;

use perun_common::BinaryReader;

use crate::rdef::{ResourceDimension, ReturnType};
use crate::signature::SystemValue;
use crate::{Error, ProgramType, Result};

pub use opcode::{NumberType, OpcodeType};
pub use operand::{
    ComponentSelection, Components, Immediate, IndexRepresentation, MinPrecision, Operand,
    OperandIndex, OperandModifier, OperandType,
};

/// A decoded shader program.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Shex {
    pub major_version: u8,
    pub minor_version: u8,
    pub program_type: ProgramType,
    pub opcodes: Vec<Opcode>,
}

impl Shex {
    /// Parse a SHEX or SHDR chunk payload.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = BinaryReader::new(data);
        let version = reader.read_u32()?;
        let length = reader.read_u32()? as usize;
        if length < 2 {
            return Err(Error::InvalidInstructionLength {
                at: 1,
                len: length,
                available: data.len() / 4,
            });
        }
        let tokens = reader.read_u32_array(length - 2)?;

        Ok(Self {
            minor_version: (version & 0xF) as u8,
            major_version: ((version >> 4) & 0xF) as u8,
            program_type: ProgramType::from_raw(version >> 16)?,
            opcodes: decode::decode_program(&tokens)?,
        })
    }

    /// Shader model string such as `ps_5_0`.
    pub fn profile(&self) -> String {
        format!(
            "{}_{}_{}",
            self.program_type.prefix(),
            self.major_version,
            self.minor_version
        )
    }

    /// Declarations in program order.
    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.opcodes.iter().filter_map(|op| match op {
            Opcode::Declaration(decl) => Some(decl),
            _ => None,
        })
    }

    /// The immediate constant buffer, if the program embeds one.
    pub fn immediate_constant_buffer(&self) -> Option<&[[f32; 4]]> {
        self.opcodes.iter().find_map(|op| match op {
            Opcode::CustomData(CustomData::ImmediateConstantBuffer(values)) => {
                Some(values.as_slice())
            }
            _ => None,
        })
    }
}

/// One decoded SHEX entity.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Opcode {
    Declaration(Declaration),
    /// Destination plus one source.
    Unary {
        header: InstructionHeader,
        dst: Operand,
        src: Operand,
    },
    /// Destination plus two sources.
    Binary {
        header: InstructionHeader,
        dst: Operand,
        src: [Operand; 2],
    },
    /// Destination plus three sources.
    Trinary {
        header: InstructionHeader,
        dst: Operand,
        src: [Operand; 3],
    },
    /// Instructions with no operands or more than four.
    Generic {
        header: InstructionHeader,
        operands: Vec<Operand>,
    },
    CustomData(CustomData),
    /// An opcode value outside the known table, skipped by its declared length.
    Unknown { raw: u32, tokens: Vec<u32> },
}

impl Opcode {
    /// Short name used for statistics and diagnostics.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Declaration(decl) => decl.opcode().mnemonic(),
            Opcode::Unary { header, .. }
            | Opcode::Binary { header, .. }
            | Opcode::Trinary { header, .. }
            | Opcode::Generic { header, .. } => header.opcode.mnemonic(),
            Opcode::CustomData(CustomData::ImmediateConstantBuffer(_)) => {
                "dcl_immediateConstantBuffer"
            }
            Opcode::CustomData(CustomData::Other { .. }) => "customdata",
            Opcode::Unknown { .. } => "unknown",
        }
    }

    /// Every operand of the opcode, including relative-index operands.
    pub fn operands(&self) -> Vec<&Operand> {
        let top: Vec<&Operand> = match self {
            Opcode::Declaration(decl) => decl.operand().into_iter().collect(),
            Opcode::Unary { dst, src, .. } => vec![dst, src],
            Opcode::Binary { dst, src, .. } => std::iter::once(dst).chain(src).collect(),
            Opcode::Trinary { dst, src, .. } => std::iter::once(dst).chain(src).collect(),
            Opcode::Generic { operands, .. } => operands.iter().collect(),
            Opcode::CustomData(_) | Opcode::Unknown { .. } => Vec::new(),
        };

        let mut all = Vec::with_capacity(top.len());
        let mut stack = top;
        stack.reverse();
        while let Some(operand) = stack.pop() {
            all.push(operand);
            for index in operand.indices.iter().rev() {
                if let Some(relative) = &index.relative {
                    stack.push(relative);
                }
            }
        }
        all
    }
}

/// Opcode token fields shared by every non-declaration instruction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct InstructionHeader {
    pub opcode: OpcodeType,
    pub token: u32,
    pub saturate: bool,
    /// `_nz` (true) or `_z` (false) for conditional instructions.
    pub test_nonzero: bool,
    pub extended: Vec<ExtendedOpcode>,
    /// Function table index read by `fcall`.
    pub function_index: Option<u32>,
}

impl InstructionHeader {
    /// `resinfo` result type (0 float, 1 rcpfloat, 2 uint).
    pub fn resinfo_return_type(&self) -> u32 {
        (self.token >> 11) & 0x3
    }
}

/// Extended opcode token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ExtendedOpcode {
    /// Texel offsets for `sample`/`ld` (`aoffimmi`).
    SampleControls { u: i8, v: i8, w: i8 },
    ResourceDim { dimension: ResourceDimension, stride: u32 },
    ResourceReturnType([ReturnType; 4]),
    Other(u32),
}

/// Custom-data block embedded in the instruction stream.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum CustomData {
    ImmediateConstantBuffer(Vec<[f32; 4]>),
    /// Comments, debug info, opaque data, shader messages.
    Other { class: u32, data: Vec<u32> },
}

/// Sampler declaration mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SamplerMode {
    Default,
    Comparison,
    Mono,
}

/// Pixel shader input interpolation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Interpolation {
    Undefined,
    Constant,
    Linear,
    LinearCentroid,
    LinearNoPerspective,
    LinearNoPerspectiveCentroid,
    LinearSample,
    LinearNoPerspectiveSample,
}

impl Interpolation {
    pub(crate) fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Constant,
            2 => Self::Linear,
            3 => Self::LinearCentroid,
            4 => Self::LinearNoPerspective,
            5 => Self::LinearNoPerspectiveCentroid,
            6 => Self::LinearSample,
            7 => Self::LinearNoPerspectiveSample,
            _ => Self::Undefined,
        }
    }

    /// GLSL interpolation qualifier, with trailing space when non-empty.
    pub fn glsl_qualifier(self) -> &'static str {
        match self {
            Self::Undefined | Self::Linear => "",
            Self::Constant => "flat ",
            Self::LinearCentroid => "centroid ",
            Self::LinearNoPerspective => "noperspective ",
            Self::LinearNoPerspectiveCentroid => "noperspective centroid ",
            Self::LinearSample => "sample ",
            Self::LinearNoPerspectiveSample => "noperspective sample ",
        }
    }
}

/// A `dcl_*` declaration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Declaration {
    GlobalFlags(u32),
    ConstantBuffer {
        operand: Operand,
        dynamic_indexed: bool,
    },
    Sampler {
        operand: Operand,
        mode: SamplerMode,
    },
    Resource {
        operand: Operand,
        dimension: ResourceDimension,
        sample_count: u32,
        return_type: [ReturnType; 4],
    },
    Input {
        opcode: OpcodeType,
        operand: Operand,
        interpolation: Option<Interpolation>,
        system_value: Option<SystemValue>,
    },
    Output {
        opcode: OpcodeType,
        operand: Operand,
        system_value: Option<SystemValue>,
    },
    Temps(u32),
    IndexableTemp {
        register: u32,
        count: u32,
        components: u32,
    },
    ThreadGroup([u32; 3]),
    /// A declaration kept as raw dwords (opcode token included).
    Other { opcode: OpcodeType, tokens: Vec<u32> },
}

impl Declaration {
    /// The declaring opcode.
    pub fn opcode(&self) -> OpcodeType {
        match self {
            Declaration::GlobalFlags(_) => OpcodeType::DclGlobalFlags,
            Declaration::ConstantBuffer { .. } => OpcodeType::DclConstantBuffer,
            Declaration::Sampler { .. } => OpcodeType::DclSampler,
            Declaration::Resource { .. } => OpcodeType::DclResource,
            Declaration::Input { opcode, .. }
            | Declaration::Output { opcode, .. }
            | Declaration::Other { opcode, .. } => *opcode,
            Declaration::Temps(_) => OpcodeType::DclTemps,
            Declaration::IndexableTemp { .. } => OpcodeType::DclIndexableTemp,
            Declaration::ThreadGroup(_) => OpcodeType::DclThreadGroup,
        }
    }

    /// The declared register, for declarations that carry an operand.
    pub fn operand(&self) -> Option<&Operand> {
        match self {
            Declaration::ConstantBuffer { operand, .. }
            | Declaration::Sampler { operand, .. }
            | Declaration::Resource { operand, .. }
            | Declaration::Input { operand, .. }
            | Declaration::Output { operand, .. } => Some(operand),
            _ => None,
        }
    }
}
