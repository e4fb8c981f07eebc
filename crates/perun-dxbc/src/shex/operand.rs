//! Operand tokens.
//!
//! An operand starts with `OperandToken0`:
//!
//! ```text
//! bits  0..2   component count (0, 1, 4, N)
//! bits  2..4   4-component selection mode (mask, swizzle, select-one)
//! bits  4..12  mask / swizzle / select-one bits
//! bits 12..20  operand type
//! bits 20..22  index dimension (0D..3D)
//! bits 22..31  per-dimension index representation (3 bits each)
//! bit  31      extended (OperandToken1 follows)
//! ```
//!
//! followed by optional extended tokens, the index slots, and for immediate
//! operands the literal values.

use super::token::{Token, TokenReader};
use crate::{Error, Result};

const LANES: [char; 4] = ['x', 'y', 'z', 'w'];

/// Relative operands nested deeper than this are rejected. Hardware allows
/// one level (`cb0[r1.x]`); index operands of index operands never occur.
const MAX_RELATIVE_DEPTH: u32 = 4;

macro_rules! operand_types {
    ($($name:ident = $value:literal => $prefix:literal,)*) => {
        /// Register file an operand addresses.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize))]
        pub enum OperandType {
            $($name = $value,)*
        }

        impl OperandType {
            /// Look up an operand type by its raw value.
            pub fn from_raw(raw: u32) -> Option<Self> {
                match raw {
                    $($value => Some(Self::$name),)*
                    _ => None,
                }
            }

            /// Register prefix used by the D3D disassembler (`r`, `v`, `cb`, ...).
            pub fn prefix(self) -> &'static str {
                match self {
                    $(Self::$name => $prefix,)*
                }
            }
        }
    };
}

operand_types! {
    Temp = 0 => "r",
    Input = 1 => "v",
    Output = 2 => "o",
    IndexableTemp = 3 => "x",
    Immediate32 = 4 => "l",
    Immediate64 = 5 => "d",
    Sampler = 6 => "s",
    Resource = 7 => "t",
    ConstantBuffer = 8 => "cb",
    ImmediateConstantBuffer = 9 => "icb",
    Label = 10 => "label",
    InputPrimitiveId = 11 => "vPrim",
    OutputDepth = 12 => "oDepth",
    Null = 13 => "null",
    Rasterizer = 14 => "rasterizer",
    OutputCoverageMask = 15 => "oMask",
    Stream = 16 => "m",
    FunctionBody = 17 => "fb",
    FunctionTable = 18 => "ft",
    Interface = 19 => "fp",
    FunctionInput = 20 => "fi",
    FunctionOutput = 21 => "fo",
    OutputControlPointId = 22 => "vOutputControlPointID",
    InputForkInstanceId = 23 => "vForkInstanceID",
    InputJoinInstanceId = 24 => "vJoinInstanceID",
    InputControlPoint = 25 => "vicp",
    OutputControlPoint = 26 => "vocp",
    InputPatchConstant = 27 => "vpc",
    InputDomainPoint = 28 => "vDomain",
    ThisPointer = 29 => "this",
    UnorderedAccessView = 30 => "u",
    ThreadGroupSharedMemory = 31 => "g",
    InputThreadId = 32 => "vThreadID",
    InputThreadGroupId = 33 => "vThreadGroupID",
    InputThreadIdInGroup = 34 => "vThreadIDInGroup",
    InputCoverageMask = 35 => "vCoverage",
    InputThreadIdInGroupFlattened = 36 => "vThreadIDInGroupFlattened",
    InputGsInstanceId = 37 => "vGSInstanceID",
    OutputDepthGreaterEqual = 38 => "oDepthGE",
    OutputDepthLessEqual = 39 => "oDepthLE",
    CycleCounter = 40 => "vCycleCounter",
}

/// How a 4-component operand selects its lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ComponentSelection {
    /// Write/read mask; bit 0 is `x`.
    Mask(u8),
    /// Per-lane source component.
    Swizzle([u8; 4]),
    /// One component broadcast to every lane.
    Select1(u8),
}

/// Component count of an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Components {
    Zero,
    One,
    Four(ComponentSelection),
    N,
}

/// Source modifier from the extended operand token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum OperandModifier {
    #[default]
    None,
    Neg,
    Abs,
    AbsNeg,
}

/// Minimum-precision hint from the extended operand token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum MinPrecision {
    #[default]
    Default,
    Float16,
    Float2_8,
    Sint16,
    Uint16,
}

impl MinPrecision {
    pub(crate) fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Float16,
            2 => Self::Float2_8,
            4 => Self::Sint16,
            5 => Self::Uint16,
            _ => Self::Default,
        }
    }
}

/// Addressing representation of one index slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum IndexRepresentation {
    Immediate32,
    Immediate64,
    Relative,
    Immediate32PlusRelative,
    Immediate64PlusRelative,
}

impl IndexRepresentation {
    fn from_raw(raw: u32) -> Result<Self> {
        Ok(match raw {
            0 => Self::Immediate32,
            1 => Self::Immediate64,
            2 => Self::Relative,
            3 => Self::Immediate32PlusRelative,
            4 => Self::Immediate64PlusRelative,
            other => {
                return Err(Error::Unsupported {
                    what: "operand index representation",
                    value: other,
                })
            }
        })
    }
}

/// One index slot: an immediate part, a relative register, or both.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct OperandIndex {
    pub representation: IndexRepresentation,
    pub value: u64,
    pub relative: Option<Box<Operand>>,
}

/// Immediate literal bits, typed later by the consuming instruction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Immediate {
    Bits32(Vec<u32>),
    Bits64(Vec<u64>),
}

impl Immediate {
    /// Number of literal values.
    pub fn len(&self) -> usize {
        match self {
            Immediate::Bits32(v) => v.len(),
            Immediate::Bits64(v) => v.len(),
        }
    }

    /// Whether no literal values are present.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw 32-bit pattern of a lane; a single literal applies to every lane.
    pub fn bits32(&self, lane: usize) -> Option<u32> {
        match self {
            Immediate::Bits32(v) => v.get(lane).or_else(|| single(v)).copied(),
            Immediate::Bits64(_) => None,
        }
    }

    /// Raw 64-bit pattern of a lane.
    pub fn bits64(&self, lane: usize) -> Option<u64> {
        match self {
            Immediate::Bits64(v) => v.get(lane).or_else(|| single(v)).copied(),
            Immediate::Bits32(_) => None,
        }
    }
}

fn single<T>(values: &[T]) -> Option<&T> {
    match values {
        [only] => Some(only),
        _ => None,
    }
}

/// A decoded operand.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Operand {
    pub token: u32,
    pub operand_type: OperandType,
    pub components: Components,
    pub modifier: OperandModifier,
    pub min_precision: MinPrecision,
    pub non_uniform: bool,
    pub indices: Vec<OperandIndex>,
    pub immediate: Option<Immediate>,
}

impl Operand {
    /// Decode an operand (and any nested relative operands) from `reader`.
    pub(crate) fn decode(reader: &mut TokenReader<'_>) -> Result<Self> {
        Self::decode_nested(reader, 0)
    }

    fn decode_nested(reader: &mut TokenReader<'_>, depth: u32) -> Result<Self> {
        if depth > MAX_RELATIVE_DEPTH {
            return Err(Error::Unsupported {
                what: "relative operand depth",
                value: depth,
            });
        }
        let token = reader.read()?;

        let components = decode_components(token)?;
        let raw_type = token.bits(12, 8)?;
        let operand_type = OperandType::from_raw(raw_type).ok_or(Error::Unsupported {
            what: "operand type",
            value: raw_type,
        })?;
        let dimension = token.bits(20, 2)?;

        let mut modifier = OperandModifier::None;
        let mut min_precision = MinPrecision::Default;
        let mut non_uniform = false;

        let mut extended = token.is_extended();
        while extended {
            let ext = reader.read()?;
            extended = ext.is_extended();
            // Type 1 is the only defined extended operand kind.
            if ext.bits(0, 6)? == 1 {
                modifier = match ext.bits(6, 8)? {
                    0 => OperandModifier::None,
                    1 => OperandModifier::Neg,
                    2 => OperandModifier::Abs,
                    3 => OperandModifier::AbsNeg,
                    other => {
                        return Err(Error::Unsupported {
                            what: "operand modifier",
                            value: other,
                        })
                    }
                };
                min_precision = MinPrecision::from_raw(ext.bits(14, 3)?);
                non_uniform = ext.bit(17)?;
            }
        }

        let mut indices = Vec::with_capacity(dimension as usize);
        for slot in 0..dimension {
            let representation = IndexRepresentation::from_raw(token.bits(22 + slot * 3, 3)?)?;
            let index = match representation {
                IndexRepresentation::Immediate32 => OperandIndex {
                    representation,
                    value: reader.read()?.0 as u64,
                    relative: None,
                },
                IndexRepresentation::Immediate64 => OperandIndex {
                    representation,
                    value: reader.read_u64()?,
                    relative: None,
                },
                IndexRepresentation::Relative => OperandIndex {
                    representation,
                    value: 0,
                    relative: Some(Box::new(Self::decode_nested(reader, depth + 1)?)),
                },
                IndexRepresentation::Immediate32PlusRelative => {
                    let value = reader.read()?.0 as u64;
                    OperandIndex {
                        representation,
                        value,
                        relative: Some(Box::new(Self::decode_nested(reader, depth + 1)?)),
                    }
                }
                IndexRepresentation::Immediate64PlusRelative => {
                    let value = reader.read_u64()?;
                    OperandIndex {
                        representation,
                        value,
                        relative: Some(Box::new(Self::decode_nested(reader, depth + 1)?)),
                    }
                }
            };
            indices.push(index);
        }

        let literal_count = match components {
            Components::One => 1,
            Components::Four(_) => 4,
            _ => 0,
        };
        let immediate = match operand_type {
            OperandType::Immediate32 => Some(Immediate::Bits32(
                (0..literal_count)
                    .map(|_| reader.read().map(|t| t.0))
                    .collect::<Result<_>>()?,
            )),
            OperandType::Immediate64 => Some(Immediate::Bits64(
                (0..literal_count)
                    .map(|_| reader.read_u64())
                    .collect::<Result<_>>()?,
            )),
            _ => None,
        };

        Ok(Self {
            token: token.0,
            operand_type,
            components,
            modifier,
            min_precision,
            non_uniform,
            indices,
            immediate,
        })
    }

    /// Source component feeding `lane`, or `None` when the lane is not selected.
    pub fn lane_source(&self, lane: usize) -> Option<u8> {
        match self.components {
            Components::Four(ComponentSelection::Mask(mask)) => {
                (mask & (1 << lane) != 0).then_some(lane as u8)
            }
            Components::Four(ComponentSelection::Swizzle(swizzle)) => swizzle.get(lane).copied(),
            Components::Four(ComponentSelection::Select1(component)) => Some(component),
            Components::One => Some(0),
            Components::Zero | Components::N => None,
        }
    }

    /// Lanes written by a destination operand.
    pub fn write_mask(&self) -> u8 {
        match self.components {
            Components::Four(ComponentSelection::Mask(mask)) => mask,
            Components::Four(_) => 0xF,
            Components::One => 0x1,
            Components::Zero | Components::N => 0,
        }
    }

    /// Source components selected for the lanes in `mask`, as `.xyzw` text.
    ///
    /// Returns an empty string for scalar operands and for an empty selection.
    pub fn swizzle_mask(&self, mask: u8) -> String {
        if !matches!(self.components, Components::Four(_)) {
            return String::new();
        }
        let lanes: String = (0..4)
            .filter(|lane| mask & (1 << lane) != 0)
            .filter_map(|lane| self.lane_source(lane))
            .map(|component| LANES[component as usize & 3])
            .collect();
        if lanes.is_empty() {
            lanes
        } else {
            format!(".{lanes}")
        }
    }

    /// The first index slot's immediate value (the register number for most files).
    pub fn register(&self) -> Option<u64> {
        self.indices.first().map(|index| index.value)
    }

    /// Whether this is the `null` destination.
    pub fn is_null(&self) -> bool {
        self.operand_type == OperandType::Null
    }
}

fn decode_components(token: Token) -> Result<Components> {
    Ok(match token.bits(0, 2)? {
        0 => Components::Zero,
        1 => Components::One,
        2 => match token.bits(2, 2)? {
            0 => Components::Four(ComponentSelection::Mask(token.bits(4, 4)? as u8)),
            1 => Components::Four(ComponentSelection::Swizzle([
                token.bits(4, 2)? as u8,
                token.bits(6, 2)? as u8,
                token.bits(8, 2)? as u8,
                token.bits(10, 2)? as u8,
            ])),
            2 => Components::Four(ComponentSelection::Select1(token.bits(4, 2)? as u8)),
            other => {
                return Err(Error::Unsupported {
                    what: "component selection mode",
                    value: other,
                })
            }
        },
        _ => Components::N,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::operand_token;

    fn decode(tokens: &[u32]) -> Operand {
        let mut reader = TokenReader::new(tokens, 0);
        let operand = Operand::decode(&mut reader).unwrap();
        assert!(reader.is_empty(), "operand left tokens unread");
        operand
    }

    #[test]
    fn test_mask_operand() {
        // o0.xz
        let op = decode(&[operand_token::mask(OperandType::Output, 0b0101, 1), 0]);
        assert_eq!(op.operand_type, OperandType::Output);
        assert_eq!(op.register(), Some(0));
        assert_eq!(op.write_mask(), 0b0101);
        assert_eq!(op.swizzle_mask(0xF), ".xz");
        assert_eq!(op.swizzle_mask(0x0), "");
    }

    #[test]
    fn test_swizzle_follows_destination_lanes() {
        // r1.yxwz read through a .xz destination mask
        let op = decode(&[operand_token::swizzle(OperandType::Temp, [1, 0, 3, 2], 1), 1]);
        assert_eq!(op.swizzle_mask(0b0101), ".yw");
        assert_eq!(op.swizzle_mask(0xF), ".yxwz");
    }

    #[test]
    fn test_select1_broadcasts() {
        let op = decode(&[operand_token::select1(OperandType::Temp, 2, 1), 3]);
        assert_eq!(op.swizzle_mask(0b0011), ".zz");
    }

    #[test]
    fn test_immediate_literals_stay_raw() {
        let op = decode(&[operand_token::immediate32(4), 0x3f80_0000, 2, 0xffff_ffff, 0]);
        let imm = op.immediate.unwrap();
        assert_eq!(imm.len(), 4);
        assert_eq!(imm.bits32(0), Some(0x3f80_0000));
        assert_eq!(imm.bits32(2), Some(0xffff_ffff));

        let scalar = decode(&[operand_token::immediate32(1), 7]);
        assert_eq!(scalar.immediate.unwrap().bits32(3), Some(7));
    }

    #[test]
    fn test_extended_modifier() {
        let token = operand_token::swizzle(OperandType::Temp, [0, 1, 2, 3], 1) | 0x8000_0000;
        // type 1 (modifier), modifier 3 (absneg), min precision float16
        let ext = 1 | (3 << 6) | (1 << 14);
        let op = decode(&[token, ext, 4]);
        assert_eq!(op.modifier, OperandModifier::AbsNeg);
        assert_eq!(op.min_precision, MinPrecision::Float16);
        assert_eq!(op.register(), Some(4));
    }

    #[test]
    fn test_relative_index() {
        // cb0[r1.x + 2]: 2D, index0 immediate32, index1 immediate32 + relative
        let token = operand_token::swizzle(OperandType::ConstantBuffer, [0, 1, 2, 3], 2)
            | (3 << 25);
        let relative = operand_token::select1(OperandType::Temp, 0, 1);
        let op = decode(&[token, 0, 2, relative, 1]);

        assert_eq!(op.indices.len(), 2);
        assert_eq!(op.indices[1].representation, IndexRepresentation::Immediate32PlusRelative);
        assert_eq!(op.indices[1].value, 2);
        let rel = op.indices[1].relative.as_ref().unwrap();
        assert_eq!(rel.operand_type, OperandType::Temp);
        assert_eq!(rel.register(), Some(1));
    }

    #[test]
    fn test_truncated_operand_fails() {
        let tokens = [operand_token::mask(OperandType::Temp, 0xF, 1)];
        let mut reader = TokenReader::new(&tokens, 0);
        assert!(matches!(
            Operand::decode(&mut reader),
            Err(Error::OperandOverrun { at: 1 })
        ));
    }

    #[test]
    fn test_relative_nesting_is_bounded() {
        // r[r[r[...]]]: every operand indexes through the next one.
        let token = operand_token::select1(OperandType::Temp, 0, 1) | (2 << 22);
        let mut tokens = vec![token; 10_000];
        tokens.push(operand_token::select1(OperandType::Temp, 0, 1));
        tokens.push(0);

        let mut reader = TokenReader::new(&tokens, 0);
        assert!(matches!(
            Operand::decode(&mut reader),
            Err(Error::Unsupported {
                what: "relative operand depth",
                value: 5
            })
        ));

        // A single level still decodes.
        let op = decode(&[token, operand_token::select1(OperandType::Temp, 0, 1), 1]);
        let rel = op.indices[0].relative.as_ref().unwrap();
        assert_eq!(rel.register(), Some(1));
    }
}
