//! Instruction stream decoding.

use log::debug;

use super::operand::Operand;
use super::token::{Token, TokenReader};
use super::{
    CustomData, Declaration, ExtendedOpcode, InstructionHeader, Interpolation, Opcode, OpcodeType,
    SamplerMode,
};
use crate::rdef::{ResourceDimension, ReturnType};
use crate::signature::SystemValue;
use crate::{Error, Result};

/// Dwords before the first instruction (version and length tokens).
const PROGRAM_HEADER_DWORDS: usize = 2;

const CUSTOM_DATA_ICB: u32 = 3;

/// Decode every instruction in `tokens` (the program without its two header tokens).
pub(super) fn decode_program(tokens: &[u32]) -> Result<Vec<Opcode>> {
    let mut opcodes = Vec::new();
    let mut at = 0;

    while at < tokens.len() {
        let len = instruction_length(tokens, at)?;
        let body = &tokens[at..at + len];
        opcodes.push(decode_instruction(body, at + PROGRAM_HEADER_DWORDS)?);
        at += len;
    }

    Ok(opcodes)
}

/// Dword length of the instruction at `at`, validated against the program.
///
/// Custom data and long declarations store a zero in the opcode length field
/// and put the real length in the following dword.
fn instruction_length(tokens: &[u32], at: usize) -> Result<usize> {
    let token = Token(tokens[at]);
    let raw = token.bits(0, 11)?;

    let mut len = token.bits(24, 7)? as usize;
    if raw == OpcodeType::CustomData as u32 || len == 0 {
        len = tokens.get(at + 1).copied().unwrap_or(0) as usize;
    }

    if len == 0 || len > tokens.len() - at {
        return Err(Error::InvalidInstructionLength {
            at: at + PROGRAM_HEADER_DWORDS,
            len,
            available: tokens.len() + PROGRAM_HEADER_DWORDS,
        });
    }
    Ok(len)
}

fn decode_instruction(body: &[u32], base: usize) -> Result<Opcode> {
    let mut reader = TokenReader::new(body, base);
    let token = reader.read()?;
    let raw = token.bits(0, 11)?;

    let Some(opcode) = OpcodeType::from_raw(raw) else {
        debug!("skipping unknown opcode {raw} at dword {base}");
        return Ok(Opcode::Unknown {
            raw,
            tokens: body.to_vec(),
        });
    };

    if opcode == OpcodeType::CustomData {
        return decode_custom_data(token, body).map(Opcode::CustomData);
    }
    if opcode.is_declaration() {
        return decode_declaration(opcode, token, &mut reader, body).map(Opcode::Declaration);
    }

    let header = decode_header(opcode, token, &mut reader)?;
    let mut operands = Vec::new();
    while !reader.is_empty() {
        operands.push(Operand::decode(&mut reader)?);
    }

    Ok(match operands.len() {
        2 => {
            let [dst, src] = take_array(operands)?;
            Opcode::Unary { header, dst, src }
        }
        3 => {
            let [dst, a, b] = take_array(operands)?;
            Opcode::Binary {
                header,
                dst,
                src: [a, b],
            }
        }
        4 => {
            let [dst, a, b, c] = take_array(operands)?;
            Opcode::Trinary {
                header,
                dst,
                src: [a, b, c],
            }
        }
        _ => Opcode::Generic { header, operands },
    })
}

fn take_array<const N: usize>(operands: Vec<Operand>) -> Result<[Operand; N]> {
    let len = operands.len();
    operands.try_into().map_err(|_| Error::Unsupported {
        what: "operand count",
        value: len as u32,
    })
}

fn decode_header(
    opcode: OpcodeType,
    token: Token,
    reader: &mut TokenReader<'_>,
) -> Result<InstructionHeader> {
    let mut extended = Vec::new();
    let mut more = token.is_extended();
    while more {
        let ext = reader.read()?;
        more = ext.is_extended();
        extended.push(decode_extended_opcode(ext)?);
    }

    let function_index = if opcode == OpcodeType::InterfaceCall {
        Some(reader.read()?.0)
    } else {
        None
    };

    Ok(InstructionHeader {
        opcode,
        token: token.0,
        saturate: token.bit(13)?,
        test_nonzero: token.bit(18)?,
        extended,
        function_index,
    })
}

fn decode_extended_opcode(token: Token) -> Result<ExtendedOpcode> {
    // Texel offsets are signed 4-bit values.
    let offset = |shift| -> Result<i8> { Ok(((token.bits(shift, 4)? as i8) << 4) >> 4) };

    Ok(match token.bits(0, 6)? {
        1 => ExtendedOpcode::SampleControls {
            u: offset(9)?,
            v: offset(13)?,
            w: offset(17)?,
        },
        2 => ExtendedOpcode::ResourceDim {
            dimension: ResourceDimension::from_token(token.bits(6, 5)?),
            stride: token.bits(11, 12)?,
        },
        3 => ExtendedOpcode::ResourceReturnType(return_types(token, 6)?),
        _ => ExtendedOpcode::Other(token.0),
    })
}

fn return_types(token: Token, shift: u32) -> Result<[ReturnType; 4]> {
    Ok([
        ReturnType::from_raw(token.bits(shift, 4)?),
        ReturnType::from_raw(token.bits(shift + 4, 4)?),
        ReturnType::from_raw(token.bits(shift + 8, 4)?),
        ReturnType::from_raw(token.bits(shift + 12, 4)?),
    ])
}

fn decode_custom_data(token: Token, body: &[u32]) -> Result<CustomData> {
    let class = token.bits(11, 21)?;
    // Token 1 is the length that framing already consumed.
    let payload = body.get(2..).unwrap_or_default();

    if class != CUSTOM_DATA_ICB {
        return Ok(CustomData::Other {
            class,
            data: payload.to_vec(),
        });
    }

    let bytes = payload.len() * 4;
    if bytes % 16 != 0 {
        return Err(Error::InvalidImmediateConstantBuffer(bytes));
    }
    Ok(CustomData::ImmediateConstantBuffer(
        payload
            .chunks_exact(4)
            .map(|v| {
                [
                    f32::from_bits(v[0]),
                    f32::from_bits(v[1]),
                    f32::from_bits(v[2]),
                    f32::from_bits(v[3]),
                ]
            })
            .collect(),
    ))
}

fn decode_declaration(
    opcode: OpcodeType,
    token: Token,
    reader: &mut TokenReader<'_>,
    body: &[u32],
) -> Result<Declaration> {
    use OpcodeType::*;

    // Extended declarations (typed UAVs) keep their raw tokens.
    if token.is_extended() {
        return Ok(Declaration::Other {
            opcode,
            tokens: body.to_vec(),
        });
    }

    Ok(match opcode {
        DclGlobalFlags => Declaration::GlobalFlags(token.bits(11, 13)?),
        DclTemps => Declaration::Temps(reader.read()?.0),
        DclIndexableTemp => Declaration::IndexableTemp {
            register: reader.read()?.0,
            count: reader.read()?.0,
            components: reader.read()?.0,
        },
        DclConstantBuffer => Declaration::ConstantBuffer {
            dynamic_indexed: token.bit(11)?,
            operand: Operand::decode(reader)?,
        },
        DclSampler => Declaration::Sampler {
            mode: match token.bits(11, 4)? {
                1 => SamplerMode::Comparison,
                2 => SamplerMode::Mono,
                _ => SamplerMode::Default,
            },
            operand: Operand::decode(reader)?,
        },
        DclResource => {
            let dimension = ResourceDimension::from_token(token.bits(11, 5)?);
            let sample_count = token.bits(16, 7)?;
            let operand = Operand::decode(reader)?;
            let return_type = return_types(reader.read()?, 0)?;
            Declaration::Resource {
                operand,
                dimension,
                sample_count,
                return_type,
            }
        }
        DclInput | DclInputSgv | DclInputSiv | DclInputPs | DclInputPsSgv | DclInputPsSiv => {
            let interpolation = matches!(opcode, DclInputPs | DclInputPsSgv | DclInputPsSiv)
                .then(|| token.bits(11, 4).map(Interpolation::from_raw))
                .transpose()?;
            let operand = Operand::decode(reader)?;
            let system_value = match opcode {
                DclInput | DclInputPs => None,
                _ => Some(SystemValue::from_raw(reader.read()?.0)),
            };
            Declaration::Input {
                opcode,
                operand,
                interpolation,
                system_value,
            }
        }
        DclOutput | DclOutputSgv | DclOutputSiv => {
            let operand = Operand::decode(reader)?;
            let system_value = match opcode {
                DclOutput => None,
                _ => Some(SystemValue::from_raw(reader.read()?.0)),
            };
            Declaration::Output {
                opcode,
                operand,
                system_value,
            }
        }
        DclThreadGroup => Declaration::ThreadGroup([
            reader.read()?.0,
            reader.read()?.0,
            reader.read()?.0,
        ]),
        _ => Declaration::Other {
            opcode,
            tokens: body.to_vec(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shex::{ComponentSelection, Components, OperandType};
    use crate::test_utils::{opcode_token, operand_token};

    fn mov(dst: u32, src: u32) -> Vec<u32> {
        vec![
            opcode_token(OpcodeType::Mov, 5),
            operand_token::mask(OperandType::Output, 0xF, 1),
            dst,
            operand_token::swizzle(OperandType::Temp, [0, 1, 2, 3], 1),
            src,
        ]
    }

    #[test]
    fn test_decode_mov() {
        let ops = decode_program(&mov(0, 0)).unwrap();
        assert_eq!(ops.len(), 1);
        let Opcode::Unary { header, dst, src } = &ops[0] else {
            panic!("expected unary, got {:?}", ops[0]);
        };
        assert_eq!(header.opcode, OpcodeType::Mov);
        assert!(!header.saturate);
        assert_eq!(dst.operand_type, OperandType::Output);
        assert_eq!(
            src.components,
            Components::Four(ComponentSelection::Swizzle([0, 1, 2, 3]))
        );
    }

    #[test]
    fn test_operand_count_selects_variant() {
        let mut tokens = vec![
            opcode_token(OpcodeType::Mad, 9) | (1 << 13),
            operand_token::mask(OperandType::Temp, 0x1, 1),
            0,
        ];
        for reg in 1..=3 {
            tokens.push(operand_token::select1(OperandType::Temp, 0, 1));
            tokens.push(reg);
        }
        tokens.push(opcode_token(OpcodeType::Ret, 1));

        let ops = decode_program(&tokens).unwrap();
        assert!(matches!(&ops[0], Opcode::Trinary { header, .. } if header.saturate));
        assert!(matches!(&ops[1], Opcode::Generic { operands, .. } if operands.is_empty()));
    }

    #[test]
    fn test_extended_opcode_chain() {
        let tokens = vec![
            opcode_token(OpcodeType::Sample, 10) | 0x8000_0000,
            // sample controls, offset (-1, 2, 0), extended again
            1 | (0xF << 9) | (2 << 13) | 0x8000_0000,
            // resource return types float x4
            3 | (5 << 6) | (5 << 10) | (5 << 14) | (5 << 18),
            operand_token::mask(OperandType::Temp, 0xF, 1),
            0,
            operand_token::swizzle(OperandType::Input, [0, 1, 0, 0], 1),
            1,
            operand_token::swizzle(OperandType::Resource, [0, 1, 2, 3], 1),
            0,
            operand_token::select1(OperandType::Sampler, 0, 1),
        ];
        // Last operand's index was cut off: the length (10) ends the instruction.
        assert!(matches!(
            decode_program(&tokens),
            Err(Error::OperandOverrun { at: 12 })
        ));

        let mut tokens = tokens;
        tokens[0] = opcode_token(OpcodeType::Sample, 11) | 0x8000_0000;
        tokens.push(0);
        let ops = decode_program(&tokens).unwrap();
        let Opcode::Trinary { header, .. } = &ops[0] else {
            panic!("expected trinary");
        };
        assert_eq!(
            header.extended,
            vec![
                ExtendedOpcode::SampleControls { u: -1, v: 2, w: 0 },
                ExtendedOpcode::ResourceReturnType([ReturnType::Float; 4]),
            ]
        );
    }

    #[test]
    fn test_udiv_has_two_destinations() {
        let mut tokens = vec![opcode_token(OpcodeType::Udiv, 8)];
        tokens.push(operand_token::mask(OperandType::Temp, 0x1, 1));
        tokens.push(0);
        tokens.push(operand_token::zero(OperandType::Null));
        for reg in 1..=2 {
            tokens.push(operand_token::select1(OperandType::Temp, 0, 1));
            tokens.push(reg);
        }
        let ops = decode_program(&tokens).unwrap();
        let Opcode::Trinary { dst, src, .. } = &ops[0] else {
            panic!("expected trinary");
        };
        assert_eq!(dst.register(), Some(0));
        assert!(src[0].is_null());
    }

    #[test]
    fn test_interface_call_reads_function_index() {
        let tokens = vec![
            opcode_token(OpcodeType::InterfaceCall, 4),
            7,
            operand_token::zero(OperandType::Interface) | (1 << 20),
            0,
        ];
        let ops = decode_program(&tokens).unwrap();
        let Opcode::Generic { header, operands } = &ops[0] else {
            panic!("expected generic");
        };
        assert_eq!(header.function_index, Some(7));
        assert_eq!(operands.len(), 1);
    }

    #[test]
    fn test_zero_length_is_rejected() {
        let tokens = vec![OpcodeType::Mov as u32];
        assert!(matches!(
            decode_program(&tokens),
            Err(Error::InvalidInstructionLength { at: 2, len: 0, .. })
        ));
    }

    #[test]
    fn test_length_past_end_is_rejected() {
        let tokens = vec![opcode_token(OpcodeType::Mov, 5), 0];
        assert!(matches!(
            decode_program(&tokens),
            Err(Error::InvalidInstructionLength { len: 5, .. })
        ));
    }

    #[test]
    fn test_unknown_opcode_is_skipped() {
        let mut tokens = vec![opcode_token(OpcodeType::Ret, 2) & !0x7ff | 0x7f0, 0xdead];
        tokens.push(opcode_token(OpcodeType::Ret, 1));
        let ops = decode_program(&tokens).unwrap();
        assert!(matches!(&ops[0], Opcode::Unknown { raw: 0x7f0, tokens } if tokens.len() == 2));
        assert_eq!(ops[1].mnemonic(), "ret");
    }

    #[test]
    fn test_immediate_constant_buffer() {
        let one = 1.0f32.to_bits();
        let tokens = vec![
            OpcodeType::CustomData as u32 | (CUSTOM_DATA_ICB << 11),
            10,
            one,
            0,
            0,
            one,
            0,
            one,
            0,
            0,
        ];
        let ops = decode_program(&tokens).unwrap();
        assert_eq!(
            ops[0],
            Opcode::CustomData(CustomData::ImmediateConstantBuffer(vec![
                [1.0, 0.0, 0.0, 1.0],
                [0.0, 1.0, 0.0, 0.0],
            ]))
        );
    }

    #[test]
    fn test_immediate_constant_buffer_not_multiple_of_16() {
        let tokens = vec![
            OpcodeType::CustomData as u32 | (CUSTOM_DATA_ICB << 11),
            5,
            0,
            0,
            0,
        ];
        assert!(matches!(
            decode_program(&tokens),
            Err(Error::InvalidImmediateConstantBuffer(12))
        ));
    }

    #[test]
    fn test_other_custom_data_is_retained() {
        let tokens = vec![OpcodeType::CustomData as u32, 4, 0x6f6c6c65, 0x68];
        let ops = decode_program(&tokens).unwrap();
        assert_eq!(
            ops[0],
            Opcode::CustomData(CustomData::Other {
                class: 0,
                data: vec![0x6f6c6c65, 0x68],
            })
        );
    }

    #[test]
    fn test_declarations() {
        let tokens = vec![
            opcode_token(OpcodeType::DclGlobalFlags, 1) | (1 << 11),
            opcode_token(OpcodeType::DclConstantBuffer, 4),
            operand_token::swizzle(OperandType::ConstantBuffer, [0, 1, 2, 3], 2),
            0,
            4,
            opcode_token(OpcodeType::DclSampler, 3) | (1 << 11),
            operand_token::zero(OperandType::Sampler) | (1 << 20),
            0,
            // texture2d, float return
            opcode_token(OpcodeType::DclResource, 4) | (3 << 11),
            operand_token::zero(OperandType::Resource) | (1 << 20),
            0,
            0x5555,
            opcode_token(OpcodeType::DclInputPsSiv, 4) | (4 << 11),
            operand_token::mask(OperandType::Input, 0xF, 1),
            0,
            1,
            opcode_token(OpcodeType::DclIndexableTemp, 4),
            0,
            8,
            4,
            opcode_token(OpcodeType::DclTemps, 2),
            3,
        ];
        let ops = decode_program(&tokens).unwrap();
        let decls: Vec<_> = ops
            .into_iter()
            .map(|op| match op {
                Opcode::Declaration(d) => d,
                other => panic!("expected declaration, got {other:?}"),
            })
            .collect();

        assert_eq!(decls[0], Declaration::GlobalFlags(1));
        assert!(matches!(
            &decls[1],
            Declaration::ConstantBuffer { operand, dynamic_indexed: false }
                if operand.indices[1].value == 4
        ));
        assert!(matches!(
            &decls[2],
            Declaration::Sampler { mode: SamplerMode::Comparison, .. }
        ));
        assert!(matches!(
            &decls[3],
            Declaration::Resource {
                dimension: ResourceDimension::Texture2D,
                return_type: [
                    ReturnType::Float,
                    ReturnType::Float,
                    ReturnType::Float,
                    ReturnType::Float
                ],
                ..
            }
        ));
        assert!(matches!(
            &decls[4],
            Declaration::Input {
                interpolation: Some(Interpolation::LinearNoPerspective),
                system_value: Some(SystemValue::Position),
                ..
            }
        ));
        assert_eq!(
            decls[5],
            Declaration::IndexableTemp {
                register: 0,
                count: 8,
                components: 4
            }
        );
        assert_eq!(decls[6], Declaration::Temps(3));
    }
}
