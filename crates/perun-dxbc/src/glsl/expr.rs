//! Operand and literal rendering.

use log::warn;

use super::GlslWriter;
use crate::shex::{Components, Immediate, NumberType, Operand, OperandIndex, OperandModifier, OperandType};
use crate::Result;

pub(super) const LANES: [char; 4] = ['x', 'y', 'z', 'w'];

/// GLSL type holding `lanes` components of `ty`.
pub(super) fn type_name(ty: NumberType, lanes: usize) -> String {
    let (scalar, prefix) = match ty {
        NumberType::Float => ("float", ""),
        NumberType::Int => ("int", "i"),
        NumberType::Uint => ("uint", "u"),
        NumberType::Double => ("double", "d"),
    };
    if lanes <= 1 {
        scalar.to_owned()
    } else {
        format!("{prefix}vec{lanes}")
    }
}

/// Reinterpret `text` from one number type to another.
///
/// 32-bit conversions are bit casts; conversions through doubles and
/// between the integer types are value constructors.
pub(super) fn convert(text: String, from: NumberType, to: NumberType, lanes: usize) -> String {
    use NumberType::*;

    let function = match (from, to) {
        _ if from == to => return text,
        (Float, Int) => "floatBitsToInt",
        (Float, Uint) => "floatBitsToUint",
        (Int, Float) => "intBitsToFloat",
        (Uint, Float) => "uintBitsToFloat",
        _ => return format!("{}({text})", type_name(to, lanes)),
    };
    format!("{function}({text})")
}

/// Float literal that reproduces the exact bit pattern.
pub(super) fn float_literal(value: f32) -> String {
    if value == 0.0 || value.is_normal() {
        format!("{value:?}")
    } else {
        format!("uintBitsToFloat({:#x}u)", value.to_bits())
    }
}

fn double_literal(value: f64) -> String {
    if value.is_finite() {
        format!("{value:?}lf")
    } else {
        let bits = value.to_bits();
        format!(
            "packDouble2x32(uvec2({:#x}u, {:#x}u))",
            bits as u32,
            (bits >> 32) as u32
        )
    }
}

/// One literal lane typed by the consuming instruction.
fn literal(immediate: &Immediate, lane: usize, ty: NumberType) -> Option<String> {
    if let Immediate::Bits64(_) = immediate {
        let bits = immediate.bits64(lane)?;
        return Some(match ty {
            NumberType::Double => double_literal(f64::from_bits(bits)),
            NumberType::Float => float_literal(f64::from_bits(bits) as f32),
            NumberType::Int => format!("{}", bits as i64 as i32),
            NumberType::Uint => format!("{}u", bits as u32),
        });
    }

    let bits = immediate.bits32(lane)?;
    Some(match ty {
        NumberType::Float => float_literal(f32::from_bits(bits)),
        NumberType::Int => format!("{}", bits as i32),
        NumberType::Uint => format!("{bits}u"),
        NumberType::Double => double_literal(f32::from_bits(bits) as f64),
    })
}

/// A valid GLSL identifier for an RDEF name.
pub(super) fn identifier(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) || out.starts_with("gl_") {
        out.insert(0, '_');
    }
    out
}

fn lane_count(mask: u8) -> usize {
    (mask & 0xF).count_ones().max(1) as usize
}

/// A rendered destination operand.
#[derive(Debug, Clone)]
pub(super) struct Destination {
    pub text: String,
    /// Type of the variable backing the register.
    pub storage: NumberType,
    pub mask: u8,
    pub lanes: usize,
}

impl GlslWriter<'_> {
    /// Variable name and backing type for a register operand.
    ///
    /// Returns `None` for the `null` register.
    pub(super) fn register(&self, op: &Operand) -> Result<Option<(String, NumberType)>> {
        use OperandType::*;

        let reg = op.indices.last().map_or(0, |i| i.value);
        let builtin = |name: &str, ty| Ok(Some((name.to_owned(), ty)));

        match op.operand_type {
            Null => Ok(None),
            Temp => Ok(Some((format!("r{reg}"), NumberType::Float))),
            Input => {
                let ty = self.inputs.get(&(reg as u32)).copied().unwrap_or(NumberType::Float);
                let name = match op.indices.as_slice() {
                    [vertex, _] => format!("v{reg}[{}]", self.index(vertex)?),
                    _ => format!("v{reg}"),
                };
                Ok(Some((name, ty)))
            }
            Output => {
                let ty = self.outputs.get(&(reg as u32)).copied().unwrap_or(NumberType::Float);
                Ok(Some((format!("o{reg}"), ty)))
            }
            IndexableTemp => {
                let register = op.register().unwrap_or(0);
                let element = match op.indices.get(1) {
                    Some(index) => self.index(index)?,
                    None => "0".to_owned(),
                };
                Ok(Some((format!("x{register}[{element}]"), NumberType::Float)))
            }
            ImmediateConstantBuffer => {
                let element = match op.indices.first() {
                    Some(index) => self.index(index)?,
                    None => "0".to_owned(),
                };
                Ok(Some((format!("icb[{element}]"), NumberType::Float)))
            }
            OutputDepth | OutputDepthGreaterEqual | OutputDepthLessEqual => {
                builtin("gl_FragDepth", NumberType::Float)
            }
            OutputCoverageMask => builtin("gl_SampleMask[0]", NumberType::Int),
            InputCoverageMask => builtin("gl_SampleMaskIn[0]", NumberType::Int),
            InputPrimitiveId => builtin("gl_PrimitiveID", NumberType::Int),
            InputGsInstanceId | OutputControlPointId => builtin("gl_InvocationID", NumberType::Int),
            InputThreadId => builtin("gl_GlobalInvocationID", NumberType::Uint),
            InputThreadGroupId => builtin("gl_WorkGroupID", NumberType::Uint),
            InputThreadIdInGroup => builtin("gl_LocalInvocationID", NumberType::Uint),
            InputThreadIdInGroupFlattened => builtin("gl_LocalInvocationIndex", NumberType::Uint),
            InputDomainPoint => builtin("gl_TessCoord", NumberType::Float),
            UnorderedAccessView | ThreadGroupSharedMemory => Ok(Some((
                format!("{}{reg}", op.operand_type.prefix()),
                NumberType::Uint,
            ))),
            other => Ok(Some((format!("{}{reg}", other.prefix()), NumberType::Float))),
        }
    }

    /// Array index text; relative indices read their register as `int`.
    pub(super) fn index(&self, index: &OperandIndex) -> Result<String> {
        match &index.relative {
            None => Ok(index.value.to_string()),
            Some(relative) => {
                let base = self.source(relative, 0x1, NumberType::Int)?;
                Ok(match index.value {
                    0 => base,
                    offset => format!("{base} + {offset}"),
                })
            }
        }
    }

    /// Render a source operand for the lanes in `mask`, typed as `ty`.
    pub(super) fn source(&self, op: &Operand, mask: u8, ty: NumberType) -> Result<String> {
        let lanes = lane_count(mask);

        let text = match op.operand_type {
            OperandType::Immediate32 | OperandType::Immediate64 => immediate(op, mask, ty),
            OperandType::ConstantBuffer => self.constant_buffer_source(op, mask, ty)?,
            _ => {
                let Some((name, storage)) = self.register(op)? else {
                    return Ok(convert("0".to_owned(), NumberType::Int, ty, lanes));
                };
                let text = match op.components {
                    Components::Four(_) => format!("{name}{}", op.swizzle_mask(mask)),
                    _ if lanes > 1 => format!("{}({name})", type_name(storage, lanes)),
                    _ => name,
                };
                convert(text, storage, ty, lanes)
            }
        };

        Ok(match op.modifier {
            OperandModifier::None => text,
            OperandModifier::Neg => format!("-({text})"),
            OperandModifier::Abs => format!("abs({text})"),
            OperandModifier::AbsNeg => format!("-abs({text})"),
        })
    }

    /// Render a destination operand, or `None` for `null`.
    pub(super) fn destination(&self, op: &Operand) -> Result<Option<Destination>> {
        let Some((name, storage)) = self.register(op)? else {
            return Ok(None);
        };
        let mask = op.write_mask();
        Ok(Some(Destination {
            text: format!("{name}{}", op.swizzle_mask(0xF)),
            storage,
            mask,
            lanes: lane_count(mask),
        }))
    }

    /// Write `dst = expr;`, saturating and converting to the register's type.
    pub(super) fn assign(
        &mut self,
        dst: &Destination,
        expr: String,
        ty: NumberType,
        saturate: bool,
    ) -> Result<()> {
        let expr = if saturate && ty == NumberType::Float {
            format!("clamp({expr}, 0.0, 1.0)")
        } else {
            expr
        };
        let expr = convert(expr, ty, dst.storage, dst.lanes);
        self.line(&format!("{} = {expr};", dst.text))
    }
}

fn immediate(op: &Operand, mask: u8, ty: NumberType) -> String {
    let Some(immediate) = &op.immediate else {
        warn!("immediate operand without literal values");
        return convert("0".to_owned(), NumberType::Int, ty, lane_count(mask));
    };

    let mask = if mask & 0xF == 0 { 0x1 } else { mask };
    let parts: Vec<String> = (0..4)
        .filter(|lane| mask & (1 << lane) != 0)
        .filter_map(|lane| literal(immediate, lane, ty))
        .collect();

    match parts.as_slice() {
        [] => convert("0".to_owned(), NumberType::Int, ty, 1),
        [single] => single.clone(),
        _ => format!("{}({})", type_name(ty, parts.len()), parts.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert() {
        let text = || "r0.xy".to_owned();
        assert_eq!(convert(text(), NumberType::Float, NumberType::Float, 2), "r0.xy");
        assert_eq!(
            convert(text(), NumberType::Float, NumberType::Int, 2),
            "floatBitsToInt(r0.xy)"
        );
        assert_eq!(
            convert(text(), NumberType::Uint, NumberType::Float, 2),
            "uintBitsToFloat(r0.xy)"
        );
        assert_eq!(convert(text(), NumberType::Int, NumberType::Uint, 2), "uvec2(r0.xy)");
        assert_eq!(convert(text(), NumberType::Uint, NumberType::Int, 1), "int(r0.xy)");
    }

    #[test]
    fn test_float_literal() {
        assert_eq!(float_literal(1.0), "1.0");
        assert_eq!(float_literal(-0.5), "-0.5");
        assert_eq!(float_literal(0.0), "0.0");
        assert_eq!(float_literal(f32::INFINITY), "uintBitsToFloat(0x7f800000u)");
        assert_eq!(float_literal(f32::from_bits(1)), "uintBitsToFloat(0x1u)");
    }

    #[test]
    fn test_literal_typing() {
        let imm = Immediate::Bits32(vec![0xffff_ffff]);
        assert_eq!(literal(&imm, 0, NumberType::Int).unwrap(), "-1");
        assert_eq!(literal(&imm, 0, NumberType::Uint).unwrap(), "4294967295u");
        assert_eq!(
            literal(&imm, 2, NumberType::Float).unwrap(),
            "uintBitsToFloat(0xffffffffu)"
        );

        let imm = Immediate::Bits64(vec![2.5f64.to_bits()]);
        assert_eq!(literal(&imm, 0, NumberType::Double).unwrap(), "2.5lf");
    }

    #[test]
    fn test_identifier() {
        assert_eq!(identifier("$Globals"), "_Globals");
        assert_eq!(identifier("gl_Thing"), "_gl_Thing");
        assert_eq!(identifier("0cb"), "_0cb");
        assert_eq!(identifier("PerMaterial"), "PerMaterial");
    }

    #[test]
    fn test_type_name() {
        assert_eq!(type_name(NumberType::Float, 1), "float");
        assert_eq!(type_name(NumberType::Int, 3), "ivec3");
        assert_eq!(type_name(NumberType::Uint, 4), "uvec4");
        assert_eq!(type_name(NumberType::Double, 2), "dvec2");
    }
}
