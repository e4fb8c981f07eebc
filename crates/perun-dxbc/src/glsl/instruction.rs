//! Per-opcode GLSL mapping.

use log::warn;

use super::expr::{convert, identifier, type_name, Destination};
use super::{GlslWriter, INDENT};
use crate::rdef::ResourceDimension;
use crate::shex::{ExtendedOpcode, Immediate, InstructionHeader, NumberType, OpcodeType, Operand};
use crate::Result;

/// A resolved texture operand.
struct Lookup {
    name: String,
    dimension: ResourceDimension,
    ty: NumberType,
}

/// Extra arguments of the sampling instructions.
enum Sampling<'o> {
    Plain,
    Lod(&'o Operand),
    Bias(&'o Operand),
    Grad(&'o Operand, &'o Operand),
}

fn lane_mask(lanes: usize) -> u8 {
    ((1u32 << lanes.min(4)) - 1) as u8
}

/// Components of a `textureSize` result.
fn size_lanes(dimension: ResourceDimension) -> usize {
    use ResourceDimension::*;
    match dimension {
        Texture1DArray | Texture2D | Texture2DMS | TextureCube => 2,
        Texture2DArray | Texture2DMSArray | Texture3D | TextureCubeArray => 3,
        _ => 1,
    }
}

/// Components of a texel offset.
fn offset_lanes(dimension: ResourceDimension) -> usize {
    use ResourceDimension::*;
    match dimension {
        Texture1D | Texture1DArray => 1,
        Texture2D | Texture2DArray | Texture2DMS | Texture2DMSArray => 2,
        Texture3D => 3,
        _ => 0,
    }
}

/// Components of a gradient.
fn gradient_lanes(dimension: ResourceDimension) -> usize {
    use ResourceDimension::*;
    match dimension {
        Texture2D | Texture2DArray => 2,
        Texture3D | TextureCube | TextureCubeArray => 3,
        _ => 1,
    }
}

/// `_nz`/`_z` suffix for conditional opcodes.
fn test_suffix(header: &InstructionHeader) -> &'static str {
    use OpcodeType::*;
    match header.opcode {
        If | Breakc | Continuec | Retc | Discard | Callc if header.test_nonzero => "_nz",
        If | Breakc | Continuec | Retc | Discard | Callc => "_z",
        _ => "",
    }
}

/// Disassembly-style operand text for comments.
fn operand_comment(op: &Operand) -> String {
    if let Some(immediate) = &op.immediate {
        let values: Vec<String> = match immediate {
            Immediate::Bits32(v) => v.iter().map(|b| format!("{b:#x}")).collect(),
            Immediate::Bits64(v) => v.iter().map(|b| format!("{b:#x}")).collect(),
        };
        return format!("l({})", values.join(", "));
    }
    let mut text = op.operand_type.prefix().to_owned();
    if let Some(register) = op.register() {
        text.push_str(&register.to_string());
    }
    text.push_str(&op.swizzle_mask(0xF));
    text
}

/// Texel offset from an `aoffimmi` extended token.
fn sample_offset(header: &InstructionHeader, dimension: ResourceDimension) -> Option<String> {
    let (u, v, w) = header.extended.iter().find_map(|ext| match ext {
        ExtendedOpcode::SampleControls { u, v, w } => Some((*u, *v, *w)),
        _ => None,
    })?;
    if (u, v, w) == (0, 0, 0) {
        return None;
    }
    match offset_lanes(dimension) {
        0 => None,
        1 => Some(u.to_string()),
        2 => Some(format!("ivec2({u}, {v})")),
        _ => Some(format!("ivec3({u}, {v}, {w})")),
    }
}

fn comparison(opcode: OpcodeType) -> Option<(&'static str, &'static str)> {
    use OpcodeType::*;
    match opcode {
        Eq | Ieq | Deq => Some(("==", "equal")),
        Ne | Ine | Dne => Some(("!=", "notEqual")),
        Lt | Ilt | Ult | Dlt => Some(("<", "lessThan")),
        Ge | Ige | Uge | Dge => Some((">=", "greaterThanEqual")),
        _ => None,
    }
}

impl GlslWriter<'_> {
    pub(super) fn unary(&mut self, header: &InstructionHeader, dst: &Operand, src: &Operand) -> Result<()> {
        use OpcodeType::*;

        let Some(d) = self.destination(dst)? else {
            return Ok(());
        };
        let (dst_ty, src_ty) = header.opcode.number_types();
        let a = self.source(src, d.mask, src_ty)?;
        let uint = type_name(NumberType::Uint, d.lanes);

        let expr = match header.opcode {
            Mov | Dmov => a,
            Rsq => format!("inversesqrt({a})"),
            Sqrt => format!("sqrt({a})"),
            Log => format!("log2({a})"),
            Exp => format!("exp2({a})"),
            Frc => format!("fract({a})"),
            Rcp => format!("1.0 / {a}"),
            Drcp => format!("1.0lf / {a}"),
            RoundNi => format!("floor({a})"),
            RoundPi => format!("ceil({a})"),
            RoundNe => format!("roundEven({a})"),
            RoundZ => format!("sign({a}) * floor(abs({a}))"),
            Ftoi | Ftou | Itof | Utof | Dtof | Ftod | Dtoi | Dtou | Itod | Utod => {
                format!("{}({a})", type_name(dst_ty, d.lanes))
            }
            DerivRtx => format!("dFdx({a})"),
            DerivRty => format!("dFdy({a})"),
            DerivRtxCoarse => format!("dFdxCoarse({a})"),
            DerivRtyCoarse => format!("dFdyCoarse({a})"),
            DerivRtxFine => format!("dFdxFine({a})"),
            DerivRtyFine => format!("dFdyFine({a})"),
            Not => format!("~({a})"),
            Ineg => format!("-({a})"),
            Bfrev => format!("bitfieldReverse({a})"),
            Countbits => format!("{uint}(bitCount({a}))"),
            FirstbitLo => format!("{uint}(findLSB({a}))"),
            FirstbitHi => format!("{uint}(findLSB(bitfieldReverse({a})))"),
            FirstbitShi => format!("{uint}(findLSB(bitfieldReverse({uint}({a} ^ ({a} >> 31)))))"),
            opcode => return self.unimplemented(opcode),
        };
        self.assign(&d, expr, dst_ty, header.saturate)
    }

    pub(super) fn binary(
        &mut self,
        header: &InstructionHeader,
        dst: &Operand,
        src: &[Operand; 2],
    ) -> Result<()> {
        use OpcodeType::*;

        let [a_op, b_op] = src;
        match header.opcode {
            Sincos => return self.sincos(header, dst, a_op, b_op),
            Ld => return self.texel_fetch(header, dst, a_op, b_op, None),
            Resinfo => return self.resinfo(header, dst, a_op, b_op),
            _ => {}
        }

        let Some(d) = self.destination(dst)? else {
            return Ok(());
        };
        let (dst_ty, src_ty) = header.opcode.number_types();

        let expr = match header.opcode {
            Dp2 | Dp3 | Dp4 => {
                let mask = match header.opcode {
                    Dp2 => 0x3,
                    Dp3 => 0x7,
                    _ => 0xF,
                };
                let a = self.source(a_op, mask, NumberType::Float)?;
                let b = self.source(b_op, mask, NumberType::Float)?;
                let dot = format!("dot({a}, {b})");
                if d.lanes > 1 {
                    format!("{}({dot})", type_name(NumberType::Float, d.lanes))
                } else {
                    dot
                }
            }
            Min | Imin | Umin | Dmin | AtomicImin | AtomicUmin => {
                let a = self.source(a_op, d.mask, src_ty)?;
                let b = self.source(b_op, d.mask, src_ty)?;
                format!("min({a}, {b})")
            }
            Max | Imax | Umax | Dmax | AtomicImax | AtomicUmax => {
                let a = self.source(a_op, d.mask, src_ty)?;
                let b = self.source(b_op, d.mask, src_ty)?;
                format!("max({a}, {b})")
            }
            opcode => {
                if let Some((operator, function)) = comparison(opcode) {
                    let a = self.source(a_op, d.mask, src_ty)?;
                    let b = self.source(b_op, d.mask, src_ty)?;
                    if d.lanes == 1 {
                        format!("{a} {operator} {b} ? 0xffffffffu : 0u")
                    } else {
                        let uint = type_name(NumberType::Uint, d.lanes);
                        format!("mix({uint}(0u), {uint}(0xffffffffu), {function}({a}, {b}))")
                    }
                } else if let Some(operator) = opcode.infix_operator() {
                    let a = self.source(a_op, d.mask, src_ty)?;
                    let b = self.source(b_op, d.mask, src_ty)?;
                    format!("{a} {operator} {b}")
                } else {
                    return self.unimplemented(opcode);
                }
            }
        };
        self.assign(&d, expr, dst_ty, header.saturate)
    }

    pub(super) fn trinary(
        &mut self,
        header: &InstructionHeader,
        dst: &Operand,
        src: &[Operand; 3],
    ) -> Result<()> {
        use OpcodeType::*;

        let [a_op, b_op, c_op] = src;
        match header.opcode {
            Udiv => return self.udiv(header, dst, src),
            Imul | Umul => return self.wide_multiply(header, dst, src),
            Sample => return self.sample(header, dst, a_op, b_op, Sampling::Plain),
            LdMs => return self.texel_fetch(header, dst, a_op, b_op, Some(c_op)),
            _ => {}
        }

        let Some(d) = self.destination(dst)? else {
            return Ok(());
        };
        let (dst_ty, src_ty) = header.opcode.number_types();

        let expr = match header.opcode {
            Mad | Dfma => {
                let a = self.source(a_op, d.mask, src_ty)?;
                let b = self.source(b_op, d.mask, src_ty)?;
                let c = self.source(c_op, d.mask, src_ty)?;
                format!("fma({a}, {b}, {c})")
            }
            Imad | Umad => {
                let a = self.source(a_op, d.mask, src_ty)?;
                let b = self.source(b_op, d.mask, src_ty)?;
                let c = self.source(c_op, d.mask, src_ty)?;
                format!("{a} * {b} + {c}")
            }
            Movc | Dmovc => {
                let condition = self.source(a_op, d.mask, NumberType::Uint)?;
                let a = self.source(b_op, d.mask, dst_ty)?;
                let b = self.source(c_op, d.mask, dst_ty)?;
                if d.lanes == 1 {
                    format!("{condition} != 0u ? {a} : {b}")
                } else {
                    let uint = type_name(NumberType::Uint, d.lanes);
                    format!("mix({b}, {a}, notEqual({condition}, {uint}(0u)))")
                }
            }
            Ubfe | Ibfe => {
                let bits = if dst_ty == NumberType::Uint { "31u" } else { "31" };
                let mut parts = Vec::with_capacity(d.lanes);
                for lane in (0..4).filter(|lane| d.mask & (1 << lane) != 0) {
                    let width = self.source(a_op, 1 << lane, src_ty)?;
                    let offset = self.source(b_op, 1 << lane, src_ty)?;
                    let value = self.source(c_op, 1 << lane, src_ty)?;
                    parts.push(format!(
                        "bitfieldExtract({value}, int({offset} & {bits}), int({width} & {bits}))"
                    ));
                }
                match parts.as_slice() {
                    [single] => single.clone(),
                    _ => format!("{}({})", type_name(dst_ty, parts.len()), parts.join(", ")),
                }
            }
            opcode => return self.unimplemented(opcode),
        };
        self.assign(&d, expr, dst_ty, header.saturate)
    }

    pub(super) fn generic(&mut self, header: &InstructionHeader, operands: &[Operand]) -> Result<()> {
        use OpcodeType::*;

        match (header.opcode, operands) {
            (Ret, []) if self.depth == 0 => {
                self.write_epilogue()?;
                self.line("return;")
            }
            (Retc | Discard, [condition]) if self.depth == 0 => {
                let test = if header.test_nonzero { "!=" } else { "==" };
                let condition = self.source(condition, 0x1, NumberType::Uint)?;
                if header.opcode == Discard {
                    return self.line(&format!("if ({condition} {test} 0u) discard;"));
                }
                self.line(&format!("if ({condition} {test} 0u) {{"))?;
                for line in self.epilogue.clone() {
                    self.line(&format!("{INDENT}{line}"))?;
                }
                self.line(&format!("{INDENT}return;"))?;
                self.line("}")
            }
            (If | Loop | Switch, _) => {
                self.control_flow_comment(header, operands)?;
                self.depth += 1;
                Ok(())
            }
            (EndIf | EndLoop | EndSwitch, _) => {
                self.depth = self.depth.saturating_sub(1);
                self.control_flow_comment(header, operands)
            }
            (
                Ret | Retc | Discard | Else | Case | Default | Break | Breakc | Continue
                | Continuec | Label | Nop | Sync,
                _,
            ) => self.control_flow_comment(header, operands),
            (SampleL, [dst, address, resource, _, lod]) => {
                self.sample(header, dst, address, resource, Sampling::Lod(lod))
            }
            (SampleB, [dst, address, resource, _, bias]) => {
                self.sample(header, dst, address, resource, Sampling::Bias(bias))
            }
            (SampleD, [dst, address, resource, _, ddx, ddy]) => {
                self.sample(header, dst, address, resource, Sampling::Grad(ddx, ddy))
            }
            (opcode, _) => self.unimplemented(opcode),
        }
    }

    /// Comment for control flow that is emitted as straight-line code.
    fn control_flow_comment(&mut self, header: &InstructionHeader, operands: &[Operand]) -> Result<()> {
        let mut text = format!("// {}{}", header.opcode.mnemonic(), test_suffix(header));
        let operands: Vec<String> = operands.iter().map(operand_comment).collect();
        if !operands.is_empty() {
            text.push(' ');
            text.push_str(&operands.join(", "));
        }
        self.line(&text)
    }

    pub(super) fn unimplemented(&mut self, opcode: OpcodeType) -> Result<()> {
        if self.unimplemented.insert(opcode) {
            warn!("no GLSL mapping for {}", opcode.mnemonic());
        }
        self.line(&format!("// unimplemented: {}", opcode.mnemonic()))
    }

    /// The sampler uniform bound to a resource operand.
    fn lookup(&self, op: &Operand) -> Option<Lookup> {
        let slot = op.register()? as u32;
        let texture = self.textures.iter().find(|t| t.covers(slot))?;
        let name = identifier(&texture.name);
        Some(Lookup {
            name: if texture.bind_count > 1 {
                format!("{name}[{}]", slot - texture.bind_point)
            } else {
                name
            },
            dimension: texture.dimension,
            ty: texture.number_type(),
        })
    }

    fn sample(
        &mut self,
        header: &InstructionHeader,
        dst: &Operand,
        address: &Operand,
        resource: &Operand,
        sampling: Sampling<'_>,
    ) -> Result<()> {
        let Some(d) = self.destination(dst)? else {
            return Ok(());
        };
        let Some(texture) = self.lookup(resource) else {
            return self.unimplemented(header.opcode);
        };

        let name = &texture.name;
        let coords_mask = lane_mask(texture.dimension.coordinate_lanes());
        let coords = self.source(address, coords_mask, NumberType::Float)?;
        let offset = sample_offset(header, texture.dimension);

        let call = match (sampling, offset) {
            (Sampling::Plain, None) => format!("texture({name}, {coords})"),
            (Sampling::Plain, Some(offset)) => format!("textureOffset({name}, {coords}, {offset})"),
            (Sampling::Lod(lod), offset) => {
                let lod = self.source(lod, 0x1, NumberType::Float)?;
                match offset {
                    None => format!("textureLod({name}, {coords}, {lod})"),
                    Some(offset) => format!("textureLodOffset({name}, {coords}, {lod}, {offset})"),
                }
            }
            (Sampling::Bias(bias), offset) => {
                let bias = self.source(bias, 0x1, NumberType::Float)?;
                match offset {
                    None => format!("texture({name}, {coords}, {bias})"),
                    Some(offset) => format!("textureOffset({name}, {coords}, {offset}, {bias})"),
                }
            }
            (Sampling::Grad(ddx, ddy), offset) => {
                let mask = lane_mask(gradient_lanes(texture.dimension));
                let ddx = self.source(ddx, mask, NumberType::Float)?;
                let ddy = self.source(ddy, mask, NumberType::Float)?;
                match offset {
                    None => format!("textureGrad({name}, {coords}, {ddx}, {ddy})"),
                    Some(offset) => {
                        format!("textureGradOffset({name}, {coords}, {ddx}, {ddy}, {offset})")
                    }
                }
            }
        };

        let expr = format!("{call}{}", resource.swizzle_mask(d.mask));
        self.assign(&d, expr, texture.ty, header.saturate)
    }

    /// `ld` and `ld_ms`: integer texel coordinates, lod in `.w` or a sample index.
    fn texel_fetch(
        &mut self,
        header: &InstructionHeader,
        dst: &Operand,
        address: &Operand,
        resource: &Operand,
        sample: Option<&Operand>,
    ) -> Result<()> {
        use ResourceDimension::*;

        let Some(d) = self.destination(dst)? else {
            return Ok(());
        };
        let Some(texture) = self.lookup(resource) else {
            return self.unimplemented(header.opcode);
        };

        let name = &texture.name;
        let coords_mask = lane_mask(texture.dimension.coordinate_lanes());
        let coords = self.source(address, coords_mask, NumberType::Int)?;
        let call = match texture.dimension {
            Buffer | BufferEx => format!("texelFetch({name}, {coords})"),
            Texture2DMS | Texture2DMSArray => {
                let sample = match sample {
                    Some(op) => self.source(op, 0x1, NumberType::Int)?,
                    None => "0".to_owned(),
                };
                format!("texelFetch({name}, {coords}, {sample})")
            }
            dimension => {
                let lod = self.source(address, 0x8, NumberType::Int)?;
                match sample_offset(header, dimension) {
                    None => format!("texelFetch({name}, {coords}, {lod})"),
                    Some(offset) => format!("texelFetchOffset({name}, {coords}, {lod}, {offset})"),
                }
            }
        };

        let expr = format!("{call}{}", resource.swizzle_mask(d.mask));
        self.assign(&d, expr, texture.ty, header.saturate)
    }

    /// `resinfo`: width, height, depth or layers, then the mip count.
    fn resinfo(
        &mut self,
        header: &InstructionHeader,
        dst: &Operand,
        mip: &Operand,
        resource: &Operand,
    ) -> Result<()> {
        use ResourceDimension::*;

        let Some(d) = self.destination(dst)? else {
            return Ok(());
        };
        let Some(texture) = self.lookup(resource) else {
            return self.unimplemented(header.opcode);
        };

        let name = &texture.name;
        let (size, levels) = match texture.dimension {
            Buffer | BufferEx | Texture2DMS | Texture2DMSArray => {
                (format!("textureSize({name})"), "1".to_owned())
            }
            _ => {
                let lod = self.source(mip, 0x1, NumberType::Uint)?;
                (
                    format!("textureSize({name}, int({lod}))"),
                    format!("textureQueryLevels({name})"),
                )
            }
        };
        let size = match size_lanes(texture.dimension) {
            1 => format!("ivec3({size}, 0, 0)"),
            2 => format!("ivec3({size}, 0)"),
            _ => size,
        };

        let (ty, call) = match header.resinfo_return_type() {
            1 => (NumberType::Float, format!("vec4(1.0 / vec3({size}), float({levels}))")),
            2 => (NumberType::Uint, format!("uvec4(uvec3({size}), uint({levels}))")),
            _ => (NumberType::Float, format!("vec4(vec3({size}), float({levels}))")),
        };
        let expr = format!("{call}{}", resource.swizzle_mask(d.mask));
        self.assign(&d, expr, ty, header.saturate)
    }

    /// `sincos`: sine to the first destination, cosine to the second.
    fn sincos(
        &mut self,
        header: &InstructionHeader,
        sin_dst: &Operand,
        cos_dst: &Operand,
        value: &Operand,
    ) -> Result<()> {
        for (dst, function) in [(sin_dst, "sin"), (cos_dst, "cos")] {
            let Some(d) = self.destination(dst)? else {
                continue;
            };
            let a = self.source(value, d.mask, NumberType::Float)?;
            self.assign(&d, format!("{function}({a})"), NumberType::Float, header.saturate)?;
        }
        Ok(())
    }

    /// `udiv`: quotient and remainder written independently.
    fn udiv(&mut self, header: &InstructionHeader, quotient: &Operand, src: &[Operand; 3]) -> Result<()> {
        let [remainder, a_op, b_op] = src;
        for (dst, operator) in [(quotient, "/"), (remainder, "%")] {
            let Some(d) = self.destination(dst)? else {
                continue;
            };
            let a = self.source(a_op, d.mask, NumberType::Uint)?;
            let b = self.source(b_op, d.mask, NumberType::Uint)?;
            self.assign(&d, format!("{a} {operator} {b}"), NumberType::Uint, header.saturate)?;
        }
        Ok(())
    }

    /// `imul`/`umul`: high half through `[iu]mulExtended`, low half as a product.
    fn wide_multiply(&mut self, header: &InstructionHeader, high: &Operand, src: &[Operand; 3]) -> Result<()> {
        let [low, a_op, b_op] = src;
        let (ty, _) = header.opcode.number_types();
        let function = match ty {
            NumberType::Int => "imulExtended",
            _ => "umulExtended",
        };

        if let Some(d) = self.destination(high)? {
            let a = self.source(a_op, d.mask, ty)?;
            let b = self.source(b_op, d.mask, ty)?;
            self.wide_high(&d, function, &a, &b, ty)?;
        }
        if let Some(d) = self.destination(low)? {
            let a = self.source(a_op, d.mask, ty)?;
            let b = self.source(b_op, d.mask, ty)?;
            self.assign(&d, format!("{a} * {b}"), ty, header.saturate)?;
        }
        Ok(())
    }

    fn wide_high(&mut self, d: &Destination, function: &str, a: &str, b: &str, ty: NumberType) -> Result<()> {
        let value_type = type_name(ty, d.lanes);
        let msb = convert("msb".to_owned(), ty, d.storage, d.lanes);
        self.line(&format!(
            "{{ {value_type} msb, lsb; {function}({a}, {b}, msb, lsb); {} = {msb}; }}",
            d.text
        ))
    }
}
