//! GLSL transpilation of a decoded container.
//!
//! The output is a best-effort readable translation, not an optimizing
//! compiler: every DXBC register becomes a GLSL variable, every instruction
//! one or two assignments, and anything without a mapping a commented
//! placeholder.
//!
//! DXBC registers are typeless. Each operand is rendered together with the
//! type of the variable backing it and converted with `floatBitsToInt` and
//! friends to the type the instruction computes in.

mod cbuffer;
mod expr;
mod instruction;

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::container::DxbcContainer;
use crate::rdef::{BufferType, InputType, Rdef, ResourceDimension, ReturnType};
use crate::shex::{
    CustomData, Declaration, Interpolation, NumberType, Opcode, OpcodeType, OperandType, Shex,
};
use crate::signature::{ComponentType, Signature, SignatureElement, SystemValue};
use crate::{ProgramType, Result};

use expr::{float_literal, identifier};

const INDENT: &str = "    ";

/// `vec4` rows in the largest constant buffer D3D11 allows.
const MAX_CONSTANT_BUFFER_ROWS: u64 = 4096;

/// Uniform block name to binding index table supplied by the caller.
///
/// A block's binding is the position of its name in the list. Blocks whose
/// names are not listed are emitted without a `binding` qualifier.
#[derive(Debug, Clone, Default)]
pub struct BlockBindings {
    bindings: FxHashMap<String, u32>,
}

impl BlockBindings {
    /// Build the table from names in binding order; the first occurrence wins.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut bindings = FxHashMap::default();
        for (index, name) in names.into_iter().enumerate() {
            bindings.entry(name.into()).or_insert(index as u32);
        }
        Self { bindings }
    }

    /// Binding index for a block name.
    pub fn get(&self, name: &str) -> Option<u32> {
        self.bindings.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for BlockBindings {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Options for [`DxbcContainer::to_glsl_with`].
#[derive(Debug, Clone)]
pub struct GlslOptions {
    pub bindings: BlockBindings,
    /// `#version` directive value.
    pub version: u32,
}

impl Default for GlslOptions {
    fn default() -> Self {
        Self {
            bindings: BlockBindings::default(),
            version: 450,
        }
    }
}

/// A texture declared as a combined GLSL sampler.
#[derive(Debug, Clone)]
struct Texture {
    name: String,
    bind_point: u32,
    bind_count: u32,
    dimension: ResourceDimension,
    return_type: ReturnType,
}

impl Texture {
    fn number_type(&self) -> NumberType {
        match self.return_type {
            ReturnType::Sint => NumberType::Int,
            ReturnType::Uint => NumberType::Uint,
            _ => NumberType::Float,
        }
    }
}

/// Registers referenced anywhere in the program.
#[derive(Debug, Default)]
struct UsedRegisters {
    temps: BTreeSet<u32>,
    inputs: BTreeSet<u32>,
    outputs: BTreeSet<u32>,
}

/// Renders one container as GLSL.
pub struct GlslWriter<'a> {
    options: &'a GlslOptions,
    rdef: Option<&'a Rdef>,
    program: Option<&'a Shex>,
    input_signature: Option<&'a Signature>,
    output_signature: Option<&'a Signature>,
    /// Backing variable type per input register.
    inputs: FxHashMap<u32, NumberType>,
    /// Backing variable type per output register.
    outputs: FxHashMap<u32, NumberType>,
    textures: Vec<Texture>,
    used: UsedRegisters,
    /// Copies into built-in outputs, written before every `return`.
    epilogue: Vec<String>,
    temps_declared: bool,
    /// Nesting depth of control flow that is not reconstructed.
    depth: usize,
    /// Opcodes already reported as unimplemented.
    unimplemented: FxHashSet<OpcodeType>,
    /// Constant buffer slots read through the raw `cb{N}[row]` array.
    raw_constant_buffers: RefCell<BTreeSet<u32>>,
    out: String,
}

impl<'a> GlslWriter<'a> {
    pub fn new(container: &'a DxbcContainer, options: &'a GlslOptions) -> Self {
        let program = container.shex.as_ref();
        let rdef = container.rdef.as_ref();

        let mut used = UsedRegisters::default();
        for operand in program.iter().flat_map(|p| &p.opcodes).flat_map(Opcode::operands) {
            let register = operand.indices.last().map(|i| i.value as u32);
            let set = match operand.operand_type {
                OperandType::Temp => &mut used.temps,
                OperandType::Input => &mut used.inputs,
                OperandType::Output => &mut used.outputs,
                _ => continue,
            };
            set.extend(register);
        }

        let stage = program
            .map(|p| p.program_type)
            .or(rdef.map(|r| r.program_type));

        Self {
            options,
            rdef,
            program,
            input_signature: container.input_signature.as_ref(),
            output_signature: container.output_signature.as_ref(),
            inputs: register_types(container.input_signature.as_ref()),
            outputs: register_types(container.output_signature.as_ref()),
            textures: collect_textures(rdef, program),
            used,
            epilogue: position_epilogue(stage, container.output_signature.as_ref()),
            temps_declared: false,
            depth: 0,
            unimplemented: FxHashSet::default(),
            raw_constant_buffers: RefCell::default(),
            out: String::new(),
        }
    }

    /// Produce the GLSL source.
    ///
    /// `main` is rendered first so the declarations can cover every register
    /// array the body ended up reading.
    pub fn write(mut self) -> Result<String> {
        let body = self.write_main()?;

        writeln!(self.out, "#version {}", self.options.version)?;
        if let Some(program) = self.program {
            writeln!(self.out, "// {}", program.profile())?;
        }
        writeln!(self.out)?;

        self.write_constant_buffers()?;
        self.write_textures()?;
        self.write_immediate_constant_buffer()?;
        self.write_inputs()?;
        self.write_outputs()?;

        self.out.push_str(&body);
        Ok(self.out)
    }

    fn write_main(&mut self) -> Result<String> {
        writeln!(self.out, "void main() {{")?;
        let prologue = self.prologue();
        for line in prologue {
            self.line(&line)?;
        }

        let has_temps_declaration = self
            .program
            .is_some_and(|p| p.declarations().any(|d| matches!(d, Declaration::Temps(_))));
        if !has_temps_declaration {
            self.write_temps(0)?;
        }

        let mut returned = false;
        if let Some(program) = self.program {
            for opcode in &program.opcodes {
                self.write_opcode(opcode)?;
                returned = matches!(
                    opcode,
                    Opcode::Generic { header, .. }
                        if header.opcode == OpcodeType::Ret && self.depth == 0
                );
            }
        }
        if !returned {
            self.write_epilogue()?;
        }

        writeln!(self.out, "}}")?;
        Ok(std::mem::take(&mut self.out))
    }

    fn line(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, "{INDENT}{text}")?;
        Ok(())
    }

    fn program_type(&self) -> Option<ProgramType> {
        self.program
            .map(|p| p.program_type)
            .or(self.rdef.map(|r| r.program_type))
    }

    fn write_constant_buffers(&mut self) -> Result<()> {
        let Some(rdef) = self.rdef else {
            return self.write_raw_constant_buffers();
        };

        for cb in &rdef.constant_buffers {
            if !matches!(
                cb.buffer_type,
                BufferType::ConstantBuffer | BufferType::TextureBuffer
            ) {
                continue;
            }
            if cb.variables.is_empty() {
                writeln!(self.out, "// {} has no variables", cb.name)?;
                continue;
            }

            match self.options.bindings.get(&cb.name) {
                Some(binding) => write!(self.out, "layout(std140, binding = {binding})")?,
                None => write!(self.out, "layout(std140)")?,
            }
            writeln!(self.out, " uniform {} {{", identifier(&cb.name))?;
            for variable in &cb.variables {
                writeln!(self.out, "{INDENT}{}", cbuffer::declaration(variable))?;
            }
            writeln!(self.out, "}};")?;
            writeln!(self.out)?;
        }

        self.write_raw_constant_buffers()
    }

    /// `vec4` array blocks for `dcl_constantbuffer` slots that RDEF does not
    /// describe, and for slots whose reads did not resolve to a variable.
    fn write_raw_constant_buffers(&mut self) -> Result<()> {
        let mut rows = BTreeMap::new();
        for decl in self.program.into_iter().flat_map(Shex::declarations) {
            let Declaration::ConstantBuffer { operand, .. } = decl else {
                continue;
            };
            let (Some(slot), Some(count)) = (operand.indices.first(), operand.indices.get(1)) else {
                continue;
            };
            let slot = slot.value as u32;
            if self.rdef.and_then(|r| r.constant_buffer_at(slot)).is_some() {
                continue;
            }
            rows.entry(slot).or_insert(count.value.max(1));
        }
        for &slot in self.raw_constant_buffers.borrow().iter() {
            rows.entry(slot).or_insert_with(|| {
                self.rdef
                    .and_then(|r| r.constant_buffer_at(slot))
                    .map_or(MAX_CONSTANT_BUFFER_ROWS, |cb| (cb.size as u64).div_ceil(16).max(1))
            });
        }

        for (slot, count) in rows {
            // Shares the named block's binding so both view the same buffer.
            let binding = self
                .rdef
                .and_then(|r| r.constant_buffer_at(slot))
                .and_then(|cb| self.options.bindings.get(&cb.name));
            match binding {
                Some(binding) => write!(self.out, "layout(std140, binding = {binding})")?,
                None => write!(self.out, "layout(std140)")?,
            }
            writeln!(self.out, " uniform cb{slot}_block {{")?;
            writeln!(self.out, "{INDENT}vec4 cb{slot}[{count}];")?;
            writeln!(self.out, "}};")?;
            writeln!(self.out)?;
        }
        Ok(())
    }

    fn write_textures(&mut self) -> Result<()> {
        if self.textures.is_empty() {
            return Ok(());
        }

        let mut text = String::new();
        for texture in &self.textures {
            let Some(suffix) = texture.dimension.glsl_suffix() else {
                writeln!(text, "// {}: {:?} is not a sampled texture", texture.name, texture.dimension)?;
                continue;
            };
            write!(
                text,
                "uniform {}sampler{suffix} {}",
                texture.return_type.glsl_prefix(),
                identifier(&texture.name)
            )?;
            if texture.bind_count > 1 {
                write!(text, "[{}]", texture.bind_count)?;
            }
            writeln!(text, ";")?;
        }
        self.out.push_str(&text);
        writeln!(self.out)?;
        Ok(())
    }

    fn write_immediate_constant_buffer(&mut self) -> Result<()> {
        let Some(values) = self.program.and_then(Shex::immediate_constant_buffer) else {
            return Ok(());
        };

        let elements: Vec<_> = values
            .iter()
            .map(|v| {
                format!(
                    "vec4({}, {}, {}, {})",
                    float_literal(v[0]),
                    float_literal(v[1]),
                    float_literal(v[2]),
                    float_literal(v[3])
                )
            })
            .collect();
        let n = elements.len();
        writeln!(
            self.out,
            "const vec4 icb[{n}] = vec4[{n}]({});",
            elements.join(", ")
        )?;
        writeln!(self.out)?;
        Ok(())
    }

    fn write_inputs(&mut self) -> Result<()> {
        let stage = self.program_type();
        let mut declared = BTreeSet::new();
        let mut text = String::new();

        let elements = self.input_signature.map(|s| s.registers().collect::<Vec<_>>());
        for element in elements.unwrap_or_default() {
            if element.register == u32::MAX || !declared.insert(element.register) {
                continue;
            }
            let ty = element.component_type.glsl_vec4();
            let reg = element.register;

            if input_builtin(stage, element.system_value).is_some() {
                writeln!(text, "{ty} v{reg}; // {}", semantic(element))?;
                continue;
            }
            let qualifier = self.interpolation(stage, reg, element.component_type);
            writeln!(
                text,
                "layout(location = {reg}) {qualifier}in {ty} v{reg}; // {}",
                semantic(element)
            )?;
        }

        for &reg in &self.used.inputs {
            if declared.insert(reg) {
                writeln!(text, "layout(location = {reg}) in vec4 v{reg};")?;
            }
        }

        if !text.is_empty() {
            self.out.push_str(&text);
            writeln!(self.out)?;
        }
        Ok(())
    }

    /// Interpolation qualifier for a pixel shader input.
    fn interpolation(&self, stage: Option<ProgramType>, register: u32, ty: ComponentType) -> &'static str {
        if stage != Some(ProgramType::Pixel) {
            return "";
        }
        if matches!(ty, ComponentType::SInt32 | ComponentType::UInt32) {
            return "flat ";
        }
        self.program
            .into_iter()
            .flat_map(Shex::declarations)
            .find_map(|decl| match decl {
                Declaration::Input {
                    operand,
                    interpolation: Some(mode),
                    ..
                } if operand.register() == Some(register as u64) => Some(*mode),
                _ => None,
            })
            .map_or("", Interpolation::glsl_qualifier)
    }

    fn write_outputs(&mut self) -> Result<()> {
        let stage = self.program_type();
        let mut declared = BTreeSet::new();
        let mut text = String::new();

        let elements = self.output_signature.map(|s| s.registers().collect::<Vec<_>>());
        for element in elements.unwrap_or_default() {
            if element.register == u32::MAX || !declared.insert(element.register) {
                continue;
            }
            let ty = element.component_type.glsl_vec4();
            let reg = element.register;

            if is_position_output(stage, element) {
                writeln!(text, "{ty} o{reg}; // {}", semantic(element))?;
                continue;
            }
            let flat = if stage != Some(ProgramType::Pixel)
                && matches!(element.component_type, ComponentType::SInt32 | ComponentType::UInt32)
            {
                "flat "
            } else {
                ""
            };
            writeln!(
                text,
                "layout(location = {reg}) {flat}out {ty} o{reg}; // {}",
                semantic(element)
            )?;
        }

        for &reg in &self.used.outputs {
            if declared.insert(reg) {
                writeln!(text, "layout(location = {reg}) out vec4 o{reg};")?;
            }
        }

        if !text.is_empty() {
            self.out.push_str(&text);
            writeln!(self.out)?;
        }
        Ok(())
    }

    /// Copies from GLSL built-ins into system-value input registers.
    fn prologue(&self) -> Vec<String> {
        let stage = self.program_type();
        let Some(signature) = self.input_signature else {
            return Vec::new();
        };

        signature
            .registers()
            .filter_map(|element| {
                let (value, ty, lanes) = input_builtin(stage, element.system_value)?;
                let storage = self.inputs.get(&element.register).copied()?;
                let reg = element.register;
                Some(if lanes == 4 {
                    format!("v{reg} = {};", expr::convert(value.to_owned(), ty, storage, 4))
                } else {
                    let lane = element.mask.trailing_zeros().min(3) as usize;
                    format!(
                        "v{reg}.{} = {};",
                        expr::LANES[lane],
                        expr::convert(value.to_owned(), ty, storage, 1)
                    )
                })
            })
            .collect()
    }

    fn write_epilogue(&mut self) -> Result<()> {
        for line in self.epilogue.clone() {
            self.line(&line)?;
        }
        Ok(())
    }

    /// Declare `r0..rN` covering both the declared count and every used register.
    fn write_temps(&mut self, declared: u32) -> Result<()> {
        if self.temps_declared {
            return Ok(());
        }
        self.temps_declared = true;

        let used = self.used.temps.last().map_or(0, |r| r + 1);
        for reg in 0..declared.max(used) {
            self.line(&format!("vec4 r{reg};"))?;
        }
        Ok(())
    }

    fn write_opcode(&mut self, opcode: &Opcode) -> Result<()> {
        match opcode {
            Opcode::Declaration(decl) => self.write_declaration(decl),
            Opcode::Unary { header, dst, src } => self.unary(header, dst, src),
            Opcode::Binary { header, dst, src } => self.binary(header, dst, src),
            Opcode::Trinary { header, dst, src } => self.trinary(header, dst, src),
            Opcode::Generic { header, operands } => self.generic(header, operands),
            Opcode::CustomData(CustomData::ImmediateConstantBuffer(values)) => {
                self.line(&format!("// dcl_immediateConstantBuffer {} values", values.len()))
            }
            Opcode::CustomData(CustomData::Other { class, data }) => {
                self.line(&format!("// customdata class {class}, {} dwords", data.len()))
            }
            Opcode::Unknown { raw, tokens } => {
                self.line(&format!("// unknown opcode {raw}, {} dwords", tokens.len()))
            }
        }
    }

    fn write_declaration(&mut self, decl: &Declaration) -> Result<()> {
        let mnemonic = decl.opcode().mnemonic();
        match decl {
            Declaration::Temps(count) => {
                self.line(&format!("// {mnemonic} {count}"))?;
                self.write_temps(*count)
            }
            Declaration::IndexableTemp {
                register,
                count,
                components,
            } => {
                self.line(&format!("// {mnemonic} x{register}[{count}], {components}"))?;
                self.line(&format!("vec4 x{register}[{count}];"))
            }
            Declaration::GlobalFlags(flags) => self.line(&format!("// {mnemonic} {flags:#x}")),
            Declaration::ConstantBuffer { operand, .. } => {
                let slot = operand.register().unwrap_or(0);
                let rows = operand.indices.get(1).map_or(0, |i| i.value);
                self.line(&format!("// {mnemonic} cb{slot}[{rows}]"))
            }
            Declaration::Sampler { operand, mode } => {
                let slot = operand.register().unwrap_or(0);
                self.line(&format!("// {mnemonic} s{slot} {mode:?}"))
            }
            Declaration::Resource {
                operand, dimension, ..
            } => {
                let slot = operand.register().unwrap_or(0);
                self.line(&format!("// {mnemonic} t{slot} {dimension:?}"))
            }
            Declaration::Input {
                operand,
                system_value,
                ..
            }
            | Declaration::Output {
                operand,
                system_value,
                ..
            } => {
                let prefix = operand.operand_type.prefix();
                let mut text = format!("// {mnemonic} {prefix}");
                if let Some(reg) = operand.register() {
                    write!(text, "{reg}")?;
                }
                text.push_str(&operand.swizzle_mask(0xF));
                if let Some(system_value) = system_value {
                    write!(text, " {system_value:?}")?;
                }
                self.line(&text)
            }
            Declaration::ThreadGroup([x, y, z]) => {
                self.line(&format!("// {mnemonic} {x}, {y}, {z}"))
            }
            Declaration::Other { tokens, .. } => {
                self.line(&format!("// {mnemonic} ({} dwords)", tokens.len()))
            }
        }
    }
}

fn semantic(element: &SignatureElement) -> String {
    if element.semantic_index == 0 {
        element.name.clone()
    } else {
        format!("{}{}", element.name, element.semantic_index)
    }
}

fn register_types(signature: Option<&Signature>) -> FxHashMap<u32, NumberType> {
    signature
        .map(|s| {
            s.registers()
                .map(|e| {
                    let ty = match e.component_type {
                        ComponentType::SInt32 => NumberType::Int,
                        ComponentType::UInt32 => NumberType::Uint,
                        _ => NumberType::Float,
                    };
                    (e.register, ty)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn is_position_output(stage: Option<ProgramType>, element: &SignatureElement) -> bool {
    stage != Some(ProgramType::Pixel) && element.system_value == SystemValue::Position
}

/// Copies of position outputs into `gl_Position`, one per declared register.
fn position_epilogue(stage: Option<ProgramType>, signature: Option<&Signature>) -> Vec<String> {
    let mut declared = BTreeSet::new();
    signature
        .into_iter()
        .flat_map(Signature::registers)
        .filter(|e| e.register != u32::MAX && declared.insert(e.register))
        .filter(|e| is_position_output(stage, e))
        .map(|e| format!("gl_Position = o{};", e.register))
        .collect()
}

/// GLSL built-in feeding a system-value input: expression, type, lanes.
fn input_builtin(
    stage: Option<ProgramType>,
    value: SystemValue,
) -> Option<(&'static str, NumberType, usize)> {
    match (stage?, value) {
        (ProgramType::Pixel, SystemValue::Position) => Some(("gl_FragCoord", NumberType::Float, 4)),
        (ProgramType::Pixel, SystemValue::IsFrontFace) => {
            Some(("(gl_FrontFacing ? 0xffffffffu : 0u)", NumberType::Uint, 1))
        }
        (ProgramType::Pixel, SystemValue::SampleIndex) => Some(("gl_SampleID", NumberType::Int, 1)),
        (ProgramType::Pixel | ProgramType::Geometry, SystemValue::PrimitiveId) => {
            Some(("gl_PrimitiveID", NumberType::Int, 1))
        }
        (ProgramType::Vertex, SystemValue::VertexId) => Some(("gl_VertexID", NumberType::Int, 1)),
        (ProgramType::Vertex, SystemValue::InstanceId) => {
            Some(("gl_InstanceID", NumberType::Int, 1))
        }
        _ => None,
    }
}

/// Textures from RDEF bindings, plus `dcl_resource` slots RDEF does not cover.
fn collect_textures(rdef: Option<&Rdef>, program: Option<&Shex>) -> Vec<Texture> {
    let mut textures: Vec<Texture> = rdef
        .into_iter()
        .flat_map(|r| &r.resource_bindings)
        .filter(|rb| rb.input_type == InputType::Texture)
        .map(|rb| Texture {
            name: rb.name.clone(),
            bind_point: rb.bind_point,
            bind_count: rb.bind_count.max(1),
            dimension: rb.dimension,
            return_type: rb.return_type,
        })
        .collect();

    for decl in program.into_iter().flat_map(Shex::declarations) {
        let Declaration::Resource {
            operand,
            dimension,
            return_type,
            ..
        } = decl
        else {
            continue;
        };
        let Some(slot) = operand.register().map(|s| s as u32) else {
            continue;
        };
        if textures.iter().any(|t| t.covers(slot)) {
            continue;
        }
        textures.push(Texture {
            name: format!("t{slot}"),
            bind_point: slot,
            bind_count: 1,
            dimension: *dimension,
            return_type: return_type[0],
        });
    }

    textures.sort_by_key(|t| t.bind_point);
    textures
}

impl Texture {
    fn covers(&self, slot: u32) -> bool {
        (self.bind_point..self.bind_point + self.bind_count).contains(&slot)
    }
}

#[cfg(test)]
mod tests;
