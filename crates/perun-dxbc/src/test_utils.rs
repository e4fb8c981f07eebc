//! Builders for synthetic DXBC blobs used by the unit tests.
//!
//! Enabled for this crate's tests and, through the `test-utils` feature,
//! for downstream crates that need fixture containers.

use crate::rdef::ResourceDimension;
use crate::shex::{OpcodeType, OperandType};
use crate::ProgramType;

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Null-terminated string pool placed at a known base offset.
struct Strings {
    base: usize,
    data: Vec<u8>,
}

impl Strings {
    fn new(base: usize) -> Self {
        Self {
            base,
            data: Vec::new(),
        }
    }

    fn add(&mut self, text: &str) -> u32 {
        let offset = self.base + self.data.len();
        self.data.extend_from_slice(text.as_bytes());
        self.data.push(0);
        offset as u32
    }
}

/// Build a DXBC container with chunks laid out back to back.
pub fn build_container(chunks: &[(&[u8; 4], &[u8])]) -> Vec<u8> {
    let header_size = 32 + 4 * chunks.len();
    let mut out = Vec::with_capacity(header_size + chunks.iter().map(|c| 8 + c.1.len()).sum::<usize>());
    out.extend_from_slice(b"DXBC");
    out.extend_from_slice(&[0u8; 16]);
    put_u16(&mut out, 1);
    put_u16(&mut out, 0);
    put_u32(&mut out, 0); // total size placeholder
    put_u32(&mut out, chunks.len() as u32);

    let offsets_pos = out.len();
    out.resize(header_size, 0);

    for (index, (tag, data)) in chunks.iter().enumerate() {
        let offset = out.len() as u32;
        let pos = offsets_pos + index * 4;
        out[pos..pos + 4].copy_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(*tag);
        put_u32(&mut out, data.len() as u32);
        out.extend_from_slice(data);
    }

    let total_size = out.len() as u32;
    out[24..28].copy_from_slice(&total_size.to_le_bytes());
    out
}

/// Opcode token with the instruction length (in dwords) filled in.
pub fn opcode_token(opcode: OpcodeType, len: u32) -> u32 {
    opcode as u32 | (len << 24)
}

/// Operand token constructors. `dims` is the index dimension; every index
/// slot is an immediate32.
pub mod operand_token {
    use crate::shex::OperandType;

    fn base(ty: OperandType, dims: u32) -> u32 {
        ((ty as u32) << 12) | (dims << 20)
    }

    /// Four components selected by a write mask.
    pub fn mask(ty: OperandType, mask: u8, dims: u32) -> u32 {
        2 | ((mask as u32 & 0xF) << 4) | base(ty, dims)
    }

    /// Four components selected by a swizzle.
    pub fn swizzle(ty: OperandType, swizzle: [u8; 4], dims: u32) -> u32 {
        let bits = swizzle
            .iter()
            .enumerate()
            .fold(0, |acc, (i, &c)| acc | ((c as u32 & 3) << (4 + 2 * i)));
        2 | (1 << 2) | bits | base(ty, dims)
    }

    /// Four components, one selected and broadcast.
    pub fn select1(ty: OperandType, component: u8, dims: u32) -> u32 {
        2 | (2 << 2) | ((component as u32 & 3) << 4) | base(ty, dims)
    }

    /// No components (samplers, labels, null).
    pub fn zero(ty: OperandType) -> u32 {
        base(ty, 0)
    }

    /// 32-bit immediate with one or four literals following it.
    pub fn immediate32(count: u32) -> u32 {
        let components = if count == 1 { 1 } else { 2 };
        components | base(OperandType::Immediate32, 0)
    }
}

/// Builds a SHEX chunk payload.
pub struct ProgramBuilder {
    version: u32,
    tokens: Vec<u32>,
}

impl ProgramBuilder {
    pub fn new(program_type: ProgramType, major: u8, minor: u8) -> Self {
        Self {
            version: (program_type.raw() << 16) | ((major as u32) << 4) | minor as u32,
            tokens: Vec::new(),
        }
    }

    /// Append an instruction; `extra` is OR-ed into the opcode token.
    pub fn instruction(mut self, opcode: OpcodeType, extra: u32, operands: &[u32]) -> Self {
        let len = 1 + operands.len() as u32;
        self.tokens.push(opcode_token(opcode, len) | extra);
        self.tokens.extend_from_slice(operands);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.tokens.len() * 4);
        put_u32(&mut out, self.version);
        put_u32(&mut out, 2 + self.tokens.len() as u32);
        for token in self.tokens {
            put_u32(&mut out, token);
        }
        out
    }
}

/// A constant-buffer variable for [`RdefBuilder`].
#[derive(Debug, Clone)]
pub struct VariableSpec {
    name: String,
    offset: u32,
    class: u16,
    base: u16,
    columns: u16,
    elements: u16,
    type_name: &'static str,
    default_value: Option<Vec<u8>>,
}

impl VariableSpec {
    pub fn float4(name: &str, offset: u32) -> Self {
        Self {
            name: name.to_owned(),
            offset,
            class: 1,
            base: 3,
            columns: 4,
            elements: 0,
            type_name: "float4",
            default_value: None,
        }
    }

    pub fn float(name: &str, offset: u32) -> Self {
        Self {
            columns: 1,
            class: 0,
            type_name: "float",
            ..Self::float4(name, offset)
        }
    }

    pub fn array(mut self, elements: u16) -> Self {
        self.elements = elements;
        self
    }

    pub fn default_value(mut self, bytes: &[u8]) -> Self {
        self.default_value = Some(bytes.to_vec());
        self
    }

    /// Override the raw variable class.
    pub fn class(mut self, class: u16) -> Self {
        self.class = class;
        self
    }

    fn size(&self) -> u32 {
        let element = 4 * self.columns as u32;
        match self.elements {
            0 => element,
            n => 16 * (n as u32 - 1) + element,
        }
    }
}

struct BufferSpec {
    name: String,
    size: u32,
    variables: Vec<VariableSpec>,
}

struct BindingSpec {
    name: String,
    input_type: u32,
    return_type: u32,
    dimension: u32,
    bind_point: u32,
}

fn srv_dimension(dimension: ResourceDimension) -> u32 {
    use ResourceDimension::*;
    match dimension {
        Unknown | RawBuffer | StructuredBuffer => 0,
        Buffer => 1,
        Texture1D => 2,
        Texture1DArray => 3,
        Texture2D => 4,
        Texture2DArray => 5,
        Texture2DMS => 6,
        Texture2DMSArray => 7,
        Texture3D => 8,
        TextureCube => 9,
        TextureCubeArray => 10,
        BufferEx => 11,
    }
}

/// Builds an RDEF chunk payload. Shader model 5 adds the `RD11` header and
/// the larger variable and type records.
pub struct RdefBuilder {
    program_type: ProgramType,
    major: u8,
    minor: u8,
    buffers: Vec<BufferSpec>,
    bindings: Vec<BindingSpec>,
    binding_size: usize,
}

impl RdefBuilder {
    pub fn new(program_type: ProgramType, major: u8, minor: u8) -> Self {
        Self {
            program_type,
            major,
            minor,
            buffers: Vec::new(),
            bindings: Vec::new(),
            binding_size: 32,
        }
    }

    /// Resource binding record size announced in `RD11`. Records longer than
    /// 32 bytes are zero-padded.
    pub fn binding_size(mut self, size: usize) -> Self {
        self.binding_size = size;
        self
    }

    /// Add a cbuffer bound at the next `cb` slot.
    pub fn constant_buffer(mut self, name: &str, size: u32, variables: Vec<VariableSpec>) -> Self {
        self.bindings.push(BindingSpec {
            name: name.to_owned(),
            input_type: 0,
            return_type: 0,
            dimension: 0,
            bind_point: self.buffers.len() as u32,
        });
        self.buffers.push(BufferSpec {
            name: name.to_owned(),
            size,
            variables,
        });
        self
    }

    /// Add a float texture bound at `t{slot}`.
    pub fn texture(mut self, name: &str, slot: u32, dimension: ResourceDimension) -> Self {
        self.bindings.push(BindingSpec {
            name: name.to_owned(),
            input_type: 2,
            return_type: 5,
            dimension: srv_dimension(dimension),
            bind_point: slot,
        });
        self
    }

    pub fn build(self) -> Vec<u8> {
        let sm5 = self.major >= 5;
        let header_size = if sm5 { 60 } else { 28 };
        let variable_size = if sm5 { 40 } else { 24 };
        let type_size = if sm5 { 36 } else { 16 };

        let variable_count: usize = self.buffers.iter().map(|b| b.variables.len()).sum();
        let cb_offset = header_size;
        let variables_offset = cb_offset + 24 * self.buffers.len();
        let types_offset = variables_offset + variable_size * variable_count;
        let rb_offset = types_offset + type_size * variable_count;
        let defaults_offset = rb_offset + self.binding_size * self.bindings.len();
        let defaults_size: usize = self
            .buffers
            .iter()
            .flat_map(|b| &b.variables)
            .filter_map(|v| v.default_value.as_ref())
            .map(Vec::len)
            .sum();
        let mut strings = Strings::new(defaults_offset + defaults_size);

        let mut out = Vec::new();
        put_u32(&mut out, self.buffers.len() as u32);
        put_u32(&mut out, cb_offset as u32);
        put_u32(&mut out, self.bindings.len() as u32);
        put_u32(&mut out, rb_offset as u32);
        out.push(self.minor);
        out.push(self.major);
        put_u16(&mut out, self.program_type.rdef_raw());
        put_u32(&mut out, 0x100); // flags
        put_u32(&mut out, strings.add("perun test compiler"));
        if sm5 {
            out.extend_from_slice(b"RD11");
            for size in [60, 24, 40, 36, 12, self.binding_size as u32, 0] {
                put_u32(&mut out, size);
            }
        }

        let mut variable_index = 0;
        for buffer in &self.buffers {
            put_u32(&mut out, strings.add(&buffer.name));
            put_u32(&mut out, buffer.variables.len() as u32);
            put_u32(&mut out, (variables_offset + variable_index * variable_size) as u32);
            put_u32(&mut out, buffer.size);
            put_u32(&mut out, 0);
            put_u32(&mut out, 0);
            variable_index += buffer.variables.len();
        }

        let mut default_cursor = defaults_offset;
        let mut defaults = Vec::new();
        for (index, variable) in self.buffers.iter().flat_map(|b| &b.variables).enumerate() {
            put_u32(&mut out, strings.add(&variable.name));
            put_u32(&mut out, variable.offset);
            put_u32(&mut out, variable.size());
            put_u32(&mut out, 0x2);
            put_u32(&mut out, (types_offset + index * type_size) as u32);
            match &variable.default_value {
                Some(bytes) => {
                    put_u32(&mut out, default_cursor as u32);
                    default_cursor += bytes.len();
                    defaults.extend_from_slice(bytes);
                }
                None => put_u32(&mut out, 0),
            }
            if sm5 {
                for unused in [u32::MAX, 0, u32::MAX, 0] {
                    put_u32(&mut out, unused);
                }
            }
        }

        for variable in self.buffers.iter().flat_map(|b| &b.variables) {
            put_u16(&mut out, variable.class);
            put_u16(&mut out, variable.base);
            put_u16(&mut out, 1);
            put_u16(&mut out, variable.columns);
            put_u16(&mut out, variable.elements);
            put_u16(&mut out, 0);
            put_u32(&mut out, 0);
            if sm5 {
                for _ in 0..4 {
                    put_u32(&mut out, 0);
                }
                put_u32(&mut out, strings.add(variable.type_name));
            }
        }

        for binding in &self.bindings {
            put_u32(&mut out, strings.add(&binding.name));
            put_u32(&mut out, binding.input_type);
            put_u32(&mut out, binding.return_type);
            put_u32(&mut out, binding.dimension);
            put_u32(&mut out, 0);
            put_u32(&mut out, binding.bind_point);
            put_u32(&mut out, 1);
            put_u32(&mut out, 0);
            out.resize(out.len() + self.binding_size.saturating_sub(32), 0);
        }

        debug_assert_eq!(out.len(), defaults_offset);
        out.extend_from_slice(&defaults);
        out.extend_from_slice(&strings.data);
        out
    }
}

/// A signature element for [`SignatureBuilder`].
#[derive(Debug, Clone)]
pub struct ElementSpec {
    name: String,
    semantic_index: u32,
    system_value: u32,
    component_type: u32,
    register: u32,
    mask: u8,
    min_precision: u32,
}

impl ElementSpec {
    /// A float element in register 0.
    pub fn new(name: &str, semantic_index: u32, mask: u8) -> Self {
        Self {
            name: name.to_owned(),
            semantic_index,
            system_value: 0,
            component_type: 3,
            register: 0,
            mask,
            min_precision: 0,
        }
    }

    pub fn system_value(mut self, value: u32) -> Self {
        self.system_value = value;
        self
    }

    pub fn register(mut self, register: u32) -> Self {
        self.register = register;
        self
    }

    pub fn component_type(mut self, ty: u32) -> Self {
        self.component_type = ty;
        self
    }

    pub fn min_precision(mut self, precision: u32) -> Self {
        self.min_precision = precision;
        self
    }
}

/// Builds an `ISGN`/`OSGN` payload, or `ISG1`/`OSG1` when `extended`.
pub struct SignatureBuilder {
    extended: bool,
    elements: Vec<ElementSpec>,
}

impl SignatureBuilder {
    pub fn new(extended: bool) -> Self {
        Self {
            extended,
            elements: Vec::new(),
        }
    }

    pub fn element(mut self, element: ElementSpec) -> Self {
        self.elements.push(element);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let record_size = if self.extended { 32 } else { 24 };
        let mut strings = Strings::new(8 + record_size * self.elements.len());

        let mut out = Vec::new();
        put_u32(&mut out, self.elements.len() as u32);
        put_u32(&mut out, 8);
        for element in &self.elements {
            if self.extended {
                put_u32(&mut out, 0);
            }
            put_u32(&mut out, strings.add(&element.name));
            put_u32(&mut out, element.semantic_index);
            put_u32(&mut out, element.system_value);
            put_u32(&mut out, element.component_type);
            put_u32(&mut out, element.register);
            out.push(element.mask);
            out.push(element.mask);
            put_u16(&mut out, 0);
            if self.extended {
                put_u32(&mut out, element.min_precision);
            }
        }
        out.extend_from_slice(&strings.data);
        out
    }
}

/// A `mov dst.xyzw, src.xyzw` between two single-index registers.
pub fn mov(dst: (OperandType, u32), src: (OperandType, u32)) -> [u32; 4] {
    [
        operand_token::mask(dst.0, 0xF, 1),
        dst.1,
        operand_token::swizzle(src.0, [0, 1, 2, 3], 1),
        src.1,
    ]
}
