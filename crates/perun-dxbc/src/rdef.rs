//! RDEF resource definition chunk.
//!
//! All offsets inside the chunk are relative to the start of the RDEF payload.
//!
//! # Layout
//!
//! - Header (28 bytes): constant buffer count/offset, resource binding
//!   count/offset, version token, flags, creator string offset
//! - SM5 only: `RD11` followed by seven record-size dwords
//! - Constant buffer records (24 bytes), each pointing at its variable records
//! - Variable records (24 bytes, 40 on SM5), each pointing at a type record
//! - Type records (16 bytes, 36 on SM5)
//! - Resource binding records (32 bytes)
//! - String and default-value data

use perun_common::BinaryReader;

use crate::{Error, ProgramType, Result};

const RD11_MAGIC: &[u8; 4] = b"RD11";

/// Type records nested deeper than this are rejected.
const MAX_TYPE_DEPTH: usize = 16;

/// Upper bound on expanded type records per chunk. Members may share one type
/// record, so the expanded tree can be far larger than the chunk itself.
const MAX_TYPE_RECORDS: usize = 1 << 16;

/// Parsed RDEF chunk.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Rdef {
    pub major_version: u8,
    pub minor_version: u8,
    pub program_type: ProgramType,
    pub flags: u32,
    pub creator: String,
    pub rd11: Option<Rd11>,
    pub constant_buffers: Vec<ConstantBuffer>,
    pub resource_bindings: Vec<ResourceBinding>,
}

/// SM5 `RD11` record sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Rd11 {
    pub header_size: u32,
    pub constant_buffer_size: u32,
    pub variable_size: u32,
    pub type_size: u32,
    pub member_size: u32,
    pub binding_size: u32,
    pub interface_slots: u32,
}

/// Constant buffer flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum BufferType {
    ConstantBuffer,
    TextureBuffer,
    InterfacePointers,
    ResourceBindInfo,
    Other(u32),
}

impl BufferType {
    fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::ConstantBuffer,
            1 => Self::TextureBuffer,
            2 => Self::InterfacePointers,
            3 => Self::ResourceBindInfo,
            other => Self::Other(other),
        }
    }
}

/// A `cbuffer` or `tbuffer` declaration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ConstantBuffer {
    pub name: String,
    /// Sorted by ascending `offset`.
    pub variables: Vec<Variable>,
    pub size: u32,
    pub flags: u32,
    pub buffer_type: BufferType,
}

impl ConstantBuffer {
    /// The variable containing byte `offset`, with its 16-byte row and
    /// component within that row.
    ///
    /// Picks the last variable starting at or before `offset`.
    pub fn resolve(&self, offset: u32) -> Result<ResolvedOffset<'_>> {
        if offset >= self.size {
            return Err(Error::ConstantBufferOffsetOutOfRange {
                buffer: self.name.clone(),
                offset,
                size: self.size,
            });
        }

        let variable = self
            .variables
            .iter()
            .take_while(|v| v.offset <= offset)
            .last()
            .ok_or_else(|| Error::ConstantBufferOffsetOutOfRange {
                buffer: self.name.clone(),
                offset,
                size: self.size,
            })?;

        let relative = offset - variable.offset;
        Ok(ResolvedOffset {
            variable,
            sub_index: relative / 16,
            component: (relative % 16) / 4,
        })
    }
}

/// Result of [`ConstantBuffer::resolve`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedOffset<'a> {
    pub variable: &'a Variable,
    /// 16-byte row inside the variable (array element or matrix row).
    pub sub_index: u32,
    /// 32-bit component inside that row.
    pub component: u32,
}

/// A variable inside a constant buffer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Variable {
    pub name: String,
    /// Byte offset from the start of the buffer.
    pub offset: u32,
    pub size: u32,
    pub flags: u32,
    pub ty: VariableType,
    pub default_value: Option<Vec<u8>>,
}

impl Variable {
    /// `D3D_SVF_USED`
    pub const FLAG_USED: u32 = 0x2;

    /// Whether the compiler marked the variable as referenced.
    pub fn is_used(&self) -> bool {
        self.flags & Self::FLAG_USED != 0
    }
}

/// Type record of a variable or struct member.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct VariableType {
    pub class: VariableClass,
    pub base: BaseType,
    pub rows: u16,
    pub columns: u16,
    /// Array length, zero for non-arrays.
    pub elements: u16,
    /// SM5 type name (`float4`, struct names).
    pub name: Option<String>,
    pub members: Vec<TypeMember>,
}

/// A member of a struct type.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TypeMember {
    pub name: String,
    pub offset: u32,
    pub ty: VariableType,
}

/// Variable class (`D3D_SHADER_VARIABLE_CLASS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum VariableClass {
    Scalar,
    Vector,
    MatrixRows,
    MatrixColumns,
    Object,
    Struct,
    InterfaceClass,
    InterfacePointer,
}

impl VariableClass {
    fn from_raw(raw: u16) -> Result<Self> {
        Ok(match raw {
            0 => Self::Scalar,
            1 => Self::Vector,
            2 => Self::MatrixRows,
            3 => Self::MatrixColumns,
            4 => Self::Object,
            5 => Self::Struct,
            6 => Self::InterfaceClass,
            7 => Self::InterfacePointer,
            other => {
                return Err(Error::Unsupported {
                    what: "variable class",
                    value: other as u32,
                })
            }
        })
    }
}

/// Underlying numeric type (`D3D_SHADER_VARIABLE_TYPE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum BaseType {
    Void,
    Bool,
    Int,
    Float,
    UInt,
    UInt8,
    Double,
    Min8Float,
    Min10Float,
    Min16Float,
    Min12Int,
    Min16Int,
    Min16UInt,
    /// Object types (textures, samplers, buffers) and anything else.
    Other(u16),
}

impl BaseType {
    fn from_raw(raw: u16) -> Self {
        match raw {
            0 => Self::Void,
            1 => Self::Bool,
            2 => Self::Int,
            3 => Self::Float,
            19 => Self::UInt,
            20 => Self::UInt8,
            39 => Self::Double,
            57 => Self::Min8Float,
            58 => Self::Min10Float,
            59 => Self::Min16Float,
            60 => Self::Min12Int,
            61 => Self::Min16Int,
            62 => Self::Min16UInt,
            other => Self::Other(other),
        }
    }
}

/// Shader input kind of a resource binding (`D3D_SHADER_INPUT_TYPE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum InputType {
    ConstantBuffer,
    TextureBuffer,
    Texture,
    Sampler,
    UavRwTyped,
    Structured,
    UavRwStructured,
    ByteAddress,
    UavRwByteAddress,
    UavAppendStructured,
    UavConsumeStructured,
    UavRwStructuredWithCounter,
    Other(u32),
}

impl InputType {
    fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::ConstantBuffer,
            1 => Self::TextureBuffer,
            2 => Self::Texture,
            3 => Self::Sampler,
            4 => Self::UavRwTyped,
            5 => Self::Structured,
            6 => Self::UavRwStructured,
            7 => Self::ByteAddress,
            8 => Self::UavRwByteAddress,
            9 => Self::UavAppendStructured,
            10 => Self::UavConsumeStructured,
            11 => Self::UavRwStructuredWithCounter,
            other => Self::Other(other),
        }
    }
}

/// Resource element type (`D3D_RESOURCE_RETURN_TYPE`), shared with `dcl_resource`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ReturnType {
    Unused,
    Unorm,
    Snorm,
    Sint,
    Uint,
    Float,
    Mixed,
    Double,
    Continued,
}

impl ReturnType {
    pub(crate) fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Unorm,
            2 => Self::Snorm,
            3 => Self::Sint,
            4 => Self::Uint,
            5 => Self::Float,
            6 => Self::Mixed,
            7 => Self::Double,
            8 => Self::Continued,
            _ => Self::Unused,
        }
    }

    /// GLSL sampler type prefix (`i`, `u` or nothing).
    pub fn glsl_prefix(self) -> &'static str {
        match self {
            Self::Sint => "i",
            Self::Uint => "u",
            _ => "",
        }
    }
}

/// Resource view dimension.
///
/// RDEF bindings and SHEX declarations number these differently; both decode
/// into this one enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ResourceDimension {
    Unknown,
    Buffer,
    Texture1D,
    Texture1DArray,
    Texture2D,
    Texture2DArray,
    Texture2DMS,
    Texture2DMSArray,
    Texture3D,
    TextureCube,
    TextureCubeArray,
    BufferEx,
    RawBuffer,
    StructuredBuffer,
}

impl ResourceDimension {
    /// From `D3D_SRV_DIMENSION` as stored in RDEF.
    pub fn from_srv(raw: u32) -> Self {
        match raw {
            1 => Self::Buffer,
            2 => Self::Texture1D,
            3 => Self::Texture1DArray,
            4 => Self::Texture2D,
            5 => Self::Texture2DArray,
            6 => Self::Texture2DMS,
            7 => Self::Texture2DMSArray,
            8 => Self::Texture3D,
            9 => Self::TextureCube,
            10 => Self::TextureCubeArray,
            11 => Self::BufferEx,
            _ => Self::Unknown,
        }
    }

    /// From the resource dimension field of a SHEX token.
    pub fn from_token(raw: u32) -> Self {
        match raw {
            1 => Self::Buffer,
            2 => Self::Texture1D,
            3 => Self::Texture2D,
            4 => Self::Texture2DMS,
            5 => Self::Texture3D,
            6 => Self::TextureCube,
            7 => Self::Texture1DArray,
            8 => Self::Texture2DArray,
            9 => Self::Texture2DMSArray,
            10 => Self::TextureCubeArray,
            11 => Self::RawBuffer,
            12 => Self::StructuredBuffer,
            _ => Self::Unknown,
        }
    }

    /// Number of address components a texture lookup takes (array layer included).
    pub fn coordinate_lanes(self) -> usize {
        match self {
            Self::Texture1DArray | Self::Texture2D | Self::Texture2DMS => 2,
            Self::Texture2DArray | Self::Texture2DMSArray | Self::Texture3D | Self::TextureCube => {
                3
            }
            Self::TextureCubeArray => 4,
            _ => 1,
        }
    }

    /// GLSL sampler type suffix (`2D`, `CubeArray`, ...).
    pub fn glsl_suffix(self) -> Option<&'static str> {
        Some(match self {
            Self::Buffer | Self::BufferEx => "Buffer",
            Self::Texture1D => "1D",
            Self::Texture1DArray => "1DArray",
            Self::Texture2D => "2D",
            Self::Texture2DArray => "2DArray",
            Self::Texture2DMS => "2DMS",
            Self::Texture2DMSArray => "2DMSArray",
            Self::Texture3D => "3D",
            Self::TextureCube => "Cube",
            Self::TextureCubeArray => "CubeArray",
            Self::Unknown | Self::RawBuffer | Self::StructuredBuffer => return None,
        })
    }
}

/// A bound resource (texture, sampler, buffer, UAV).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ResourceBinding {
    pub name: String,
    pub input_type: InputType,
    pub return_type: ReturnType,
    pub dimension: ResourceDimension,
    pub sample_count: u32,
    pub bind_point: u32,
    pub bind_count: u32,
    pub flags: u32,
}

/// Record sizes for one shader model.
#[derive(Debug, Clone, Copy)]
struct RecordSizes {
    variable: usize,
    ty: usize,
    binding: usize,
}

impl RecordSizes {
    const SM4: Self = Self {
        variable: 24,
        ty: 16,
        binding: 32,
    };

    /// Sizes announced by `RD11`. Records may grow but never shrink below
    /// the fields read here.
    fn from_rd11(rd11: &Rd11) -> Result<Self> {
        let sizes = [
            (rd11.variable_size, Self::SM4.variable),
            (rd11.type_size, Self::SM4.ty),
            (rd11.binding_size, Self::SM4.binding),
        ];
        if let Some(&(size, _)) = sizes.iter().find(|(size, min)| (*size as usize) < *min) {
            return Err(Error::Unsupported {
                what: "RDEF record size",
                value: size,
            });
        }
        Ok(Self {
            variable: rd11.variable_size as usize,
            ty: rd11.type_size as usize,
            binding: rd11.binding_size as usize,
        })
    }
}

/// Per-chunk parse state shared by every type record.
struct TypeParser {
    sizes: RecordSizes,
    /// Type records expanded so far.
    parsed: usize,
}

impl Rdef {
    /// Parse an RDEF chunk payload.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = BinaryReader::new(data);

        let cb_count = reader.read_u32()? as usize;
        let cb_offset = reader.read_u32()? as usize;
        let rb_count = reader.read_u32()? as usize;
        let rb_offset = reader.read_u32()? as usize;
        let minor_version = reader.read_u8()?;
        let major_version = reader.read_u8()?;
        let program_type = ProgramType::from_rdef(reader.read_u16()?)?;
        let flags = reader.read_u32()?;
        let creator_offset = reader.read_u32()? as usize;

        let has_rd11 = major_version >= 5 && reader.peek_bytes(4).is_ok_and(|m| m == RD11_MAGIC);
        let rd11 = if has_rd11 {
            reader.read_bytes(4)?;
            Some(Rd11 {
                header_size: reader.read_u32()?,
                constant_buffer_size: reader.read_u32()?,
                variable_size: reader.read_u32()?,
                type_size: reader.read_u32()?,
                member_size: reader.read_u32()?,
                binding_size: reader.read_u32()?,
                interface_slots: reader.read_u32()?,
            })
        } else {
            None
        };

        let sizes = match &rd11 {
            Some(rd11) => RecordSizes::from_rd11(rd11)?,
            None => RecordSizes::SM4,
        };

        let creator = if creator_offset == 0 {
            String::new()
        } else {
            reader.read_cstring_at(creator_offset)?.to_owned()
        };

        let mut types = TypeParser { sizes, parsed: 0 };
        let mut constant_buffers = Vec::with_capacity(cb_count.min(256));
        for index in 0..cb_count {
            reader.seek(cb_offset + index * 24)?;
            constant_buffers.push(parse_constant_buffer(&mut reader, &mut types)?);
        }

        let mut resource_bindings = Vec::with_capacity(rb_count.min(256));
        for index in 0..rb_count {
            reader.seek(rb_offset + index * sizes.binding)?;
            resource_bindings.push(parse_resource_binding(&mut reader)?);
        }

        Ok(Self {
            major_version,
            minor_version,
            program_type,
            flags,
            creator,
            rd11,
            constant_buffers,
            resource_bindings,
        })
    }

    /// Find a constant buffer by name.
    pub fn constant_buffer(&self, name: &str) -> Option<&ConstantBuffer> {
        self.constant_buffers.iter().find(|cb| cb.name == name)
    }

    /// Constant buffer bound at register `cb{slot}`.
    pub fn constant_buffer_at(&self, slot: u32) -> Option<&ConstantBuffer> {
        let binding = self.binding_at(InputType::ConstantBuffer, slot)?;
        self.constant_buffer(&binding.name)
    }

    /// Resource binding of the given kind covering register `slot`.
    pub fn binding_at(&self, input_type: InputType, slot: u32) -> Option<&ResourceBinding> {
        self.resource_bindings.iter().find(|rb| {
            rb.input_type == input_type
                && (rb.bind_point..rb.bind_point + rb.bind_count.max(1)).contains(&slot)
        })
    }
}

fn parse_constant_buffer(reader: &mut BinaryReader<'_>, types: &mut TypeParser) -> Result<ConstantBuffer> {
    let name_offset = reader.read_u32()? as usize;
    let var_count = reader.read_u32()? as usize;
    let var_offset = reader.read_u32()? as usize;
    let size = reader.read_u32()?;
    let flags = reader.read_u32()?;
    let buffer_type = BufferType::from_raw(reader.read_u32()?);

    let name = reader.read_cstring_at(name_offset)?.to_owned();

    let mut variables = Vec::with_capacity(var_count.min(1024));
    for index in 0..var_count {
        reader.seek(var_offset + index * types.sizes.variable)?;
        variables.push(parse_variable(reader, types)?);
    }
    variables.sort_by_key(|v| v.offset);

    Ok(ConstantBuffer {
        name,
        variables,
        size,
        flags,
        buffer_type,
    })
}

fn parse_variable(reader: &mut BinaryReader<'_>, types: &mut TypeParser) -> Result<Variable> {
    let name_offset = reader.read_u32()? as usize;
    let offset = reader.read_u32()?;
    let size = reader.read_u32()?;
    let flags = reader.read_u32()?;
    let type_offset = reader.read_u32()? as usize;
    let default_offset = reader.read_u32()? as usize;
    // SM5 appends texture/sampler slot ranges, unused here.

    let name = reader.read_cstring_at(name_offset)?.to_owned();
    let ty = types.parse(reader, type_offset, 0)?;

    let default_value = if default_offset == 0 {
        None
    } else {
        reader.seek(default_offset)?;
        Some(reader.read_bytes(size as usize)?.to_vec())
    };

    Ok(Variable {
        name,
        offset,
        size,
        flags,
        ty,
        default_value,
    })
}

impl TypeParser {
    fn parse(&mut self, reader: &mut BinaryReader<'_>, offset: usize, depth: usize) -> Result<VariableType> {
        if depth > MAX_TYPE_DEPTH {
            return Err(Error::Unsupported {
                what: "type nesting depth",
                value: depth as u32,
            });
        }
        self.parsed += 1;
        if self.parsed > MAX_TYPE_RECORDS {
            return Err(Error::Unsupported {
                what: "type record count",
                value: self.parsed as u32,
            });
        }

        reader.seek(offset)?;
        let class = VariableClass::from_raw(reader.read_u16()?)?;
        let base = BaseType::from_raw(reader.read_u16()?);
        let rows = reader.read_u16()?;
        let columns = reader.read_u16()?;
        let elements = reader.read_u16()?;
        let member_count = reader.read_u16()? as usize;
        let member_offset = reader.read_u32()? as usize;

        let name = if self.sizes.ty > 16 {
            // Parent, base class and interface fields precede the name.
            reader.seek(offset + self.sizes.ty - 4)?;
            match reader.read_u32()? {
                0 => None,
                name_offset => Some(reader.read_cstring_at(name_offset as usize)?.to_owned()),
            }
        } else {
            None
        };

        let mut members = Vec::with_capacity(member_count.min(256));
        for index in 0..member_count {
            reader.seek(member_offset + index * 12)?;
            let name_offset = reader.read_u32()? as usize;
            let type_offset = reader.read_u32()? as usize;
            let member_offset = reader.read_u32()?;
            members.push(TypeMember {
                name: reader.read_cstring_at(name_offset)?.to_owned(),
                offset: member_offset,
                ty: self.parse(reader, type_offset, depth + 1)?,
            });
        }

        Ok(VariableType {
            class,
            base,
            rows,
            columns,
            elements,
            name,
            members,
        })
    }
}

fn parse_resource_binding(reader: &mut BinaryReader<'_>) -> Result<ResourceBinding> {
    let name_offset = reader.read_u32()? as usize;
    let input_type = InputType::from_raw(reader.read_u32()?);
    let return_type = ReturnType::from_raw(reader.read_u32()?);
    let dimension = ResourceDimension::from_srv(reader.read_u32()?);
    let sample_count = reader.read_u32()?;
    let bind_point = reader.read_u32()?;
    let bind_count = reader.read_u32()?;
    let flags = reader.read_u32()?;

    Ok(ResourceBinding {
        name: reader.read_cstring_at(name_offset)?.to_owned(),
        input_type,
        return_type,
        dimension,
        sample_count,
        bind_point,
        bind_count,
        flags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RdefBuilder, VariableSpec};
    use pretty_assertions::assert_eq;

    fn float4_buffer(builder: RdefBuilder) -> RdefBuilder {
        builder.constant_buffer(
            "Globals",
            64,
            vec![
                VariableSpec::float4("a", 0),
                VariableSpec::float4("b", 16),
                VariableSpec::float4("c", 32),
                VariableSpec::float4("d", 48),
            ],
        )
    }

    #[test]
    fn test_parse_sm4() {
        let data = float4_buffer(RdefBuilder::new(ProgramType::Pixel, 4, 0))
            .texture("diffuse", 0, ResourceDimension::Texture2D)
            .build();
        let rdef = Rdef::parse(&data).unwrap();

        assert_eq!(rdef.major_version, 4);
        assert_eq!(rdef.program_type, ProgramType::Pixel);
        assert_eq!(rdef.creator, "perun test compiler");
        assert!(rdef.rd11.is_none());

        let cb = &rdef.constant_buffers[0];
        assert_eq!(cb.name, "Globals");
        assert_eq!(cb.size, 64);
        assert_eq!(cb.buffer_type, BufferType::ConstantBuffer);
        let offsets: Vec<_> = cb.variables.iter().map(|v| v.offset).collect();
        assert_eq!(offsets, vec![0, 16, 32, 48]);
        assert_eq!(cb.variables[1].ty.class, VariableClass::Vector);
        assert_eq!(cb.variables[1].ty.base, BaseType::Float);
        assert_eq!(cb.variables[1].ty.columns, 4);
        assert_eq!(cb.variables[1].ty.name, None);

        let textures: Vec<_> = rdef
            .resource_bindings
            .iter()
            .filter(|rb| rb.input_type == InputType::Texture)
            .collect();
        assert_eq!(textures.len(), 1);
        assert_eq!(textures[0].name, "diffuse");
        assert_eq!(textures[0].dimension, ResourceDimension::Texture2D);
        assert_eq!(textures[0].return_type, ReturnType::Float);
    }

    #[test]
    fn test_parse_sm5_rd11() {
        let data = float4_buffer(RdefBuilder::new(ProgramType::Vertex, 5, 0)).build();
        let rdef = Rdef::parse(&data).unwrap();

        let rd11 = rdef.rd11.unwrap();
        assert_eq!(rd11.header_size, 60);
        assert_eq!(rd11.variable_size, 40);
        assert_eq!(rd11.type_size, 36);
        let var = &rdef.constant_buffers[0].variables[0];
        assert_eq!(var.ty.name.as_deref(), Some("float4"));
        assert_eq!(rdef.constant_buffer_at(0).unwrap().name, "Globals");
    }

    #[test]
    fn test_resolve_offset() {
        let data = float4_buffer(RdefBuilder::new(ProgramType::Pixel, 4, 0)).build();
        let rdef = Rdef::parse(&data).unwrap();
        let cb = &rdef.constant_buffers[0];

        let resolved = cb.resolve(20).unwrap();
        assert_eq!(resolved.variable.offset, 16);
        assert_eq!(resolved.sub_index, 0);
        assert_eq!(resolved.component, 1);

        assert!(matches!(
            cb.resolve(64),
            Err(Error::ConstantBufferOffsetOutOfRange { offset: 64, size: 64, .. })
        ));
        assert!(cb.resolve(100).is_err());
    }

    #[test]
    fn test_resolve_array_row() {
        let data = RdefBuilder::new(ProgramType::Pixel, 4, 0)
            .constant_buffer(
                "Bones",
                80,
                vec![
                    VariableSpec::float4("scale", 0),
                    VariableSpec::float4("palette", 16).array(4),
                ],
            )
            .build();
        let rdef = Rdef::parse(&data).unwrap();
        let resolved = rdef.constant_buffers[0].resolve(16 * 3 + 8).unwrap();
        assert_eq!(resolved.variable.name, "palette");
        assert_eq!(resolved.sub_index, 2);
        assert_eq!(resolved.component, 2);
    }

    #[test]
    fn test_default_value() {
        let data = RdefBuilder::new(ProgramType::Pixel, 4, 0)
            .constant_buffer(
                "Material",
                16,
                vec![VariableSpec::float("gloss", 0).default_value(&0.5f32.to_le_bytes())],
            )
            .build();
        let rdef = Rdef::parse(&data).unwrap();
        assert_eq!(
            rdef.constant_buffers[0].variables[0].default_value.as_deref(),
            Some(&0.5f32.to_le_bytes()[..])
        );
    }

    #[test]
    fn test_unknown_variable_class() {
        let data = RdefBuilder::new(ProgramType::Pixel, 4, 0)
            .constant_buffer("Cb", 16, vec![VariableSpec::float4("x", 0).class(9)])
            .build();
        assert!(matches!(
            Rdef::parse(&data),
            Err(Error::Unsupported {
                what: "variable class",
                value: 9
            })
        ));
    }

    #[test]
    fn test_truncated() {
        let data = float4_buffer(RdefBuilder::new(ProgramType::Pixel, 4, 0)).build();
        assert!(Rdef::parse(&data[..20]).is_err());
        assert!(Rdef::parse(&data[..60]).is_err());
    }

    /// SM4 RDEF with one struct variable whose type fans out into four
    /// members per level, all members of a level sharing one type record.
    fn fan_out_rdef(levels: usize) -> Vec<u8> {
        const NAME: u32 = 76;
        const TYPES: usize = 80;
        let members = TYPES + 16 * levels;

        fn put(out: &mut Vec<u8>, value: u32) {
            out.extend_from_slice(&value.to_le_bytes());
        }

        let mut out = Vec::new();

        // Header: one cbuffer, no bindings, ps_4_0.
        for value in [1, 28, 0, 0] {
            put(&mut out, value);
        }
        out.extend_from_slice(&[0, 4, 0xFF, 0xFF]);
        put(&mut out, 0);
        put(&mut out, 0);
        // Constant buffer and its variable.
        for value in [NAME, 1, 52, 16, 0, 0] {
            put(&mut out, value);
        }
        for value in [NAME, 0, 16, 0, TYPES as u32, 0] {
            put(&mut out, value);
        }
        out.extend_from_slice(b"s\0\0\0");

        for level in 0..levels {
            let last = level + 1 == levels;
            let (count, offset) = if last { (0, 0) } else { (4, members + 48 * level) };
            out.extend_from_slice(&5u16.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&1u16.to_le_bytes());
            out.extend_from_slice(&1u16.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&(count as u16).to_le_bytes());
            put(&mut out, offset as u32);
        }
        for level in 0..levels - 1 {
            let child = (TYPES + 16 * (level + 1)) as u32;
            for _ in 0..4 {
                for value in [NAME, child, 0] {
                    put(&mut out, value);
                }
            }
        }
        out
    }

    #[test]
    fn test_shared_member_types() {
        let rdef = Rdef::parse(&fan_out_rdef(3)).unwrap();
        let ty = &rdef.constant_buffers[0].variables[0].ty;
        assert_eq!(ty.class, VariableClass::Struct);
        assert_eq!(ty.members.len(), 4);
        assert_eq!(ty.members[3].ty.members.len(), 4);
        assert!(ty.members[3].ty.members[0].ty.members.is_empty());
    }

    #[test]
    fn test_type_fan_out_is_bounded() {
        // 4^16 leaf records from about a kilobyte of input.
        let data = fan_out_rdef(17);
        assert!(data.len() < 2048);
        assert!(matches!(
            Rdef::parse(&data),
            Err(Error::Unsupported {
                what: "type record count",
                ..
            })
        ));
    }

    #[test]
    fn test_rd11_binding_stride() {
        let data = RdefBuilder::new(ProgramType::Pixel, 5, 0)
            .binding_size(40)
            .constant_buffer("Globals", 16, vec![VariableSpec::float4("tint", 0)])
            .texture("diffuse", 0, ResourceDimension::Texture2D)
            .build();
        let rdef = Rdef::parse(&data).unwrap();

        assert_eq!(rdef.rd11.unwrap().binding_size, 40);
        let names: Vec<_> = rdef.resource_bindings.iter().map(|rb| rb.name.as_str()).collect();
        assert_eq!(names, vec!["Globals", "diffuse"]);
        assert_eq!(rdef.resource_bindings[1].dimension, ResourceDimension::Texture2D);
    }

    #[test]
    fn test_rd11_short_binding_record() {
        let mut data = RdefBuilder::new(ProgramType::Pixel, 5, 0)
            .texture("diffuse", 0, ResourceDimension::Texture2D)
            .build();
        // RD11 binding record size
        data[52..56].copy_from_slice(&28u32.to_le_bytes());
        assert!(matches!(
            Rdef::parse(&data),
            Err(Error::Unsupported {
                what: "RDEF record size",
                value: 28
            })
        ));
    }
}
