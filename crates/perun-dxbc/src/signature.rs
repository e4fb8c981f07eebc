//! Input/output signature chunks (`ISGN`, `OSGN`, `OSG5`, `ISG1`, `OSG1`).
//!
//! Each chunk is an element count and element array offset followed by
//! fixed-size element records. The variants differ only in the extra fields
//! around the common 24-byte record:
//!
//! | Tag | Size | Layout |
//! |-----|------|--------|
//! | `ISGN`/`OSGN` | 24 | common fields |
//! | `OSG5` | 28 | stream, common fields |
//! | `ISG1`/`OSG1` | 32 | stream, common fields, minimum precision |

use perun_common::{BinaryReader, FourCC};

use crate::shex::MinPrecision;
use crate::{Error, Result};

/// System-value semantic (`D3D_NAME`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SystemValue {
    Undefined,
    Position,
    ClipDistance,
    CullDistance,
    RenderTargetArrayIndex,
    ViewportArrayIndex,
    VertexId,
    PrimitiveId,
    InstanceId,
    IsFrontFace,
    SampleIndex,
    Target,
    Depth,
    Coverage,
    DepthGreaterEqual,
    DepthLessEqual,
    /// Tessellation factors and later additions.
    Other(u32),
}

impl SystemValue {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Undefined,
            1 => Self::Position,
            2 => Self::ClipDistance,
            3 => Self::CullDistance,
            4 => Self::RenderTargetArrayIndex,
            5 => Self::ViewportArrayIndex,
            6 => Self::VertexId,
            7 => Self::PrimitiveId,
            8 => Self::InstanceId,
            9 => Self::IsFrontFace,
            10 => Self::SampleIndex,
            64 => Self::Target,
            65 => Self::Depth,
            66 => Self::Coverage,
            67 => Self::DepthGreaterEqual,
            68 => Self::DepthLessEqual,
            other => Self::Other(other),
        }
    }
}

/// Register component type (`D3D_REGISTER_COMPONENT_TYPE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ComponentType {
    Unknown,
    UInt32,
    SInt32,
    Float32,
    Other(u32),
}

impl ComponentType {
    fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Unknown,
            1 => Self::UInt32,
            2 => Self::SInt32,
            3 => Self::Float32,
            other => Self::Other(other),
        }
    }

    /// GLSL `vec4` type holding a register of this component type.
    pub fn glsl_vec4(self) -> &'static str {
        match self {
            Self::UInt32 => "uvec4",
            Self::SInt32 => "ivec4",
            _ => "vec4",
        }
    }
}

/// One signature element.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SignatureElement {
    pub name: String,
    pub semantic_index: u32,
    pub system_value: SystemValue,
    pub component_type: ComponentType,
    pub register: u32,
    /// Components present in the register (bit 0 is `x`).
    pub mask: u8,
    /// Components actually read (inputs) or never written (outputs).
    pub rw_mask: u8,
    pub stream: u32,
    pub min_precision: MinPrecision,
}

/// A parsed signature chunk.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Signature {
    pub elements: Vec<SignatureElement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementLayout {
    Basic,
    Stream,
    StreamPrecision,
}

impl ElementLayout {
    fn for_tag(tag: FourCC) -> Option<Self> {
        match &tag.0 {
            b"ISGN" | b"OSGN" | b"PCSG" => Some(Self::Basic),
            b"OSG5" => Some(Self::Stream),
            b"ISG1" | b"OSG1" | b"PSG1" => Some(Self::StreamPrecision),
            _ => None,
        }
    }

    fn size(self) -> usize {
        match self {
            Self::Basic => 24,
            Self::Stream => 28,
            Self::StreamPrecision => 32,
        }
    }
}

impl Signature {
    /// Parse a signature chunk payload; `tag` selects the element layout.
    pub fn parse(tag: FourCC, data: &[u8]) -> Result<Self> {
        let layout = ElementLayout::for_tag(tag).ok_or(Error::Unsupported {
            what: "signature chunk tag",
            value: u32::from_le_bytes(tag.0),
        })?;

        let mut reader = BinaryReader::new(data);
        let count = reader.read_u32()? as usize;
        let offset = reader.read_u32()? as usize;

        let mut elements = Vec::with_capacity(count.min(128));
        for index in 0..count {
            reader.seek(offset + index * layout.size())?;
            elements.push(parse_element(&mut reader, layout)?);
        }

        Ok(Self { elements })
    }

    /// Elements sharing a register are packed into it; this yields one
    /// element per register (the first declared).
    pub fn registers(&self) -> impl Iterator<Item = &SignatureElement> {
        self.elements
            .iter()
            .enumerate()
            .filter(|(i, e)| {
                self.elements[..*i]
                    .iter()
                    .all(|prev| prev.register != e.register || prev.stream != e.stream)
            })
            .map(|(_, e)| e)
    }
}

fn parse_element(reader: &mut BinaryReader<'_>, layout: ElementLayout) -> Result<SignatureElement> {
    let stream = match layout {
        ElementLayout::Basic => 0,
        ElementLayout::Stream | ElementLayout::StreamPrecision => reader.read_u32()?,
    };
    let name_offset = reader.read_u32()? as usize;
    let semantic_index = reader.read_u32()?;
    let system_value = SystemValue::from_raw(reader.read_u32()?);
    let component_type = ComponentType::from_raw(reader.read_u32()?);
    let register = reader.read_u32()?;
    let mask = reader.read_u8()?;
    let rw_mask = reader.read_u8()?;
    reader.read_u16()?;
    let min_precision = match layout {
        ElementLayout::StreamPrecision => MinPrecision::from_raw(reader.read_u32()?),
        _ => MinPrecision::Default,
    };

    Ok(SignatureElement {
        name: reader.read_cstring_at(name_offset)?.to_owned(),
        semantic_index,
        system_value,
        component_type,
        register,
        mask,
        rw_mask,
        stream,
        min_precision,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ElementSpec, SignatureBuilder};

    #[test]
    fn test_parse_isgn() {
        let data = SignatureBuilder::new(false)
            .element(ElementSpec::new("SV_Position", 0, 0xF).system_value(1))
            .element(ElementSpec::new("TEXCOORD", 0, 0x3).register(1))
            .element(ElementSpec::new("TEXCOORD", 1, 0xC).register(1))
            .build();
        let sig = Signature::parse(FourCC::new(b"ISGN"), &data).unwrap();

        assert_eq!(sig.elements.len(), 3);
        assert_eq!(sig.elements[0].name, "SV_Position");
        assert_eq!(sig.elements[0].system_value, SystemValue::Position);
        assert_eq!(sig.elements[0].component_type, ComponentType::Float32);
        assert_eq!(sig.elements[2].semantic_index, 1);
        assert_eq!(sig.elements[2].mask, 0xC);

        let registers: Vec<_> = sig.registers().map(|e| e.register).collect();
        assert_eq!(registers, vec![0, 1]);
    }

    #[test]
    fn test_parse_osg1() {
        let data = SignatureBuilder::new(true)
            .element(
                ElementSpec::new("SV_Target", 0, 0xF)
                    .component_type(2)
                    .min_precision(4),
            )
            .build();
        let sig = Signature::parse(FourCC::new(b"OSG1"), &data).unwrap();

        let element = &sig.elements[0];
        assert_eq!(element.name, "SV_Target");
        assert_eq!(element.component_type, ComponentType::SInt32);
        assert_eq!(element.min_precision, MinPrecision::Sint16);
        assert_eq!(element.stream, 0);
    }

    #[test]
    fn test_unknown_tag() {
        let data = SignatureBuilder::new(true)
            .element(ElementSpec::new("COLOR", 0, 0xF))
            .build();
        assert!(matches!(
            Signature::parse(FourCC::new(b"RDEF"), &data),
            Err(Error::Unsupported { .. })
        ));
    }

    #[test]
    fn test_truncated_element() {
        let data = SignatureBuilder::new(false)
            .element(ElementSpec::new("COLOR", 0, 0xF))
            .build();
        assert!(Signature::parse(FourCC::new(b"OSGN"), &data[..20]).is_err());
    }
}
