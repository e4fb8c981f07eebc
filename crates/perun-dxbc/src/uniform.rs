//! Typed uniform values packed into constant-buffer upload memory.
//!
//! A [`UniformBlock`] starts as a copy of a constant buffer's declared size
//! and default values. Values are written at the byte offsets recorded in
//! RDEF; array elements and matrix rows each start a new 16-byte register.

use byteorder::{ByteOrder, LittleEndian};
use rustc_hash::FxHashMap;

use crate::rdef::ConstantBuffer;
use crate::{Error, Result};

/// Register stride of array elements and matrix rows.
const REGISTER: usize = 16;

/// A value that can be written into a uniform block.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Int(i32),
    IVec4([i32; 4]),
    UInt(u32),
    UVec4([u32; 4]),
    /// Four rows, each stored in its own register.
    Mat4([[f32; 4]; 4]),
    FloatArray(Vec<f32>),
    Vec4Array(Vec<[f32; 4]>),
    IntArray(Vec<i32>),
}

/// std140 size and base alignment, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Std140Layout {
    pub size: usize,
    pub align: usize,
}

impl Std140Layout {
    const fn new(size: usize, align: usize) -> Self {
        Self { size, align }
    }
}

/// std140 layout of a value. Arrays use a 16-byte element stride.
pub fn std140_layout(value: &UniformValue) -> Std140Layout {
    use UniformValue::*;

    match value {
        Float(_) | Int(_) | UInt(_) => Std140Layout::new(4, 4),
        Vec2(_) => Std140Layout::new(8, 8),
        Vec3(_) => Std140Layout::new(12, 16),
        Vec4(_) | IVec4(_) | UVec4(_) => Std140Layout::new(16, 16),
        Mat4(_) => Std140Layout::new(64, 16),
        FloatArray(v) => Std140Layout::new(REGISTER * v.len(), REGISTER),
        Vec4Array(v) => Std140Layout::new(REGISTER * v.len(), REGISTER),
        IntArray(v) => Std140Layout::new(REGISTER * v.len(), REGISTER),
    }
}

impl UniformValue {
    /// 32-bit words per element and the elements themselves.
    fn elements(&self) -> Vec<Vec<u32>> {
        use UniformValue::*;

        let floats = |v: &[f32]| v.iter().map(|f| f.to_bits()).collect::<Vec<_>>();
        match self {
            Float(v) => vec![vec![v.to_bits()]],
            Vec2(v) => vec![floats(v)],
            Vec3(v) => vec![floats(v)],
            Vec4(v) => vec![floats(v)],
            Int(v) => vec![vec![*v as u32]],
            IVec4(v) => vec![v.iter().map(|&i| i as u32).collect()],
            UInt(v) => vec![vec![*v]],
            UVec4(v) => vec![v.to_vec()],
            Mat4(rows) => rows.iter().map(|row| floats(row)).collect(),
            FloatArray(v) => v.iter().map(|f| vec![f.to_bits()]).collect(),
            Vec4Array(v) => v.iter().map(|row| floats(row)).collect(),
            IntArray(v) => v.iter().map(|&i| vec![i as u32]).collect(),
        }
    }

    /// Bytes covered when written, up to the end of the last element.
    ///
    /// D3D packs the final array element without tail padding, so this is
    /// what the RDEF variable size is compared against.
    pub fn packed_len(&self) -> usize {
        let elements = self.elements();
        match elements.last() {
            None => 0,
            Some(last) => REGISTER * (elements.len() - 1) + 4 * last.len(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    offset: usize,
    size: usize,
}

/// CPU-side contents of one constant buffer.
#[derive(Debug, Clone)]
pub struct UniformBlock {
    name: String,
    data: Vec<u8>,
    slots: FxHashMap<String, Slot>,
}

impl UniformBlock {
    /// A block sized like `cb`, pre-filled with its default values.
    pub fn from_constant_buffer(cb: &ConstantBuffer) -> Self {
        let mut data = vec![0u8; cb.size as usize];
        let mut slots = FxHashMap::default();

        for variable in &cb.variables {
            let offset = variable.offset as usize;
            slots.insert(
                variable.name.clone(),
                Slot {
                    offset,
                    size: variable.size as usize,
                },
            );

            let Some(default) = &variable.default_value else {
                continue;
            };
            if let Some(target) = data.get_mut(offset..) {
                let len = default.len().min(target.len());
                target[..len].copy_from_slice(&default[..len]);
            }
        }

        Self {
            name: cb.name.clone(),
            data,
            slots,
        }
    }

    /// Name of the constant buffer this block mirrors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write `value` into the variable called `name`.
    pub fn set(&mut self, name: &str, value: &UniformValue) -> Result<()> {
        let slot = *self
            .slots
            .get(name)
            .ok_or_else(|| Error::UnknownVariable(name.to_owned()))?;

        let needed = value.packed_len();
        if needed > slot.size {
            return Err(Error::UniformSizeMismatch {
                name: name.to_owned(),
                needed,
                available: slot.size,
            });
        }
        if slot.offset + needed > self.data.len() {
            return Err(Error::ConstantBufferOffsetOutOfRange {
                buffer: self.name.clone(),
                offset: (slot.offset + needed) as u32,
                size: self.data.len() as u32,
            });
        }

        for (index, words) in value.elements().iter().enumerate() {
            let start = slot.offset + index * REGISTER;
            let target = &mut self.data[start..start + 4 * words.len()];
            LittleEndian::write_u32_into(words, target);
        }
        Ok(())
    }

    /// Upload-ready buffer contents.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdef::Rdef;
    use crate::test_utils::{RdefBuilder, VariableSpec};
    use crate::ProgramType;

    fn block() -> UniformBlock {
        let gloss = 0.25f32.to_le_bytes();
        let rdef = RdefBuilder::new(ProgramType::Pixel, 5, 0)
            .constant_buffer(
                "PerMaterial",
                96,
                vec![
                    VariableSpec::float4("Tint", 0),
                    VariableSpec::float("Gloss", 16).default_value(&gloss),
                    VariableSpec::float("Weights", 32).array(3),
                    VariableSpec::float4("Rows", 80),
                ],
            )
            .build();
        let rdef = Rdef::parse(&rdef).unwrap();
        UniformBlock::from_constant_buffer(&rdef.constant_buffers[0])
    }

    fn read_f32(block: &UniformBlock, offset: usize) -> f32 {
        LittleEndian::read_f32(&block.bytes()[offset..])
    }

    #[test]
    fn test_layout_table() {
        assert_eq!(std140_layout(&UniformValue::Float(1.0)), Std140Layout::new(4, 4));
        assert_eq!(std140_layout(&UniformValue::Vec2([0.0; 2])), Std140Layout::new(8, 8));
        assert_eq!(std140_layout(&UniformValue::Vec3([0.0; 3])), Std140Layout::new(12, 16));
        assert_eq!(std140_layout(&UniformValue::UVec4([0; 4])), Std140Layout::new(16, 16));
        assert_eq!(std140_layout(&UniformValue::Mat4([[0.0; 4]; 4])), Std140Layout::new(64, 16));
        assert_eq!(
            std140_layout(&UniformValue::FloatArray(vec![0.0; 3])),
            Std140Layout::new(48, 16)
        );
    }

    #[test]
    fn test_packed_len() {
        assert_eq!(UniformValue::Vec3([0.0; 3]).packed_len(), 12);
        assert_eq!(UniformValue::FloatArray(vec![0.0; 3]).packed_len(), 36);
        assert_eq!(UniformValue::Mat4([[0.0; 4]; 4]).packed_len(), 64);
        assert_eq!(UniformValue::IntArray(Vec::new()).packed_len(), 0);
    }

    #[test]
    fn test_defaults_and_set() {
        let mut block = block();
        assert_eq!(block.name(), "PerMaterial");
        assert_eq!(block.bytes().len(), 96);
        assert_eq!(read_f32(&block, 16), 0.25);

        block.set("Tint", &UniformValue::Vec4([1.0, 0.5, 0.25, 1.0])).unwrap();
        assert_eq!(read_f32(&block, 4), 0.5);

        block
            .set("Weights", &UniformValue::FloatArray(vec![1.0, 2.0, 3.0]))
            .unwrap();
        assert_eq!(read_f32(&block, 32), 1.0);
        assert_eq!(read_f32(&block, 48), 2.0);
        assert_eq!(read_f32(&block, 64), 3.0);
        // Padding between elements stays untouched.
        assert_eq!(read_f32(&block, 36), 0.0);

        block.set("Rows", &UniformValue::IVec4([-1, 0, 1, 2])).unwrap();
        assert_eq!(LittleEndian::read_i32(&block.bytes()[80..]), -1);
    }

    #[test]
    fn test_set_errors() {
        let mut block = block();
        assert!(matches!(
            block.set("Missing", &UniformValue::Float(1.0)),
            Err(Error::UnknownVariable(name)) if name == "Missing"
        ));
        assert!(matches!(
            block.set("Gloss", &UniformValue::Vec4([0.0; 4])),
            Err(Error::UniformSizeMismatch { needed: 16, available: 4, .. })
        ));
        assert!(matches!(
            block.set("Weights", &UniformValue::FloatArray(vec![0.0; 4])),
            Err(Error::UniformSizeMismatch { needed: 52, available: 36, .. })
        ));
    }
}
