//! Constant-buffer declarations and operand resolution.
//!
//! A `cb{slot}[row]` operand addresses 16-byte rows of the buffer. Each
//! selected lane is mapped to byte offset `row * 16 + component * 4` and
//! resolved against the RDEF variable list, so the GLSL reads named
//! variables instead of raw rows.

use log::warn;

use super::expr::{convert, identifier, type_name, LANES};
use super::GlslWriter;
use crate::rdef::{BaseType, ConstantBuffer, Variable, VariableClass};
use crate::shex::{NumberType, Operand, OperandIndex};
use crate::Result;

/// How a variable is declared inside its uniform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Scalar,
    Vector(u16),
    /// Array of scalars or vectors; every element starts a new row.
    Array { columns: u16, len: u16 },
    /// Matrices and structs, declared as raw `vec4` rows.
    Registers(u32),
}

fn layout(variable: &Variable) -> Layout {
    let ty = &variable.ty;
    match ty.class {
        VariableClass::Scalar | VariableClass::Vector if storage(ty.base) != NumberType::Double => {
            let columns = ty.columns.max(1);
            match ty.elements {
                0 if columns == 1 => Layout::Scalar,
                0 => Layout::Vector(columns),
                len => Layout::Array { columns, len },
            }
        }
        _ => Layout::Registers(variable.size.div_ceil(16).max(1)),
    }
}

/// Type the variable is read as. Doubles are kept as raw 32-bit words.
fn storage(base: BaseType) -> NumberType {
    match base {
        BaseType::Int | BaseType::Min12Int | BaseType::Min16Int => NumberType::Int,
        BaseType::Bool | BaseType::UInt | BaseType::UInt8 | BaseType::Min16UInt => NumberType::Uint,
        BaseType::Double => NumberType::Double,
        _ => NumberType::Float,
    }
}

/// Declaration line for a block member.
pub(super) fn declaration(variable: &Variable) -> String {
    let name = identifier(&variable.name);
    let ty = match storage(variable.ty.base) {
        NumberType::Double => NumberType::Uint,
        other => other,
    };

    let decl = match layout(variable) {
        Layout::Scalar => format!("{} {name};", type_name(ty, 1)),
        Layout::Vector(columns) => format!("{} {name};", type_name(ty, columns as usize)),
        Layout::Array { columns, len } => {
            format!("{} {name}[{len}];", type_name(ty, columns as usize))
        }
        Layout::Registers(rows) => format!("{} {name}[{rows}];", type_name(ty, 4)),
    };
    format!("{decl} // offset {}", variable.offset)
}

/// A single resolved lane: `base` plus an optional component selector.
#[derive(Debug, Clone, PartialEq)]
struct Access {
    base: String,
    component: Option<char>,
    storage: NumberType,
}

impl Access {
    fn text(&self) -> String {
        match self.component {
            Some(c) => format!("{}.{c}", self.base),
            None => self.base.clone(),
        }
    }
}

/// Resolve one 32-bit lane at `offset`.
///
/// `relative` is the rendered dynamic row index, added to the array
/// element when the variable is an array.
fn resolve(cb: &ConstantBuffer, offset: u32, relative: Option<&str>) -> Option<Access> {
    let resolved = cb.resolve(offset).ok()?;
    let variable = resolved.variable;
    if offset >= variable.offset + variable.size.max(4) {
        return None;
    }

    let name = identifier(&variable.name);
    let storage = match storage(variable.ty.base) {
        NumberType::Double => NumberType::Uint,
        other => other,
    };
    let element = |sub: u32| match relative {
        Some(rel) if sub == 0 => format!("{name}[{rel}]"),
        Some(rel) => format!("{name}[{rel} + {sub}]"),
        None => format!("{name}[{sub}]"),
    };

    let component = LANES[resolved.component as usize & 3];
    let access = match layout(variable) {
        Layout::Scalar | Layout::Vector(_) if relative.is_some() => return None,
        Layout::Scalar => Access {
            base: name.clone(),
            component: None,
            storage,
        },
        Layout::Vector(_) => Access {
            base: name.clone(),
            component: Some(component),
            storage,
        },
        Layout::Array { columns: 1, .. } => Access {
            base: element(resolved.sub_index),
            component: None,
            storage,
        },
        Layout::Array { .. } | Layout::Registers(_) => Access {
            base: element(resolved.sub_index),
            component: Some(component),
            storage,
        },
    };
    Some(access)
}

impl GlslWriter<'_> {
    /// Render a `cb{slot}[row]` source operand.
    pub(super) fn constant_buffer_source(
        &self,
        op: &Operand,
        mask: u8,
        ty: NumberType,
    ) -> Result<String> {
        let slot = op.register().unwrap_or(0) as u32;
        let Some(row) = op.indices.get(1) else {
            warn!("cb{slot} operand without a row index");
            self.raw_constant_buffers.borrow_mut().insert(slot);
            return Ok(format!("cb{slot}[0]{}", op.swizzle_mask(mask)));
        };
        let relative = match &row.relative {
            Some(_) => Some(self.index(&OperandIndex {
                value: 0,
                ..row.clone()
            })?),
            None => None,
        };

        let mask = if mask & 0xF == 0 { 0x1 } else { mask & 0xF };
        let lanes: Vec<usize> = (0..4).filter(|lane| mask & (1 << lane) != 0).collect();

        let accesses: Option<Vec<Access>> = self
            .rdef
            .and_then(|rdef| rdef.constant_buffer_at(slot))
            .and_then(|cb| {
                lanes
                    .iter()
                    .map(|&lane| {
                        let component = op.lane_source(lane)? as u32;
                        let offset = (row.value as u32).checked_mul(16)? + component * 4;
                        resolve(cb, offset, relative.as_deref())
                    })
                    .collect()
            });

        let Some(accesses) = accesses else {
            let index = self.index(row)?;
            if self.rdef.is_some_and(|r| r.constant_buffer_at(slot).is_some()) {
                warn!("cb{slot}[{index}] does not resolve to a variable");
            }
            self.raw_constant_buffers.borrow_mut().insert(slot);
            let text = format!("cb{slot}[{index}]{}", op.swizzle_mask(mask));
            return Ok(convert(text, NumberType::Float, ty, lanes.len()));
        };

        Ok(combine(&accesses, ty))
    }
}

/// Merge per-lane accesses into one expression of `ty`.
fn combine(accesses: &[Access], ty: NumberType) -> String {
    let lanes = accesses.len();
    if let [first, rest @ ..] = accesses {
        let shared = first.component.is_some()
            && rest
                .iter()
                .all(|a| a.base == first.base && a.storage == first.storage && a.component.is_some());
        if shared || lanes == 1 {
            let components: String = accesses.iter().filter_map(|a| a.component).collect();
            let text = if components.is_empty() {
                first.base.clone()
            } else {
                format!("{}.{components}", first.base)
            };
            return convert(text, first.storage, ty, lanes);
        }
    }

    let parts: Vec<String> = accesses
        .iter()
        .map(|a| convert(a.text(), a.storage, ty, 1))
        .collect();
    format!("{}({})", type_name(ty, lanes), parts.join(", "))
}
