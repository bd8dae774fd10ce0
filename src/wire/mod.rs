//! Wire rules - how each reflected type crosses the boundary
//!
//! Design: every value occupies consecutive 8-byte slots from its first
//! slot. Integers up to 32 bits ride in the low half of a float whose upper
//! half is the 2^52 exponent pattern, so the callee reads them as exact
//! doubles. Wider scalars are raw 64-bit patterns.
//!
//! Architecture:
//! - `rules.rs` - rule selection and the per-loader registry
//! - `listing.rs` - encode/decode bodies shared by interpreter and codegen
//! - `value.rs` - dynamic values for interpreted calls

pub mod listing;
mod rules;
mod value;

pub use rules::{DecodeStep, EncodeStep, RuleKey, WireRule, WireTypeRegistry};
pub use value::{Slice, SliceArg, Value};

use crate::errors::{Fault, Result};
use crate::frame::CallFrame;
use crate::reflect::Type;
use std::fmt;
use std::sync::Arc;

/// Upper half 0x43300000: the float 2^52 with the integer in its low bits
pub const INT_BIAS: u64 = 0x4330_0000_0000_0000;

/// Upper 32 bits of the null sentinel, a signalling-NaN prefix
pub const NULL_HIGH: u32 = 0x7FF4_0000;

/// Whole-slot null sentinel
pub const NULL_BITS: u64 = (NULL_HIGH as u64) << 32;

/// Quiet NaN substituted for float payloads that would read as null
pub const CANONICAL_NAN: u64 = 0x7FF8_0000_0000_0000;

/// Tag slot value of a present tagged optional (boxed 1)
pub const PRESENT: u64 = INT_BIAS | 1;

/// A reflected type bound to its wire rule
pub struct WireType {
    ty: Arc<Type>,
    rule: WireRule,
}

impl WireType {
    pub fn new(ty: Arc<Type>, rule: WireRule) -> Self {
        Self { ty, rule }
    }

    #[inline]
    pub fn ty(&self) -> &Arc<Type> {
        &self.ty
    }

    #[inline]
    pub fn rule(&self) -> &WireRule {
        &self.rule
    }

    /// Child of an optional rule
    pub fn child(&self) -> Option<&Arc<WireType>> {
        match &self.rule {
            WireRule::Optional(child) | WireRule::OptionalFloat(child) | WireRule::OptionalTagged(child) => {
                Some(child)
            }
            _ => None,
        }
    }

    /// Consecutive wire slots the value occupies
    pub fn wire_count(&self) -> usize {
        match &self.rule {
            WireRule::Void | WireRule::Callback => 0,
            WireRule::Bytes | WireRule::Slice { .. } => 2,
            WireRule::Optional(child) | WireRule::OptionalFloat(child) => child.wire_count(),
            WireRule::OptionalTagged(child) => child.wire_count() + 1,
            _ => 1,
        }
    }

    /// Transient allocation alignment, 0 when nothing is reserved
    pub fn align(&self) -> usize {
        match &self.rule {
            WireRule::Bytes | WireRule::Aggregate { .. } => 1,
            WireRule::Slice { align, .. } => *align,
            WireRule::Optional(child) | WireRule::OptionalFloat(child) | WireRule::OptionalTagged(child) => {
                child.align()
            }
            _ => 0,
        }
    }

    /// Whether this type can come back as a return value
    pub fn decodable(&self) -> bool {
        !matches!(self.rule, WireRule::Callback)
    }

    /// Whether encoding takes a callback slot
    pub fn is_callback(&self) -> bool {
        matches!(self.rule, WireRule::Callback)
    }

    /// Label of the listing module implementing this rule
    pub fn shape(&self) -> &'static str {
        match &self.rule {
            WireRule::Void => listing::void::SHAPE,
            WireRule::Bool => listing::boolean::SHAPE,
            WireRule::SmallUint { .. } => listing::small_uint::SHAPE,
            WireRule::SmallInt { .. } => listing::small_int::SHAPE,
            WireRule::WideUint { .. } => listing::wide_uint::SHAPE,
            WireRule::WideInt { .. } => listing::wide_int::SHAPE,
            WireRule::Float { .. } => listing::float::SHAPE,
            WireRule::Callback => listing::callback::SHAPE,
            WireRule::Bytes => listing::bytes::SHAPE,
            WireRule::Slice { .. } => listing::slice::SHAPE,
            WireRule::Aggregate { .. } => listing::aggregate::SHAPE,
            WireRule::Optional(_) => listing::optional::SHAPE,
            WireRule::OptionalFloat(_) => listing::optional_float::SHAPE,
            WireRule::OptionalTagged(_) => listing::optional_tagged::SHAPE,
        }
    }

    /// Constant bindings for the listing's extra parameters, as Rust literals
    pub fn substitutions(&self) -> Vec<(&'static str, String)> {
        match &self.rule {
            WireRule::SmallUint { bits }
            | WireRule::SmallInt { bits }
            | WireRule::WideUint { bits }
            | WireRule::WideInt { bits } => vec![("bits", format!("{}u32", bits))],
            WireRule::Slice { elem, align } => vec![
                ("elem", format!("{}usize", elem)),
                ("align", format!("{}usize", align)),
            ],
            WireRule::Aggregate { len } => vec![("len", format!("{}usize", len))],
            WireRule::OptionalTagged(child) => vec![("tag", format!("{}usize", child.wire_count()))],
            _ => Vec::new(),
        }
    }

    /// Parameter type of the generated surface
    pub fn param_type(&self) -> String {
        match &self.rule {
            WireRule::Void => "()".to_string(),
            WireRule::Bool => "bool".to_string(),
            WireRule::SmallUint { .. } | WireRule::SmallInt { .. } => "i64".to_string(),
            WireRule::WideUint { .. } | WireRule::WideInt { .. } => "i128".to_string(),
            WireRule::Float { .. } => "f64".to_string(),
            WireRule::Callback => "Callback".to_string(),
            WireRule::Bytes | WireRule::Slice { .. } => "SliceArg<'_>".to_string(),
            WireRule::Aggregate { .. } => "&[u8]".to_string(),
            WireRule::Optional(child) | WireRule::OptionalFloat(child) | WireRule::OptionalTagged(child) => {
                format!("Option<{}>", child.param_type())
            }
        }
    }

    /// Result type of the generated surface; None when not returnable
    pub fn result_type(&self) -> Option<String> {
        let text = match &self.rule {
            WireRule::Void => "()".to_string(),
            WireRule::Bool => "bool".to_string(),
            WireRule::SmallUint { .. } => "u32".to_string(),
            WireRule::SmallInt { .. } => "i32".to_string(),
            WireRule::WideUint { .. } => "u64".to_string(),
            WireRule::WideInt { .. } => "i64".to_string(),
            WireRule::Float { .. } => "f64".to_string(),
            WireRule::Callback => return None,
            WireRule::Bytes | WireRule::Slice { .. } => "Slice".to_string(),
            WireRule::Aggregate { .. } => "Vec<u8>".to_string(),
            WireRule::Optional(child) | WireRule::OptionalFloat(child) | WireRule::OptionalTagged(child) => {
                format!("Option<{}>", child.result_type()?)
            }
        };
        Some(text)
    }

    /// Write `value` starting at `slot`
    pub fn encode(&self, frame: &mut CallFrame<'_>, slot: usize, value: Value) -> Result<()> {
        match &self.rule {
            WireRule::Void => listing::void::encode(frame, slot, ()),
            WireRule::Bool => listing::boolean::encode(frame, slot, value.to_bool()?),
            WireRule::SmallUint { bits } => {
                let arg = small(frame, &value, *bits, false)?;
                listing::small_uint::encode(frame, slot, arg, *bits)
            }
            WireRule::SmallInt { bits } => {
                let arg = small(frame, &value, *bits, true)?;
                listing::small_int::encode(frame, slot, arg, *bits)
            }
            WireRule::WideUint { bits } => listing::wide_uint::encode(frame, slot, value.to_int()?, *bits),
            WireRule::WideInt { bits } => listing::wide_int::encode(frame, slot, value.to_int()?, *bits),
            WireRule::Float { .. } => listing::float::encode(frame, slot, value.to_f64()?),
            WireRule::Callback => listing::callback::encode(frame, slot, value.to_callback()?),
            WireRule::Bytes => listing::bytes::encode(frame, slot, value.to_slice_arg()?),
            WireRule::Slice { elem, align } => {
                listing::slice::encode(frame, slot, value.to_slice_arg()?, *elem, *align)
            }
            WireRule::Aggregate { len } => {
                listing::aggregate::encode(frame, slot, value.to_struct_bytes()?, *len)
            }
            WireRule::Optional(child) => listing::optional::encode(frame, slot, present(value), child),
            WireRule::OptionalFloat(child) => {
                listing::optional_float::encode(frame, slot, present(value), child)
            }
            WireRule::OptionalTagged(child) => {
                let tag = child.wire_count();
                listing::optional_tagged::encode(frame, slot, present(value), child, tag)
            }
        }
    }

    /// Read a value starting at `slot`
    pub fn decode(&self, frame: &mut CallFrame<'_>, slot: usize) -> Result<Value> {
        let value = match &self.rule {
            WireRule::Void => {
                listing::void::decode(frame, slot)?;
                Value::Void
            }
            WireRule::Bool => Value::Bool(listing::boolean::decode(frame, slot)?),
            WireRule::SmallUint { bits } => Value::Int(listing::small_uint::decode(frame, slot, *bits)? as i128),
            WireRule::SmallInt { bits } => Value::Int(listing::small_int::decode(frame, slot, *bits)? as i128),
            WireRule::WideUint { bits } => Value::Int(listing::wide_uint::decode(frame, slot, *bits)? as i128),
            WireRule::WideInt { bits } => Value::Int(listing::wide_int::decode(frame, slot, *bits)? as i128),
            WireRule::Float { .. } => Value::Float(listing::float::decode(frame, slot)?),
            WireRule::Callback => {
                return Err(Fault::unsupported("fn", "function pointers cannot be returned"));
            }
            WireRule::Bytes => Value::Slice(listing::bytes::decode(frame, slot)?),
            WireRule::Slice { elem, .. } => Value::Slice(listing::slice::decode(frame, slot, *elem)?),
            WireRule::Aggregate { len } => Value::Struct(listing::aggregate::decode(frame, slot, *len)?),
            WireRule::Optional(child) => nullable(listing::optional::decode(frame, slot, child)?),
            WireRule::OptionalFloat(child) => nullable(listing::optional_float::decode(frame, slot, child)?),
            WireRule::OptionalTagged(child) => {
                let tag = child.wire_count();
                nullable(listing::optional_tagged::decode(frame, slot, child, tag)?)
            }
        };
        Ok(value)
    }
}

impl fmt::Debug for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireType")
            .field("ty", &format_args!("{}", self.ty))
            .field("shape", &self.shape())
            .field("slots", &self.wire_count())
            .finish()
    }
}

/// Narrow a dynamic integer to the listing's i64 argument
fn small(frame: &CallFrame<'_>, value: &Value, bits: u32, signed: bool) -> Result<i64> {
    let wide = value.to_int()?;
    i64::try_from(wide).map_err(|_| frame.range_fault(wide, bits, signed))
}

#[inline]
fn present(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Some(inner) => Some(*inner),
        value => Some(value),
    }
}

/// Inverse of `present`: a present payload that is itself null stays boxed
#[inline]
fn nullable(decoded: Option<Value>) -> Value {
    match decoded {
        None => Value::Null,
        Some(inner @ (Value::Null | Value::Some(_))) => Value::Some(Box::new(inner)),
        Some(value) => value,
    }
}

#[cfg(test)]
mod tests;
