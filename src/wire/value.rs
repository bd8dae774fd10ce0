//! Dynamic values passed to and returned from interpreted wrappers

use crate::bridge::{same_memory, Callback, MemoryView, SharedBridge};
use crate::errors::{Fault, Result};
use std::fmt;
use std::rc::Rc;

/// Range of elements living in a module's memory
#[derive(Clone)]
pub struct Slice {
    owner: SharedBridge,
    address: u64,
    len: u64,
    elem_size: usize,
}

impl Slice {
    pub fn new(owner: SharedBridge, address: u64, len: u64, elem_size: usize) -> Self {
        Self {
            owner,
            address,
            len,
            elem_size,
        }
    }

    #[inline]
    pub fn owner(&self) -> &SharedBridge {
        &self.owner
    }

    #[inline]
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Element count
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn elem_size(&self) -> usize {
        self.elem_size
    }

    #[inline]
    pub fn byte_len(&self) -> usize {
        self.len as usize * self.elem_size
    }

    /// Copy the elements out of the owning memory.
    ///
    /// Transient slices are only valid until their call's frame is reused.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let view = MemoryView::acquire(&*self.owner)?;
        let offset = view.offset(self.address, self.byte_len())?;
        Ok(view.read(offset, self.byte_len())?.to_vec())
    }

    /// Decode the elements as UTF-8, replacing invalid sequences
    pub fn to_string_lossy(&self) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.to_bytes()?).into_owned())
    }
}

impl fmt::Debug for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slice")
            .field("owner", &self.owner.label())
            .field("address", &format_args!("{:#x}", self.address))
            .field("len", &self.len)
            .field("elem_size", &self.elem_size)
            .finish()
    }
}

impl PartialEq for Slice {
    fn eq(&self, other: &Self) -> bool {
        same_memory(&self.owner, &other.owner)
            && self.address == other.address
            && self.len == other.len
            && self.elem_size == other.elem_size
    }
}

/// Source of a slice argument
#[derive(Debug, Clone)]
pub enum SliceArg<'a> {
    /// UTF-8 text, copied into the frame
    Text(&'a str),
    /// Host bytes, copied into the frame
    Host(&'a [u8]),
    /// Module-resident slice; passed in place when it lives in the callee's memory
    Slice(Slice),
}

impl<'a> From<&'a str> for SliceArg<'a> {
    fn from(text: &'a str) -> Self {
        SliceArg::Text(text)
    }
}

impl<'a> From<&'a [u8]> for SliceArg<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        SliceArg::Host(bytes)
    }
}

impl From<Slice> for SliceArg<'_> {
    fn from(slice: Slice) -> Self {
        SliceArg::Slice(slice)
    }
}

/// Dynamically typed argument or result
#[derive(Clone)]
pub enum Value {
    Void,
    Null,
    /// Present optional whose payload is itself null, as in `Some(None)`
    /// for a `??T`. Other present optionals carry their payload directly.
    Some(Box<Value>),
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Slice(Slice),
    /// Raw struct bytes
    Struct(Vec<u8>),
    Callback(Callback),
}

impl Value {
    pub fn callback(f: impl Fn(&[f64]) -> f64 + 'static) -> Self {
        Value::Callback(Rc::new(f))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Null => "null",
            Value::Some(_) => "some",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Slice(_) => "slice",
            Value::Struct(_) => "struct",
            Value::Callback(_) => "callback",
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_slice(&self) -> Option<&Slice> {
        match self {
            Value::Slice(slice) => Some(slice),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&[u8]> {
        match self {
            Value::Struct(bytes) => Some(bytes),
            _ => None,
        }
    }

    // Conversions used by the interpreter. Each reports the expected shape
    // on mismatch.

    pub(crate) fn to_bool(&self) -> Result<bool> {
        self.as_bool().ok_or_else(|| Fault::argument("bool", self.kind_name()))
    }

    /// Integer view; integral floats are accepted
    pub(crate) fn to_int(&self) -> Result<i128> {
        match self {
            Value::Int(i) => Ok(*i),
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 => Ok(*f as i128),
            _ => Err(Fault::argument("integer", self.kind_name())),
        }
    }

    pub(crate) fn to_f64(&self) -> Result<f64> {
        self.as_f64().ok_or_else(|| Fault::argument("float", self.kind_name()))
    }

    pub(crate) fn to_slice_arg(&self) -> Result<SliceArg<'_>> {
        match self {
            Value::Str(text) => Ok(SliceArg::Text(text)),
            Value::Bytes(bytes) => Ok(SliceArg::Host(bytes)),
            Value::Slice(slice) => Ok(SliceArg::Slice(slice.clone())),
            _ => Err(Fault::argument("slice", self.kind_name())),
        }
    }

    pub(crate) fn to_struct_bytes(&self) -> Result<&[u8]> {
        match self {
            Value::Struct(bytes) | Value::Bytes(bytes) => Ok(bytes),
            _ => Err(Fault::argument("struct bytes", self.kind_name())),
        }
    }

    pub(crate) fn to_callback(&self) -> Result<Callback> {
        match self {
            Value::Callback(callback) => Ok(Rc::clone(callback)),
            _ => Err(Fault::argument("callback", self.kind_name())),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "Void"),
            Value::Null => write!(f, "Null"),
            Value::Some(inner) => write!(f, "Some({:?})", inner),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Float(x) => write!(f, "Float({:?})", x),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Bytes(b) => write!(f, "Bytes({:?})", b),
            Value::Slice(s) => write!(f, "{:?}", s),
            Value::Struct(b) => write!(f, "Struct({:?})", b),
            Value::Callback(_) => write!(f, "Callback(..)"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) | (Value::Null, Value::Null) => true,
            (Value::Some(a), Value::Some(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Slice(a), Value::Slice(b)) => a == b,
            (Value::Struct(a), Value::Struct(b)) => a == b,
            (Value::Callback(a), Value::Callback(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

macro_rules! int_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::Int(value as i128)
                }
            }
        )*
    };
}

int_value!(i8, i16, i32, i64, i128, u8, u16, u32, u64);

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Slice> for Value {
    fn from(value: Slice) -> Self {
        Value::Slice(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}
