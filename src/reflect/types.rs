//! Reflected type descriptions

use std::fmt;
use std::sync::Arc;

/// Structural kind of a reflected type. Tag values are the wire encoding.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Unknown = 0,
    Void = 1,
    Bool = 2,
    Int = 3,
    Float = 4,
    Pointer = 5,
    Slice = 6,
    Array = 7,
    Struct = 8,
    Optional = 9,
    ErrorUnion = 10,
    Opaque = 11,
    Fn = 12,
}

impl TypeKind {
    const ALL: [TypeKind; 13] = [
        TypeKind::Unknown,
        TypeKind::Void,
        TypeKind::Bool,
        TypeKind::Int,
        TypeKind::Float,
        TypeKind::Pointer,
        TypeKind::Slice,
        TypeKind::Array,
        TypeKind::Struct,
        TypeKind::Optional,
        TypeKind::ErrorUnion,
        TypeKind::Opaque,
        TypeKind::Fn,
    ];

    /// Decode a descriptor kind tag
    #[inline]
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    #[inline]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            TypeKind::Unknown => "unknown",
            TypeKind::Void => "void",
            TypeKind::Bool => "bool",
            TypeKind::Int => "int",
            TypeKind::Float => "float",
            TypeKind::Pointer => "pointer",
            TypeKind::Slice => "slice",
            TypeKind::Array => "array",
            TypeKind::Struct => "struct",
            TypeKind::Optional => "optional",
            TypeKind::ErrorUnion => "error union",
            TypeKind::Opaque => "opaque",
            TypeKind::Fn => "fn",
        }
    }
}

/// Bit 0 of `flags` marks a signed integer
pub const FLAG_SIGNED: u8 = 1;

/// One interned type. Exactly one instance exists per id and loader.
#[derive(Debug)]
pub struct Type {
    pub id: u32,
    pub kind: TypeKind,
    /// Element or pointee. Never set for structs.
    pub child: Option<Arc<Type>>,
    /// Bit width (Int, Float), byte size (Struct) or element count (Array)
    pub len: u16,
    /// Signedness for Int; name length for Struct
    pub flags: u8,
    /// Struct name
    pub name: Option<String>,
}

impl Type {
    #[inline]
    pub fn is_signed(&self) -> bool {
        self.kind == TypeKind::Int && self.flags & FLAG_SIGNED != 0
    }

    #[inline]
    pub fn child_kind(&self) -> Option<TypeKind> {
        self.child.as_ref().map(|child| child.kind)
    }

    /// Size in bytes when stored as a slice element
    pub fn element_size(&self) -> Option<usize> {
        match self.kind {
            TypeKind::Bool => Some(1),
            TypeKind::Int | TypeKind::Float if self.len > 0 && self.len % 8 == 0 => {
                Some(self.len as usize / 8)
            }
            TypeKind::Struct => Some(self.len as usize),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let child = |f: &mut fmt::Formatter<'_>| match &self.child {
            Some(child) => write!(f, "{}", child),
            None => write!(f, "?"),
        };
        match self.kind {
            TypeKind::Int => {
                let prefix = if self.is_signed() { 'i' } else { 'u' };
                write!(f, "{}{}", prefix, self.len)
            }
            TypeKind::Float => write!(f, "f{}", self.len),
            TypeKind::Slice => {
                write!(f, "[]")?;
                child(f)
            }
            TypeKind::Array => {
                write!(f, "[{}]", self.len)?;
                child(f)
            }
            TypeKind::Optional => {
                write!(f, "?")?;
                child(f)
            }
            TypeKind::Pointer => {
                write!(f, "*")?;
                child(f)
            }
            TypeKind::ErrorUnion => {
                write!(f, "!")?;
                child(f)
            }
            TypeKind::Struct => match &self.name {
                Some(name) => write!(f, "{}", name),
                None => write!(f, "struct#{}", self.id),
            },
            kind => write!(f, "{}", kind.name()),
        }
    }
}
