//! Rule table and per-loader registry
//!
//! Lookup is a pure function of a type's structural shape: the
//! (kind, width, signedness, child-kind) key selects a rule, and nothing
//! about declaration order or position feeds into it.

use super::WireType;
use crate::errors::{Fault, Result};
use crate::reflect::{Type, TypeKind};
use dashmap::DashMap;
use std::sync::Arc;

/// Structural key a rule is selected by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleKey {
    pub kind: TypeKind,
    /// Bit width for scalars, element bit width for slices, byte size for structs
    pub width: u16,
    pub signed: bool,
    pub child: Option<TypeKind>,
}

impl RuleKey {
    pub fn of(ty: &Type) -> Self {
        let width = match (ty.kind, &ty.child) {
            (TypeKind::Slice, Some(child)) => child.len,
            _ => ty.len,
        };
        Self {
            kind: ty.kind,
            width,
            signed: ty.is_signed(),
            child: ty.child_kind(),
        }
    }
}

/// How a type moves across the boundary
#[derive(Debug, Clone)]
pub enum WireRule {
    Void,
    Bool,
    /// 1..=32 bits, boxed in the low half of a float
    SmallUint { bits: u32 },
    SmallInt { bits: u32 },
    /// 33..=64 bits, native 64-bit slot
    WideUint { bits: u32 },
    WideInt { bits: u32 },
    Float { bits: u32 },
    /// Pointer to fn: out-of-band callback slot, no wire slots
    Callback,
    /// Slice of 8-bit ints; accepts text
    Bytes,
    Slice { elem: usize, align: usize },
    Aggregate { len: usize },
    Optional(Arc<WireType>),
    /// Optional float; genuine payloads never collide with the sentinel
    OptionalFloat(Arc<WireType>),
    /// Optional whose child can produce any first-slot pattern; null travels in a tag slot
    OptionalTagged(Arc<WireType>),
}

impl WireRule {
    /// Select the rule for `ty`. Optional children resolve through `registry`.
    pub fn select(ty: &Type, registry: &WireTypeRegistry) -> Result<Self> {
        let key = RuleKey::of(ty);
        let bits = key.width as u32;
        let rule = match (key.kind, key.width, key.signed, key.child) {
            (TypeKind::Void, ..) => WireRule::Void,
            (TypeKind::Bool, ..) => WireRule::Bool,
            (TypeKind::Int, 1..=32, false, _) => WireRule::SmallUint { bits },
            (TypeKind::Int, 1..=32, true, _) => WireRule::SmallInt { bits },
            (TypeKind::Int, 33..=64, false, _) => WireRule::WideUint { bits },
            (TypeKind::Int, 33..=64, true, _) => WireRule::WideInt { bits },
            (TypeKind::Int, ..) => {
                return Err(Fault::unsupported("int", format!("{}-bit integers", bits)));
            }
            (TypeKind::Float, 32 | 64, ..) => WireRule::Float { bits },
            (TypeKind::Float, ..) => {
                return Err(Fault::unsupported("float", format!("{}-bit floats", bits)));
            }
            (TypeKind::Pointer, _, _, Some(TypeKind::Fn)) => WireRule::Callback,
            (TypeKind::Slice, 8, _, Some(TypeKind::Int)) => WireRule::Bytes,
            (TypeKind::Slice, _, _, Some(TypeKind::Int | TypeKind::Float | TypeKind::Bool | TypeKind::Struct)) => {
                let elem = ty
                    .child
                    .as_ref()
                    .and_then(|child| child.element_size())
                    .filter(|&size| size > 0)
                    .ok_or_else(|| Fault::unsupported("slice", format!("elements of {}", ty)))?;
                let align = if elem.is_power_of_two() { elem.min(16) } else { 1 };
                WireRule::Slice { elem, align }
            }
            (TypeKind::Struct, ..) => WireRule::Aggregate {
                len: key.width as usize,
            },
            (TypeKind::Optional, ..) => {
                let child = ty
                    .child
                    .as_ref()
                    .ok_or_else(|| Fault::mismatch(format!("optional type {} has no child", ty.id)))?;
                Self::optional(registry.resolve(child)?)?
            }
            (kind, ..) => {
                return Err(Fault::unsupported(kind.name(), format!("no wire rule for {}", ty)));
            }
        };
        Ok(rule)
    }

    fn optional(child: Arc<WireType>) -> Result<Self> {
        match child.rule() {
            WireRule::Void | WireRule::Callback => Err(Fault::unsupported(
                "optional",
                format!("optional of {}", child.ty()),
            )),
            WireRule::Float { .. } => Ok(WireRule::OptionalFloat(child)),
            WireRule::WideUint { .. }
            | WireRule::WideInt { .. }
            | WireRule::Optional(_)
            | WireRule::OptionalFloat(_)
            | WireRule::OptionalTagged(_) => Ok(WireRule::OptionalTagged(child)),
            _ => Ok(WireRule::Optional(child)),
        }
    }
}

/// Per-loader cache of wire types, keyed by type id
#[derive(Default)]
pub struct WireTypeRegistry {
    cache: DashMap<u32, Arc<WireType>>,
}

impl WireTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire type for `ty`, built once per id
    pub fn resolve(&self, ty: &Arc<Type>) -> Result<Arc<WireType>> {
        if let Some(wire) = self.cache.get(&ty.id) {
            return Ok(Arc::clone(&*wire));
        }
        let rule = WireRule::select(ty, self)?;
        let wire = Arc::new(WireType::new(Arc::clone(ty), rule));
        Ok(Arc::clone(&*self.cache.entry(ty.id).or_insert(wire)))
    }

    /// Step writing a value of `ty` starting at `slot`
    pub fn to_stack(&self, ty: &Arc<Type>, slot: usize) -> Result<EncodeStep> {
        Ok(EncodeStep {
            wire: self.resolve(ty)?,
            slot,
        })
    }

    /// Step reading a value of `ty` from `slot`
    pub fn from_stack(&self, ty: &Arc<Type>, slot: usize) -> Result<DecodeStep> {
        let wire = self.resolve(ty)?;
        if !wire.decodable() {
            return Err(Fault::unsupported(
                "fn",
                format!("{} cannot be returned", wire.ty()),
            ));
        }
        Ok(DecodeStep { wire, slot })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// A wire type bound to its first slot
#[derive(Debug, Clone)]
pub struct EncodeStep {
    pub wire: Arc<WireType>,
    pub slot: usize,
}

impl EncodeStep {
    #[inline]
    pub fn apply(&self, frame: &mut crate::frame::CallFrame<'_>, value: super::Value) -> Result<()> {
        self.wire.encode(frame, self.slot, value)
    }
}

#[derive(Debug, Clone)]
pub struct DecodeStep {
    pub wire: Arc<WireType>,
    pub slot: usize,
}

impl DecodeStep {
    #[inline]
    pub fn apply(&self, frame: &mut crate::frame::CallFrame<'_>) -> Result<super::Value> {
        self.wire.decode(frame, self.slot)
    }
}
