//! Method emission - frame plans for exported methods
//!
//! Design: everything about a call that does not depend on argument values
//! is fixed once at load time in a `MethodPlan`: each parameter's wire type,
//! first slot and padding, the frame size and the callback range. The plan
//! is realized two ways, interpreted here by `invoke`, or rendered as Rust
//! source by `source.rs`.
//!
//! Call lifecycle: reserve frame, encode arguments, invoke, decode slot 0,
//! roll back. A fault at any step drops the frame, which rolls back.

mod source;

pub use source::{emit_bindings, emit_manifest, Manifest, MethodEntry, ParamEntry};

use crate::bridge::CELL;
use crate::errors::{Fault, Result};
use crate::logging::log_call;
use crate::module::Module;
use crate::reflect::{MethodSpec, TypeReflector};
use crate::wire::{Value, WireType, WireTypeRegistry};
use std::sync::Arc;

/// One parameter's place in the frame
#[derive(Debug, Clone)]
pub struct ParamPlan {
    pub wire: Arc<WireType>,
    /// First wire slot
    pub slot: usize,
    /// Alignment to pad the transient cursor to before encoding
    pub pad: Option<usize>,
}

/// Load-time layout of one exported method
#[derive(Debug, Clone)]
pub struct MethodPlan {
    pub ordinal: usize,
    pub name: String,
    pub ret: Arc<WireType>,
    pub params: Vec<ParamPlan>,
    /// `max(1 + argument slots, return slots)`
    pub wire_slots: usize,
    pub callback_base: usize,
    pub callback_count: usize,
}

impl MethodPlan {
    /// Lay out `spec`, resolving its types through `reflector`
    pub fn build(spec: &MethodSpec, reflector: &TypeReflector<'_>, registry: &WireTypeRegistry) -> Result<Self> {
        let ret = registry.from_stack(&reflector.get(spec.ret())?, 0)?.wire;

        let mut params = Vec::with_capacity(spec.params().len());
        let mut slot = 1;
        // Slot 0 starts the frame on a cell boundary
        let mut last_align = CELL;
        let mut callbacks = 0;
        for &id in spec.params() {
            let step = registry.to_stack(&reflector.get(id)?, slot)?;
            let align = step.wire.align();
            let mut pad = None;
            if align > 0 {
                if align > last_align {
                    pad = Some(align);
                }
                last_align = align;
            }
            if step.wire.is_callback() {
                callbacks += 1;
            }
            slot += step.wire.wire_count();
            params.push(ParamPlan {
                wire: step.wire,
                slot: step.slot,
                pad,
            });
        }

        if callbacks > spec.callback_slots {
            return Err(Fault::mismatch(format!(
                "{} takes {} callbacks but declares {} callback slots",
                spec.name, callbacks, spec.callback_slots
            )));
        }

        Ok(Self {
            ordinal: spec.ordinal,
            name: spec.name.clone(),
            wire_slots: slot.max(ret.wire_count()),
            ret,
            params,
            callback_base: spec.callback_base,
            callback_count: spec.callback_slots,
        })
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Human-readable signature in reflected type names
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(|param| param.wire.ty().to_string()).collect();
        format!("{}({}) {}", self.name, params.join(", "), self.ret.ty())
    }

    /// Call the method with dynamic arguments
    pub fn invoke(&self, module: &Module, args: Vec<Value>) -> Result<Value> {
        if args.len() != self.params.len() {
            return Err(Fault::Arity {
                method: self.name.clone(),
                expected: self.params.len(),
                got: args.len(),
            });
        }

        let mut frame = module.open_frame(self.ordinal, self.wire_slots, self.callback_base, self.callback_count)?;
        log_call(&self.name, args.len(), frame.args_offset());

        for (param, arg) in self.params.iter().zip(args) {
            if let Some(align) = param.pad {
                frame.pad_to(align)?;
            }
            param.wire.encode(&mut frame, param.slot, arg)?;
        }
        frame.invoke()?;
        self.ret.decode(&mut frame, 0)
    }
}
