//! On-demand type resolution through the module's "reflect one" entry point

use super::protocol::{type_id, Handshake, ModuleHeader};
use super::table::TypeTable;
use super::types::{Type, TypeKind};
use crate::bridge::{Bridge, CallbackTable, Invocation, MemoryView};
use crate::errors::{Fault, Result};
use crate::logging::log_reflect;
use std::cell::RefCell;
use std::sync::Arc;

/// Descriptor fields as read from scratch, before children are resolved
struct RawDescriptor {
    child: u64,
    len: u16,
    kind: TypeKind,
    flags: u8,
    name: Option<String>,
}

/// Resolves type ids against one module, caching into its [`TypeTable`]
pub struct TypeReflector<'a> {
    bridge: &'a dyn Bridge,
    handshake: Handshake,
    pointer_width: usize,
    reflect_one: u64,
    callbacks: &'a CallbackTable,
    table: &'a TypeTable,
    /// Ids currently being resolved, for cycle detection
    pending: RefCell<Vec<u32>>,
}

impl<'a> TypeReflector<'a> {
    pub fn new(
        bridge: &'a dyn Bridge,
        header: &ModuleHeader,
        handshake: Handshake,
        callbacks: &'a CallbackTable,
        table: &'a TypeTable,
    ) -> Self {
        Self {
            bridge,
            handshake,
            pointer_width: header.pointer_width,
            reflect_one: header.reflect_one,
            callbacks,
            table,
            pending: RefCell::new(Vec::new()),
        }
    }

    /// Resolve `id`, returning the loader's single instance for it
    pub fn get(&self, id: u32) -> Result<Arc<Type>> {
        // Fast path: already interned
        if let Some(ty) = self.table.get(id) {
            return Ok(ty);
        }

        if self.pending.borrow().contains(&id) {
            return Err(Fault::mismatch(format!("type {} contains itself", id)));
        }
        self.pending.borrow_mut().push(id);
        let resolved = self.resolve(id);
        self.pending.borrow_mut().retain(|&pending| pending != id);
        resolved
    }

    fn resolve(&self, id: u32) -> Result<Arc<Type>> {
        let raw = self.fetch(id)?;

        let child = if raw.child != 0 && raw.kind != TypeKind::Struct {
            Some(self.get(type_id(raw.child)?)?)
        } else {
            None
        };

        let ty = self.table.intern(Type {
            id,
            kind: raw.kind,
            child,
            len: raw.len,
            flags: raw.flags,
            name: raw.name,
        });
        log_reflect(id, &ty);
        Ok(ty)
    }

    /// Query the module for one descriptor
    fn fetch(&self, id: u32) -> Result<RawDescriptor> {
        let scratch = self.bridge.scratch_offset();
        {
            let mut view = MemoryView::acquire(self.bridge)?;
            view.set_cell_f64(scratch, id as f64)?;
        }
        self.bridge.invoke(&Invocation {
            address: self.reflect_one,
            frame: scratch,
            callbacks: self.callbacks,
            callback_slots: &[],
        })?;

        let view = MemoryView::acquire(self.bridge)?;
        let layout = self.handshake;
        let child = view.uint(scratch + layout.child, self.pointer_width)?;
        let len = view.uint(scratch + layout.len, 2)? as u16;
        let tag = view.uint(scratch + layout.kind, 1)? as u8;
        let flags = view.uint(scratch + layout.flags, 1)? as u8;

        let kind = TypeKind::from_tag(tag)
            .ok_or_else(|| Fault::mismatch(format!("type {} has unknown kind tag {}", id, tag)))?;

        let name = if kind == TypeKind::Struct {
            let bytes = view.read(scratch + layout.size, flags as usize)?;
            let name = std::str::from_utf8(bytes)
                .map_err(|_| Fault::mismatch(format!("struct {} name is not UTF-8", id)))?;
            Some(name.to_string())
        } else {
            None
        };

        Ok(RawDescriptor {
            child,
            len,
            kind,
            flags,
            name,
        })
    }
}
