//! In-process module with Rust closures as exports
//!
//! Design: speaks the full module protocol (header, handshake, method table,
//! per-type reflection) over a plain byte vector, so host-side modules and
//! test doubles go through exactly the path a sandboxed module would.
//!
//! Memory layout:
//! - header cells at offset 0
//! - export names
//! - scratch region, which is also where the transient arena begins

use super::{Bridge, BridgeError, CallbackTable, Invocation, CELL};
use crate::reflect::{TypeKind, FLAG_SIGNED};
use std::cell::{Cell, RefCell, RefMut};
use std::rc::Rc;
use tracing::trace;

/// Entry point address of "reflect all"
pub const REFLECT_ALL: u64 = 0x10;
/// Entry point address of "reflect one"
pub const REFLECT_ONE: u64 = 0x11;
const EXPORT_BASE: u64 = 0x100;

const DEFAULT_CAPACITY: usize = 64 * 1024;

/// Native export signature
pub type NativeFn = Rc<dyn Fn(&NativeCall<'_>) -> Result<(), BridgeError>>;

/// Type description served by the module's reflection entry points
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDesc {
    pub kind: TypeKind,
    pub child: u32,
    pub len: u16,
    pub flags: u8,
    pub name: Option<String>,
}

impl TypeDesc {
    fn new(kind: TypeKind, child: u32, len: u16) -> Self {
        Self {
            kind,
            child,
            len,
            flags: 0,
            name: None,
        }
    }

    pub fn void() -> Self {
        Self::new(TypeKind::Void, 0, 0)
    }

    pub fn boolean() -> Self {
        Self::new(TypeKind::Bool, 0, 1)
    }

    pub fn int(bits: u16, signed: bool) -> Self {
        let mut desc = Self::new(TypeKind::Int, 0, bits);
        if signed {
            desc.flags = FLAG_SIGNED;
        }
        desc
    }

    pub fn float(bits: u16) -> Self {
        Self::new(TypeKind::Float, 0, bits)
    }

    pub fn slice(child: u32) -> Self {
        Self::new(TypeKind::Slice, child, 0)
    }

    pub fn array(child: u32, count: u16) -> Self {
        Self::new(TypeKind::Array, child, count)
    }

    pub fn optional(child: u32) -> Self {
        Self::new(TypeKind::Optional, child, 0)
    }

    pub fn pointer(child: u32) -> Self {
        Self::new(TypeKind::Pointer, child, 0)
    }

    pub fn function() -> Self {
        Self::new(TypeKind::Fn, 0, 0)
    }

    pub fn error_union(child: u32) -> Self {
        Self::new(TypeKind::ErrorUnion, child, 0)
    }

    pub fn opaque() -> Self {
        Self::new(TypeKind::Opaque, 0, 0)
    }

    /// Struct of `size` bytes. The flags byte carries the name length.
    pub fn structure(name: &str, size: u16) -> Self {
        Self {
            kind: TypeKind::Struct,
            child: 0,
            len: size,
            flags: name.len().min(u8::MAX as usize) as u8,
            name: Some(name.to_string()),
        }
    }
}

/// Byte offsets of the descriptor fields, announced in the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorLayout {
    pub size: usize,
    pub child: usize,
    pub len: usize,
    pub kind: usize,
    pub flags: usize,
}

impl DescriptorLayout {
    /// Natural packing: child first, then len, kind and flags
    pub fn for_pointer_width(width: usize) -> Self {
        let child_width = if width == 4 { 4 } else { 8 };
        Self {
            size: child_width * 2,
            child: 0,
            len: child_width,
            kind: child_width + 2,
            flags: child_width + 3,
        }
    }
}

struct Export {
    name: String,
    ids: Vec<u32>,
    callback_slots: usize,
    func: NativeFn,
}

/// Builder for [`NativeModule`]
pub struct NativeModuleBuilder {
    label: String,
    pointer_width: usize,
    layout: Option<DescriptorLayout>,
    capacity: usize,
    base: u64,
    types: Vec<TypeDesc>,
    exports: Vec<Export>,
}

impl NativeModuleBuilder {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            pointer_width: 8,
            layout: None,
            capacity: DEFAULT_CAPACITY,
            base: 0,
            types: Vec::new(),
            exports: Vec::new(),
        }
    }

    /// Pointer width announced in the header. Only 4 and 8 load.
    pub fn pointer_width(mut self, width: usize) -> Self {
        self.pointer_width = width;
        self
    }

    pub fn layout(mut self, layout: DescriptorLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Bytes available to the scratch region and transient frames
    pub fn capacity(mut self, bytes: usize) -> Self {
        self.capacity = bytes;
        self
    }

    pub fn base_address(mut self, base: u64) -> Self {
        self.base = base;
        self
    }

    /// Register a type and return its id. Ids start at 1.
    pub fn ty(&mut self, desc: TypeDesc) -> u32 {
        self.types.push(desc);
        self.types.len() as u32
    }

    /// Export a function. `ret` and `args` are type ids.
    pub fn export<F>(&mut self, name: &str, ret: u32, args: &[u32], callback_slots: usize, func: F)
    where
        F: Fn(&NativeCall<'_>) -> Result<(), BridgeError> + 'static,
    {
        let mut ids = Vec::with_capacity(args.len() + 1);
        ids.push(ret);
        ids.extend_from_slice(args);
        self.exports.push(Export {
            name: name.to_string(),
            ids,
            callback_slots,
            func: Rc::new(func),
        });
    }

    pub fn build(self) -> Rc<NativeModule> {
        let header_cells = 4 + self.exports.len();
        let mut names = Vec::with_capacity(self.exports.len());
        let mut cursor = header_cells * CELL;
        for export in &self.exports {
            names.push((cursor, export.name.len()));
            cursor += export.name.len();
        }
        let scratch = align_up(cursor, CELL);

        let table_cells = 6 + self
            .exports
            .iter()
            .map(|export| 4 + export.ids.len())
            .sum::<usize>();
        let capacity = self.capacity.max(table_cells * CELL);
        let mut memory = vec![0u8; scratch + capacity];

        let mut put = |offset: usize, value: f64| {
            memory[offset..offset + CELL].copy_from_slice(&value.to_bits().to_ne_bytes());
        };
        put(0, self.pointer_width as f64);
        put(CELL, self.exports.len() as f64);
        put(2 * CELL, REFLECT_ALL as f64);
        put(3 * CELL, REFLECT_ONE as f64);
        for index in 0..self.exports.len() {
            put((4 + index) * CELL, (EXPORT_BASE + index as u64) as f64);
        }
        for (export, &(offset, len)) in self.exports.iter().zip(&names) {
            memory[offset..offset + len].copy_from_slice(export.name.as_bytes());
        }

        let layout = self
            .layout
            .unwrap_or_else(|| DescriptorLayout::for_pointer_width(self.pointer_width));

        Rc::new(NativeModule {
            label: self.label,
            len: Cell::new(memory.len()),
            memory: RefCell::new(memory),
            base: self.base,
            scratch,
            pointer_width: self.pointer_width,
            layout,
            types: self.types,
            exports: self.exports,
            names,
        })
    }
}

/// Module backed by a byte vector, with Rust closures as exports
pub struct NativeModule {
    label: String,
    memory: RefCell<Vec<u8>>,
    /// Mirrors `memory.len()`, readable while a view is live
    len: Cell<usize>,
    base: u64,
    scratch: usize,
    pointer_width: usize,
    layout: DescriptorLayout,
    types: Vec<TypeDesc>,
    exports: Vec<Export>,
    names: Vec<(usize, usize)>,
}

impl NativeModule {
    pub fn builder(label: &str) -> NativeModuleBuilder {
        NativeModuleBuilder::new(label)
    }

    /// Export that copies its argument slots down onto the return slots
    pub fn echo(slots: usize) -> impl Fn(&NativeCall<'_>) -> Result<(), BridgeError> {
        move |call: &NativeCall<'_>| {
            for slot in 0..slots {
                let bits = call.slot_bits(slot + 1)?;
                call.set_slot_bits(slot, bits)?;
            }
            Ok(())
        }
    }

    /// Current memory size in bytes
    #[inline]
    pub fn memory_len(&self) -> usize {
        self.len.get()
    }

    fn cells(&self) -> Result<RefMut<'_, Vec<u8>>, BridgeError> {
        self.memory.try_borrow_mut().map_err(|_| BridgeError::MemoryBusy)
    }

    fn put_cell(memory: &mut [u8], offset: usize, value: f64) {
        memory[offset..offset + CELL].copy_from_slice(&value.to_bits().to_ne_bytes());
    }

    /// Write the handshake followed by the method table into scratch
    fn reflect_all(&self) -> Result<(), BridgeError> {
        let layout = self.layout;
        let mut cells: Vec<f64> = [layout.size, layout.child, layout.len, layout.kind, layout.flags]
            .iter()
            .map(|&offset| offset as f64)
            .collect();
        cells.push(self.exports.len() as f64);
        for (export, &(offset, len)) in self.exports.iter().zip(&self.names) {
            cells.push((self.base + offset as u64) as f64);
            cells.push(len as f64);
            cells.push(export.callback_slots as f64);
            cells.push(export.ids.len() as f64);
            cells.extend(export.ids.iter().map(|&id| id as f64));
        }

        let mut memory = self.cells()?;
        for (index, value) in cells.into_iter().enumerate() {
            Self::put_cell(&mut memory, self.scratch + index * CELL, value);
        }
        Ok(())
    }

    /// Answer one type query: id in, descriptor and name out
    fn reflect_one(&self) -> Result<(), BridgeError> {
        let mut memory = self.cells()?;
        let mut cell = [0u8; CELL];
        cell.copy_from_slice(&memory[self.scratch..self.scratch + CELL]);
        let id = f64::from_bits(u64::from_ne_bytes(cell));

        let desc = (id >= 1.0)
            .then(|| self.types.get(id as usize - 1))
            .flatten()
            .ok_or_else(|| BridgeError::Trap(format!("unknown type id {}", id)))?;

        let layout = self.layout;
        let start = self.scratch;
        memory[start..start + layout.size].fill(0);

        let child = start + layout.child;
        if self.pointer_width == 4 {
            memory[child..child + 4].copy_from_slice(&desc.child.to_ne_bytes());
        } else {
            memory[child..child + 8].copy_from_slice(&(desc.child as u64).to_ne_bytes());
        }
        let len = start + layout.len;
        memory[len..len + 2].copy_from_slice(&desc.len.to_ne_bytes());
        memory[start + layout.kind] = desc.kind.tag();
        memory[start + layout.flags] = desc.flags;

        if let Some(name) = &desc.name {
            let at = start + layout.size;
            let bytes = &name.as_bytes()[..desc.flags as usize];
            memory[at..at + bytes.len()].copy_from_slice(bytes);
        }
        Ok(())
    }
}

impl Bridge for NativeModule {
    fn memory(&self) -> Result<RefMut<'_, [u8]>, BridgeError> {
        self.cells().map(|memory| RefMut::map(memory, |bytes| bytes.as_mut_slice()))
    }

    fn base_address(&self) -> u64 {
        self.base
    }

    fn header_offset(&self) -> usize {
        0
    }

    fn scratch_offset(&self) -> usize {
        self.scratch
    }

    fn invoke(&self, call: &Invocation<'_>) -> Result<(), BridgeError> {
        match call.address {
            REFLECT_ALL => self.reflect_all(),
            REFLECT_ONE => self.reflect_one(),
            address => {
                let export = address
                    .checked_sub(EXPORT_BASE)
                    .and_then(|index| self.exports.get(index as usize))
                    .ok_or(BridgeError::UnknownCall(address))?;
                trace!(module = %self.label, export = %export.name, frame = call.frame, "native call");
                let native = NativeCall {
                    module: self,
                    frame: call.frame,
                    callbacks: call.callbacks,
                    callback_slots: call.callback_slots,
                };
                (export.func)(&native)
            }
        }
    }

    fn label(&self) -> &str {
        &self.label
    }
}

/// Callee-side view of one call frame.
///
/// Every accessor borrows memory only for its own duration, so callbacks
/// invoked from an export may re-enter the module.
pub struct NativeCall<'a> {
    module: &'a NativeModule,
    frame: usize,
    callbacks: &'a CallbackTable,
    callback_slots: &'a [usize],
}

impl NativeCall<'_> {
    /// Byte offset of slot 0
    #[inline]
    pub fn frame_offset(&self) -> usize {
        self.frame
    }

    pub fn callback_slots(&self) -> &[usize] {
        self.callback_slots
    }

    fn cell_range(&self, slot: usize, len: usize) -> Result<std::ops::Range<usize>, BridgeError> {
        let start = self.frame + slot * CELL;
        if start + CELL > len {
            return Err(BridgeError::InvalidAddress {
                address: self.module.base + start as u64,
                len: CELL,
            });
        }
        Ok(start..start + CELL)
    }

    pub fn slot_bits(&self, slot: usize) -> Result<u64, BridgeError> {
        let memory = self.module.cells()?;
        let range = self.cell_range(slot, memory.len())?;
        let mut cell = [0u8; CELL];
        cell.copy_from_slice(&memory[range]);
        Ok(u64::from_ne_bytes(cell))
    }

    pub fn set_slot_bits(&self, slot: usize, bits: u64) -> Result<(), BridgeError> {
        let mut memory = self.module.cells()?;
        let range = self.cell_range(slot, memory.len())?;
        memory[range].copy_from_slice(&bits.to_ne_bytes());
        Ok(())
    }

    #[inline]
    pub fn slot_f64(&self, slot: usize) -> Result<f64, BridgeError> {
        self.slot_bits(slot).map(f64::from_bits)
    }

    #[inline]
    pub fn set_slot_f64(&self, slot: usize, value: f64) -> Result<(), BridgeError> {
        self.set_slot_bits(slot, value.to_bits())
    }

    /// End of the caller's working set, where returned aggregates go
    pub fn extent(&self) -> Result<u64, BridgeError> {
        self.slot_f64(0).map(|address| address as u64)
    }

    fn range(&self, address: u64, len: usize, memory_len: usize) -> Result<std::ops::Range<usize>, BridgeError> {
        let invalid = BridgeError::InvalidAddress { address, len };
        let start = address.checked_sub(self.module.base).ok_or(invalid.clone())? as usize;
        match start.checked_add(len) {
            Some(end) if end <= memory_len => Ok(start..end),
            _ => Err(invalid),
        }
    }

    pub fn read(&self, address: u64, len: usize) -> Result<Vec<u8>, BridgeError> {
        let memory = self.module.cells()?;
        let range = self.range(address, len, memory.len())?;
        Ok(memory[range].to_vec())
    }

    pub fn write(&self, address: u64, bytes: &[u8]) -> Result<(), BridgeError> {
        let mut memory = self.module.cells()?;
        let range = self.range(address, bytes.len(), memory.len())?;
        memory[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Invoke a host callback by slot
    pub fn call_back(&self, index: usize, args: &[f64]) -> Result<f64, BridgeError> {
        self.callbacks.invoke(index, args)
    }

    /// Grow memory by `extra` bytes into a fresh allocation
    pub fn grow(&self, extra: usize) -> Result<(), BridgeError> {
        let mut memory = self.module.cells()?;
        let mut moved = Vec::with_capacity(memory.len() + extra);
        moved.extend_from_slice(&memory);
        moved.resize(memory.len() + extra, 0);
        self.module.len.set(moved.len());
        *memory = moved;
        Ok(())
    }
}

#[inline]
const fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) & !(align - 1)
}
