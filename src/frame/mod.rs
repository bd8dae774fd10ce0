//! Call frames - one per in-flight call, carved out of the transient arena
//!
//! Design: a frame reserves its wire slots on open, bumps the arena for
//! every byte copy an argument needs, and restores the arena cursor when it
//! is dropped. Every exit path (fault, early return, normal completion)
//! releases the frame's allocations.
//!
//! Module memory is borrowed for the duration of each access and never held
//! between them. Slices decoded from a live frame, nested frames and the
//! module's own accessors can all reach memory while the frame is open, and
//! the first access after the call sees whatever memory the callee left.
//!
//! Architecture:
//! - `bump.rs` - the arena cursor

mod bump;

pub use bump::{align_up, TransientArena, TransientStats};

use crate::bridge::{Bridge, BridgeError, Callback, CallbackTable, Invocation, MemoryView, SharedBridge, CELL};
use crate::errors::{Fault, Result};
use crate::logging::{log_range_fault, log_rollback};
use crate::wire::Slice;
use smallvec::SmallVec;

/// Borrowed module state a frame works against
#[derive(Clone, Copy)]
pub struct FrameContext<'m> {
    pub bridge: &'m SharedBridge,
    pub arena: &'m TransientArena,
    pub callbacks: &'m CallbackTable,
    /// Call table, by ordinal
    pub calls: &'m [u64],
    pub zero_slots: bool,
}

/// Lifecycle of a frame. Dropping the frame rolls it back from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Reserved,
    Encoded,
    Invoked,
}

/// One call's slice of the transient arena
pub struct CallFrame<'m> {
    ctx: FrameContext<'m>,
    ordinal: usize,
    /// Arena cursor when the frame opened
    entry: usize,
    /// Byte offset of slot 0
    args: usize,
    slots: usize,
    /// Working-set end, fixed when the frame is sealed
    extent: usize,
    reserved: bool,
    callback_next: usize,
    callback_end: usize,
    callback_slots: SmallVec<[usize; 4]>,
    state: FrameState,
}

impl<'m> CallFrame<'m> {
    /// Reserve `wire_slots` slots for a call to `ordinal`
    pub fn open(
        ctx: FrameContext<'m>,
        ordinal: usize,
        wire_slots: usize,
        callback_base: usize,
        callback_count: usize,
    ) -> Result<Self> {
        let entry = ctx.arena.top();
        let bytes = wire_slots * CELL;
        let args = ctx.arena.try_alloc(bytes, CELL).ok_or(Fault::TransientExhausted {
            requested: bytes,
            remaining: ctx.arena.remaining(),
        })?;
        ctx.arena.note_frame();

        let frame = Self {
            ctx,
            ordinal,
            entry,
            args,
            slots: wire_slots,
            extent: args + bytes,
            reserved: false,
            callback_next: callback_base,
            callback_end: callback_base + callback_count,
            callback_slots: SmallVec::new(),
            state: FrameState::Reserved,
        };
        if ctx.zero_slots {
            let zeros = vec![0u8; bytes];
            frame.with_view(|view| view.write(args, &zeros))?;
        }
        Ok(frame)
    }

    #[inline]
    fn bridge(&self) -> &'m dyn Bridge {
        &**self.ctx.bridge
    }

    /// Run `access` against a view that is released as soon as it returns
    #[inline]
    fn with_view<T>(
        &self,
        access: impl FnOnce(&mut MemoryView<'m>) -> std::result::Result<T, BridgeError>,
    ) -> Result<T> {
        let mut view = MemoryView::acquire(self.bridge())?;
        Ok(access(&mut view)?)
    }

    #[inline]
    fn slot_offset(&self, slot: usize) -> usize {
        debug_assert!(slot < self.slots, "slot {} outside {}-slot frame", slot, self.slots);
        self.args + slot * CELL
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Byte offset of slot 0
    #[inline]
    pub fn args_offset(&self) -> usize {
        self.args
    }

    #[inline]
    pub fn wire_slots(&self) -> usize {
        self.slots
    }

    /// Whether any argument allocated transient bytes
    #[inline]
    pub fn reserved(&self) -> bool {
        self.reserved
    }

    pub fn callback_slots(&self) -> &[usize] {
        &self.callback_slots
    }

    // ------------------------------------------------------------------
    // Slot access
    // ------------------------------------------------------------------

    #[inline]
    pub fn set_bits(&mut self, slot: usize, bits: u64) -> Result<()> {
        let offset = self.slot_offset(slot);
        self.with_view(|view| view.set_cell_bits(offset, bits))
    }

    #[inline]
    pub fn bits(&mut self, slot: usize) -> Result<u64> {
        let offset = self.slot_offset(slot);
        self.with_view(|view| view.cell_bits(offset))
    }

    #[inline]
    pub fn set_f64(&mut self, slot: usize, value: f64) -> Result<()> {
        self.set_bits(slot, value.to_bits())
    }

    #[inline]
    pub fn f64(&mut self, slot: usize) -> Result<f64> {
        self.bits(slot).map(f64::from_bits)
    }

    /// Upper 32 bits of a slot
    #[inline]
    pub fn high(&mut self, slot: usize) -> Result<u32> {
        self.bits(slot).map(|bits| (bits >> 32) as u32)
    }

    /// Lower 32 bits of a slot, where boxed integers keep their pattern
    #[inline]
    pub fn low(&mut self, slot: usize) -> Result<u32> {
        self.bits(slot).map(|bits| bits as u32)
    }

    // ------------------------------------------------------------------
    // Transient bytes
    // ------------------------------------------------------------------

    /// Allocate `len` transient bytes, returning their offset
    pub fn alloc(&mut self, len: usize, align: usize) -> Result<usize> {
        let offset = self
            .ctx
            .arena
            .try_alloc(len, align.max(1))
            .ok_or(Fault::TransientExhausted {
                requested: len,
                remaining: self.ctx.arena.remaining(),
            })?;
        self.reserved = true;
        Ok(offset)
    }

    /// Advance the cursor to satisfy `align` before the next allocation
    pub fn pad_to(&mut self, align: usize) -> Result<()> {
        self.ctx
            .arena
            .pad_to(align.max(1))
            .map(|_| ())
            .ok_or(Fault::TransientExhausted {
                requested: align,
                remaining: self.ctx.arena.remaining(),
            })
    }

    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.with_view(|view| view.write(offset, bytes))?;
        self.ctx.arena.note_copy(bytes.len());
        Ok(())
    }

    pub fn read(&mut self, offset: usize, len: usize) -> Result<Vec<u8>> {
        self.with_view(|view| view.read(offset, len).map(<[u8]>::to_vec))
    }

    /// Address the callee sees for a byte offset
    #[inline]
    pub fn address(&self, offset: usize) -> u64 {
        self.bridge().base_address() + offset as u64
    }

    /// Byte offset of `len` bytes at `address`
    pub fn offset_of(&mut self, address: u64, len: usize) -> Result<usize> {
        self.with_view(|view| view.offset(address, len))
    }

    /// End of the working set; returned aggregates are written here
    #[inline]
    pub fn extent(&self) -> usize {
        self.extent
    }

    // ------------------------------------------------------------------
    // Slices and callbacks
    // ------------------------------------------------------------------

    /// Whether a slice already lives in this frame's memory
    #[inline]
    pub fn owns(&self, slice: &Slice) -> bool {
        crate::bridge::same_memory(slice.owner(), self.ctx.bridge)
    }

    /// Slice handle over this module's memory
    pub fn slice(&self, address: u64, len: u64, elem_size: usize) -> Slice {
        Slice::new(self.ctx.bridge.clone(), address, len, elem_size)
    }

    /// Claim the next callback slot of this call
    pub fn next_callback_slot(&mut self) -> Result<usize> {
        if self.callback_next >= self.callback_end {
            return Err(Fault::unsupported(
                "fn",
                format!("callback slot {} beyond the declared range", self.callback_next),
            ));
        }
        let index = self.callback_next;
        self.callback_next += 1;
        Ok(index)
    }

    pub fn register_callback(&mut self, index: usize, callback: Callback) -> Result<()> {
        self.ctx.callbacks.register(index, callback)?;
        self.callback_slots.push(index);
        Ok(())
    }

    /// Range fault for an N-bit integer argument
    pub fn range_fault(&self, value: i128, bits: u32, signed: bool) -> Fault {
        log_range_fault(value, bits, signed);
        Fault::range(value, bits, signed)
    }

    // ------------------------------------------------------------------
    // Call
    // ------------------------------------------------------------------

    /// Record the working-set end in slot 0
    pub fn seal(&mut self) -> Result<()> {
        self.extent = self.ctx.arena.top();
        let extent = self.address(self.extent);
        self.set_f64(0, extent as f64)?;
        self.state = FrameState::Encoded;
        Ok(())
    }

    /// Seal the frame and run the callee
    pub fn invoke(&mut self) -> Result<()> {
        self.seal()?;

        let address = *self
            .ctx
            .calls
            .get(self.ordinal)
            .ok_or_else(|| Fault::UnknownMethod(format!("#{}", self.ordinal)))?;
        self.ctx.bridge.invoke(&Invocation {
            address,
            frame: self.args,
            callbacks: self.ctx.callbacks,
            callback_slots: &self.callback_slots,
        })?;
        self.state = FrameState::Invoked;
        Ok(())
    }
}

impl Drop for CallFrame<'_> {
    fn drop(&mut self) {
        log_rollback(self.entry, self.ctx.arena.stats().high_water);
        self.ctx.arena.rollback(self.entry);
    }
}
