//! Bump pointer arena over the module's transient region
//!
//! Design: a single cursor moving in strict stack discipline. Frames record
//! the cursor on entry and restore it on exit, so nested frames unwind in
//! order and nothing is freed individually.
//!
//! Cursor positions are memory offsets, but alignment is taken on the
//! address the callee sees (`base + offset`).

use std::cell::Cell;

/// Transient region cursor for one module
pub struct TransientArena {
    base: u64,
    start: usize,
    end: usize,
    top: Cell<usize>,
    high_water: Cell<usize>,
    frames: Cell<u64>,
    bytes_copied: Cell<u64>,
}

impl TransientArena {
    /// Arena over byte offsets `start..end` of memory mapped at address 0
    #[inline]
    pub fn new(start: usize, end: usize) -> Self {
        Self::with_base(0, start, end)
    }

    /// Arena over byte offsets `start..end` of memory mapped at `base`
    pub fn with_base(base: u64, start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "invalid arena bounds");
        Self {
            base,
            start,
            end,
            top: Cell::new(start),
            high_water: Cell::new(start),
            frames: Cell::new(0),
            bytes_copied: Cell::new(0),
        }
    }

    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.end
    }

    /// Current cursor
    #[inline]
    pub fn top(&self) -> usize {
        self.top.get()
    }

    /// Fast path: bump allocation
    ///
    /// Returns the aligned offset, or None if the region is exhausted.
    #[inline(always)]
    pub fn try_alloc(&self, size: usize, align: usize) -> Option<usize> {
        debug_assert!(align.is_power_of_two(), "alignment must be power of 2");

        // Distance of offset 0 from the previous `align` boundary
        let skew = (self.base & (align as u64 - 1)) as usize;
        let offset = align_up(self.top.get() + skew, align) - skew;
        let new_top = offset.checked_add(size)?;

        if new_top <= self.end {
            self.set_top(new_top);
            Some(offset)
        } else {
            None
        }
    }

    /// Move the cursor up to the next address aligned to `align`
    #[inline]
    pub fn pad_to(&self, align: usize) -> Option<usize> {
        self.try_alloc(0, align)
    }

    /// Restore the cursor recorded when a frame opened
    #[inline]
    pub fn rollback(&self, top: usize) {
        debug_assert!(top >= self.start && top <= self.top.get(), "rollback above cursor");
        self.top.set(top);
    }

    /// Remaining capacity above the cursor
    #[inline]
    pub fn remaining(&self) -> usize {
        self.end.saturating_sub(self.top.get())
    }

    #[inline]
    pub(crate) fn note_frame(&self) {
        self.frames.set(self.frames.get() + 1);
    }

    #[inline]
    pub(crate) fn note_copy(&self, bytes: usize) {
        self.bytes_copied.set(self.bytes_copied.get() + bytes as u64);
    }

    pub fn stats(&self) -> TransientStats {
        TransientStats {
            frames: self.frames.get(),
            bytes_copied: self.bytes_copied.get(),
            high_water: self.high_water.get() - self.start,
            in_use: self.top.get() - self.start,
        }
    }

    #[inline]
    fn set_top(&self, top: usize) {
        self.top.set(top);
        if top > self.high_water.get() {
            self.high_water.set(top);
        }
    }
}

/// Transient usage counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransientStats {
    /// Frames opened since load
    pub frames: u64,
    /// Bytes copied into transient memory
    pub bytes_copied: u64,
    /// Deepest cursor position seen, relative to the region start
    pub high_water: usize,
    /// Bytes held by live frames
    pub in_use: usize,
}

/// Align offset upward to next multiple of alignment
///
/// Uses bit manipulation for branch-free execution:
/// - Add (align - 1) to round up
/// - Mask with !(align - 1) to align down
#[inline(always)]
pub const fn align_up(offset: usize, align: usize) -> usize {
    (offset.wrapping_add(align).wrapping_sub(1)) & !align.wrapping_sub(1)
}
