//! Runtime bridge - the seam between the wire layer and a loaded module
//!
//! Design: the loaded module is reached only through this trait. Memory is
//! borrowed per phase, never cached, so a module that grows or relocates its
//! memory mid-call is always read through a fresh view.
//!
//! Architecture:
//! - `memory.rs` - phase-scoped typed view over module memory
//! - `native.rs` - in-process module whose exports are Rust closures

mod memory;
pub mod native;

pub use memory::{MemoryView, CELL};
pub use native::{DescriptorLayout, NativeCall, NativeFn, NativeModule, NativeModuleBuilder, TypeDesc};

use std::cell::{RefCell, RefMut};
use std::rc::Rc;

/// Host function registered into a callback slot.
///
/// Receives and returns raw wire cells.
pub type Callback = Rc<dyn Fn(&[f64]) -> f64>;

/// Shared handle to a loaded module
pub type SharedBridge = Rc<dyn Bridge>;

/// Connection to one loaded module.
///
/// Implementations own the memory and the call table. All offsets are byte
/// offsets into `memory()`; addresses written into wire slots are
/// `base_address() + offset`.
pub trait Bridge {
    /// Borrow the module memory. Fails if a view is already live.
    fn memory(&self) -> Result<RefMut<'_, [u8]>, BridgeError>;

    /// Added to memory offsets to form the addresses the callee sees
    fn base_address(&self) -> u64 {
        0
    }

    /// Byte offset of the module header
    fn header_offset(&self) -> usize;

    /// Byte offset of the shared scratch region; the transient arena starts here
    fn scratch_offset(&self) -> usize;

    /// Call the entry point at `call.address`
    fn invoke(&self, call: &Invocation<'_>) -> Result<(), BridgeError>;

    /// Name used in log output
    fn label(&self) -> &str {
        "module"
    }
}

/// One call through the call table
pub struct Invocation<'a> {
    pub address: u64,
    /// Byte offset of slot 0 of the call frame
    pub frame: usize,
    pub callbacks: &'a CallbackTable,
    /// Callback slots registered by this call, in declaration order
    pub callback_slots: &'a [usize],
}

/// True when both handles reach the same module memory
#[inline]
pub fn same_memory(a: &SharedBridge, b: &SharedBridge) -> bool {
    Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
}

/// Indexed table of host callbacks shared by every method of a module
#[derive(Default)]
pub struct CallbackTable {
    slots: RefCell<Vec<Option<Callback>>>,
}

impl CallbackTable {
    pub fn with_slots(count: usize) -> Self {
        Self {
            slots: RefCell::new(vec![None; count]),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store a callback, replacing whatever held the slot before
    pub fn register(&self, index: usize, callback: Callback) -> Result<(), BridgeError> {
        let mut slots = self.slots.borrow_mut();
        let slot = slots
            .get_mut(index)
            .ok_or(BridgeError::UnknownCallback(index))?;
        *slot = Some(callback);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<Callback> {
        self.slots.borrow().get(index).cloned().flatten()
    }

    /// Call the callback in `index`.
    ///
    /// The table is not borrowed while the callback runs, so the callback may
    /// re-enter the module and register callbacks of its own.
    pub fn invoke(&self, index: usize, args: &[f64]) -> Result<f64, BridgeError> {
        let callback = self.get(index).ok_or(BridgeError::UnknownCallback(index))?;
        Ok(callback(args))
    }
}

/// Failures reported by a bridge
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Memory is already borrowed by another view
    MemoryBusy,
    InvalidAddress { address: u64, len: usize },
    UnknownCall(u64),
    UnknownCallback(usize),
    /// Callee aborted
    Trap(String),
}

impl core::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::MemoryBusy => write!(f, "Module memory is already borrowed"),
            Self::InvalidAddress { address, len } => {
                write!(f, "Invalid address {:#x} (+{} bytes)", address, len)
            }
            Self::UnknownCall(address) => write!(f, "No entry point at {:#x}", address),
            Self::UnknownCallback(index) => write!(f, "No callback in slot {}", index),
            Self::Trap(msg) => write!(f, "Trap: {}", msg),
        }
    }
}

impl std::error::Error for BridgeError {}
