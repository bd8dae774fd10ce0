//! wirebind - wire-format ABI layer for calling into linear-memory modules
//!
//! A module publishes a header, a method table and per-type descriptors in
//! its own memory. `Module::load` reads them through a [`bridge::Bridge`],
//! resolves every reflected type to a wire rule and lays out one frame plan
//! per exported method. Calls then run through the plan, or through Rust
//! bindings generated from it.
//!
//! Architecture:
//! - `bridge` - the seam to a loaded module, plus an in-process module
//! - `reflect` - header, handshake and type reflection
//! - `wire` - wire rules and the reference listing of their bodies
//! - `frame` - transient arena and per-call frames
//! - `snippet` - template extraction from the listing
//! - `emit` - method plans, generated source and manifests
//! - `module` - the loader and lazily connected libraries

pub mod bridge;
pub mod config;
pub mod emit;
pub mod errors;
pub mod frame;
pub mod logging;
pub mod module;
pub mod reflect;
pub mod snippet;
pub mod wire;

pub use bridge::{Bridge, BridgeError, Callback, NativeModule, SharedBridge};
pub use config::{BindConfig, CodegenConfig};
pub use emit::MethodPlan;
pub use errors::{Fault, Result};
pub use frame::{CallFrame, TransientStats};
pub use module::{Connector, Library, Module, Source};
pub use reflect::{Type, TypeKind};
pub use wire::{Slice, SliceArg, Value, WireRule, WireType};

/// Everything generated bindings refer to
pub mod prelude {
    pub use crate::bridge::Callback;
    pub use crate::errors::Fault;
    pub use crate::frame::CallFrame;
    pub use crate::module::{Connector, Library, Module, Source};
    pub use crate::wire::{Slice, SliceArg, Value, CANONICAL_NAN, INT_BIAS, NULL_BITS, NULL_HIGH, PRESENT};
}
