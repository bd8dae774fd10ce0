//! Type reflection - decode type ids through the module's own metadata
//!
//! Design: the module describes its types in a fixed-layout descriptor
//! whose field offsets it announces once at startup. Nothing about the
//! layout is assumed on this side.
//!
//! Architecture:
//! - `types.rs` - TypeKind and Type
//! - `table.rs` - per-loader interning table
//! - `protocol.rs` - header, handshake and method table readers
//! - `reflector.rs` - lazy, cached id resolution

mod protocol;
mod reflector;
mod table;
mod types;

pub use protocol::{discover, Discovery, Handshake, MethodSpec, ModuleHeader, HANDSHAKE_CELLS};
pub use reflector::TypeReflector;
pub use table::TypeTable;
pub use types::{Type, TypeKind, FLAG_SIGNED};

#[cfg(test)]
mod tests;
