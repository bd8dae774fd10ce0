//! Fault taxonomy for the wire layer
//!
//! Design: one flat enum, every fault synchronous and local to the call or
//! load that raised it. Nothing is retried.

use crate::bridge::BridgeError;

/// Errors raised while loading a module, building wrappers or calling
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Argument outside its declared integer domain. The frame was rolled back.
    Range {
        value: i128,
        bits: u32,
        signed: bool,
    },
    /// No wire rule exists for this type shape
    UnsupportedType {
        kind: &'static str,
        detail: String,
    },
    /// Target metadata disagrees with a decodable layout
    ReflectionMismatch(String),
    /// Dynamic value does not fit the parameter's rule
    ArgumentType {
        expected: String,
        found: &'static str,
    },
    Arity {
        method: String,
        expected: usize,
        got: usize,
    },
    UnknownMethod(String),
    /// Frame does not fit in the transient region
    TransientExhausted {
        requested: usize,
        remaining: usize,
    },
    Bridge(BridgeError),
    Config(String),
    /// Reference listing could not be parsed into templates
    Template(String),
}

impl Fault {
    /// Build a range fault for an N-bit integer
    #[inline]
    pub fn range(value: i128, bits: u32, signed: bool) -> Self {
        Self::Range { value, bits, signed }
    }

    pub fn unsupported(kind: &'static str, detail: impl Into<String>) -> Self {
        Self::UnsupportedType {
            kind,
            detail: detail.into(),
        }
    }

    pub fn mismatch(detail: impl Into<String>) -> Self {
        Self::ReflectionMismatch(detail.into())
    }

    pub fn argument(expected: impl Into<String>, found: &'static str) -> Self {
        Self::ArgumentType {
            expected: expected.into(),
            found,
        }
    }

    /// Short tag used in structured log fields
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Range { .. } => "range",
            Self::UnsupportedType { .. } => "unsupported_type",
            Self::ReflectionMismatch(_) => "reflection_mismatch",
            Self::ArgumentType { .. } => "argument_type",
            Self::Arity { .. } => "arity",
            Self::UnknownMethod(_) => "unknown_method",
            Self::TransientExhausted { .. } => "transient_exhausted",
            Self::Bridge(_) => "bridge",
            Self::Config(_) => "config",
            Self::Template(_) => "template",
        }
    }
}

impl core::fmt::Display for Fault {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Range {
                value,
                bits,
                signed,
            } => {
                let prefix = if *signed { 'i' } else { 'u' };
                write!(f, "Value {} out of range for {}{}", value, prefix, bits)
            }
            Self::UnsupportedType { kind, detail } => {
                write!(f, "Unsupported type {}: {}", kind, detail)
            }
            Self::ReflectionMismatch(detail) => write!(f, "Reflection mismatch: {}", detail),
            Self::ArgumentType { expected, found } => {
                write!(f, "Expected {}, got {}", expected, found)
            }
            Self::Arity {
                method,
                expected,
                got,
            } => write!(
                f,
                "{} takes {} argument(s), got {}",
                method, expected, got
            ),
            Self::UnknownMethod(name) => write!(f, "Unknown method: {}", name),
            Self::TransientExhausted {
                requested,
                remaining,
            } => write!(
                f,
                "Transient region exhausted: requested {} bytes, {} remaining",
                requested, remaining
            ),
            Self::Bridge(err) => write!(f, "Bridge error: {}", err),
            Self::Config(msg) => write!(f, "Config error: {}", msg),
            Self::Template(msg) => write!(f, "Template error: {}", msg),
        }
    }
}

impl std::error::Error for Fault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bridge(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BridgeError> for Fault {
    fn from(err: BridgeError) -> Self {
        Self::Bridge(err)
    }
}

pub type Result<T> = std::result::Result<T, Fault>;
