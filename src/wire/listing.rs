//! Reference listing of every wire rule
//!
//! Each `pub mod` pairs the encode and decode bodies of one rule. The
//! interpreter calls these functions directly, and `snippet` parses this
//! same file to splice the bodies into generated bindings, so both modes
//! share one implementation.
//!
//! Layout conventions the parser relies on:
//! - signatures stay on one line, the encoded value is the `arg` parameter
//! - decode bodies bind their result as `let ret: T = ...;` and end in `Ok(ret)`
//! - encode bodies end in `Ok(())`
//! - no trailing comments inside bodies
//!
//! Extra parameters (`bits`, `elem`, `align`, `len`, `tag`) are the rule's
//! static substitutions; generated code binds them as constants.

use super::{Slice, SliceArg, Value, WireType, CANONICAL_NAN, INT_BIAS, NULL_BITS, NULL_HIGH, PRESENT};
use crate::bridge::Callback;
use crate::errors::{Fault, Result};
use crate::frame::CallFrame;

pub mod void {
    use super::*;

    pub const SHAPE: &str = "void";

    pub fn encode(_frame: &mut CallFrame<'_>, _slot: usize, arg: ()) -> Result<()> {
        let _ = arg;
        Ok(())
    }

    pub fn decode(_frame: &mut CallFrame<'_>, _slot: usize) -> Result<()> {
        let ret: () = ();
        Ok(ret)
    }
}

pub mod boolean {
    use super::*;

    pub const SHAPE: &str = "bool";

    pub fn encode(frame: &mut CallFrame<'_>, slot: usize, arg: bool) -> Result<()> {
        frame.set_f64(slot, if arg { 1.0 } else { 0.0 })?;
        Ok(())
    }

    pub fn decode(frame: &mut CallFrame<'_>, slot: usize) -> Result<bool> {
        let value = frame.f64(slot)?;
        let ret: bool = value != 0.0 && !value.is_nan();
        Ok(ret)
    }
}

pub mod small_uint {
    use super::*;

    pub const SHAPE: &str = "small_uint";

    pub fn encode(frame: &mut CallFrame<'_>, slot: usize, arg: i64, bits: u32) -> Result<()> {
        if arg < 0 || arg > (u32::MAX >> (32 - bits)) as i64 {
            return Err(frame.range_fault(arg as i128, bits, false));
        }
        frame.set_bits(slot, INT_BIAS | arg as u64)?;
        Ok(())
    }

    pub fn decode(frame: &mut CallFrame<'_>, slot: usize, bits: u32) -> Result<u32> {
        let ret: u32 = frame.low(slot)? & (u32::MAX >> (32 - bits));
        Ok(ret)
    }
}

pub mod small_int {
    use super::*;

    pub const SHAPE: &str = "small_int";

    pub fn encode(frame: &mut CallFrame<'_>, slot: usize, arg: i64, bits: u32) -> Result<()> {
        let max = (1i64 << (bits - 1)) - 1;
        if arg < -max - 1 || arg > max {
            return Err(frame.range_fault(arg as i128, bits, true));
        }
        frame.set_bits(slot, INT_BIAS | arg as u32 as u64)?;
        Ok(())
    }

    pub fn decode(frame: &mut CallFrame<'_>, slot: usize, bits: u32) -> Result<i32> {
        let shift = 32 - bits;
        let ret: i32 = ((frame.low(slot)? << shift) as i32) >> shift;
        Ok(ret)
    }
}

pub mod wide_uint {
    use super::*;

    pub const SHAPE: &str = "wide_uint";

    pub fn encode(frame: &mut CallFrame<'_>, slot: usize, arg: i128, bits: u32) -> Result<()> {
        if arg < 0 || arg > (u64::MAX >> (64 - bits)) as i128 {
            return Err(frame.range_fault(arg, bits, false));
        }
        frame.set_bits(slot, arg as u64)?;
        Ok(())
    }

    pub fn decode(frame: &mut CallFrame<'_>, slot: usize, bits: u32) -> Result<u64> {
        let ret: u64 = frame.bits(slot)? & (u64::MAX >> (64 - bits));
        Ok(ret)
    }
}

pub mod wide_int {
    use super::*;

    pub const SHAPE: &str = "wide_int";

    pub fn encode(frame: &mut CallFrame<'_>, slot: usize, arg: i128, bits: u32) -> Result<()> {
        let max = (1i128 << (bits - 1)) - 1;
        if arg < -max - 1 || arg > max {
            return Err(frame.range_fault(arg, bits, true));
        }
        frame.set_bits(slot, arg as i64 as u64)?;
        Ok(())
    }

    pub fn decode(frame: &mut CallFrame<'_>, slot: usize, bits: u32) -> Result<i64> {
        let shift = 64 - bits;
        let ret: i64 = ((frame.bits(slot)? << shift) as i64) >> shift;
        Ok(ret)
    }
}

pub mod float {
    use super::*;

    pub const SHAPE: &str = "float";

    pub fn encode(frame: &mut CallFrame<'_>, slot: usize, arg: f64) -> Result<()> {
        frame.set_bits(slot, arg.to_bits())?;
        Ok(())
    }

    pub fn decode(frame: &mut CallFrame<'_>, slot: usize) -> Result<f64> {
        let ret: f64 = f64::from_bits(frame.bits(slot)?);
        Ok(ret)
    }
}

pub mod callback {
    use super::*;

    pub const SHAPE: &str = "callback";

    pub fn encode(frame: &mut CallFrame<'_>, _slot: usize, arg: Callback) -> Result<()> {
        let index = frame.next_callback_slot()?;
        frame.register_callback(index, arg)?;
        Ok(())
    }
}

pub mod bytes {
    use super::*;

    pub const SHAPE: &str = "bytes";

    pub fn encode(frame: &mut CallFrame<'_>, slot: usize, arg: SliceArg<'_>) -> Result<()> {
        let (address, len) = match arg {
            SliceArg::Slice(slice) if slice.elem_size() != 1 => {
                return Err(Fault::argument("slice of bytes", "slice"));
            }
            SliceArg::Slice(slice) if frame.owns(&slice) => (slice.address(), slice.len()),
            SliceArg::Slice(slice) => {
                let data = slice.to_bytes()?;
                let offset = frame.alloc(data.len(), 1)?;
                frame.write(offset, &data)?;
                (frame.address(offset), slice.len())
            }
            SliceArg::Text(text) => {
                let offset = frame.alloc(text.len(), 1)?;
                frame.write(offset, text.as_bytes())?;
                (frame.address(offset), text.len() as u64)
            }
            SliceArg::Host(data) => {
                let offset = frame.alloc(data.len(), 1)?;
                frame.write(offset, data)?;
                (frame.address(offset), data.len() as u64)
            }
        };
        if len > u32::MAX as u64 {
            return Err(frame.range_fault(len as i128, 32, false));
        }
        frame.set_f64(slot, address as f64)?;
        frame.set_bits(slot + 1, INT_BIAS | len)?;
        Ok(())
    }

    pub fn decode(frame: &mut CallFrame<'_>, slot: usize) -> Result<Slice> {
        let address = frame.f64(slot)? as u64;
        let len = frame.low(slot + 1)? as u64;
        let ret: Slice = frame.slice(address, len, 1);
        Ok(ret)
    }
}

pub mod slice {
    use super::*;

    pub const SHAPE: &str = "slice";

    pub fn encode(frame: &mut CallFrame<'_>, slot: usize, arg: SliceArg<'_>, elem: usize, align: usize) -> Result<()> {
        let (address, len) = match arg {
            SliceArg::Slice(slice) if slice.elem_size() != elem => {
                return Err(Fault::argument(format!("slice of {}-byte elements", elem), "slice"));
            }
            SliceArg::Slice(slice) if frame.owns(&slice) => (slice.address(), slice.len()),
            SliceArg::Slice(slice) => {
                let data = slice.to_bytes()?;
                let offset = frame.alloc(data.len(), align)?;
                frame.write(offset, &data)?;
                (frame.address(offset), slice.len())
            }
            SliceArg::Host(data) if data.len() % elem == 0 => {
                let offset = frame.alloc(data.len(), align)?;
                frame.write(offset, data)?;
                (frame.address(offset), (data.len() / elem) as u64)
            }
            SliceArg::Host(_) => {
                return Err(Fault::argument(format!("whole {}-byte elements", elem), "bytes"));
            }
            SliceArg::Text(_) => {
                return Err(Fault::argument(format!("slice of {}-byte elements", elem), "str"));
            }
        };
        if len > u32::MAX as u64 {
            return Err(frame.range_fault(len as i128, 32, false));
        }
        frame.set_f64(slot, address as f64)?;
        frame.set_bits(slot + 1, INT_BIAS | len)?;
        Ok(())
    }

    pub fn decode(frame: &mut CallFrame<'_>, slot: usize, elem: usize) -> Result<Slice> {
        let address = frame.f64(slot)? as u64;
        let len = frame.low(slot + 1)? as u64;
        let ret: Slice = frame.slice(address, len, elem);
        Ok(ret)
    }
}

pub mod aggregate {
    use super::*;

    pub const SHAPE: &str = "struct";

    pub fn encode(frame: &mut CallFrame<'_>, slot: usize, arg: &[u8], len: usize) -> Result<()> {
        if arg.len() != len {
            return Err(Fault::argument(format!("{}-byte struct", len), "bytes of another size"));
        }
        let offset = frame.alloc(len, 1)?;
        frame.write(offset, arg)?;
        frame.set_f64(slot, frame.address(offset) as f64)?;
        Ok(())
    }

    pub fn decode(frame: &mut CallFrame<'_>, _slot: usize, len: usize) -> Result<Vec<u8>> {
        let ret: Vec<u8> = frame.read(frame.extent(), len)?;
        Ok(ret)
    }
}

pub mod optional {
    use super::*;

    pub const SHAPE: &str = "optional";

    pub fn encode(frame: &mut CallFrame<'_>, slot: usize, arg: Option<Value>, child: &WireType) -> Result<()> {
        match arg {
            None => frame.set_bits(slot, NULL_BITS)?,
            Some(arg) => {
                child.encode(frame, slot, arg)?;
            }
        }
        Ok(())
    }

    pub fn decode(frame: &mut CallFrame<'_>, slot: usize, child: &WireType) -> Result<Option<Value>> {
        let ret: Option<Value> = if frame.high(slot)? == NULL_HIGH { None } else { Some(child.decode(frame, slot)?) };
        Ok(ret)
    }
}

pub mod optional_float {
    use super::*;

    pub const SHAPE: &str = "optional_float";

    pub fn encode(frame: &mut CallFrame<'_>, slot: usize, arg: Option<Value>, child: &WireType) -> Result<()> {
        match arg {
            None => frame.set_bits(slot, NULL_BITS)?,
            Some(arg) => {
                child.encode(frame, slot, arg)?;
                if frame.high(slot)? == NULL_HIGH {
                    frame.set_bits(slot, CANONICAL_NAN)?;
                }
            }
        }
        Ok(())
    }

    pub fn decode(frame: &mut CallFrame<'_>, slot: usize, child: &WireType) -> Result<Option<Value>> {
        let ret: Option<Value> = if frame.high(slot)? == NULL_HIGH { None } else { Some(child.decode(frame, slot)?) };
        Ok(ret)
    }
}

pub mod optional_tagged {
    use super::*;

    pub const SHAPE: &str = "optional_tagged";

    pub fn encode(frame: &mut CallFrame<'_>, slot: usize, arg: Option<Value>, child: &WireType, tag: usize) -> Result<()> {
        match arg {
            None => frame.set_bits(slot + tag, NULL_BITS)?,
            Some(arg) => {
                child.encode(frame, slot, arg)?;
                frame.set_bits(slot + tag, PRESENT)?;
            }
        }
        Ok(())
    }

    pub fn decode(frame: &mut CallFrame<'_>, slot: usize, child: &WireType, tag: usize) -> Result<Option<Value>> {
        let ret: Option<Value> = if frame.high(slot + tag)? == NULL_HIGH { None } else { Some(child.decode(frame, slot)?) };
        Ok(ret)
    }
}
