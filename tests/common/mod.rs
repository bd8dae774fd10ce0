//! Shared in-process module for integration tests
#![allow(dead_code)]

use std::rc::Rc;
use wirebind::bridge::{BridgeError, NativeCall, NativeModule, TypeDesc};
use wirebind::config::BindConfig;
use wirebind::wire::INT_BIAS;
use wirebind::{Module, SharedBridge};

/// Transient bytes given to each fixture module
pub const TRANSIENT: usize = 16 * 1024;

/// Offset above the frame where `greeting` keeps its text
const STATIC_TEXT: u64 = 32 * 1024;

pub const POINT_SIZE: u16 = 8;

fn slice_parts(call: &NativeCall<'_>, slot: usize) -> Result<(u64, usize), BridgeError> {
    let address = call.slot_f64(slot)? as u64;
    let len = call.slot_bits(slot + 1)? as u32 as usize;
    Ok((address, len))
}

fn return_slice(call: &NativeCall<'_>, address: u64, len: usize) -> Result<(), BridgeError> {
    call.set_slot_f64(0, address as f64)?;
    call.set_slot_bits(1, INT_BIAS | len as u64)
}

/// Identity functions plus a few exports that touch memory and callbacks
pub fn identity_module(label: &str) -> Rc<NativeModule> {
    let mut b = NativeModule::builder(label);
    let void = b.ty(TypeDesc::void());
    let boolean = b.ty(TypeDesc::boolean());
    let u8_id = b.ty(TypeDesc::int(8, false));
    let i8_id = b.ty(TypeDesc::int(8, true));
    let i16_id = b.ty(TypeDesc::int(16, true));
    let u32_id = b.ty(TypeDesc::int(32, false));
    let i32_id = b.ty(TypeDesc::int(32, true));
    let u64_id = b.ty(TypeDesc::int(64, false));
    let i64_id = b.ty(TypeDesc::int(64, true));
    let f32_id = b.ty(TypeDesc::float(32));
    let f64_id = b.ty(TypeDesc::float(64));
    let bytes = b.ty(TypeDesc::slice(u8_id));
    let words = b.ty(TypeDesc::slice(u32_id));
    let point = b.ty(TypeDesc::structure("Point", POINT_SIZE));
    let null_bool = b.ty(TypeDesc::optional(boolean));
    let null_f64 = b.ty(TypeDesc::optional(f64_id));
    let null_u64 = b.ty(TypeDesc::optional(u64_id));
    let null_u8 = b.ty(TypeDesc::optional(u8_id));
    let func = b.ty(TypeDesc::function());
    let callback = b.ty(TypeDesc::pointer(func));

    b.export("identity_u8", u8_id, &[u8_id], 0, NativeModule::echo(1));
    b.export("identity_i8", i8_id, &[i8_id], 0, NativeModule::echo(1));
    b.export("identity_i16", i16_id, &[i16_id], 0, NativeModule::echo(1));
    b.export("identity_u32", u32_id, &[u32_id], 0, NativeModule::echo(1));
    b.export("identity_u64", u64_id, &[u64_id], 0, NativeModule::echo(1));
    b.export("identity_i64", i64_id, &[i64_id], 0, NativeModule::echo(1));
    b.export("identity_f32", f32_id, &[f32_id], 0, NativeModule::echo(1));
    b.export("identity_f64", f64_id, &[f64_id], 0, NativeModule::echo(1));
    b.export("identity_bool", boolean, &[boolean], 0, NativeModule::echo(1));
    b.export("identity_slice_u8", bytes, &[bytes], 0, NativeModule::echo(2));
    b.export("identity_null_bool", null_bool, &[null_bool], 0, NativeModule::echo(1));
    b.export("identity_null_f64", null_f64, &[null_f64], 0, NativeModule::echo(1));
    b.export("identity_null_u64", null_u64, &[null_u64], 0, NativeModule::echo(2));
    b.export("identity_null_u8", null_u8, &[null_u8], 0, NativeModule::echo(1));
    b.export("nothing", void, &[], 0, |_: &NativeCall<'_>| Ok(()));

    b.export("sum_u32", u64_id, &[words], 0, |call: &NativeCall<'_>| {
        let (address, len) = slice_parts(call, 1)?;
        let sum = call
            .read(address, len * 4)?
            .chunks_exact(4)
            .map(|chunk| u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as u64)
            .sum::<u64>();
        call.set_slot_bits(0, sum)
    });

    // Point { x: i32, y: i32 } scaled by an i32, returned at the extent
    b.export("point_scale", point, &[point, i32_id], 0, |call: &NativeCall<'_>| {
        let raw = call.read(call.slot_f64(1)? as u64, POINT_SIZE as usize)?;
        let factor = call.slot_bits(2)? as u32 as i32;
        let x = i32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]) * factor;
        let y = i32::from_ne_bytes([raw[4], raw[5], raw[6], raw[7]]) * factor;
        let mut out = x.to_ne_bytes().to_vec();
        out.extend_from_slice(&y.to_ne_bytes());
        call.write(call.extent()?, &out)
    });

    b.export("greeting", bytes, &[], 0, |call: &NativeCall<'_>| {
        let address = call.frame_offset() as u64 + STATIC_TEXT;
        call.write(address, b"Hello!")?;
        return_slice(call, address, 6)
    });

    b.export("grow_echo", bytes, &[bytes], 0, |call: &NativeCall<'_>| {
        call.grow(64 * 1024)?;
        let (address, len) = slice_parts(call, 1)?;
        return_slice(call, address, len)
    });

    b.export("apply", f64_id, &[callback, f64_id], 1, |call: &NativeCall<'_>| {
        let index = call.callback_slots()[0];
        let result = call.call_back(index, &[call.slot_f64(1)?])?;
        call.set_slot_f64(0, result)
    });

    b.export("apply_twice", f64_id, &[callback, callback, f64_id], 2, |call: &NativeCall<'_>| {
        let slots = call.callback_slots().to_vec();
        let first = call.call_back(slots[0], &[call.slot_f64(1)?])?;
        let second = call.call_back(slots[1], &[first])?;
        call.set_slot_f64(0, second)
    });

    b.build()
}

pub fn config() -> BindConfig {
    let mut config = BindConfig::default();
    config.transient.capacity = TRANSIENT;
    config
}

pub fn load(label: &str) -> Module {
    let bridge: SharedBridge = identity_module(label);
    Module::load_with_config(bridge, &config()).expect("fixture loads")
}
