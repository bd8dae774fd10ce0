//! Numeric round-trip properties of the wire rules

mod common;

use proptest::prelude::*;
use wirebind::{Fault, Value};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn u8_in_domain_round_trips(value in 0u8..=u8::MAX) {
        let module = common::load("props");
        prop_assert_eq!(module.call("identity_u8", vec![Value::from(value)]).unwrap(), Value::Int(value as i128));
    }

    #[test]
    fn u8_out_of_domain_faults(value in prop_oneof![i64::MIN..0i64, 256i64..i64::MAX]) {
        let module = common::load("props");
        let result = module.call("identity_u8", vec![Value::from(value)]);
        prop_assert!(matches!(result, Err(Fault::Range { bits: 8, signed: false, .. })), "{:?}", result);
        prop_assert_eq!(module.stats().in_use, 0);
    }

    #[test]
    fn i16_round_trips(value in any::<i16>()) {
        let module = common::load("props");
        prop_assert_eq!(module.call("identity_i16", vec![Value::from(value)]).unwrap(), Value::Int(value as i128));
    }

    #[test]
    fn i16_out_of_domain_faults(value in prop_oneof![i32::MIN..-32768i32, 32768i32..i32::MAX]) {
        let module = common::load("props");
        let result = module.call("identity_i16", vec![Value::from(value)]);
        let is_range = matches!(result, Err(Fault::Range { bits: 16, signed: true, .. }));
        prop_assert!(is_range);
    }

    #[test]
    fn u32_round_trips(value in any::<u32>()) {
        let module = common::load("props");
        prop_assert_eq!(module.call("identity_u32", vec![Value::from(value)]).unwrap(), Value::Int(value as i128));
    }

    #[test]
    fn wide_ints_round_trip(unsigned in any::<u64>(), signed in any::<i64>()) {
        let module = common::load("props");
        prop_assert_eq!(module.call("identity_u64", vec![Value::from(unsigned)]).unwrap(), Value::Int(unsigned as i128));
        prop_assert_eq!(module.call("identity_i64", vec![Value::from(signed)]).unwrap(), Value::Int(signed as i128));
    }

    #[test]
    fn float_bits_preserved(bits in any::<u64>()) {
        // Quiet the NaN so the host never has to preserve a signalling payload
        let bits = if f64::from_bits(bits).is_nan() { bits | 0x0008_0000_0000_0000 } else { bits };
        let module = common::load("props");
        let back = module.call("identity_f64", vec![Value::Float(f64::from_bits(bits))]).unwrap();
        prop_assert_eq!(back.as_f64().unwrap().to_bits(), bits);
    }

    #[test]
    fn optional_float_never_reads_as_null(bits in any::<u64>()) {
        let module = common::load("props");
        let back = module.call("identity_null_f64", vec![Value::Float(f64::from_bits(bits))]).unwrap();
        prop_assert!(!back.is_null());
        let original = f64::from_bits(bits);
        let value = back.as_f64().unwrap();
        if original.is_nan() {
            prop_assert!(value.is_nan());
        } else {
            prop_assert_eq!(value.to_bits(), bits);
        }
    }

    #[test]
    fn optional_u64_distinguishes_null(value in proptest::option::of(any::<u64>())) {
        let module = common::load("props");
        let back = module.call("identity_null_u64", vec![Value::from(value)]).unwrap();
        match value {
            Some(value) => prop_assert_eq!(back, Value::Int(value as i128)),
            None => prop_assert!(back.is_null()),
        }
    }

    #[test]
    fn text_slices_round_trip(text in "\\PC{0,64}") {
        let module = common::load("props");
        let back = module.call("identity_slice_u8", vec![Value::from(text.as_str())]).unwrap();
        let slice = back.as_slice().unwrap();
        prop_assert_eq!(slice.len() as usize, text.len());
        prop_assert_eq!(slice.to_string_lossy().unwrap(), text.clone());
        prop_assert_eq!(module.stats().bytes_copied, text.len() as u64);
    }
}
