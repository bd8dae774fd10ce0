use super::*;
use crate::bridge::{Bridge, CallbackTable, NativeModule, SharedBridge};
use crate::frame::{CallFrame, FrameContext, TransientArena};
use crate::reflect::{TypeKind, FLAG_SIGNED};

struct Harness {
    bridge: SharedBridge,
    arena: TransientArena,
    callbacks: CallbackTable,
    calls: Vec<u64>,
    registry: WireTypeRegistry,
}

impl Harness {
    fn new() -> Self {
        let module = NativeModule::builder("wire").capacity(4096).build();
        let arena = TransientArena::new(module.scratch_offset(), module.memory_len());
        let bridge: SharedBridge = module;
        Self {
            bridge,
            arena,
            callbacks: CallbackTable::with_slots(2),
            calls: Vec::new(),
            registry: WireTypeRegistry::new(),
        }
    }

    fn frame(&self, slots: usize) -> CallFrame<'_> {
        let ctx = FrameContext {
            bridge: &self.bridge,
            arena: &self.arena,
            callbacks: &self.callbacks,
            calls: &self.calls,
            zero_slots: true,
        };
        CallFrame::open(ctx, 0, slots, 0, 2).unwrap()
    }

    fn wire(&self, ty: Arc<Type>) -> Arc<WireType> {
        self.registry.resolve(&ty).unwrap()
    }

    fn round_trip(&self, ty: Arc<Type>, value: Value) -> Value {
        let wire = self.wire(ty);
        let mut frame = self.frame(wire.wire_count().max(1));
        wire.encode(&mut frame, 0, value).unwrap();
        wire.decode(&mut frame, 0).unwrap()
    }
}

fn ty(id: u32, kind: TypeKind, len: u16, flags: u8, child: Option<Arc<Type>>) -> Arc<Type> {
    Arc::new(Type {
        id,
        kind,
        child,
        len,
        flags,
        name: None,
    })
}

fn uint(bits: u16) -> Arc<Type> {
    ty(100 + bits as u32, TypeKind::Int, bits, 0, None)
}

fn int(bits: u16) -> Arc<Type> {
    ty(200 + bits as u32, TypeKind::Int, bits, FLAG_SIGNED, None)
}

fn float(bits: u16) -> Arc<Type> {
    ty(300 + bits as u32, TypeKind::Float, bits, 0, None)
}

fn boolean() -> Arc<Type> {
    ty(2, TypeKind::Bool, 1, 0, None)
}

fn optional(id: u32, child: Arc<Type>) -> Arc<Type> {
    ty(id, TypeKind::Optional, 0, 0, Some(child))
}

#[test]
fn test_small_uint_boxing() {
    let h = Harness::new();
    let wire = h.wire(uint(8));
    let mut frame = h.frame(1);
    wire.encode(&mut frame, 0, Value::Int(255)).unwrap();
    assert_eq!(frame.bits(0).unwrap(), INT_BIAS | 255);
    assert_eq!(frame.f64(0).unwrap(), 4503599627370496.0 + 255.0);
    assert_eq!(wire.decode(&mut frame, 0).unwrap(), Value::Int(255));
}

#[test]
fn test_small_uint_range() {
    let h = Harness::new();
    let wire = h.wire(uint(8));
    let mut frame = h.frame(1);
    let err = wire.encode(&mut frame, 0, Value::Int(256)).unwrap_err();
    assert_eq!(err, Fault::range(256, 8, false));
    assert_eq!(err.to_string(), "Value 256 out of range for u8");
    assert!(matches!(
        wire.encode(&mut frame, 0, Value::Int(-1)),
        Err(Fault::Range { .. })
    ));
}

#[test]
fn test_small_int_sign_extension() {
    let h = Harness::new();
    assert_eq!(h.round_trip(int(8), Value::Int(-128)), Value::Int(-128));
    assert_eq!(h.round_trip(int(8), Value::Int(127)), Value::Int(127));
    assert_eq!(h.round_trip(int(32), Value::Int(-1)), Value::Int(-1));
    assert_eq!(h.round_trip(int(1), Value::Int(-1)), Value::Int(-1));

    let wire = h.wire(int(8));
    let mut frame = h.frame(1);
    assert_eq!(
        wire.encode(&mut frame, 0, Value::Int(-129)),
        Err(Fault::range(-129, 8, true))
    );
}

#[test]
fn test_signed_low_half_pattern() {
    let h = Harness::new();
    let wire = h.wire(int(32));
    let mut frame = h.frame(1);
    wire.encode(&mut frame, 0, Value::Int(-1)).unwrap();
    assert_eq!(frame.bits(0).unwrap(), INT_BIAS | 0xFFFF_FFFF);
}

#[test]
fn test_wide_ints() {
    let h = Harness::new();
    assert_eq!(
        h.round_trip(uint(64), Value::Int(u64::MAX as i128)),
        Value::Int(u64::MAX as i128)
    );
    assert_eq!(
        h.round_trip(int(64), Value::Int(i64::MIN as i128)),
        Value::Int(i64::MIN as i128)
    );
    assert_eq!(h.round_trip(int(48), Value::Int(-5)), Value::Int(-5));

    let wire = h.wire(uint(64));
    let mut frame = h.frame(1);
    assert!(matches!(
        wire.encode(&mut frame, 0, Value::Int(-1)),
        Err(Fault::Range { .. })
    ));
    assert!(matches!(
        wire.encode(&mut frame, 0, Value::Int(1 << 64)),
        Err(Fault::Range { .. })
    ));
}

#[test]
fn test_integral_float_accepted_as_int() {
    let h = Harness::new();
    assert_eq!(h.round_trip(uint(16), Value::Float(42.0)), Value::Int(42));

    let wire = h.wire(uint(16));
    let mut frame = h.frame(1);
    assert!(matches!(
        wire.encode(&mut frame, 0, Value::Float(1.5)),
        Err(Fault::ArgumentType { .. })
    ));
}

#[test]
fn test_float_bits_preserved() {
    let h = Harness::new();
    let payload = f64::from_bits(0x7FF8_0000_0000_1234);
    match h.round_trip(float(64), Value::Float(payload)) {
        Value::Float(x) => assert_eq!(x.to_bits(), payload.to_bits()),
        other => panic!("unexpected {:?}", other),
    }
    match h.round_trip(float(64), Value::Float(-0.0)) {
        Value::Float(x) => assert!(x == 0.0 && x.is_sign_negative()),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_bool_decoding() {
    let h = Harness::new();
    let wire = h.wire(boolean());
    let mut frame = h.frame(1);

    wire.encode(&mut frame, 0, Value::Bool(true)).unwrap();
    assert_eq!(frame.f64(0).unwrap(), 1.0);
    assert_eq!(wire.decode(&mut frame, 0).unwrap(), Value::Bool(true));

    frame.set_f64(0, f64::NAN).unwrap();
    assert_eq!(wire.decode(&mut frame, 0).unwrap(), Value::Bool(false));
    frame.set_f64(0, -0.0).unwrap();
    assert_eq!(wire.decode(&mut frame, 0).unwrap(), Value::Bool(false));
}

#[test]
fn test_optional_null_sentinel() {
    let h = Harness::new();
    let ty = optional(400, boolean());
    assert_eq!(h.round_trip(ty.clone(), Value::Null), Value::Null);
    assert_eq!(h.round_trip(ty.clone(), Value::Bool(true)), Value::Bool(true));
    assert_eq!(h.round_trip(ty.clone(), Value::Bool(false)), Value::Bool(false));

    let wire = h.wire(ty);
    let mut frame = h.frame(1);
    wire.encode(&mut frame, 0, Value::Null).unwrap();
    assert_eq!(frame.bits(0).unwrap(), NULL_BITS);
    assert_eq!(frame.high(0).unwrap(), NULL_HIGH);
}

#[test]
fn test_optional_float_canonicalizes_colliding_nan() {
    let h = Harness::new();
    let wire = h.wire(optional(401, float(64)));
    assert_eq!(wire.shape(), "optional_float");

    let colliding = f64::from_bits(NULL_BITS | 7);
    let mut frame = h.frame(1);
    wire.encode(&mut frame, 0, Value::Float(colliding)).unwrap();
    assert_eq!(frame.bits(0).unwrap(), CANONICAL_NAN);
    match wire.decode(&mut frame, 0).unwrap() {
        Value::Float(x) => assert!(x.is_nan()),
        other => panic!("expected NaN, got {:?}", other),
    }

    assert_eq!(h.round_trip(optional(401, float(64)), Value::Float(2.5)), Value::Float(2.5));
}

#[test]
fn test_optional_tagged_for_wide_ints() {
    let h = Harness::new();
    let ty = optional(402, uint(64));
    let wire = h.wire(ty.clone());
    assert_eq!(wire.shape(), "optional_tagged");
    assert_eq!(wire.wire_count(), 2);

    // A payload equal to the sentinel is still a value
    let sentinel = NULL_BITS as i128;
    assert_eq!(h.round_trip(ty.clone(), Value::Int(sentinel)), Value::Int(sentinel));
    assert_eq!(h.round_trip(ty, Value::Null), Value::Null);
}

#[test]
fn test_nested_optional() {
    let h = Harness::new();
    let inner = optional(403, boolean());
    let outer = optional(404, inner);
    let wire = h.wire(outer.clone());
    assert_eq!(wire.wire_count(), 2);
    assert_eq!(h.round_trip(outer.clone(), Value::Null), Value::Null);
    assert_eq!(h.round_trip(outer.clone(), Value::Bool(true)), Value::Bool(true));

    // Present outer, absent inner
    let some_none = Value::Some(Box::new(Value::Null));
    assert_eq!(h.round_trip(outer.clone(), some_none.clone()), some_none);
    assert_eq!(
        h.round_trip(outer, Value::Some(Box::new(Value::Bool(false)))),
        Value::Bool(false)
    );

    let deepest = optional(407, optional(406, optional(405, boolean())));
    let some_some_none = Value::Some(Box::new(some_none.clone()));
    assert_eq!(h.round_trip(deepest.clone(), some_some_none.clone()), some_some_none);
    assert_eq!(h.round_trip(deepest, some_none.clone()), some_none);
}

#[test]
fn test_unsupported_shapes() {
    let h = Harness::new();
    let cases = [
        ty(500, TypeKind::Int, 0, 0, None),
        ty(501, TypeKind::Int, 65, 0, None),
        ty(502, TypeKind::Array, 4, 0, Some(uint(8))),
        ty(503, TypeKind::ErrorUnion, 0, 0, Some(uint(8))),
        ty(504, TypeKind::Opaque, 0, 0, None),
        ty(505, TypeKind::Pointer, 0, 0, Some(uint(8))),
        optional(506, ty(507, TypeKind::Void, 0, 0, None)),
        optional(508, ty(509, TypeKind::Pointer, 0, 0, Some(ty(510, TypeKind::Fn, 0, 0, None)))),
    ];
    for case in cases {
        assert!(
            matches!(h.registry.resolve(&case), Err(Fault::UnsupportedType { .. })),
            "{} should be unsupported",
            case
        );
    }
}

#[test]
fn test_callback_not_returnable() {
    let h = Harness::new();
    let callback = ty(600, TypeKind::Pointer, 0, 0, Some(ty(601, TypeKind::Fn, 0, 0, None)));
    let wire = h.wire(callback.clone());
    assert_eq!(wire.wire_count(), 0);
    assert!(h.registry.to_stack(&callback, 1).is_ok());
    assert!(matches!(
        h.registry.from_stack(&callback, 0),
        Err(Fault::UnsupportedType { .. })
    ));
}

#[test]
fn test_callback_registration() {
    let h = Harness::new();
    let callback = ty(602, TypeKind::Pointer, 0, 0, Some(ty(603, TypeKind::Fn, 0, 0, None)));
    let wire = h.wire(callback);
    let mut frame = h.frame(1);
    wire.encode(&mut frame, 1, Value::callback(|args| args[0] * 2.0)).unwrap();
    assert_eq!(frame.callback_slots(), &[0]);
    assert_eq!(h.callbacks.invoke(0, &[4.0]).unwrap(), 8.0);
}

#[test]
fn test_text_slice_copied() {
    let h = Harness::new();
    let bytes = ty(700, TypeKind::Slice, 0, 0, Some(uint(8)));
    let wire = h.wire(bytes);
    assert_eq!(wire.shape(), "bytes");
    assert_eq!(wire.align(), 1);

    let mut frame = h.frame(2);
    wire.encode(&mut frame, 0, Value::from("Hello!")).unwrap();
    assert!(frame.reserved());
    assert_eq!(frame.bits(1).unwrap(), INT_BIAS | 6);
    let slice = match wire.decode(&mut frame, 0).unwrap() {
        Value::Slice(slice) => slice,
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(slice.len(), 6);
    assert_eq!(slice.to_string_lossy().unwrap(), "Hello!");
}

#[test]
fn test_same_memory_slice_not_copied() {
    let h = Harness::new();
    let wire = h.wire(ty(701, TypeKind::Slice, 0, 0, Some(uint(8))));
    let resident = Slice::new(h.bridge.clone(), 0, 4, 1);

    let mut frame = h.frame(2);
    wire.encode(&mut frame, 0, Value::Slice(resident.clone())).unwrap();
    assert!(!frame.reserved());
    assert_eq!(wire.decode(&mut frame, 0).unwrap(), Value::Slice(resident));
}

#[test]
fn test_typed_slice_rejects_text() {
    let h = Harness::new();
    let wire = h.wire(ty(702, TypeKind::Slice, 0, 0, Some(uint(32))));
    assert_eq!(wire.align(), 4);
    let mut frame = h.frame(2);
    assert!(matches!(
        wire.encode(&mut frame, 0, Value::from("abcd")),
        Err(Fault::ArgumentType { found: "str", .. })
    ));
    wire.encode(&mut frame, 0, Value::Bytes(vec![1, 0, 0, 0, 2, 0, 0, 0])).unwrap();
    assert_eq!(frame.bits(1).unwrap(), INT_BIAS | 2);
}

#[test]
fn test_struct_size_checked() {
    let h = Harness::new();
    let point = ty(800, TypeKind::Struct, 8, 0, None);
    let wire = h.wire(point);
    let mut frame = h.frame(1);
    assert!(matches!(
        wire.encode(&mut frame, 0, Value::Struct(vec![0; 4])),
        Err(Fault::ArgumentType { .. })
    ));
    wire.encode(&mut frame, 0, Value::Struct(vec![7; 8])).unwrap();
    let address = frame.f64(0).unwrap() as u64;
    let offset = frame.offset_of(address, 8).unwrap();
    assert_eq!(frame.read(offset, 8).unwrap(), vec![7; 8]);
}

#[test]
fn test_registry_interns_by_id() {
    let h = Harness::new();
    let first = h.wire(uint(8));
    let second = h.wire(uint(8));
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(h.registry.len(), 1);
}

#[test]
fn test_display_signatures() {
    let h = Harness::new();
    assert_eq!(h.wire(uint(8)).param_type(), "i64");
    assert_eq!(h.wire(uint(8)).result_type().as_deref(), Some("u32"));
    assert_eq!(h.wire(int(64)).result_type().as_deref(), Some("i64"));
    assert_eq!(
        h.wire(optional(900, boolean())).param_type(),
        "Option<bool>"
    );
    assert_eq!(
        h.wire(ty(901, TypeKind::Slice, 0, 0, Some(uint(8)))).result_type().as_deref(),
        Some("Slice")
    );
}

#[test]
fn test_rule_key_uses_element_width_for_slices() {
    let key = RuleKey::of(&ty(902, TypeKind::Slice, 0, 0, Some(int(8))));
    assert_eq!(key.width, 8);
    assert_eq!(key.child, Some(TypeKind::Int));
    assert!(!key.signed);
}
