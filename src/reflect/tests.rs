use super::*;
use crate::bridge::{CallbackTable, DescriptorLayout, NativeModule, TypeDesc};
use crate::errors::Fault;
use std::sync::Arc;

#[test]
fn test_header_read() {
    let mut builder = NativeModule::builder("header");
    let u8_id = builder.ty(TypeDesc::int(8, false));
    builder.export("a", u8_id, &[u8_id], 0, NativeModule::echo(1));
    let module = builder.build();

    let header = ModuleHeader::read(&*module).unwrap();
    assert_eq!(header.pointer_width, 8);
    assert_eq!(header.calls.len(), 1);
    assert_ne!(header.reflect_all, header.reflect_one);
}

#[test]
fn test_header_rejects_pointer_width() {
    let module = NativeModule::builder("odd").pointer_width(3).build();
    assert!(matches!(
        ModuleHeader::read(&*module),
        Err(Fault::ReflectionMismatch(_))
    ));
}

#[test]
fn test_discover_method_table() {
    let mut builder = NativeModule::builder("table");
    let f64_id = builder.ty(TypeDesc::float(64));
    let fn_id = builder.ty(TypeDesc::function());
    let cb_id = builder.ty(TypeDesc::pointer(fn_id));
    builder.export("apply", f64_id, &[cb_id, f64_id], 1, NativeModule::echo(0));
    builder.export("twice", f64_id, &[cb_id, cb_id], 2, NativeModule::echo(0));
    builder.export("plain", f64_id, &[f64_id], 0, NativeModule::echo(1));
    let module = builder.build();

    let header = ModuleHeader::read(&*module).unwrap();
    let discovery = discover(&*module, &header, &CallbackTable::default()).unwrap();

    assert_eq!(discovery.handshake, Handshake { size: 16, child: 0, len: 8, kind: 10, flags: 11 });
    assert_eq!(discovery.methods.len(), 3);
    assert_eq!(discovery.callback_slots(), 3);

    let apply = &discovery.methods[0];
    assert_eq!(apply.name, "apply");
    assert_eq!(apply.ret(), f64_id);
    assert_eq!(apply.params(), &[cb_id, f64_id]);
    assert_eq!(apply.callback_base, 0);

    assert_eq!(discovery.methods[1].callback_base, 1);
    assert_eq!(discovery.methods[2].callback_base, 3);
    assert_eq!(discovery.methods[2].ordinal, 2);
}

#[test]
fn test_handshake_offsets_are_discovered() {
    let layout = DescriptorLayout {
        size: 24,
        child: 8,
        len: 20,
        kind: 2,
        flags: 3,
    };
    let mut builder = NativeModule::builder("shuffled").layout(layout);
    let u16_id = builder.ty(TypeDesc::int(16, true));
    let opt_id = builder.ty(TypeDesc::optional(u16_id));
    builder.export("f", opt_id, &[], 0, NativeModule::echo(0));
    let module = builder.build();

    let header = ModuleHeader::read(&*module).unwrap();
    let callbacks = CallbackTable::default();
    let discovery = discover(&*module, &header, &callbacks).unwrap();
    assert_eq!(discovery.handshake.size, 24);

    let table = TypeTable::new();
    let reflector = TypeReflector::new(&*module, &header, discovery.handshake, &callbacks, &table);
    let opt = reflector.get(opt_id).unwrap();
    assert_eq!(opt.kind, TypeKind::Optional);
    let child = opt.child.as_ref().unwrap();
    assert_eq!(child.kind, TypeKind::Int);
    assert_eq!(child.len, 16);
    assert!(child.is_signed());
    assert_eq!(opt.to_string(), "?i16");
}

#[test]
fn test_handshake_overrun_rejected() {
    let layout = DescriptorLayout {
        size: 8,
        child: 0,
        len: 8,
        kind: 10,
        flags: 11,
    };
    let module = NativeModule::builder("overrun").layout(layout).build();
    let header = ModuleHeader::read(&*module).unwrap();
    assert!(matches!(
        discover(&*module, &header, &CallbackTable::default()),
        Err(Fault::ReflectionMismatch(_))
    ));
}

#[test]
fn test_narrow_pointer_width() {
    let mut builder = NativeModule::builder("narrow").pointer_width(4);
    let u8_id = builder.ty(TypeDesc::int(8, false));
    let slice_id = builder.ty(TypeDesc::slice(u8_id));
    let module = builder.build();

    let header = ModuleHeader::read(&*module).unwrap();
    let callbacks = CallbackTable::default();
    let discovery = discover(&*module, &header, &callbacks).unwrap();
    assert_eq!(discovery.handshake.size, 8);

    let table = TypeTable::new();
    let reflector = TypeReflector::new(&*module, &header, discovery.handshake, &callbacks, &table);
    assert_eq!(reflector.get(slice_id).unwrap().to_string(), "[]u8");
}

#[test]
fn test_reflection_is_cached_and_identical() {
    let mut builder = NativeModule::builder("cache");
    let u8_id = builder.ty(TypeDesc::int(8, false));
    let point_id = builder.ty(TypeDesc::structure("Point", 8));
    let module = builder.build();

    let header = ModuleHeader::read(&*module).unwrap();
    let callbacks = CallbackTable::default();
    let discovery = discover(&*module, &header, &callbacks).unwrap();
    let table = TypeTable::new();
    let reflector = TypeReflector::new(&*module, &header, discovery.handshake, &callbacks, &table);

    let first = reflector.get(u8_id).unwrap();
    let second = reflector.get(u8_id).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let point = reflector.get(point_id).unwrap();
    assert_eq!(point.name.as_deref(), Some("Point"));
    assert_eq!(point.len, 8);
    assert!(point.child.is_none());
    assert_eq!(table.len(), 2);
}

#[test]
fn test_self_referencing_child_rejected() {
    let mut builder = NativeModule::builder("cycle");
    // Type 1 is an optional of itself
    let id = builder.ty(TypeDesc::optional(1));
    let module = builder.build();

    let header = ModuleHeader::read(&*module).unwrap();
    let callbacks = CallbackTable::default();
    let discovery = discover(&*module, &header, &callbacks).unwrap();
    let table = TypeTable::new();
    let reflector = TypeReflector::new(&*module, &header, discovery.handshake, &callbacks, &table);

    let err = reflector.get(id).unwrap_err();
    assert!(matches!(err, Fault::ReflectionMismatch(ref msg) if msg.contains("contains itself")));
    assert!(table.is_empty());
}

#[test]
fn test_non_utf8_struct_name_rejected() {
    let mut builder = NativeModule::builder("names");
    let mut desc = TypeDesc::structure("é", 4);
    desc.flags = 1;
    let id = builder.ty(desc);
    let module = builder.build();

    let header = ModuleHeader::read(&*module).unwrap();
    let callbacks = CallbackTable::default();
    let discovery = discover(&*module, &header, &callbacks).unwrap();
    let table = TypeTable::new();
    let reflector = TypeReflector::new(&*module, &header, discovery.handshake, &callbacks, &table);
    assert!(matches!(reflector.get(id), Err(Fault::ReflectionMismatch(_))));
}

#[test]
fn test_kind_tags() {
    for tag in 0..=12u8 {
        assert_eq!(TypeKind::from_tag(tag).unwrap().tag(), tag);
    }
    assert!(TypeKind::from_tag(13).is_none());
}
