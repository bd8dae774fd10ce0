//! Generated bindings and manifests for the fixture module

mod common;

use std::fs;
use tempfile::TempDir;
use wirebind::config::BindConfig;
use wirebind::emit::Manifest;
use wirebind::snippet::{Fingerprint, TemplateBook};

#[test]
fn test_shared_book_matches_listing_file() {
    let listing = fs::read_to_string(concat!(env!("CARGO_MANIFEST_DIR"), "/src/wire/listing.rs")).unwrap();
    let parsed = TemplateBook::from_source(&listing).unwrap();
    let shared = TemplateBook::shared().unwrap();

    assert_eq!(parsed.len(), shared.len());
    for snippet in parsed.iter() {
        assert_eq!(shared.fingerprint(&snippet.shape), Some(snippet.fingerprint));
        assert_eq!(snippet.fingerprint, Fingerprint::of(&snippet.encode.body, &snippet.decode.body));
    }
}

#[test]
fn test_every_method_rendered() {
    let module = common::load("codegen");
    let source = module.emit_bindings(&Default::default()).unwrap();

    for plan in module.methods() {
        assert!(source.contains(&format!("pub fn {}(", plan.name)), "{} missing", plan.name);
        assert!(source.contains(&format!("/// `{}`", plan.signature())));
    }
    assert_eq!(source.matches("frame.invoke()?;").count(), module.methods().len());
    assert!(source.contains("pub fn apply(&self, a0: Callback, a1: f64) -> Result<f64, Fault> {"));
    assert!(source.contains("let index = frame.next_callback_slot()?;"));
    assert!(source.contains("pub fn point_scale(&self, a0: &[u8], a1: i64) -> Result<Vec<u8>, Fault> {"));
    assert!(source.contains("let ret: Vec<u8> = frame.read(frame.extent(), len)?;"));
    assert!(source.contains("pub fn nothing(&self) -> Result<(), Fault> {"));
}

#[test]
fn test_codegen_config_from_toml() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(".wirebind.toml");
    fs::write(
        &path,
        "[codegen]\nstruct_name = \"Identity\"\ndefault_source = \"identity.wasm\"\nstamp_fingerprints = false\n",
    )
    .unwrap();
    let config = BindConfig::discover_from(dir.path()).unwrap();

    let module = common::load("codegen");
    let source = module.emit_bindings(&config.codegen).unwrap();
    assert!(source.contains("pub struct Identity {"));
    assert!(source.contains("\"identity.wasm\""));
    assert!(!source.contains("Templates:"));

    let out = dir.path().join("identity.rs");
    fs::write(&out, &source).unwrap();
    assert_eq!(fs::read_to_string(&out).unwrap(), source);
}

#[test]
fn test_manifest_describes_fixture() {
    let module = common::load("codegen");
    let manifest: Manifest = serde_json::from_str(&module.manifest().unwrap()).unwrap();
    assert_eq!(manifest.methods.len(), module.methods().len());

    let twice = manifest.methods.iter().find(|method| method.name == "apply_twice").unwrap();
    assert_eq!(twice.callback_base, 1);
    assert_eq!(twice.callback_count, 2);
    assert_eq!(twice.params[0].shape, "callback");
    assert_eq!(twice.params[2].slot, 1);

    let shared = TemplateBook::shared().unwrap();
    for (shape, fingerprint) in &manifest.templates {
        assert_eq!(&shared.fingerprint(shape).unwrap().to_string(), fingerprint);
    }
    assert_eq!(module.verify_templates().unwrap(), Vec::<String>::new());
}
