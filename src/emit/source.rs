//! Rust source and JSON manifest rendering of method plans
//!
//! Generated methods are the listing's bodies spliced in place: each
//! parameter becomes a block binding `slot`, `arg` and the rule's static
//! substitutions, followed by the rule's encode body verbatim. Optional
//! rules splice their child's body where the listing calls into the child.

use super::MethodPlan;
use crate::config::CodegenConfig;
use crate::errors::{Fault, Result};
use crate::snippet::TemplateBook;
use crate::wire::WireType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const CHILD_ENCODE: &str = "child.encode(frame, slot, arg)?;";
const CHILD_DECODE: &str = "child.decode(frame, slot)?";
const GENERIC_OPTION: &str = "Option<Value>";

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum", "extern", "false",
    "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref", "return",
    "static", "struct", "super", "trait", "true", "type", "unsafe", "use", "where", "while", "yield",
];

/// Indenting line writer
struct Writer {
    out: String,
    depth: usize,
}

impl Writer {
    fn new() -> Self {
        Self {
            out: String::new(),
            depth: 0,
        }
    }

    fn line(&mut self, text: &str) {
        if text.is_empty() {
            self.out.push('\n');
            return;
        }
        for _ in 0..self.depth {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    /// Multi-line text, each line at the current depth
    fn block(&mut self, text: &str) {
        for line in text.lines() {
            self.line(line);
        }
    }

    fn open(&mut self, text: &str) {
        self.line(text);
        self.depth += 1;
    }

    fn close(&mut self, text: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.line(text);
    }
}

/// `let` bindings for a rule's static substitutions
fn bindings(wire: &WireType) -> Vec<String> {
    wire.substitutions()
        .into_iter()
        .map(|(name, value)| format!("let {} = {};", name, value))
        .collect()
}

/// Encode body of `wire` with optional children spliced in
pub(crate) fn expand_encode(book: &TemplateBook, wire: &WireType) -> Result<String> {
    let body = book.for_wire(wire)?.encode.splice();
    let child = match wire.child() {
        Some(child) => child,
        None => return Ok(body),
    };

    let inner = expand_encode(book, child)?;
    let mut lines = Vec::new();
    for line in body.lines() {
        if line.trim() != CHILD_ENCODE {
            lines.push(line.to_string());
            continue;
        }
        let indent = &line[..line.len() - line.trim_start().len()];
        lines.push(format!("{}{{", indent));
        for binding in bindings(child) {
            lines.push(format!("{}    {}", indent, binding));
        }
        for inner_line in inner.lines() {
            lines.push(format!("{}    {}", indent, inner_line));
        }
        lines.push(format!("{}}}", indent));
    }
    Ok(lines.join("\n"))
}

/// Decode body of `wire` with optional children spliced in
pub(crate) fn expand_decode(book: &TemplateBook, wire: &WireType) -> Result<String> {
    let mut body = book.for_wire(wire)?.decode.splice();
    if body.is_empty() {
        return Err(Fault::Template(format!("{} has no decode template", wire.shape())));
    }
    if let Some(child) = wire.child() {
        let result = wire
            .result_type()
            .ok_or_else(|| Fault::unsupported("fn", format!("{} cannot be returned", wire.ty())))?;
        let inner = expand_decode(book, child)?;
        let mut parts = bindings(child);
        parts.extend(inner.lines().map(|line| line.trim().to_string()));
        parts.push("ret".to_string());
        let splice = format!("{{ {} }}", parts.join(" "));
        body = body.replace(CHILD_DECODE, &splice).replace(GENERIC_OPTION, &result);
    }
    Ok(body)
}

/// Rust identifier for an export name
fn ident(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' { ch } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|ch: char| ch.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if KEYWORDS.contains(&out.as_str()) {
        out.insert_str(0, "r#");
    }
    out
}

/// Shapes and fingerprints of every template a set of plans uses
fn templates(plans: &[MethodPlan], book: &TemplateBook) -> Result<BTreeMap<String, String>> {
    fn visit(wire: &WireType, book: &TemplateBook, out: &mut BTreeMap<String, String>) -> Result<()> {
        let snippet = book.for_wire(wire)?;
        out.insert(snippet.shape.clone(), snippet.fingerprint.to_string());
        if let Some(child) = wire.child() {
            visit(child, book, out)?;
        }
        Ok(())
    }

    let mut out = BTreeMap::new();
    for plan in plans {
        visit(&plan.ret, book, &mut out)?;
        for param in &plan.params {
            visit(&param.wire, book, &mut out)?;
        }
    }
    Ok(out)
}

fn render_method(w: &mut Writer, plan: &MethodPlan, book: &TemplateBook) -> Result<()> {
    let result = plan
        .ret
        .result_type()
        .ok_or_else(|| Fault::unsupported("fn", format!("{} returns a function pointer", plan.name)))?;
    let mut signature = String::from("&self");
    for (index, param) in plan.params.iter().enumerate() {
        signature.push_str(&format!(", a{}: {}", index, param.wire.param_type()));
    }

    w.line(&format!("/// `{}`", plan.signature()));
    w.open(&format!(
        "pub fn {}({}) -> Result<{}, Fault> {{",
        ident(&plan.name),
        signature,
        result
    ));
    w.line("let module = self.library.module()?;");
    w.line(&format!(
        "let mut frame = module.open_frame({}, {}, {}, {})?;",
        plan.ordinal, plan.wire_slots, plan.callback_base, plan.callback_count
    ));

    for (index, param) in plan.params.iter().enumerate() {
        if let Some(align) = param.pad {
            w.line(&format!("frame.pad_to({})?;", align));
        }
        w.open("{");
        w.line(&format!("let slot = {}usize;", param.slot));
        w.line(&format!("let arg = a{};", index));
        for binding in bindings(&param.wire) {
            w.line(&binding);
        }
        w.block(&expand_encode(book, &param.wire)?);
        w.close("}");
    }

    w.line("frame.invoke()?;");
    w.open(&format!("let ret: {} = {{", result));
    w.line("let slot = 0usize;");
    for binding in bindings(&plan.ret) {
        w.line(&binding);
    }
    w.block(&expand_decode(book, &plan.ret)?);
    w.line("ret");
    w.close("};");
    w.line("Ok(ret)");
    w.close("}");
    Ok(())
}

/// Render a bindings module for `plans`
pub fn emit_bindings(
    label: &str,
    plans: &[MethodPlan],
    book: &TemplateBook,
    config: &CodegenConfig,
) -> Result<String> {
    let mut w = Writer::new();
    w.line(&format!("// Generated by wirebind from `{}`. Do not edit.", label));
    if config.stamp_fingerprints {
        w.line("//");
        w.line("// Templates:");
        for (shape, fingerprint) in templates(plans, book)? {
            w.line(&format!("//   {:<16} {}", shape, fingerprint));
        }
    }
    w.line("");
    w.line(&format!("use {}::prelude::*;", config.crate_name));
    w.line("");
    w.line(&format!("/// Bindings for `{}`", label));
    w.open(&format!("pub struct {} {{", config.struct_name));
    w.line("library: Library,");
    w.close("}");
    w.line("");
    w.line("#[allow(unused_variables, unused_mut, unused_braces, clippy::all)]");
    w.open(&format!("impl {} {{", config.struct_name));
    w.line(&format!(
        "pub const DEFAULT_SOURCE: &'static str = {:?};",
        config.default_source
    ));
    w.line("");
    w.line("/// Connects lazily on first call, from `DEFAULT_SOURCE` unless `init` picks another");
    w.open("pub fn new(connector: Connector) -> Self {");
    w.line("let source = Source::Path(Self::DEFAULT_SOURCE.into());");
    w.line("Self { library: Library::new(connector, source) }");
    w.close("}");
    w.line("");
    w.line("/// Connect to `source` now, replacing any previous connection");
    w.open("pub fn init(&mut self, source: Source) -> Result<(), Fault> {");
    w.line("self.library.init(source)");
    w.close("}");

    for plan in plans {
        w.line("");
        render_method(&mut w, plan, book)?;
    }
    w.close("}");
    Ok(w.out)
}

/// Machine-readable description of a module's methods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub module: String,
    pub methods: Vec<MethodEntry>,
    /// Shape to template fingerprint
    pub templates: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodEntry {
    pub name: String,
    pub ordinal: usize,
    pub params: Vec<ParamEntry>,
    /// Reflected return type
    pub returns: String,
    /// Return type of the generated method
    pub result: String,
    pub wire_slots: usize,
    pub callback_base: usize,
    pub callback_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamEntry {
    /// Reflected type
    pub ty: String,
    /// Parameter type of the generated method
    pub rust: String,
    pub shape: String,
    pub slot: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pad: Option<usize>,
}

impl Manifest {
    pub fn build(label: &str, plans: &[MethodPlan], book: &TemplateBook) -> Result<Self> {
        let methods = plans
            .iter()
            .map(|plan| MethodEntry {
                name: plan.name.clone(),
                ordinal: plan.ordinal,
                params: plan
                    .params
                    .iter()
                    .map(|param| ParamEntry {
                        ty: param.wire.ty().to_string(),
                        rust: param.wire.param_type(),
                        shape: param.wire.shape().to_string(),
                        slot: param.slot,
                        pad: param.pad,
                    })
                    .collect(),
                returns: plan.ret.ty().to_string(),
                result: plan.ret.result_type().unwrap_or_default(),
                wire_slots: plan.wire_slots,
                callback_base: plan.callback_base,
                callback_count: plan.callback_count,
            })
            .collect();
        Ok(Self {
            module: label.to_string(),
            methods,
            templates: templates(plans, book)?,
        })
    }
}

/// Render the manifest as pretty JSON
pub fn emit_manifest(label: &str, plans: &[MethodPlan], book: &TemplateBook) -> Result<String> {
    let manifest = Manifest::build(label, plans, book)?;
    serde_json::to_string_pretty(&manifest).map_err(|e| Fault::Template(format!("Failed to serialize manifest: {}", e)))
}
