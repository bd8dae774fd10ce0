//! Snippet extraction from the reference listing
//!
//! Design: the listing is parsed by indentation alone. Every deeper line
//! opens a block, every shallower line closes blocks down to its width, and
//! blank lines do neither. A block opened right after an `fn encode(` or
//! `fn decode(` line captures its lines as a template body. A block holding
//! a `SHAPE` marker pairs the encode and decode bodies captured inside it
//! into one snippet, identified by the blake3 hash of its content.

use crate::errors::{Fault, Result};
use crate::wire::WireType;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::fmt;

/// Source of every wire rule, compiled as `crate::wire::listing`
pub const LISTING: &str = include_str!("../wire/listing.rs");

const SHAPE_MARKER: &str = "pub const SHAPE: &str = \"";
const ENCODE_OPENER: &str = "fn encode(";
const DECODE_OPENER: &str = "fn decode(";
const ARG_PARAM: &str = "arg: ";
const RESULT_BINDING: &str = "let ret: ";

static SHARED: OnceCell<TemplateBook> = OnceCell::new();

/// blake3 digest of a snippet's encode and decode bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(encode: &str, decode: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(encode.as_bytes());
        hasher.update(b"\n//\n");
        hasher.update(decode.as_bytes());
        hasher.update(b"\n");
        Self(*hasher.finalize().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First 8 bytes as hex
    pub fn short(&self) -> String {
        self.0[..8].iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// One captured body, indent-stripped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    /// Type of `arg` for encode, of `ret` for decode
    pub declared: Option<String>,
    pub body: String,
}

impl Template {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Body without comment lines and without the trailing `Ok(..)` line
    pub fn splice(&self) -> String {
        let mut lines: Vec<&str> = self
            .body
            .lines()
            .filter(|line| !line.trim_start().starts_with("//"))
            .collect();
        if matches!(lines.last().map(|line| line.trim()), Some("Ok(())") | Some("Ok(ret)")) {
            lines.pop();
        }
        lines.join("\n")
    }
}

/// Encode and decode bodies of one rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub shape: String,
    pub encode: Template,
    pub decode: Template,
    pub fingerprint: Fingerprint,
}

impl Snippet {
    pub fn new(shape: impl Into<String>, encode: Template, decode: Template) -> Self {
        let fingerprint = Fingerprint::of(&encode.body, &decode.body);
        Self {
            shape: shape.into(),
            encode,
            decode,
            fingerprint,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    Encode,
    Decode,
}

#[derive(Debug, Default)]
struct Block {
    indent: usize,
    capture: Option<Capture>,
    declared: Option<String>,
    lines: Vec<String>,
    shape: Option<String>,
    encode: Option<Template>,
    decode: Option<Template>,
}

/// Indentation-driven parser over the listing text
#[derive(Default)]
pub struct SnippetExtractor {
    stack: Vec<Block>,
    pending: Option<(Capture, Option<String>)>,
    snippets: Vec<Snippet>,
}

impl SnippetExtractor {
    /// Parse `source` into snippets, in listing order
    pub fn parse(source: &str) -> Result<Vec<Snippet>> {
        let mut parser = Self {
            stack: vec![Block::default()],
            ..Self::default()
        };
        for line in source.lines() {
            if line.trim().is_empty() {
                continue;
            }
            parser.line(line)?;
        }
        while let Some(block) = parser.stack.pop() {
            parser.close(block)?;
        }
        Ok(parser.snippets)
    }

    fn line(&mut self, line: &str) -> Result<()> {
        let indent = line.len() - line.trim_start_matches(' ').len();
        let text = line.trim();

        while self.stack.len() > 1 && self.top().indent > indent {
            let block = self.pop();
            self.close(block)?;
        }
        if indent > self.top().indent {
            let mut block = Block {
                indent,
                ..Block::default()
            };
            if let Some((capture, declared)) = self.pending.take() {
                block.capture = Some(capture);
                block.declared = declared;
            }
            self.stack.push(block);
        } else {
            self.pending = None;
        }

        if let Some(capture) = self.stack.iter_mut().rev().find(|block| block.capture.is_some()) {
            let relative = line.get(capture.indent..).unwrap_or(text);
            capture.lines.push(relative.trim_end().to_string());
            if capture.capture == Some(Capture::Decode) {
                if let Some(rest) = text.strip_prefix(RESULT_BINDING) {
                    if let Some((ty, _)) = rest.split_once(" = ") {
                        capture.declared = Some(ty.trim().to_string());
                    }
                }
            }
            return Ok(());
        }

        if let Some(rest) = text.strip_prefix(SHAPE_MARKER) {
            let label = rest
                .split('"')
                .next()
                .filter(|label| !label.is_empty())
                .ok_or_else(|| Fault::Template(format!("malformed shape marker: {}", text)))?;
            self.top_mut().shape = Some(label.to_string());
        } else if text.contains(ENCODE_OPENER) {
            self.pending = Some((Capture::Encode, arg_type(text)));
        } else if text.contains(DECODE_OPENER) {
            self.pending = Some((Capture::Decode, None));
        }
        Ok(())
    }

    fn close(&mut self, block: Block) -> Result<()> {
        if let Some(capture) = block.capture {
            let template = Template {
                declared: block.declared,
                body: block.lines.join("\n"),
            };
            let parent = self
                .stack
                .last_mut()
                .ok_or_else(|| Fault::Template("template body outside any scope".to_string()))?;
            match capture {
                Capture::Encode => parent.encode = Some(template),
                Capture::Decode => parent.decode = Some(template),
            }
            return Ok(());
        }

        if let Some(shape) = block.shape {
            let encode = block
                .encode
                .ok_or_else(|| Fault::Template(format!("shape {} has no encode body", shape)))?;
            let decode = block.decode.unwrap_or_default();
            self.snippets.push(Snippet::new(shape, encode, decode));
        }
        Ok(())
    }

    #[inline]
    fn top(&self) -> &Block {
        &self.stack[self.stack.len() - 1]
    }

    #[inline]
    fn top_mut(&mut self) -> &mut Block {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    #[inline]
    fn pop(&mut self) -> Block {
        self.stack.pop().unwrap_or_default()
    }
}

/// Text of the `arg` parameter's type in a one-line signature
fn arg_type(signature: &str) -> Option<String> {
    let start = signature.find(ARG_PARAM)? + ARG_PARAM.len();
    let mut depth = 0i32;
    for (offset, ch) in signature[start..].char_indices() {
        match ch {
            '<' | '(' | '[' => depth += 1,
            '>' | ']' => depth -= 1,
            ')' if depth == 0 => return Some(signature[start..start + offset].trim().to_string()),
            ')' => depth -= 1,
            ',' if depth == 0 => return Some(signature[start..start + offset].trim().to_string()),
            _ => {}
        }
    }
    None
}

/// Snippets indexed by fingerprint, with the shape-to-fingerprint table
pub struct TemplateBook {
    snippets: HashMap<Fingerprint, Snippet>,
    shapes: HashMap<String, Fingerprint>,
    order: Vec<Fingerprint>,
}

impl TemplateBook {
    pub fn from_source(source: &str) -> Result<Self> {
        Ok(Self::from_snippets(SnippetExtractor::parse(source)?))
    }

    pub fn from_snippets(snippets: Vec<Snippet>) -> Self {
        let mut book = Self {
            snippets: HashMap::with_capacity(snippets.len()),
            shapes: HashMap::with_capacity(snippets.len()),
            order: Vec::with_capacity(snippets.len()),
        };
        for snippet in snippets {
            let fingerprint = snippet.fingerprint;
            book.shapes.insert(snippet.shape.clone(), fingerprint);
            if book.snippets.insert(fingerprint, snippet).is_none() {
                book.order.push(fingerprint);
            }
        }
        book
    }

    /// Templates of the compiled listing, parsed once per process
    pub fn shared() -> Result<&'static TemplateBook> {
        SHARED.get_or_try_init(|| Self::from_source(LISTING))
    }

    #[inline]
    pub fn fingerprint(&self, shape: &str) -> Option<Fingerprint> {
        self.shapes.get(shape).copied()
    }

    #[inline]
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&Snippet> {
        self.snippets.get(fingerprint)
    }

    /// Snippet implementing a wire type's rule
    pub fn for_wire(&self, wire: &WireType) -> Result<&Snippet> {
        self.fingerprint(wire.shape())
            .and_then(|fingerprint| self.get(&fingerprint))
            .ok_or_else(|| Fault::Template(format!("no template for shape {}", wire.shape())))
    }

    /// Snippets in listing order
    pub fn iter(&self) -> impl Iterator<Item = &Snippet> {
        self.order.iter().filter_map(|fingerprint| self.snippets.get(fingerprint))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    /// Disagreements between the listing's declared types and the rule's
    /// display signature. Generic declarations over `Value` are skipped.
    pub fn verify(&self, wire: &WireType) -> Vec<String> {
        let snippet = match self.for_wire(wire) {
            Ok(snippet) => snippet,
            Err(err) => return vec![err.to_string()],
        };
        let mut problems = Vec::new();
        let mut check = |side: &str, declared: &Option<String>, expected: Option<String>| {
            if let (Some(declared), Some(expected)) = (declared, expected) {
                if !declared.contains("Value") && *declared != expected {
                    problems.push(format!(
                        "{} {}: listing declares {}, rule displays {}",
                        snippet.shape, side, declared, expected
                    ));
                }
            }
        };
        check("encode", &snippet.encode.declared, Some(wire.param_type()));
        check("decode", &snippet.decode.declared, wire.result_type());
        problems
    }
}
