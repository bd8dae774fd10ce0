//! Loaded modules and lazily connected libraries
//!
//! Design: a `Module` is one loader. It owns the type table, the wire
//! registry, the callback table and the transient arena for exactly one
//! bridge; nothing is shared between modules. Method plans are built once
//! at load time and reused for every call.

use crate::bridge::{CallbackTable, MemoryView, SharedBridge};
use crate::config::{BindConfig, CodegenConfig};
use crate::emit::{emit_bindings, emit_manifest, MethodPlan};
use crate::errors::{Fault, Result};
use crate::frame::{CallFrame, FrameContext, TransientArena, TransientStats};
use crate::logging::{log_module_loaded, log_unsupported};
use crate::reflect::{discover, Handshake, ModuleHeader, TypeReflector, TypeTable};
use crate::snippet::TemplateBook;
use crate::wire::{Value, WireTypeRegistry};
use once_cell::unsync::OnceCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::debug;

/// One loaded module and everything derived from its metadata
pub struct Module {
    bridge: SharedBridge,
    header: ModuleHeader,
    handshake: Handshake,
    types: TypeTable,
    registry: WireTypeRegistry,
    callbacks: CallbackTable,
    arena: TransientArena,
    plans: Vec<MethodPlan>,
    by_name: HashMap<String, usize>,
    skipped: Vec<(String, Fault)>,
    zero_slots: bool,
}

impl Module {
    /// Load with default configuration
    pub fn load(bridge: SharedBridge) -> Result<Self> {
        Self::load_with_config(bridge, &BindConfig::default())
    }

    pub fn load_with_config(bridge: SharedBridge, config: &BindConfig) -> Result<Self> {
        let header = ModuleHeader::read(&*bridge)?;

        // Discovery runs before the callback table can be sized
        let discovery = discover(&*bridge, &header, &CallbackTable::default())?;
        let callbacks = CallbackTable::with_slots(discovery.callback_slots());
        let types = TypeTable::new();
        let registry = WireTypeRegistry::new();

        let mut plans = Vec::with_capacity(discovery.methods.len());
        let mut skipped = Vec::new();
        {
            let reflector = TypeReflector::new(&*bridge, &header, discovery.handshake, &callbacks, &types);
            for spec in &discovery.methods {
                match MethodPlan::build(spec, &reflector, &registry) {
                    Ok(plan) => plans.push(plan),
                    Err(err @ Fault::UnsupportedType { .. }) if config.build.skip_unsupported => {
                        log_unsupported(&spec.name, &err.to_string());
                        skipped.push((spec.name.clone(), err));
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        let scratch = bridge.scratch_offset();
        let memory_len = MemoryView::acquire(&*bridge)?.len();
        let end = memory_len.min(scratch.saturating_add(config.transient.capacity));
        if end <= scratch {
            return Err(Fault::Config(format!(
                "no transient space: scratch at {}, memory ends at {}",
                scratch, memory_len
            )));
        }
        debug!(start = scratch, end = end, "transient region");

        let by_name = plans
            .iter()
            .enumerate()
            .map(|(index, plan)| (plan.name.clone(), index))
            .collect();
        log_module_loaded(bridge.label(), plans.len(), types.len());

        Ok(Self {
            handshake: discovery.handshake,
            arena: TransientArena::with_base(bridge.base_address(), scratch, end),
            bridge,
            header,
            types,
            registry,
            callbacks,
            plans,
            by_name,
            skipped,
            zero_slots: config.transient.zero_slots,
        })
    }

    #[inline]
    pub fn bridge(&self) -> &SharedBridge {
        &self.bridge
    }

    #[inline]
    pub fn pointer_width(&self) -> usize {
        self.header.pointer_width
    }

    #[inline]
    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    #[inline]
    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    #[inline]
    pub fn registry(&self) -> &WireTypeRegistry {
        &self.registry
    }

    #[inline]
    pub fn callbacks(&self) -> &CallbackTable {
        &self.callbacks
    }

    /// Callable methods, in ordinal order
    pub fn methods(&self) -> &[MethodPlan] {
        &self.plans
    }

    pub fn method(&self, name: &str) -> Option<&MethodPlan> {
        self.by_name.get(name).map(|&index| &self.plans[index])
    }

    /// Methods left out at load time, with the reason
    pub fn skipped(&self) -> &[(String, Fault)] {
        &self.skipped
    }

    /// Call an export by name
    pub fn call(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        let plan = self
            .method(name)
            .ok_or_else(|| Fault::UnknownMethod(name.to_string()))?;
        plan.invoke(self, args)
    }

    /// Call an export by call-table ordinal
    pub fn call_ordinal(&self, ordinal: usize, args: Vec<Value>) -> Result<Value> {
        let plan = self
            .plans
            .iter()
            .find(|plan| plan.ordinal == ordinal)
            .ok_or_else(|| Fault::UnknownMethod(format!("#{}", ordinal)))?;
        plan.invoke(self, args)
    }

    /// Reserve a frame for one call
    pub fn open_frame(
        &self,
        ordinal: usize,
        wire_slots: usize,
        callback_base: usize,
        callback_count: usize,
    ) -> Result<CallFrame<'_>> {
        let ctx = FrameContext {
            bridge: &self.bridge,
            arena: &self.arena,
            callbacks: &self.callbacks,
            calls: &self.header.calls,
            zero_slots: self.zero_slots,
        };
        CallFrame::open(ctx, ordinal, wire_slots, callback_base, callback_count)
    }

    pub fn stats(&self) -> TransientStats {
        self.arena.stats()
    }

    /// Rust bindings for every callable method
    pub fn emit_bindings(&self, config: &CodegenConfig) -> Result<String> {
        emit_bindings(self.bridge.label(), &self.plans, TemplateBook::shared()?, config)
    }

    /// JSON manifest of every callable method
    pub fn manifest(&self) -> Result<String> {
        emit_manifest(self.bridge.label(), &self.plans, TemplateBook::shared()?)
    }

    /// Disagreements between listing templates and the rules in use
    pub fn verify_templates(&self) -> Result<Vec<String>> {
        let book = TemplateBook::shared()?;
        let mut problems = Vec::new();
        for plan in &self.plans {
            for wire in std::iter::once(&plan.ret).chain(plan.params.iter().map(|param| &param.wire)) {
                problems.extend(book.verify(wire));
            }
        }
        problems.sort();
        problems.dedup();
        Ok(problems)
    }
}

/// Where a library's module comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// The library's default source
    Default,
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// Turns a source into a live bridge
pub type Connector = Box<dyn Fn(&Source) -> Result<SharedBridge>>;

/// A module connected on first use
pub struct Library {
    connector: Connector,
    default: Source,
    config: BindConfig,
    module: OnceCell<Rc<Module>>,
}

impl Library {
    pub fn new(connector: Connector, default: Source) -> Self {
        Self {
            connector,
            default,
            config: BindConfig::default(),
            module: OnceCell::new(),
        }
    }

    pub fn with_config(mut self, config: BindConfig) -> Self {
        self.config = config;
        self
    }

    /// Connect to `source` now, replacing any previous connection
    pub fn init(&mut self, source: Source) -> Result<()> {
        let module = self.connect(&source)?;
        self.module = OnceCell::from(module);
        Ok(())
    }

    /// The connected module, connecting to the default source if needed
    pub fn module(&self) -> Result<Rc<Module>> {
        self.module
            .get_or_try_init(|| self.connect(&Source::Default))
            .map(Rc::clone)
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.module.get().is_some()
    }

    fn connect(&self, source: &Source) -> Result<Rc<Module>> {
        let source = match source {
            Source::Default => &self.default,
            other => other,
        };
        let bridge = (self.connector)(source)?;
        Ok(Rc::new(Module::load_with_config(bridge, &self.config)?))
    }
}
