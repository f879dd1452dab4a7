//! Agent construction.

use std::sync::Arc;

use anyhow::Result;
use indexmap::IndexMap;
use loka_bus::EventBus;
use loka_protocol::{AgentProfile, TextFilter, validate_key};
use serde_json::Value;

use crate::agent::{Agent, AgentParts};
use crate::registry::MethodRegistry;
use crate::state::{Library, Store};
use crate::traits::{Hook, Listener, Method};

/// Optional lifecycle hooks, each invoked with the owning agent.
#[derive(Clone, Default)]
pub struct Hooks {
    pub on_init: Option<Arc<dyn Hook>>,
    pub on_start: Option<Arc<dyn Hook>>,
    pub on_stop: Option<Arc<dyn Hook>>,
    pub on_loaded: Option<Arc<dyn Hook>>,
    pub on_logout: Option<Arc<dyn Hook>>,
}

/// Assembles an [`Agent`] from an identity, capabilities, listeners, hooks
/// and children. Building wires nothing onto the bus — that happens in
/// [`Agent::init`].
pub struct AgentBuilder {
    profile: AgentProfile,
    translate: Option<Arc<dyn TextFilter>>,
    parse: Option<Arc<dyn TextFilter>>,
    bus: Option<EventBus>,
    config: Store,
    vars: Store,
    lib: Library,
    methods: Vec<(String, Arc<dyn Method>)>,
    listeners: Vec<(String, Arc<dyn Listener>)>,
    hooks: Hooks,
    children: IndexMap<String, Agent>,
}

impl AgentBuilder {
    pub fn new(profile: AgentProfile) -> Self {
        Self {
            profile,
            translate: None,
            parse: None,
            bus: None,
            config: Store::default(),
            vars: Store::default(),
            lib: Library::default(),
            methods: Vec::new(),
            listeners: Vec::new(),
            hooks: Hooks::default(),
            children: IndexMap::new(),
        }
    }

    /// The bus this agent publishes and subscribes on. A child agent may
    /// omit it; the parent's inherit pass overwrites it at init time anyway.
    pub fn bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn config(mut self, value: Value) -> Self {
        self.config = Store::new(value);
        self
    }

    /// Adopt an existing shared config handle instead of a fresh document.
    pub fn config_store(mut self, store: Store) -> Self {
        self.config = store;
        self
    }

    pub fn vars(mut self, value: Value) -> Self {
        self.vars = Store::new(value);
        self
    }

    pub fn library(mut self, lib: Library) -> Self {
        self.lib = lib;
        self
    }

    pub fn translate(mut self, filter: Arc<dyn TextFilter>) -> Self {
        self.translate = Some(filter);
        self
    }

    pub fn parse(mut self, filter: Arc<dyn TextFilter>) -> Self {
        self.parse = Some(filter);
        self
    }

    /// Register a capability under `name`.
    pub fn method(mut self, name: impl Into<String>, method: Arc<dyn Method>) -> Self {
        self.methods.push((name.into(), method));
        self
    }

    /// Subscribe `listener` to an arbitrary bus channel at init time.
    pub fn listener(mut self, channel: impl Into<String>, listener: Arc<dyn Listener>) -> Self {
        self.listeners.push((channel.into(), listener));
        self
    }

    pub fn on_init(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.on_init = Some(hook);
        self
    }

    pub fn on_start(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.on_start = Some(hook);
        self
    }

    pub fn on_stop(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.on_stop = Some(hook);
        self
    }

    pub fn on_loaded(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.on_loaded = Some(hook);
        self
    }

    pub fn on_logout(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.on_logout = Some(hook);
        self
    }

    /// Attach a child agent under `name`.
    pub fn child(mut self, name: impl Into<String>, agent: Agent) -> Self {
        self.children.insert(name.into(), agent);
        self
    }

    /// Validate the identity key and assemble the agent. Fails on an
    /// unusable key or an empty method name; never touches the bus.
    pub fn build(self) -> Result<Agent> {
        validate_key(&self.profile.key)?;

        let registry = MethodRegistry::new();
        for (name, method) in self.methods {
            registry.register(name, method)?;
        }

        Ok(Agent::assemble(AgentParts {
            profile: self.profile,
            translate: self.translate,
            parse: self.parse,
            bus: self.bus.unwrap_or_default(),
            config: self.config,
            vars: self.vars,
            lib: self.lib,
            methods: registry,
            listeners: self.listeners,
            hooks: self.hooks,
            children: self.children,
        }))
    }
}
