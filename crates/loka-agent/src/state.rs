//! Shared mutable resources: configuration/vars documents and the helper
//! library.
//!
//! Both types are handles around `Arc`-shared interiors. The inherit pass
//! copies the *handle* from parent to child, so the whole agent tree
//! observes one underlying document or helper table. Configuration is
//! conventionally written before `init` and treated as read-only afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, bail};
use parking_lot::RwLock;
use serde_json::Value;

/// A JSON document shared by reference across an agent tree. Used for both
/// `config` (inherited) and `vars` (per-agent scratch state).
#[derive(Clone, Default)]
pub struct Store {
    doc: Arc<RwLock<Value>>,
}

impl Store {
    pub fn new(value: Value) -> Self {
        Self {
            doc: Arc::new(RwLock::new(value)),
        }
    }

    /// Clone of the current document.
    pub fn snapshot(&self) -> Value {
        self.doc.read().clone()
    }

    /// Look up a value by JSON pointer (`/a/b/0`).
    pub fn pointer(&self, pointer: &str) -> Option<Value> {
        self.doc.read().pointer(pointer).cloned()
    }

    /// Replace the whole document.
    pub fn replace(&self, value: Value) {
        *self.doc.write() = value;
    }

    /// Set a top-level field, promoting the document to an object if it is
    /// not one yet.
    pub fn insert(&self, field: impl Into<String>, value: Value) {
        let mut doc = self.doc.write();
        if !doc.is_object() {
            *doc = Value::Object(serde_json::Map::new());
        }
        if let Some(map) = doc.as_object_mut() {
            map.insert(field.into(), value);
        }
    }

    /// Whether another handle shares this document.
    pub fn shares_with(&self, other: &Store) -> bool {
        Arc::ptr_eq(&self.doc, &other.doc)
    }
}

/// A synchronous named helper a library exposes to capabilities.
pub trait Helper: Send + Sync {
    fn call(&self, input: Value) -> Result<Value>;
}

impl<F> Helper for F
where
    F: Fn(Value) -> Result<Value> + Send + Sync,
{
    fn call(&self, input: Value) -> Result<Value> {
        self(input)
    }
}

/// Named helper-function table shared by reference across an agent tree,
/// the "library handle" of the inherit pass.
#[derive(Clone, Default)]
pub struct Library {
    helpers: Arc<RwLock<HashMap<String, Arc<dyn Helper>>>>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, helper: Arc<dyn Helper>) {
        self.helpers.write().insert(name.into(), helper);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Helper>> {
        self.helpers.read().get(name).cloned()
    }

    /// Invoke helper `name`, failing when it is not registered.
    pub fn call(&self, name: &str, input: Value) -> Result<Value> {
        let Some(helper) = self.get(name) else {
            bail!("library helper not found: {name}");
        };
        helper.call(input)
    }

    pub fn shares_with(&self, other: &Library) -> bool {
        Arc::ptr_eq(&self.helpers, &other.helpers)
    }
}
