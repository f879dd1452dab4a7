//! The capability registry: method name → async handler.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, bail};
use parking_lot::RwLock;

use crate::traits::Method;

/// String-keyed capability table. Keys are unique; registering an existing
/// name replaces the previous handler (last registration wins).
#[derive(Default)]
pub struct MethodRegistry {
    methods: RwLock<HashMap<String, Arc<dyn Method>>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `name`. Empty names are refused so an empty
    /// head token can never resolve.
    pub fn register(&self, name: impl Into<String>, method: Arc<dyn Method>) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            bail!("method name must not be empty");
        }
        self.methods.write().insert(name, method);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Method>> {
        self.methods.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.methods.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.read().is_empty()
    }
}
