//! Host module registry.

use dashmap::DashMap;
use std::sync::Arc;

use scriptbox_core::{traits::NativeModule, Error, Result};

/// Modules the host makes available for whitelisting.
///
/// A collection's `moduleWhitelist` can only ever name modules registered
/// here; nothing is loaded from disk or from a package manager.
pub struct ModuleRegistry {
    /// Registered modules by import name.
    modules: DashMap<String, Arc<dyn NativeModule>>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            modules: DashMap::new(),
        }
    }

    /// Register a module under its own name.
    pub fn register(&self, module: Arc<dyn NativeModule>) -> Result<()> {
        let name = module.name().to_string();
        tracing::info!(module = %name, "Registering module");

        if self.modules.contains_key(&name) {
            return Err(Error::Internal(format!(
                "Module '{}' is already registered",
                name
            )));
        }

        self.modules.insert(name, module);
        Ok(())
    }

    /// Look up a module by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn NativeModule>> {
        self.modules.get(name).map(|entry| entry.value().clone())
    }

    /// Whether a module is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Registered module names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Get the number of registered modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
