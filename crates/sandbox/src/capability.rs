//! Capability resolution.
//!
//! Turns a collection's `ScriptingConfig` into the [`CapabilityTable`] a
//! single run is allowed to see. The table is built fresh for every run and
//! is the only source of modules a backend consults.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use scriptbox_core::{config::ScriptingConfig, fs_policy, traits::NativeModule, Error, Result};
use scriptbox_modules::{FilesystemModule, InbuiltModule, ModuleRegistry};

// =============================================================================
// Module Names
// =============================================================================

/// A validated module name (`lodash`, `node-vault`, `@scope/pkg`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleName(String);

impl ModuleName {
    /// Validate a whitelist entry.
    ///
    /// Names must be non-empty printable ASCII without whitespace, must not
    /// look like a path (`./x`, `/x`, `..`), and may carry a single `@scope/`.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidConfig(format!("module name '{}' {}", raw, reason));

        if raw.is_empty() || raw.len() > 214 {
            return Err(invalid("must be between 1 and 214 characters"));
        }
        if raw.starts_with('.') || raw.starts_with('/') || raw.contains("..") {
            return Err(invalid("must not be a path"));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@' | '/'))
        {
            return Err(invalid("contains invalid characters"));
        }

        let slashes = raw.matches('/').count();
        let scoped = raw.starts_with('@');
        if (scoped && slashes != 1) || (!scoped && slashes != 0) || raw[1..].contains('@') {
            return Err(invalid("is not a valid package name"));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifier the embedded backend binds the module to.
    ///
    /// Characters that are not valid in identifiers become `_`.
    pub fn global_identifier(&self) -> String {
        let mut ident: String = self
            .0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '$' { c } else { '_' })
            .collect();
        if ident.starts_with(|c: char| c.is_ascii_digit()) {
            ident.insert(0, '_');
        }
        ident
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Capability Table
// =============================================================================

/// What a module name is bound to inside a run.
#[derive(Clone)]
pub enum ModuleBinding {
    /// A native module; calls cross the bridge as JSON.
    Native(Arc<dyn NativeModule>),
    /// The script-side assertion library (`chai`).
    Assertions,
}

impl fmt::Debug for ModuleBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(module) => f.debug_tuple("Native").field(&module.name()).finish(),
            Self::Assertions => f.write_str("Assertions"),
        }
    }
}

/// Where a bound module came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingSource {
    Inbuilt,
    Whitelist,
    Filesystem,
}

#[derive(Debug, Clone)]
struct TableEntry {
    binding: Option<ModuleBinding>,
    source: BindingSource,
}

/// A whitelist entry that could not be bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedModule {
    /// The name as written in the whitelist.
    pub name: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Result of looking a name up in the table.
#[derive(Debug)]
pub enum Lookup<'a> {
    /// The name is bound.
    Bound(&'a ModuleBinding),
    /// The name is known and deliberately unbound (`fs` without access).
    Absent,
    /// The table has never heard of the name.
    Unknown,
}

/// The modules and filesystem reach of a single run.
#[derive(Debug, Clone)]
pub struct CapabilityTable {
    allow_filesystem: bool,
    collection_path: PathBuf,
    additional_roots: Vec<PathBuf>,
    modules: BTreeMap<String, TableEntry>,
    unresolved: Vec<UnresolvedModule>,
}

impl CapabilityTable {
    /// An empty table: no modules, no filesystem access.
    pub fn empty(collection_path: impl Into<PathBuf>) -> Self {
        Self {
            allow_filesystem: false,
            collection_path: collection_path.into(),
            additional_roots: Vec::new(),
            modules: BTreeMap::new(),
            unresolved: Vec::new(),
        }
    }

    /// Whether scripts may touch the filesystem.
    pub fn allow_filesystem(&self) -> bool {
        self.allow_filesystem
    }

    /// Directory scripts run relative to.
    pub fn collection_path(&self) -> &Path {
        &self.collection_path
    }

    /// Extra directories local `require`s may load from.
    pub fn additional_roots(&self) -> &[PathBuf] {
        &self.additional_roots
    }

    /// Every directory local files may be loaded from.
    pub fn require_roots(&self) -> Vec<PathBuf> {
        std::iter::once(self.collection_path.clone())
            .chain(self.additional_roots.iter().cloned())
            .collect()
    }

    /// Look a module name up.
    pub fn lookup(&self, name: &str) -> Lookup<'_> {
        match self.modules.get(name) {
            Some(TableEntry {
                binding: Some(binding),
                ..
            }) => Lookup::Bound(binding),
            Some(TableEntry { binding: None, .. }) => Lookup::Absent,
            None => Lookup::Unknown,
        }
    }

    /// The binding for `name`, if bound.
    pub fn get(&self, name: &str) -> Option<&ModuleBinding> {
        match self.lookup(name) {
            Lookup::Bound(binding) => Some(binding),
            _ => None,
        }
    }

    /// Where the binding for `name` came from.
    pub fn source(&self, name: &str) -> Option<BindingSource> {
        self.modules.get(name).map(|entry| entry.source)
    }

    /// Names of every bound module, sorted.
    pub fn bound_names(&self) -> Vec<&str> {
        self.modules
            .iter()
            .filter(|(_, entry)| entry.binding.is_some())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Bound modules with the global identifier the embedded backend uses.
    ///
    /// Inbuilt names use their conventional globals (`_`, `CryptoJS`); other
    /// names are turned into identifiers.
    pub fn global_bindings(&self) -> Vec<(String, &str, &ModuleBinding)> {
        self.modules
            .iter()
            .filter_map(|(name, entry)| {
                let binding = entry.binding.as_ref()?;
                let global = match InbuiltModule::from_name(name) {
                    Some(inbuilt) => inbuilt.global_name().to_string(),
                    None => ModuleName(name.clone()).global_identifier(),
                };
                Some((global, name.as_str(), binding))
            })
            .collect()
    }

    /// Whitelist entries that were skipped.
    pub fn unresolved(&self) -> &[UnresolvedModule] {
        &self.unresolved
    }

    fn bind(&mut self, name: &str, binding: Option<ModuleBinding>, source: BindingSource) {
        self.modules
            .insert(name.to_string(), TableEntry { binding, source });
    }

    fn skip(&mut self, name: &str, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(module = %name, reason = %reason, "Skipping whitelisted module");
        self.unresolved.push(UnresolvedModule {
            name: name.to_string(),
            reason,
        });
    }
}

// =============================================================================
// Capability Resolver
// =============================================================================

/// Builds capability tables from scripting configuration.
#[derive(Clone, Default)]
pub struct CapabilityResolver {
    registry: Arc<ModuleRegistry>,
}

impl CapabilityResolver {
    /// Resolve whitelists against `registry`.
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self { registry }
    }

    /// The registry whitelists resolve against.
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// Build the table for one run.
    ///
    /// 1. The inbuilt library is always bound.
    /// 2. Whitelisted names that are valid and registered are bound, replacing
    ///    inbuilt modules of the same name. Others are skipped with a warning.
    /// 3. `fs` is bound only when filesystem access is allowed and is
    ///    explicitly absent otherwise.
    pub fn resolve(&self, config: &ScriptingConfig, collection_path: &Path) -> CapabilityTable {
        let mut table = CapabilityTable::empty(collection_path);
        table.allow_filesystem = config.filesystem_access.allow;
        table.additional_roots =
            fs_policy::resolve_context_roots(collection_path, &config.additional_context_roots);

        for inbuilt in InbuiltModule::ALL {
            let binding = match inbuilt.native(collection_path) {
                Some(native) => ModuleBinding::Native(native),
                None => ModuleBinding::Assertions,
            };
            table.bind(inbuilt.name(), Some(binding), BindingSource::Inbuilt);
        }

        for raw in &config.module_whitelist {
            let name = match ModuleName::parse(raw) {
                Ok(name) => name,
                Err(e) => {
                    table.skip(raw, e.to_string());
                    continue;
                }
            };
            if name.as_str() == "fs" {
                table.skip(raw, "fs is governed by filesystemAccess.allow");
                continue;
            }
            match self.registry.get(name.as_str()) {
                Some(module) => {
                    tracing::debug!(module = %name, "Binding whitelisted module");
                    table.bind(
                        name.as_str(),
                        Some(ModuleBinding::Native(module)),
                        BindingSource::Whitelist,
                    );
                }
                None => table.skip(raw, "module is not registered with the host"),
            }
        }

        let fs_binding = table.allow_filesystem.then(|| {
            let module = FilesystemModule::new(
                collection_path.to_path_buf(),
                table.additional_roots.clone(),
            );
            ModuleBinding::Native(Arc::new(module))
        });
        table.bind("fs", fs_binding, BindingSource::Filesystem);

        table
    }
}
