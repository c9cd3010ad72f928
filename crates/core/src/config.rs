use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::Error;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub runtime: RuntimeConfig,
    pub scripting: ScriptingConfig,
    pub logging: LoggingConfig,
}

/// Which execution backend runs scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Fresh interpreter scope with `require` interception.
    #[default]
    #[serde(alias = "vm2")]
    Isolated,
    /// Minimal engine with pre-bound modules and no module loader.
    #[serde(alias = "quickjs")]
    Embedded,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Isolated => f.write_str("isolated"),
            Self::Embedded => f.write_str("embedded"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "isolated" | "vm2" => Ok(Self::Isolated),
            "embedded" | "quickjs" => Ok(Self::Embedded),
            other => Err(Error::InvalidConfig(format!("unknown backend '{}'", other))),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RuntimeConfig {
    pub backend: BackendKind,
    /// Heap cap for the embedded backend.
    pub memory_limit_bytes: usize,
    /// Stack cap for the embedded backend.
    pub max_stack_size_bytes: usize,
    pub view_permissions: ViewPermissions,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Isolated,
            memory_limit_bytes: 64 * 1024 * 1024, // 64MB
            max_stack_size_bytes: 512 * 1024,     // 512KB
            view_permissions: ViewPermissions::default(),
        }
    }
}

/// Which snapshot fields scripts may rewrite.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct ViewPermissions {
    pub request_headers: bool,
    pub request_body: bool,
    pub response_body: bool,
}

impl Default for ViewPermissions {
    fn default() -> Self {
        Self {
            request_headers: true,
            request_body: true,
            response_body: true,
        }
    }
}

/// Per-collection scripting options.
///
/// Accepts both the snake_case keys used in config files and the camelCase
/// keys collections store.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ScriptingConfig {
    #[serde(alias = "filesystemAccess")]
    pub filesystem_access: FilesystemAccess,
    #[serde(alias = "moduleWhitelist")]
    pub module_whitelist: Vec<String>,
    #[serde(alias = "additionalContextRoots")]
    pub additional_context_roots: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(default)]
pub struct FilesystemAccess {
    pub allow: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,scriptbox=debug".into(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from `config/default`, an optional explicit file, and
    /// `SCRIPTBOX__*` environment variables, in that order.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            Config::builder().add_source(File::with_name("config/default").required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let s = builder
            // Map SCRIPTBOX__RUNTIME__BACKEND=embedded to runtime.backend
            .add_source(Environment::with_prefix("SCRIPTBOX").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
