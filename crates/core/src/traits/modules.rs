//! Native module traits.
//!
//! A native module is the Rust side of anything a script can `require`. Calls
//! cross the engine boundary as JSON, so a module never sees engine handles.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// How a script invokes an exported function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    /// Returns a value directly.
    Sync,
    /// Returns a promise settled by the host.
    Async,
}

/// A function exported by a native module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Export {
    /// Property name on the module object.
    pub name: String,
    /// Calling convention.
    pub kind: CallKind,
}

impl Export {
    /// A synchronous export.
    pub fn sync(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: CallKind::Sync,
        }
    }

    /// A promise-returning export.
    pub fn asynchronous(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: CallKind::Async,
        }
    }
}

/// A module that can be bound into a script's capability table.
///
/// Implementations must be stateless from the engine's point of view: the
/// same instance may serve many runs.
#[async_trait]
pub trait NativeModule: Send + Sync {
    /// Name scripts use to import the module.
    fn name(&self) -> &str;

    /// Functions the module exposes.
    fn exports(&self) -> Vec<Export>;

    /// Whether the module object itself is callable (dispatches to `default`).
    fn is_callable(&self) -> bool {
        false
    }

    /// Script-side adapter that reshapes the raw exports, if any.
    ///
    /// Used by modules whose script API is object-oriented (chained date
    /// values, schema validator classes) while the native calls stay flat.
    fn adapter(&self) -> Option<&str> {
        None
    }

    /// Invoke a synchronous export.
    fn call(&self, function: &str, _args: &[Value]) -> Result<Value> {
        Err(Error::module_call(format!(
            "{}.{} is not a synchronous function",
            self.name(),
            function
        )))
    }

    /// Invoke an asynchronous export.
    async fn call_async(&self, function: &str, _args: Vec<Value>) -> Result<Value> {
        Err(Error::module_call(format!(
            "{}.{} is not an asynchronous function",
            self.name(),
            function
        )))
    }
}
