//! Host collaborator traits.
//!
//! These are capabilities the host injects into a run. The engine never
//! performs network I/O or logging on its own behalf.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::ConsoleLevel;

/// Executes another request of the collection on behalf of a script.
#[async_trait]
pub trait RequestRunner: Send + Sync {
    /// Run the request at `path` (relative to the collection) and return its response.
    async fn run_request(&self, path: &str) -> Result<Value>;
}

/// Receives console output produced by scripts, in call order.
pub trait ConsoleSink: Send + Sync {
    /// Handle one console call with its sanitized arguments.
    fn log(&self, level: ConsoleLevel, args: &[Value]);
}

impl<F> ConsoleSink for F
where
    F: Fn(ConsoleLevel, &[Value]) + Send + Sync,
{
    fn log(&self, level: ConsoleLevel, args: &[Value]) {
        self(level, args)
    }
}
