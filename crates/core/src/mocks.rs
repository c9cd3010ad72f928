//! Mock implementations of core traits for testing.
//!
//! These stand in for the collaborators a host normally injects into a run:
//! a console sink, a request runner, and a native module.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::{
    traits::{ConsoleSink, Export, NativeModule, RequestRunner},
    types::ConsoleLevel,
    Error, Result,
};

// =============================================================================
// Recording Console
// =============================================================================

/// Console sink that keeps every call in order.
#[derive(Default)]
pub struct RecordingConsole {
    entries: Mutex<Vec<(ConsoleLevel, Vec<Value>)>>,
}

impl RecordingConsole {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded calls.
    pub fn entries(&self) -> Vec<(ConsoleLevel, Vec<Value>)> {
        self.entries.lock().unwrap().clone()
    }

    /// Recorded calls rendered as `level: arg arg ...` lines.
    pub fn lines(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .map(|(level, args)| {
                let rendered: Vec<String> = args
                    .iter()
                    .map(|arg| match arg {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect();
                format!("{}: {}", level, rendered.join(" "))
            })
            .collect()
    }
}

impl ConsoleSink for RecordingConsole {
    fn log(&self, level: ConsoleLevel, args: &[Value]) {
        self.entries.lock().unwrap().push((level, args.to_vec()));
    }
}

// =============================================================================
// Scripted Request Runner
// =============================================================================

/// Request runner that answers from a fixed table of responses.
#[derive(Default)]
pub struct ScriptedRequestRunner {
    responses: HashMap<String, Value>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRequestRunner {
    /// Create a runner with no known requests.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `path` with `response`.
    pub fn with_response(mut self, path: &str, response: Value) -> Self {
        self.responses.insert(path.to_string(), response);
        self
    }

    /// Wait this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Paths requested so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RequestRunner for ScriptedRequestRunner {
    async fn run_request(&self, path: &str) -> Result<Value> {
        self.calls.lock().unwrap().push(path.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.responses
            .get(path)
            .cloned()
            .ok_or_else(|| Error::host_callback(format!("Request not found: {}", path)))
    }
}

// =============================================================================
// Echo Module
// =============================================================================

/// Native module that echoes its arguments back.
///
/// Exports `echo` (sync), `later` (async), and `fail` (always errors). The
/// module object itself is callable and behaves like `echo`.
pub struct EchoModule {
    name: String,
}

impl EchoModule {
    /// Create an echo module importable as `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl NativeModule for EchoModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn exports(&self) -> Vec<Export> {
        vec![
            Export::sync("echo"),
            Export::asynchronous("later"),
            Export::sync("fail"),
        ]
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn call(&self, function: &str, args: &[Value]) -> Result<Value> {
        match function {
            "echo" | "default" => Ok(json!({ "module": self.name, "args": args })),
            "fail" => Err(Error::module_call(format!("{} refused", self.name))),
            other => Err(Error::module_call(format!(
                "{}.{} is not a function",
                self.name, other
            ))),
        }
    }

    async fn call_async(&self, function: &str, args: Vec<Value>) -> Result<Value> {
        match function {
            "later" => Ok(json!({ "module": self.name, "args": args })),
            other => Err(Error::module_call(format!(
                "{}.{} is not a function",
                self.name, other
            ))),
        }
    }
}
