//! Event loop shared by both backends.
//!
//! The script runs as an async function. Whenever it awaits a host call the
//! driver drains the engine's job queue and starts the queued calls. Calls run
//! concurrently and each outcome is handed back as soon as it settles, so a
//! short sleep resumes the script before a slow sub-request does. The loop
//! ends when nothing is outstanding.

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use rquickjs::{Ctx, Function, Object};
use serde::Deserialize;
use serde_json::Value;

use scriptbox_core::{Error, Result};

use super::bridge::{response, Bridge};

/// Script-side assertion library, evaluated before the prelude.
pub(crate) const ASSERTIONS_JS: &str = include_str!("js/assertions.js");

/// Script-side API (`bru`, `req`, `res`, `test`, module loading).
pub(crate) const PRELUDE_JS: &str = include_str!("js/prelude.js");

/// The operations the driver needs from an engine.
#[async_trait(?Send)]
pub(crate) trait JsEngine {
    /// Call a function on the frozen `__scriptbox` object with one string argument.
    async fn call_entry(&self, function: &str, arg: String) -> Result<String>;

    /// Run queued promise jobs until the queue is empty.
    async fn run_jobs(&self) -> Result<()>;
}

/// Call `__scriptbox[function](arg)` inside an engine context.
pub(crate) fn call_entry(ctx: &Ctx<'_>, function: &str, arg: String) -> Result<String> {
    let call = || -> rquickjs::Result<Option<String>> {
        let api: Object = ctx.globals().get("__scriptbox")?;
        let entry: Function = api.get(function)?;
        entry.call((arg,))
    };
    call()
        .map(Option::unwrap_or_default)
        .map_err(|err| caught(ctx, err))
}

/// Turn an engine error into a crate error, reading the pending exception if any.
pub(crate) fn caught(ctx: &Ctx<'_>, err: rquickjs::Error) -> Error {
    if !matches!(err, rquickjs::Error::Exception) {
        return Error::engine(err.to_string());
    }
    let exception = ctx.catch();
    let message = exception
        .as_exception()
        .and_then(|e| e.message())
        .or_else(|| exception.as_string().and_then(|s| s.to_string().ok()))
        .unwrap_or_else(|| "uncaught exception".to_string());
    Error::engine(message)
}

// =============================================================================
// Run State
// =============================================================================

#[derive(Debug, Deserialize)]
struct ScriptError {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    stack: Option<String>,
    #[serde(default)]
    phase: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum RunState {
    Idle,
    Pending,
    Done,
    Error { error: ScriptError },
}

/// Map a script error onto the crate's error kinds.
fn classify(error: ScriptError) -> Error {
    if let Some(stack) = &error.stack {
        tracing::debug!(stack = %stack, "Script error stack");
    }
    match (error.name.as_deref(), error.phase.as_deref()) {
        (Some("SyntaxError"), Some("compile")) => Error::script_syntax(error.message),
        (Some("AssertionError"), _) => Error::bare_assertion(error.message),
        (Some(name), _) if !name.is_empty() => {
            Error::script_runtime(format!("{}: {}", name, error.message))
        }
        _ => Error::script_runtime(error.message),
    }
}

fn completion(id: u64, outcome: Result<Option<Value>>) -> String {
    let mut payload = response(outcome);
    if let Value::Object(map) = &mut payload {
        map.insert("id".to_string(), Value::from(id));
    }
    payload.to_string()
}

// =============================================================================
// Driver
// =============================================================================

/// Run `source` to completion.
///
/// `mode` selects how the prelude exposes modules: `isolated` installs
/// `require`, `embedded` binds modules as globals.
pub(crate) async fn drive<E>(engine: &E, bridge: &Bridge, mode: &str, source: &str) -> Result<()>
where
    E: JsEngine + ?Sized,
{
    engine.call_entry("setup", mode.to_string()).await?;
    engine.call_entry("run", source.to_string()).await?;

    let mut in_flight = FuturesUnordered::new();
    loop {
        engine.run_jobs().await?;

        for (id, call) in bridge.take_pending() {
            let future = bridge.dispatch(call);
            in_flight.push(async move { (id, future.await) });
        }

        let Some((id, outcome)) = in_flight.next().await else {
            break;
        };
        tracing::trace!(call = id, outstanding = in_flight.len(), "Host call settled");
        engine.call_entry("complete", completion(id, outcome)).await?;
    }

    let state = engine.call_entry("state", String::new()).await?;
    match serde_json::from_str::<RunState>(&state)? {
        RunState::Done => Ok(()),
        RunState::Error { error } => Err(classify(error)),
        RunState::Idle | RunState::Pending => Err(Error::ScriptStalled(
            "the script is awaiting a promise that can never settle".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn error(value: Value) -> ScriptError {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_classify() {
        let err = classify(error(json!({"name": "SyntaxError", "message": "unexpected token", "phase": "compile"})));
        assert!(matches!(err, Error::ScriptSyntax(_)));

        let err = classify(error(json!({"name": "SyntaxError", "message": "bad JSON", "phase": "run"})));
        assert_eq!(err.to_string(), "SyntaxError: bad JSON");

        let err = classify(error(json!({"name": "AssertionError", "message": "expected 1 to equal 2"})));
        assert!(matches!(err, Error::BareAssertion(_)));
        assert_eq!(err.to_string(), "expected 1 to equal 2");

        let err = classify(error(json!({"message": "boom"})));
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_run_state_parsing() {
        let state: RunState = serde_json::from_str(r#"{"status":"done"}"#).unwrap();
        assert!(matches!(state, RunState::Done));
        let state: RunState =
            serde_json::from_str(r#"{"status":"error","error":{"name":"Error","message":"x"}}"#).unwrap();
        assert!(matches!(state, RunState::Error { .. }));
    }

    #[test]
    fn test_completion_carries_id() {
        let payload: Value = serde_json::from_str(&completion(7, Ok(Some(json!(1))))).unwrap();
        assert_eq!(payload, json!({"ok": true, "value": 1, "id": 7}));
    }
}
