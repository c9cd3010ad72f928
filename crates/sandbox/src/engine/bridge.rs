//! JSON host-call bridge.
//!
//! Script-side code reaches the context through two engine functions:
//! `__host` answers immediately and `__host_async` queues work that the
//! driver settles later. Both exchange JSON text, so no engine value ever
//! outlives a call and both backends share one implementation.

use futures::future::{FutureExt, LocalBoxFuture};
use serde::Deserialize;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use scriptbox_core::{
    fs_policy, traits::NativeModule, AssertionResult, ConsoleLevel, Error, Result, VariableScope,
    VariableTier,
};

use crate::capability::{CapabilityTable, Lookup, ModuleBinding};
use crate::context::ScriptContext;

// =============================================================================
// Calls
// =============================================================================

/// A call answered while the script waits.
#[derive(Debug, Deserialize)]
#[serde(tag = "op")]
pub(crate) enum HostCall {
    #[serde(rename = "var.get")]
    VarGet { tier: Option<String>, key: String },
    #[serde(rename = "var.has")]
    VarHas { tier: Option<String>, key: String },
    #[serde(rename = "var.set")]
    VarSet {
        tier: Option<String>,
        key: String,
        #[serde(default)]
        value: Value,
    },
    #[serde(rename = "var.delete")]
    VarDelete { tier: Option<String>, key: String },
    #[serde(rename = "var.clear")]
    VarClear { tier: Option<String> },
    #[serde(rename = "var.interpolate")]
    VarInterpolate {
        #[serde(default)]
        template: Value,
    },

    #[serde(rename = "req.get")]
    RequestGet { field: String },
    #[serde(rename = "req.header")]
    RequestHeader { name: String },
    #[serde(rename = "req.setHeader")]
    RequestSetHeader {
        name: String,
        #[serde(default)]
        value: Value,
    },
    #[serde(rename = "req.setHeaders")]
    RequestSetHeaders {
        #[serde(default)]
        headers: Value,
    },
    #[serde(rename = "req.deleteHeader")]
    RequestDeleteHeader { name: String },
    #[serde(rename = "req.setBody")]
    RequestSetBody {
        #[serde(default)]
        body: Value,
    },
    #[serde(rename = "req.skipAssertions")]
    RequestSkipAssertions,

    #[serde(rename = "res.get")]
    ResponseGet { field: String },
    #[serde(rename = "res.header")]
    ResponseHeader { name: String },
    #[serde(rename = "res.setBody")]
    ResponseSetBody {
        #[serde(default)]
        body: Value,
    },

    #[serde(rename = "next.set")]
    NextSet { name: Option<String> },
    #[serde(rename = "results.record")]
    ResultsRecord {
        description: String,
        passed: bool,
        error: Option<String>,
    },
    #[serde(rename = "results.reserve")]
    ResultsReserve { description: String },
    #[serde(rename = "results.settle")]
    ResultsSettle {
        slot: usize,
        passed: bool,
        error: Option<String>,
    },
    #[serde(rename = "results.list")]
    ResultsList,
    #[serde(rename = "assertions.list")]
    AssertionsList,

    #[serde(rename = "console")]
    Console {
        level: ConsoleLevel,
        #[serde(default)]
        args: Vec<Value>,
    },

    #[serde(rename = "module.call")]
    ModuleCall {
        module: String,
        function: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    #[serde(rename = "module.resolve")]
    ModuleResolve { name: String, parent: Option<String> },
    #[serde(rename = "modules.bindings")]
    ModuleBindings,
    #[serde(rename = "context.info")]
    ContextInfo,
}

/// A call whose result arrives as a promise settlement.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op")]
pub(crate) enum AsyncHostCall {
    #[serde(rename = "runRequest")]
    RunRequest { path: String },
    #[serde(rename = "sleep")]
    Sleep {
        #[serde(default)]
        ms: f64,
    },
    #[serde(rename = "module.call")]
    ModuleCall {
        module: String,
        function: String,
        #[serde(default)]
        args: Vec<Value>,
    },
}

#[derive(Debug, Deserialize)]
struct AsyncEnvelope {
    id: u64,
    #[serde(flatten)]
    call: AsyncHostCall,
}

// =============================================================================
// Responses
// =============================================================================

/// Error name and message as the script should see them.
fn script_error(err: &Error) -> (&'static str, String) {
    match err {
        Error::ReadOnlyTier(_)
        | Error::ReadOnlyField(_)
        | Error::UnknownTier(_)
        | Error::Serialization(_) => ("TypeError", err.to_string()),
        Error::ScriptRuntime(message) => ("TypeError", message.clone()),
        Error::ModuleUnavailable(name) => ("Error", format!("Cannot find module '{}'", name)),
        Error::ModuleCall(message) | Error::HostCallback(message) => ("Error", message.clone()),
        other => ("Error", other.to_string()),
    }
}

/// Encode a call outcome. A missing value reads as `undefined`.
pub(crate) fn response(outcome: Result<Option<Value>>) -> Value {
    match outcome {
        Ok(Some(value)) => json!({ "ok": true, "value": value }),
        Ok(None) => json!({ "ok": true }),
        Err(err) => {
            let (name, message) = script_error(&err);
            json!({ "ok": false, "error": { "name": name, "message": message } })
        }
    }
}

/// Interpolate strings anywhere inside a value.
fn interpolate_value(scope: &VariableScope, value: Value) -> Value {
    match value {
        Value::String(template) => Value::String(scope.interpolate(&template)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| interpolate_value(scope, item))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, item)| (key, interpolate_value(scope, item)))
                .collect(),
        ),
        other => other,
    }
}

fn is_local(name: &str) -> bool {
    name == "." || name == ".." || name.starts_with("./") || name.starts_with("../") || name.starts_with('/')
}

// =============================================================================
// Bridge
// =============================================================================

/// Routes script calls into one run's context and capabilities.
pub(crate) struct Bridge {
    context: Rc<ScriptContext>,
    capabilities: CapabilityTable,
    queue: RefCell<Vec<(u64, AsyncHostCall)>>,
}

impl Bridge {
    pub(crate) fn new(context: Rc<ScriptContext>, capabilities: CapabilityTable) -> Self {
        Self {
            context,
            capabilities,
            queue: RefCell::new(Vec::new()),
        }
    }

    /// Answer a synchronous call.
    pub(crate) fn handle_sync(&self, payload: &str) -> String {
        let outcome = serde_json::from_str::<HostCall>(payload)
            .map_err(|e| Error::script_runtime(format!("invalid host call: {}", e)))
            .and_then(|call| self.handle(call));
        response(outcome).to_string()
    }

    /// Queue an asynchronous call for the driver.
    pub(crate) fn enqueue(&self, payload: &str) -> String {
        let outcome = serde_json::from_str::<AsyncEnvelope>(payload)
            .map_err(|e| Error::script_runtime(format!("invalid host call: {}", e)))
            .map(|envelope| {
                self.queue.borrow_mut().push((envelope.id, envelope.call));
                None
            });
        response(outcome).to_string()
    }

    /// Drain the queued asynchronous calls.
    pub(crate) fn take_pending(&self) -> Vec<(u64, AsyncHostCall)> {
        std::mem::take(&mut *self.queue.borrow_mut())
    }

    /// Start an asynchronous call. The future holds no borrow of the bridge.
    pub(crate) fn dispatch(&self, call: AsyncHostCall) -> LocalBoxFuture<'static, Result<Option<Value>>> {
        match call {
            AsyncHostCall::RunRequest { path } => {
                let runner = self.context.runner();
                async move {
                    let runner = runner.ok_or_else(|| {
                        Error::host_callback("bru.runRequest is not available in this run")
                    })?;
                    tracing::debug!(path = %path, "Script requested another request");
                    runner.run_request(&path).await.map(Some)
                }
                .boxed_local()
            }
            AsyncHostCall::Sleep { ms } => {
                let ms = if ms.is_finite() && ms > 0.0 { ms as u64 } else { 0 };
                async move {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(None)
                }
                .boxed_local()
            }
            AsyncHostCall::ModuleCall {
                module,
                function,
                args,
            } => {
                let native = self.native(&module);
                async move { native?.call_async(&function, args).await.map(Some) }.boxed_local()
            }
        }
    }

    fn handle(&self, call: HostCall) -> Result<Option<Value>> {
        let context = &self.context;
        match call {
            HostCall::VarGet { tier, key } => {
                let tier = tier.as_deref().map(str::parse).transpose()?;
                Ok(context.scope.borrow().get(tier, &key).cloned())
            }
            HostCall::VarHas { tier, key } => {
                let scope = context.scope.borrow();
                let found = match tier.as_deref().map(str::parse::<VariableTier>).transpose()? {
                    Some(tier) => scope.has(tier, &key),
                    None => scope.resolve(&key).is_some(),
                };
                Ok(Some(json!(found)))
            }
            HostCall::VarSet { tier, key, value } => {
                let tier = Self::write_tier(tier.as_deref())?;
                context.scope.borrow_mut().set(tier, key, value)?;
                Ok(None)
            }
            HostCall::VarDelete { tier, key } => {
                let tier = Self::write_tier(tier.as_deref())?;
                context.scope.borrow_mut().delete(tier, &key)?;
                Ok(None)
            }
            HostCall::VarClear { tier } => {
                let tier = Self::write_tier(tier.as_deref())?;
                context.scope.borrow_mut().clear(tier)?;
                Ok(None)
            }
            HostCall::VarInterpolate { template } => {
                Ok(Some(interpolate_value(&context.scope.borrow(), template)))
            }

            HostCall::RequestGet { field } => Ok(Some(context.request.borrow().get(&field))),
            HostCall::RequestHeader { name } => Ok(context.request.borrow().header(&name)),
            HostCall::RequestSetHeader { name, value } => {
                context.request.borrow_mut().set_header(&name, value)?;
                Ok(None)
            }
            HostCall::RequestSetHeaders { headers } => {
                context.request.borrow_mut().set_headers(headers)?;
                Ok(None)
            }
            HostCall::RequestDeleteHeader { name } => {
                context.request.borrow_mut().delete_header(&name)?;
                Ok(None)
            }
            HostCall::RequestSetBody { body } => {
                context.request.borrow_mut().set_body(body)?;
                Ok(None)
            }
            HostCall::RequestSkipAssertions => {
                context.request.borrow_mut().skip_assertions();
                Ok(None)
            }

            HostCall::ResponseGet { field } => Ok(Some(context.response.borrow().get(&field))),
            HostCall::ResponseHeader { name } => Ok(context.response.borrow().header(&name)),
            HostCall::ResponseSetBody { body } => {
                context.response.borrow_mut().set_body(body)?;
                Ok(None)
            }

            HostCall::NextSet { name } => {
                *context.next_request.borrow_mut() = name;
                Ok(None)
            }
            HostCall::ResultsRecord {
                description,
                passed,
                error,
            } => {
                context.recorder.borrow_mut().record(AssertionResult {
                    description,
                    passed,
                    error: if passed { None } else { error },
                });
                Ok(None)
            }
            HostCall::ResultsReserve { description } => {
                Ok(Some(json!(context.recorder.borrow_mut().reserve(description))))
            }
            HostCall::ResultsSettle {
                slot,
                passed,
                error,
            } => {
                context.recorder.borrow_mut().settle(slot, passed, error)?;
                Ok(None)
            }
            HostCall::ResultsList => Ok(Some(json!(context.recorder.borrow().results()))),
            HostCall::AssertionsList => Ok(Some(context.request.borrow().get("assertionResults"))),

            HostCall::Console { level, args } => {
                context.log(level, &args);
                Ok(None)
            }

            HostCall::ModuleCall {
                module,
                function,
                args,
            } => self.native(&module)?.call(&function, &args).map(Some),
            HostCall::ModuleResolve { name, parent } => self.resolve_module(&name, parent.as_deref()),
            HostCall::ModuleBindings => {
                let bindings: Vec<Value> = self
                    .capabilities
                    .global_bindings()
                    .into_iter()
                    .map(|(global, name, binding)| {
                        json!({ "global": global, "module": describe(name, binding) })
                    })
                    .collect();
                Ok(Some(Value::Array(bindings)))
            }
            HostCall::ContextInfo => Ok(Some(json!({
                "cwd": context.collection_path().to_string_lossy(),
                "collectionName": context.collection_name(),
            }))),
        }
    }

    /// Tier a write targets; scripts write the runtime tier by default.
    fn write_tier(raw: Option<&str>) -> Result<VariableTier> {
        raw.map(str::parse).transpose().map(|tier| tier.unwrap_or(VariableTier::Runtime))
    }

    fn native(&self, name: &str) -> Result<Arc<dyn NativeModule>> {
        match self.capabilities.get(name) {
            Some(ModuleBinding::Native(module)) => Ok(module.clone()),
            _ => Err(Error::ModuleUnavailable(name.to_string())),
        }
    }

    /// Describe what `require(name)` should produce, or `None` for undefined.
    fn resolve_module(&self, name: &str, parent: Option<&str>) -> Result<Option<Value>> {
        let bare = name.strip_prefix("node:").unwrap_or(name);
        if is_local(bare) {
            return self.resolve_file(bare, parent);
        }
        match self.capabilities.lookup(bare) {
            Lookup::Bound(binding) => Ok(Some(describe(bare, binding))),
            Lookup::Absent => {
                tracing::debug!(module = %bare, "Module is not granted to this run");
                Ok(None)
            }
            Lookup::Unknown => Ok(None),
        }
    }

    /// Locate a local file under the collection or an additional root.
    ///
    /// Without filesystem access local names read as undefined.
    fn resolve_file(&self, name: &str, parent: Option<&str>) -> Result<Option<Value>> {
        if !self.capabilities.allow_filesystem() {
            return Ok(None);
        }

        let base = parent
            .map(PathBuf::from)
            .unwrap_or_else(|| self.capabilities.collection_path().to_path_buf());
        let roots = self.capabilities.require_roots();
        let candidates = [
            name.to_string(),
            format!("{}.js", name),
            format!("{}.json", name),
            format!("{}/index.js", name),
        ];

        for candidate in &candidates {
            let path = match fs_policy::resolve_within_roots(&roots, &base, candidate) {
                Ok(path) => path,
                Err(err) => {
                    tracing::warn!(module = %name, error = %err, "Rejected local require");
                    return Err(Error::ModuleUnavailable(name.to_string()));
                }
            };
            if !path.is_file() {
                continue;
            }
            let source = std::fs::read_to_string(&path)?;
            let dir = path.parent().unwrap_or(Path::new("/")).to_path_buf();
            let is_json = path.extension().is_some_and(|ext| ext == "json");
            return Ok(Some(json!({
                "kind": "file",
                "path": path.to_string_lossy(),
                "dir": dir.to_string_lossy(),
                "source": source,
                "json": is_json,
            })));
        }

        Err(Error::ModuleUnavailable(name.to_string()))
    }
}

/// Script-side description of a bound module.
fn describe(name: &str, binding: &ModuleBinding) -> Value {
    match binding {
        ModuleBinding::Native(module) => json!({
            "kind": "native",
            "name": name,
            "exports": module.exports(),
            "callable": module.is_callable(),
            "adapter": module.adapter(),
        }),
        ModuleBinding::Assertions => json!({ "kind": "assertions", "name": name }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityResolver;
    use scriptbox_core::config::{FilesystemAccess, ScriptingConfig};
    use scriptbox_core::mocks::{RecordingConsole, ScriptedRequestRunner};
    use scriptbox_modules::ModuleRegistry;

    fn bridge_with(config: ScriptingConfig, collection: &Path) -> Bridge {
        let context = ScriptContext::builder(Default::default(), Default::default())
            .collection_path(collection)
            .build();
        let table = CapabilityResolver::new(Arc::new(ModuleRegistry::new())).resolve(&config, collection);
        Bridge::new(Rc::new(context), table)
    }

    fn call(bridge: &Bridge, payload: Value) -> Value {
        serde_json::from_str(&bridge.handle_sync(&payload.to_string())).unwrap()
    }

    #[test]
    fn test_variable_calls() {
        let bridge = bridge_with(ScriptingConfig::default(), Path::new("/c"));

        let out = call(&bridge, json!({"op": "var.set", "key": "token", "value": "abc"}));
        assert_eq!(out, json!({"ok": true}));

        let out = call(&bridge, json!({"op": "var.get", "key": "token"}));
        assert_eq!(out["value"], json!("abc"));
        let out = call(&bridge, json!({"op": "var.get", "tier": "collection", "key": "token"}));
        assert!(out.get("value").is_none());

        let out = call(&bridge, json!({"op": "var.interpolate", "template": {"auth": "Bearer {{token}}"}}));
        assert_eq!(out["value"], json!({"auth": "Bearer abc"}));

        let out = call(&bridge, json!({"op": "var.set", "tier": "processEnv", "key": "x", "value": 1}));
        assert_eq!(out["ok"], json!(false));
        assert_eq!(out["error"]["name"], json!("TypeError"));
    }

    #[test]
    fn test_malformed_call_is_an_error_response() {
        let bridge = bridge_with(ScriptingConfig::default(), Path::new("/c"));
        let out: Value = serde_json::from_str(&bridge.handle_sync("{\"op\":\"nope\"}")).unwrap();
        assert_eq!(out["ok"], json!(false));
        assert!(out["error"]["message"].as_str().unwrap().contains("invalid host call"));
    }

    #[test]
    fn test_module_resolution() {
        let bridge = bridge_with(ScriptingConfig::default(), Path::new("/c"));

        let out = call(&bridge, json!({"op": "module.resolve", "name": "lodash"}));
        assert_eq!(out["value"]["kind"], json!("native"));
        let out = call(&bridge, json!({"op": "module.resolve", "name": "node:path"}));
        assert_eq!(out["value"]["name"], json!("path"));
        let out = call(&bridge, json!({"op": "module.resolve", "name": "chai"}));
        assert_eq!(out["value"]["kind"], json!("assertions"));

        for hidden in ["fs", "node-vault", "./helpers"] {
            let out = call(&bridge, json!({"op": "module.resolve", "name": hidden}));
            assert_eq!(out, json!({"ok": true}), "{} should be undefined", hidden);
        }

        let out = call(&bridge, json!({"op": "module.call", "module": "fs", "function": "existsSync", "args": ["x"]}));
        assert_eq!(out["error"]["message"], json!("Cannot find module 'fs'"));
    }

    #[test]
    fn test_local_files_need_filesystem_access() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("lib")).unwrap();
        std::fs::write(dir.path().join("lib/helpers.js"), "module.exports = 1;").unwrap();

        let config = ScriptingConfig {
            filesystem_access: FilesystemAccess { allow: true },
            ..Default::default()
        };
        let bridge = bridge_with(config, dir.path());

        let out = call(&bridge, json!({"op": "module.resolve", "name": "./lib/helpers"}));
        assert_eq!(out["value"]["kind"], json!("file"));
        assert_eq!(out["value"]["source"], json!("module.exports = 1;"));
        assert_eq!(out["value"]["json"], json!(false));

        let out = call(&bridge, json!({"op": "module.resolve", "name": "./missing"}));
        assert_eq!(out["error"]["message"], json!("Cannot find module './missing'"));
        let out = call(&bridge, json!({"op": "module.resolve", "name": "../../etc/passwd"}));
        assert_eq!(out["ok"], json!(false));
    }

    #[test]
    fn test_results_and_console() {
        let console = Arc::new(RecordingConsole::new());
        let context = ScriptContext::builder(Default::default(), Default::default())
            .console(Some(console.clone()))
            .build();
        let bridge = Bridge::new(Rc::new(context), CapabilityTable::empty("/c"));

        let slot = call(&bridge, json!({"op": "results.reserve", "description": "later"}));
        call(&bridge, json!({"op": "results.record", "description": "now", "passed": true}));
        call(&bridge, json!({"op": "results.settle", "slot": slot["value"], "passed": false, "error": "late"}));
        call(&bridge, json!({"op": "console", "level": "info", "args": ["hi", 1]}));

        let out = call(&bridge, json!({"op": "results.list"}));
        assert_eq!(
            out["value"],
            json!([
                {"description": "later", "passed": false, "error": "late"},
                {"description": "now", "passed": true}
            ])
        );
        assert_eq!(console.lines(), vec!["info: hi 1"]);
    }

    #[tokio::test]
    async fn test_async_queue() {
        let runner = Arc::new(ScriptedRequestRunner::new().with_response("auth/login", json!({"status": 200})));
        let context = ScriptContext::builder(Default::default(), Default::default())
            .runner(Some(runner.clone()))
            .build();
        let bridge = Bridge::new(Rc::new(context), CapabilityTable::empty("/c"));

        let ack = bridge.enqueue(r#"{"id": 1, "op": "runRequest", "path": "auth/login"}"#);
        assert_eq!(ack, r#"{"ok":true}"#);
        bridge.enqueue(r#"{"id": 2, "op": "sleep", "ms": 1}"#);

        let pending = bridge.take_pending();
        assert_eq!(pending.len(), 2);
        assert!(bridge.take_pending().is_empty());

        let (id, first) = pending[0].clone();
        assert_eq!(id, 1);
        let value = bridge.dispatch(first).await.unwrap();
        assert_eq!(value, Some(json!({"status": 200})));
        assert_eq!(runner.calls(), vec!["auth/login"]);
    }

    #[tokio::test]
    async fn test_run_request_without_runner_rejects() {
        let bridge = bridge_with(ScriptingConfig::default(), Path::new("/c"));
        let result = bridge
            .dispatch(AsyncHostCall::RunRequest { path: "x".into() })
            .await;
        assert!(matches!(result, Err(Error::HostCallback(_))));
    }
}
