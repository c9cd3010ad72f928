//! Runtime entry point.
//!
//! [`TestRuntime::run`] wires one script execution together: resolve the
//! capability table, assemble the context, run the backend, collect the
//! report. The report is collected whether or not the script succeeded.

use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use scriptbox_core::{
    config::{BackendKind, RuntimeConfig, ScriptingConfig},
    ConsoleSink, Error, RequestRunner, RequestSnapshot, ResponseSnapshot, ScriptExecutionResult,
    Variables,
};
use scriptbox_modules::ModuleRegistry;

use crate::capability::CapabilityResolver;
use crate::collector::collect;
use crate::context::ScriptContext;
use crate::engine::{create_backend, ExecutionBackend};

// =============================================================================
// Request & Failure
// =============================================================================

/// Everything a single run needs.
#[derive(Default)]
pub struct RunRequest {
    /// Script source. Runs inside an async function body.
    pub script: String,
    pub request: RequestSnapshot,
    pub response: ResponseSnapshot,
    /// The selected environment's variables.
    pub env_variables: Variables,
    /// Variables carried over from earlier runs.
    pub runtime_variables: Variables,
    /// Directory relative paths and local requires resolve against.
    pub collection_path: PathBuf,
    /// Receives every console call, in order. `None` discards output.
    pub on_console_log: Option<Arc<dyn ConsoleSink>>,
    /// Read-only process environment exposed to the script.
    pub process_env_vars: Variables,
    pub scripting_config: ScriptingConfig,
    /// Implements `bru.runRequest(path)`. Without it the call rejects.
    pub run_request_by_path: Option<Arc<dyn RequestRunner>>,
    pub collection_name: Option<String>,
}

impl fmt::Debug for RunRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunRequest")
            .field("script_len", &self.script.len())
            .field("collection_path", &self.collection_path)
            .field("collection_name", &self.collection_name)
            .field("scripting_config", &self.scripting_config)
            .field("has_console", &self.on_console_log.is_some())
            .field("has_runner", &self.run_request_by_path.is_some())
            .finish_non_exhaustive()
    }
}

/// A run that ended in an error, with everything collected up to that point.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ScriptFailure {
    pub error: Error,
    pub partial_results: Box<ScriptExecutionResult>,
}

// =============================================================================
// Runtime
// =============================================================================

/// Executes test scripts against request/response exchanges.
///
/// A runtime holds only configuration and can be shared. The future returned
/// by [`run`](Self::run) is not `Send`; drive it with `.await` on the current
/// task or inside a `tokio::task::LocalSet`.
pub struct TestRuntime {
    config: RuntimeConfig,
    resolver: CapabilityResolver,
    backend: Box<dyn ExecutionBackend>,
}

impl TestRuntime {
    /// Runtime with an empty module registry.
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_registry(config, Arc::new(ModuleRegistry::new()))
    }

    /// Runtime whose whitelist resolves against `registry`.
    pub fn with_registry(config: RuntimeConfig, registry: Arc<ModuleRegistry>) -> Self {
        let backend = create_backend(config.backend, &config);
        Self {
            config,
            resolver: CapabilityResolver::new(registry),
            backend,
        }
    }

    /// Replace the backend chosen by configuration.
    pub fn with_backend(mut self, backend: Box<dyn ExecutionBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn backend(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        self.resolver.registry()
    }

    /// Run one script.
    ///
    /// An empty script yields the unchanged exchange. On failure the error
    /// carries the report as it stood when the script stopped.
    pub async fn run(&self, request: RunRequest) -> Result<ScriptExecutionResult, ScriptFailure> {
        let RunRequest {
            script,
            request,
            response,
            env_variables,
            runtime_variables,
            collection_path,
            on_console_log,
            process_env_vars,
            scripting_config,
            run_request_by_path,
            collection_name,
        } = request;

        tracing::debug!(
            backend = %self.backend.kind(),
            collection = %collection_path.display(),
            request = request.name.as_deref().unwrap_or(""),
            "Starting script run"
        );

        let capabilities = self.resolver.resolve(&scripting_config, &collection_path);
        let context = Rc::new(
            ScriptContext::builder(request, response)
                .env_variables(env_variables)
                .runtime_variables(runtime_variables)
                .process_env(process_env_vars)
                .permissions(self.config.view_permissions)
                .console(on_console_log)
                .runner(run_request_by_path)
                .collection_path(collection_path)
                .collection_name(collection_name)
                .build(),
        );

        if script.trim().is_empty() {
            return Ok(collect(&context));
        }

        let outcome = self
            .backend
            .execute(&script, Rc::clone(&context), capabilities)
            .await;
        let result = collect(&context);

        match outcome {
            Ok(()) => {
                tracing::debug!(
                    tests = result.results.len(),
                    console_calls = context.console_calls(),
                    "Script run finished"
                );
                Ok(result)
            }
            Err(error) => {
                tracing::debug!(error = %error, tests = result.results.len(), "Script run failed");
                Err(ScriptFailure {
                    error,
                    partial_results: Box::new(result),
                })
            }
        }
    }
}

impl Default for TestRuntime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl fmt::Debug for TestRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestRuntime")
            .field("backend", &self.backend.kind())
            .field("config", &self.config)
            .finish()
    }
}
