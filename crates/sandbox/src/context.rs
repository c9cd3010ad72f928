//! Per-run script context.
//!
//! Everything a script can observe or change lives here. The context is
//! built once per run, shared with the backend behind an `Rc`, and read back
//! by the collector afterwards.

use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use scriptbox_core::{
    config::ViewPermissions, ConsoleLevel, ConsoleSink, RequestRunner, RequestSnapshot,
    ResponseSnapshot, VariableScope, VariableTier, Variables,
};

use crate::recorder::AssertionRecorder;
use crate::views::{RequestView, ResponseView};

/// Mutable state of a single run.
pub struct ScriptContext {
    pub(crate) scope: RefCell<VariableScope>,
    pub(crate) request: RefCell<RequestView>,
    pub(crate) response: RefCell<ResponseView>,
    pub(crate) recorder: RefCell<AssertionRecorder>,
    pub(crate) next_request: RefCell<Option<String>>,
    pub(crate) console: Option<Arc<dyn ConsoleSink>>,
    pub(crate) runner: Option<Arc<dyn RequestRunner>>,
    pub(crate) collection_path: PathBuf,
    pub(crate) collection_name: Option<String>,
    console_calls: Cell<usize>,
}

impl fmt::Debug for ScriptContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptContext")
            .field("collection_path", &self.collection_path)
            .field("collection_name", &self.collection_name)
            .field("has_console", &self.console.is_some())
            .field("has_runner", &self.runner.is_some())
            .finish_non_exhaustive()
    }
}

impl ScriptContext {
    /// Start building a context for one run.
    pub fn builder(request: RequestSnapshot, response: ResponseSnapshot) -> ScriptContextBuilder {
        ScriptContextBuilder {
            request,
            response,
            env_variables: Variables::new(),
            runtime_variables: Variables::new(),
            process_env: Variables::new(),
            permissions: ViewPermissions::default(),
            console: None,
            runner: None,
            collection_path: PathBuf::from("."),
            collection_name: None,
        }
    }

    /// Borrow the variable scope.
    pub fn scope(&self) -> std::cell::Ref<'_, VariableScope> {
        self.scope.borrow()
    }

    /// Borrow the request view.
    pub fn request(&self) -> std::cell::Ref<'_, RequestView> {
        self.request.borrow()
    }

    /// Borrow the response view.
    pub fn response(&self) -> std::cell::Ref<'_, ResponseView> {
        self.response.borrow()
    }

    /// Borrow the assertion recorder.
    pub fn recorder(&self) -> std::cell::Ref<'_, AssertionRecorder> {
        self.recorder.borrow()
    }

    /// Request the script chose to run next.
    pub fn next_request(&self) -> Option<String> {
        self.next_request.borrow().clone()
    }

    pub fn collection_path(&self) -> &std::path::Path {
        &self.collection_path
    }

    pub fn collection_name(&self) -> Option<&str> {
        self.collection_name.as_deref()
    }

    /// The host's request runner, if one was supplied.
    pub fn runner(&self) -> Option<Arc<dyn RequestRunner>> {
        self.runner.clone()
    }

    /// Forward a console call to the sink, or drop it.
    pub fn log(&self, level: ConsoleLevel, args: &[Value]) {
        self.console_calls.set(self.console_calls.get() + 1);
        if let Some(sink) = &self.console {
            sink.log(level, args);
        }
    }

    /// Number of console calls made so far.
    pub fn console_calls(&self) -> usize {
        self.console_calls.get()
    }
}

/// Assembles a [`ScriptContext`].
pub struct ScriptContextBuilder {
    request: RequestSnapshot,
    response: ResponseSnapshot,
    env_variables: Variables,
    runtime_variables: Variables,
    process_env: Variables,
    permissions: ViewPermissions,
    console: Option<Arc<dyn ConsoleSink>>,
    runner: Option<Arc<dyn RequestRunner>>,
    collection_path: PathBuf,
    collection_name: Option<String>,
}

impl ScriptContextBuilder {
    pub fn env_variables(mut self, variables: Variables) -> Self {
        self.env_variables = variables;
        self
    }

    pub fn runtime_variables(mut self, variables: Variables) -> Self {
        self.runtime_variables = variables;
        self
    }

    pub fn process_env(mut self, variables: Variables) -> Self {
        self.process_env = variables;
        self
    }

    pub fn permissions(mut self, permissions: ViewPermissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn console(mut self, console: Option<Arc<dyn ConsoleSink>>) -> Self {
        self.console = console;
        self
    }

    pub fn runner(mut self, runner: Option<Arc<dyn RequestRunner>>) -> Self {
        self.runner = runner;
        self
    }

    pub fn collection_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.collection_path = path.into();
        self
    }

    pub fn collection_name(mut self, name: Option<String>) -> Self {
        self.collection_name = name;
        self
    }

    /// Seed the variable tiers and wrap the snapshots in views.
    ///
    /// The request's variable bags move into the scope; the collector writes
    /// them back when the run ends.
    pub fn build(self) -> ScriptContext {
        let mut request = self.request;
        let scope = VariableScope::new()
            .with_tier(
                VariableTier::GlobalEnvironment,
                std::mem::take(&mut request.global_environment_variables),
            )
            .with_tier(
                VariableTier::Collection,
                std::mem::take(&mut request.collection_variables),
            )
            .with_tier(VariableTier::Folder, std::mem::take(&mut request.folder_variables))
            .with_tier(VariableTier::Request, std::mem::take(&mut request.request_variables))
            .with_tier(VariableTier::Environment, self.env_variables)
            .with_tier(VariableTier::Runtime, self.runtime_variables)
            .with_tier(VariableTier::ProcessEnv, self.process_env);

        ScriptContext {
            scope: RefCell::new(scope),
            request: RefCell::new(RequestView::new(request, self.permissions)),
            response: RefCell::new(ResponseView::new(self.response, self.permissions)),
            recorder: RefCell::new(AssertionRecorder::new()),
            next_request: RefCell::new(None),
            console: self.console,
            runner: self.runner,
            collection_path: self.collection_path,
            collection_name: self.collection_name,
            console_calls: Cell::new(0),
        }
    }
}
