use async_trait::async_trait;
use rquickjs::{Context, Runtime};
use std::rc::Rc;

use scriptbox_core::{config::BackendKind, Error, Result};

use super::bridge::Bridge;
use super::driver::{call_entry, caught, drive, JsEngine};
use super::{install, ExecutionBackend};
use crate::capability::CapabilityTable;
use crate::context::ScriptContext;

/// Interpreter with a fresh global scope per run and `require` interception.
///
/// `require(name)` resolves only from the capability table, or to local
/// files under the collection and its context roots when filesystem access
/// is granted. Anything else reads as `undefined`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsolatedBackend;

impl IsolatedBackend {
    pub fn new() -> Self {
        Self
    }
}

struct SyncEngine {
    context: Context,
    runtime: Runtime,
}

#[async_trait(?Send)]
impl JsEngine for SyncEngine {
    async fn call_entry(&self, function: &str, arg: String) -> Result<String> {
        self.context.with(|ctx| call_entry(&ctx, function, arg))
    }

    async fn run_jobs(&self) -> Result<()> {
        while self
            .runtime
            .execute_pending_job()
            .map_err(|_| Error::engine("a queued promise job failed"))?
        {}
        Ok(())
    }
}

#[async_trait(?Send)]
impl ExecutionBackend for IsolatedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Isolated
    }

    async fn execute(
        &self,
        source: &str,
        context: Rc<ScriptContext>,
        capabilities: CapabilityTable,
    ) -> Result<()> {
        let runtime = Runtime::new().map_err(|e| Error::engine(e.to_string()))?;
        let js = Context::full(&runtime).map_err(|e| Error::engine(e.to_string()))?;

        let bridge = Rc::new(Bridge::new(context, capabilities));
        js.with(|ctx| install(&ctx, &bridge).map_err(|e| caught(&ctx, e)))?;

        let engine = SyncEngine {
            context: js,
            runtime,
        };
        drive(&engine, &bridge, "isolated", source).await
    }
}
