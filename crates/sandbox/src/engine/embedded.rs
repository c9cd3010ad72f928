use async_trait::async_trait;
use rquickjs::{AsyncContext, AsyncRuntime};
use std::rc::Rc;

use scriptbox_core::{
    config::{BackendKind, RuntimeConfig},
    Error, Result,
};

use super::bridge::Bridge;
use super::driver::{call_entry, caught, drive, JsEngine};
use super::{install, ExecutionBackend};
use crate::capability::CapabilityTable;
use crate::context::ScriptContext;

/// Minimal engine driven as an async task.
///
/// Applies a heap and a stack limit, binds every granted module as a global
/// (`_`, `CryptoJS`, `moment`, ...) and offers no module loader. A limit of
/// zero leaves that resource unbounded.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedBackend {
    memory_limit: usize,
    max_stack_size: usize,
}

impl EmbeddedBackend {
    pub fn new(memory_limit: usize, max_stack_size: usize) -> Self {
        Self {
            memory_limit,
            max_stack_size,
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(config.memory_limit_bytes, config.max_stack_size_bytes)
    }

    pub fn memory_limit(&self) -> usize {
        self.memory_limit
    }

    pub fn max_stack_size(&self) -> usize {
        self.max_stack_size
    }
}

impl Default for EmbeddedBackend {
    fn default() -> Self {
        Self::from_config(&RuntimeConfig::default())
    }
}

struct AsyncEngine {
    context: AsyncContext,
    runtime: AsyncRuntime,
}

#[async_trait(?Send)]
impl JsEngine for AsyncEngine {
    async fn call_entry(&self, function: &str, arg: String) -> Result<String> {
        self.context
            .with(|ctx| call_entry(&ctx, function, arg))
            .await
    }

    async fn run_jobs(&self) -> Result<()> {
        loop {
            let ran = self
                .runtime
                .execute_pending_job()
                .await
                .map_err(|err| Error::engine(format!("QuickJS job: {}", err)))?;
            if !ran {
                break;
            }
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl ExecutionBackend for EmbeddedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Embedded
    }

    async fn execute(
        &self,
        source: &str,
        context: Rc<ScriptContext>,
        capabilities: CapabilityTable,
    ) -> Result<()> {
        let runtime = AsyncRuntime::new().map_err(|e| Error::engine(e.to_string()))?;
        if self.memory_limit > 0 {
            runtime.set_memory_limit(self.memory_limit).await;
        }
        if self.max_stack_size > 0 {
            runtime.set_max_stack_size(self.max_stack_size).await;
        }
        let js = AsyncContext::full(&runtime)
            .await
            .map_err(|e| Error::engine(e.to_string()))?;

        let bridge = Rc::new(Bridge::new(context, capabilities));
        js.with(|ctx| install(&ctx, &bridge).map_err(|e| caught(&ctx, e)))
            .await?;

        let engine = AsyncEngine {
            context: js,
            runtime,
        };
        drive(&engine, &bridge, "embedded", source).await
    }
}
