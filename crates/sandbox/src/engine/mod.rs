//! Execution backends.
//!
//! Both backends embed QuickJS and reach the run's context through the same
//! JSON bridge and driver loop. They differ in how modules are exposed and in
//! the resource limits they apply:
//!
//! - [`IsolatedBackend`]: fresh runtime per run, modules reached via `require`
//! - [`EmbeddedBackend`]: memory and stack limits, modules pre-bound as
//!   globals, no module loader

mod bridge;
mod driver;
mod embedded;
mod isolated;

pub use embedded::EmbeddedBackend;
pub use isolated::IsolatedBackend;

use async_trait::async_trait;
use rquickjs::{prelude::Func, Ctx};
use std::rc::Rc;

use scriptbox_core::{
    config::{BackendKind, RuntimeConfig},
    Result,
};

use crate::capability::CapabilityTable;
use crate::context::ScriptContext;
use bridge::Bridge;
use driver::{ASSERTIONS_JS, PRELUDE_JS};

/// Runs one script against one context.
///
/// Backends themselves are shareable, but the futures they return are not
/// `Send`: a run owns a single-threaded engine and must be driven on the task
/// that started it.
#[async_trait(?Send)]
pub trait ExecutionBackend: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> BackendKind;

    /// Execute `source` wrapped in an async function.
    ///
    /// Returns once the script's promise settles and no host call is
    /// outstanding. The context keeps every change the script made, whether
    /// or not it succeeded.
    async fn execute(
        &self,
        source: &str,
        context: Rc<ScriptContext>,
        capabilities: CapabilityTable,
    ) -> Result<()>;
}

/// Create the backend `kind` configured from `config`.
pub fn create_backend(kind: BackendKind, config: &RuntimeConfig) -> Box<dyn ExecutionBackend> {
    tracing::debug!(backend = %kind, "Creating execution backend");
    match kind {
        BackendKind::Isolated => Box::new(IsolatedBackend::new()),
        BackendKind::Embedded => Box::new(EmbeddedBackend::from_config(config)),
    }
}

/// Expose the bridge to script code and evaluate the script-side library.
fn install(ctx: &Ctx<'_>, bridge: &Rc<Bridge>) -> rquickjs::Result<()> {
    let globals = ctx.globals();

    let sync_bridge = Rc::clone(bridge);
    globals.set(
        "__host",
        Func::from(move |payload: String| -> String { sync_bridge.handle_sync(&payload) }),
    )?;

    let async_bridge = Rc::clone(bridge);
    globals.set(
        "__host_async",
        Func::from(move |payload: String| -> String { async_bridge.enqueue(&payload) }),
    )?;

    ctx.eval::<(), _>(ASSERTIONS_JS)?;
    ctx.eval::<(), _>(PRELUDE_JS)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_backend() {
        let config = RuntimeConfig::default();
        assert_eq!(create_backend(BackendKind::Isolated, &config).kind(), BackendKind::Isolated);
        assert_eq!(create_backend(BackendKind::Embedded, &config).kind(), BackendKind::Embedded);
    }
}
