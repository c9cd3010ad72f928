#![deny(unused)]
//! Script sandbox for Scriptbox.
//!
//! This crate runs untrusted test scripts against a captured HTTP exchange.
//! Scripts see the exchange through `req`/`res`, variables through `bru`,
//! and record outcomes with `test`/`expect`/`assert`. They reach only the
//! modules their capability table grants.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │  TestRuntime::run(RunRequest)          │
//! │    ↓ resolves                          │
//! ├────────────────────────────────────────┤
//! │  CapabilityTable  +  ScriptContext     │
//! │  (inbuilt, whitelist, fs)  (scope,     │
//! │                    views, recorder)    │
//! │    ↓ hands both to                     │
//! ├────────────────────────────────────────┤
//! │  ExecutionBackend (Isolated|Embedded)  │
//! │    QuickJS + JSON host-call bridge     │
//! │    ↓ on completion or failure          │
//! ├────────────────────────────────────────┤
//! │  collect() → ScriptExecutionResult     │
//! └────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use scriptbox_sandbox::{RunRequest, TestRuntime};
//!
//! let runtime = TestRuntime::new(RuntimeConfig::default());
//! let result = runtime
//!     .run(RunRequest {
//!         script: "test('ok', () => expect(res.status).to.equal(200));".into(),
//!         response,
//!         ..Default::default()
//!     })
//!     .await?;
//! ```

pub mod capability;
pub mod collector;
pub mod context;
pub mod engine;
pub mod recorder;
pub mod runtime;
pub mod views;

pub use capability::{
    BindingSource, CapabilityResolver, CapabilityTable, Lookup, ModuleBinding, ModuleName,
    UnresolvedModule,
};
pub use collector::collect;
pub use context::{ScriptContext, ScriptContextBuilder};
pub use engine::{create_backend, EmbeddedBackend, ExecutionBackend, IsolatedBackend};
pub use recorder::AssertionRecorder;
pub use runtime::{RunRequest, ScriptFailure, TestRuntime};
pub use views::{RequestView, ResponseView};
