//! Core type definitions for Scriptbox.
//!
//! Everything a run consumes or produces is plain, serializable data.

pub mod console;
pub mod results;
pub mod snapshot;
pub mod variables;

pub use console::*;
pub use results::*;
pub use snapshot::*;
pub use variables::*;
