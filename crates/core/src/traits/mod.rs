//! Core traits for Scriptbox.
//!
//! - `host`: collaborators the host injects (RequestRunner, ConsoleSink)
//! - `modules`: the NativeModule contract behind every importable module

pub mod host;
pub mod modules;

pub use host::*;
pub use modules::*;
