#![deny(unused)]
//! Core types, traits, and error definitions for Scriptbox.
//!
//! This crate provides the building blocks shared by the module catalogue and
//! the script sandbox: the variable scope, exchange snapshots, result types,
//! host collaborator traits, configuration, and the filesystem policy.

pub mod config;
pub mod error;
pub mod fs_policy;
pub mod mocks;
pub mod tracing_layer;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::*;
pub use types::*;
