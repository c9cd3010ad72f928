#![deny(unused)]
//! Native modules for Scriptbox scripts.
//!
//! This crate holds everything a script can import:
//!
//! - `inbuilt`: the library every run gets (`path`, `url`, `uuid`, `btoa`,
//!   `atob`, `crypto-js`, `moment`, `lodash`, `tv4`, `ajv`, `axios`, `xml2js`,
//!   `cheerio`, `chai`)
//! - `filesystem`: the `fs` capability, scoped to a set of roots
//! - `registry`: host-registered modules that collections may whitelist
//!
//! # Usage
//!
//! ```ignore
//! use scriptbox_modules::{InbuiltModule, ModuleRegistry};
//!
//! let registry = ModuleRegistry::new();
//! registry.register(Arc::new(VaultModule::new(client)))?;
//!
//! let lodash = InbuiltModule::Lodash.native(Path::new("/collections/petstore"));
//! ```

pub mod filesystem;
pub mod inbuilt;
pub mod registry;

pub use filesystem::FilesystemModule;
pub use inbuilt::InbuiltModule;
pub use registry::ModuleRegistry;
