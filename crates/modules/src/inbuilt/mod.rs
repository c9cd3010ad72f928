//! The inbuilt library every run receives.
//!
//! Each inbuilt module is a [`NativeModule`]. `chai` is the exception: its
//! assertions live in the script prelude, so it has no native half.

use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use scriptbox_core::{traits::NativeModule, Error, Result};

pub mod crypto;
pub mod data;
pub mod dates;
pub mod encoding;
pub mod http;
pub mod html;
pub mod ids;
pub mod path;
pub mod schema;
pub mod url;
pub mod xml;

pub use crypto::CryptoModule;
pub use data::LodashModule;
pub use dates::DatesModule;
pub use encoding::{AtobModule, BtoaModule};
pub use html::CheerioModule;
pub use http::HttpModule;
pub use ids::UuidModule;
pub use path::PathModule;
pub use schema::{SchemaFlavor, SchemaModule};
pub use url::UrlModule;
pub use xml::Xml2jsModule;

/// Closed set of modules shipped with the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InbuiltModule {
    Path,
    Url,
    Uuid,
    Btoa,
    Atob,
    CryptoJs,
    Moment,
    Lodash,
    Tv4,
    Ajv,
    Axios,
    Xml2js,
    Cheerio,
    Chai,
}

impl InbuiltModule {
    /// Every inbuilt module, in binding order.
    pub const ALL: [InbuiltModule; 14] = [
        InbuiltModule::Path,
        InbuiltModule::Url,
        InbuiltModule::Uuid,
        InbuiltModule::Btoa,
        InbuiltModule::Atob,
        InbuiltModule::CryptoJs,
        InbuiltModule::Moment,
        InbuiltModule::Lodash,
        InbuiltModule::Tv4,
        InbuiltModule::Ajv,
        InbuiltModule::Axios,
        InbuiltModule::Xml2js,
        InbuiltModule::Cheerio,
        InbuiltModule::Chai,
    ];

    /// Name used with `require`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Url => "url",
            Self::Uuid => "uuid",
            Self::Btoa => "btoa",
            Self::Atob => "atob",
            Self::CryptoJs => "crypto-js",
            Self::Moment => "moment",
            Self::Lodash => "lodash",
            Self::Tv4 => "tv4",
            Self::Ajv => "ajv",
            Self::Axios => "axios",
            Self::Xml2js => "xml2js",
            Self::Cheerio => "cheerio",
            Self::Chai => "chai",
        }
    }

    /// Global the embedded backend binds the module to.
    pub fn global_name(&self) -> &'static str {
        match self {
            Self::CryptoJs => "CryptoJS",
            Self::Lodash => "_",
            Self::Ajv => "Ajv",
            other => other.name(),
        }
    }

    /// Look up an inbuilt module by its `require` name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.name() == name)
    }

    /// Instantiate the native half of the module.
    ///
    /// `cwd` is the directory relative paths resolve against (the collection
    /// path). Returns `None` for `chai`.
    pub fn native(&self, cwd: &Path) -> Option<Arc<dyn NativeModule>> {
        let module: Arc<dyn NativeModule> = match self {
            Self::Path => Arc::new(PathModule::with_cwd(cwd)),
            Self::Url => Arc::new(UrlModule),
            Self::Uuid => Arc::new(UuidModule),
            Self::Btoa => Arc::new(BtoaModule),
            Self::Atob => Arc::new(AtobModule),
            Self::CryptoJs => Arc::new(CryptoModule),
            Self::Moment => Arc::new(DatesModule),
            Self::Lodash => Arc::new(LodashModule),
            Self::Tv4 => Arc::new(SchemaModule::new(SchemaFlavor::Tv4)),
            Self::Ajv => Arc::new(SchemaModule::new(SchemaFlavor::Ajv)),
            Self::Axios => Arc::new(HttpModule::new()),
            Self::Xml2js => Arc::new(Xml2jsModule),
            Self::Cheerio => Arc::new(CheerioModule),
            Self::Chai => return None,
        };
        Some(module)
    }
}

impl fmt::Display for InbuiltModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Argument helpers
// =============================================================================

static NULL: Value = Value::Null;

/// Positional argument, `null` when missing.
pub(crate) fn arg(args: &[Value], index: usize) -> &Value {
    args.get(index).unwrap_or(&NULL)
}

/// Positional string argument.
pub(crate) fn arg_str<'a>(args: &'a [Value], index: usize, function: &str) -> Result<&'a str> {
    arg(args, index).as_str().ok_or_else(|| {
        Error::module_call(format!(
            "{}: argument {} must be a string",
            function,
            index + 1
        ))
    })
}

/// Positional argument coerced the way script code would stringify it.
pub(crate) fn arg_text(args: &[Value], index: usize) -> String {
    match arg(args, index) {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Error for an export name the module does not have.
pub(crate) fn unknown_function(module: &str, function: &str) -> Error {
    Error::module_call(format!("{}.{} is not a function", module, function))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for module in InbuiltModule::ALL {
            assert_eq!(InbuiltModule::from_name(module.name()), Some(module));
        }
        assert_eq!(InbuiltModule::from_name("fs"), None);
        assert_eq!(InbuiltModule::from_name("node-vault"), None);
    }

    #[test]
    fn test_global_names() {
        assert_eq!(InbuiltModule::CryptoJs.global_name(), "CryptoJS");
        assert_eq!(InbuiltModule::Lodash.global_name(), "_");
        assert_eq!(InbuiltModule::Ajv.global_name(), "Ajv");
        assert_eq!(InbuiltModule::Xml2js.global_name(), "xml2js");
        assert_eq!(InbuiltModule::Chai.global_name(), "chai");
    }

    #[test]
    fn test_native_halves() {
        let cwd = Path::new("/collections/petstore");
        for module in InbuiltModule::ALL {
            match module.native(cwd) {
                Some(native) => assert_eq!(native.name(), module.name()),
                None => assert_eq!(module, InbuiltModule::Chai),
            }
        }
    }
}
