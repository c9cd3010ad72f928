//! `uuid`: identifier generation.

use serde_json::{json, Value};
use uuid::Uuid;

use scriptbox_core::{traits::Export, traits::NativeModule, Result};

use super::{arg_text, unknown_function};

/// `uuid.v4()`, `uuid.validate()`, `uuid.version()`.
pub struct UuidModule;

impl NativeModule for UuidModule {
    fn name(&self) -> &str {
        "uuid"
    }

    fn exports(&self) -> Vec<Export> {
        vec![
            Export::sync("v4"),
            Export::sync("validate"),
            Export::sync("version"),
        ]
    }

    fn call(&self, function: &str, args: &[Value]) -> Result<Value> {
        match function {
            "v4" => Ok(json!(Uuid::new_v4().to_string())),
            "validate" => Ok(json!(Uuid::parse_str(&arg_text(args, 0)).is_ok())),
            "version" => Ok(Uuid::parse_str(&arg_text(args, 0))
                .map(|id| json!(id.get_version_num()))
                .unwrap_or(Value::Null)),
            other => Err(unknown_function("uuid", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v4_is_valid() {
        let id = UuidModule.call("v4", &[]).unwrap();
        let id = id.as_str().unwrap();
        assert_eq!(id.len(), 36);
        assert_eq!(UuidModule.call("validate", &[json!(id)]).unwrap(), json!(true));
        assert_eq!(UuidModule.call("version", &[json!(id)]).unwrap(), json!(4));
        assert_eq!(UuidModule.call("validate", &[json!("nope")]).unwrap(), json!(false));
    }
}
