//! `tv4` / `ajv`: JSON Schema validation.

use serde_json::{json, Value};

use scriptbox_core::{traits::Export, traits::NativeModule, Error, Result};

use super::{arg, unknown_function};

/// Which validator API the module imitates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFlavor {
    /// `tv4.validate(data, schema)` returning a boolean.
    Tv4,
    /// `new Ajv().compile(schema)(data)` with an `errors` list.
    Ajv,
}

/// JSON Schema validation behind both flavours.
pub struct SchemaModule {
    flavor: SchemaFlavor,
}

/// One validation failure.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaViolation {
    /// JSON pointer into the instance.
    pub instance_path: String,
    /// JSON pointer into the schema.
    pub schema_path: String,
    /// Human-readable message.
    pub message: String,
}

/// Validate `instance` against `schema`, collecting every violation.
pub fn check(schema: &Value, instance: &Value) -> Result<Vec<SchemaViolation>> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| Error::module_call(format!("Invalid schema: {}", e)))?;

    Ok(validator
        .iter_errors(instance)
        .map(|error| SchemaViolation {
            instance_path: error.instance_path.to_string(),
            schema_path: error.schema_path.to_string(),
            message: error.to_string(),
        })
        .collect())
}

impl SchemaModule {
    /// Create a validator module of the given flavour.
    pub fn new(flavor: SchemaFlavor) -> Self {
        Self { flavor }
    }

    fn tv4_error(violation: &SchemaViolation) -> Value {
        json!({
            "message": violation.message,
            "dataPath": violation.instance_path,
            "schemaPath": violation.schema_path,
        })
    }

    fn call_tv4(&self, function: &str, data: &Value, schema: &Value) -> Result<Value> {
        let violations = check(schema, data)?;
        match function {
            "validate" => Ok(json!(violations.is_empty())),
            "validateResult" => Ok(json!({
                "valid": violations.is_empty(),
                "error": violations.first().map(Self::tv4_error),
                "missing": [],
            })),
            "validateMultiple" => Ok(json!({
                "valid": violations.is_empty(),
                "errors": violations.iter().map(Self::tv4_error).collect::<Vec<_>>(),
                "missing": [],
            })),
            other => Err(unknown_function("tv4", other)),
        }
    }

    fn call_ajv(&self, function: &str, schema: &Value, data: &Value) -> Result<Value> {
        match function {
            "validate" => {
                let violations = check(schema, data)?;
                let errors: Vec<Value> = violations
                    .iter()
                    .map(|v| {
                        json!({
                            "instancePath": v.instance_path,
                            "schemaPath": format!("#{}", v.schema_path),
                            "message": v.message,
                        })
                    })
                    .collect();
                Ok(json!({
                    "valid": errors.is_empty(),
                    "errors": if errors.is_empty() { Value::Null } else { Value::Array(errors) },
                }))
            }
            "compile" => {
                // Surface schema errors at compile time, like ajv does
                jsonschema::validator_for(schema)
                    .map_err(|e| Error::module_call(format!("schema is invalid: {}", e)))?;
                Ok(Value::Bool(true))
            }
            other => Err(unknown_function("ajv", other)),
        }
    }
}

impl NativeModule for SchemaModule {
    fn name(&self) -> &str {
        match self.flavor {
            SchemaFlavor::Tv4 => "tv4",
            SchemaFlavor::Ajv => "ajv",
        }
    }

    fn exports(&self) -> Vec<Export> {
        let names: &[&str] = match self.flavor {
            SchemaFlavor::Tv4 => &["validate", "validateResult", "validateMultiple"],
            SchemaFlavor::Ajv => &["validate", "compile"],
        };
        names.iter().copied().map(Export::sync).collect()
    }

    fn adapter(&self) -> Option<&str> {
        Some(self.name())
    }

    fn call(&self, function: &str, args: &[Value]) -> Result<Value> {
        match self.flavor {
            SchemaFlavor::Tv4 => self.call_tv4(function, arg(args, 0), arg(args, 1)),
            SchemaFlavor::Ajv => self.call_ajv(function, arg(args, 0), arg(args, 1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_schema() -> Value {
        json!({
            "type": "object",
            "required": ["id", "name"],
            "properties": {
                "id": {"type": "integer"},
                "name": {"type": "string"}
            }
        })
    }

    #[test]
    fn test_tv4_validate() {
        let tv4 = SchemaModule::new(SchemaFlavor::Tv4);
        let ok = tv4.call("validate", &[json!({"id": 1, "name": "ada"}), user_schema()]).unwrap();
        assert_eq!(ok, json!(true));

        let result = tv4
            .call("validateResult", &[json!({"id": "x", "name": "ada"}), user_schema()])
            .unwrap();
        assert_eq!(result["valid"], json!(false));
        assert_eq!(result["error"]["dataPath"], json!("/id"));
    }

    #[test]
    fn test_ajv_validate_argument_order() {
        let ajv = SchemaModule::new(SchemaFlavor::Ajv);
        let result = ajv.call("validate", &[user_schema(), json!({"id": 1})]).unwrap();
        assert_eq!(result["valid"], json!(false));
        assert_eq!(result["errors"].as_array().unwrap().len(), 1);

        let ok = ajv
            .call("validate", &[user_schema(), json!({"id": 1, "name": "x"})])
            .unwrap();
        assert!(ok["errors"].is_null());
    }

    #[test]
    fn test_invalid_schema() {
        let ajv = SchemaModule::new(SchemaFlavor::Ajv);
        assert!(ajv.call("compile", &[json!({"type": 12})]).is_err());
    }
}
