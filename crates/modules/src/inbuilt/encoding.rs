//! `btoa` / `atob`: Base64 over Latin-1 strings.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};

use scriptbox_core::{traits::Export, traits::NativeModule, Error, Result};

use super::{arg_text, unknown_function};

/// Encode a binary string (every char at most U+00FF) to Base64.
pub fn btoa(input: &str) -> Result<String> {
    let bytes = input
        .chars()
        .map(|c| {
            u8::try_from(u32::from(c)).map_err(|_| {
                Error::module_call(format!(
                    "btoa: character '{}' is outside of the Latin1 range",
                    c
                ))
            })
        })
        .collect::<Result<Vec<u8>>>()?;
    Ok(STANDARD.encode(bytes))
}

/// Decode Base64 into a binary string.
pub fn atob(input: &str) -> Result<String> {
    let cleaned: String = input.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD
        .decode(cleaned.trim_end_matches('=').to_string() + padding(&cleaned))
        .map_err(|e| Error::module_call(format!("atob: {}", e)))?;
    Ok(bytes.into_iter().map(char::from).collect())
}

fn padding(input: &str) -> &'static str {
    match input.trim_end_matches('=').len() % 4 {
        2 => "==",
        3 => "=",
        _ => "",
    }
}

/// The `btoa` module; the module object itself is the encoder.
pub struct BtoaModule;

/// The `atob` module; the module object itself is the decoder.
pub struct AtobModule;

impl NativeModule for BtoaModule {
    fn name(&self) -> &str {
        "btoa"
    }

    fn exports(&self) -> Vec<Export> {
        vec![Export::sync("default")]
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn call(&self, function: &str, args: &[Value]) -> Result<Value> {
        match function {
            "default" => Ok(json!(btoa(&arg_text(args, 0))?)),
            other => Err(unknown_function("btoa", other)),
        }
    }
}

impl NativeModule for AtobModule {
    fn name(&self) -> &str {
        "atob"
    }

    fn exports(&self) -> Vec<Export> {
        vec![Export::sync("default")]
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn call(&self, function: &str, args: &[Value]) -> Result<Value> {
        match function {
            "default" => Ok(json!(atob(&arg_text(args, 0))?)),
            other => Err(unknown_function("atob", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_btoa_atob() {
        assert_eq!(btoa("user:pass").unwrap(), "dXNlcjpwYXNz");
        assert_eq!(atob("dXNlcjpwYXNz").unwrap(), "user:pass");
        assert_eq!(atob("aGk").unwrap(), "hi");
        assert_eq!(btoa("\u{e9}").unwrap(), "6Q==");
    }

    #[test]
    fn test_btoa_rejects_wide_chars() {
        assert!(btoa("\u{263a}").is_err());
        assert!(atob("***").is_err());
    }

    #[test]
    fn test_callable_dispatch() {
        assert_eq!(BtoaModule.call("default", &[json!("hi")]).unwrap(), json!("aGk="));
        assert!(BtoaModule.is_callable());
        assert!(AtobModule.call("decode", &[]).is_err());
    }
}
