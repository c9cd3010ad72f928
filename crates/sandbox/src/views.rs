//! Request/response views.
//!
//! Scripts read every captured field but may only rewrite the fields the host
//! permits through [`ViewPermissions`].

use serde_json::{json, Value};

use scriptbox_core::{
    config::ViewPermissions, find_header, remove_header, upsert_header, Error, RequestSnapshot,
    ResponseSnapshot, Result,
};

/// Whether a content type describes a JSON payload.
fn is_json(content_type: Option<&Value>) -> bool {
    content_type
        .and_then(Value::as_str)
        .map(|ct| ct.to_ascii_lowercase().contains("json"))
        .unwrap_or(false)
}

/// Turn a script-supplied header value into its stored form.
fn header_value(value: Value) -> Value {
    match value {
        Value::String(_) | Value::Null => value,
        other => Value::String(other.to_string()),
    }
}

// =============================================================================
// Request View
// =============================================================================

/// The `req` object scripts see.
#[derive(Debug, Clone)]
pub struct RequestView {
    snapshot: RequestSnapshot,
    permissions: ViewPermissions,
}

impl RequestView {
    pub fn new(snapshot: RequestSnapshot, permissions: ViewPermissions) -> Self {
        Self {
            snapshot,
            permissions,
        }
    }

    pub fn snapshot(&self) -> &RequestSnapshot {
        &self.snapshot
    }

    pub fn into_snapshot(self) -> RequestSnapshot {
        self.snapshot
    }

    /// Read a field by its script name.
    pub fn get(&self, field: &str) -> Value {
        match field {
            "url" => json!(self.snapshot.url),
            "method" => json!(self.snapshot.method),
            "headers" => Value::Object(self.snapshot.headers.clone()),
            "body" => self.body(),
            "name" => json!(self.snapshot.name),
            "timeout" => json!(self.snapshot.timeout),
            "assertionResults" => json!(self.snapshot.assertion_results),
            other => self.snapshot.extra.get(other).cloned().unwrap_or(Value::Null),
        }
    }

    /// The body, parsed when it is JSON text with a JSON content type.
    pub fn body(&self) -> Value {
        match &self.snapshot.body {
            Value::String(text) if is_json(self.snapshot.header("content-type")) => {
                serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()))
            }
            other => other.clone(),
        }
    }

    pub fn header(&self, name: &str) -> Option<Value> {
        self.snapshot.header(name).cloned()
    }

    pub fn set_header(&mut self, name: &str, value: Value) -> Result<()> {
        self.ensure(self.permissions.request_headers, "req.headers")?;
        upsert_header(&mut self.snapshot.headers, name, header_value(value));
        Ok(())
    }

    /// Replace every header.
    pub fn set_headers(&mut self, headers: Value) -> Result<()> {
        self.ensure(self.permissions.request_headers, "req.headers")?;
        let Value::Object(headers) = headers else {
            return Err(Error::script_runtime("headers must be an object"));
        };
        self.snapshot.headers = headers
            .into_iter()
            .map(|(name, value)| (name, header_value(value)))
            .collect();
        Ok(())
    }

    pub fn delete_header(&mut self, name: &str) -> Result<()> {
        self.ensure(self.permissions.request_headers, "req.headers")?;
        remove_header(&mut self.snapshot.headers, name);
        Ok(())
    }

    pub fn set_body(&mut self, body: Value) -> Result<()> {
        self.ensure(self.permissions.request_body, "req.body")?;
        self.snapshot.body = body;
        Ok(())
    }

    /// Ask the host to skip assertions that have not run yet.
    pub fn skip_assertions(&mut self) {
        self.snapshot.skip_assertions = true;
    }

    fn ensure(&self, allowed: bool, field: &str) -> Result<()> {
        if allowed {
            Ok(())
        } else {
            Err(Error::ReadOnlyField(field.to_string()))
        }
    }
}

// =============================================================================
// Response View
// =============================================================================

/// The `res` object scripts see.
#[derive(Debug, Clone)]
pub struct ResponseView {
    snapshot: ResponseSnapshot,
    permissions: ViewPermissions,
}

impl ResponseView {
    pub fn new(snapshot: ResponseSnapshot, permissions: ViewPermissions) -> Self {
        Self {
            snapshot,
            permissions,
        }
    }

    pub fn snapshot(&self) -> &ResponseSnapshot {
        &self.snapshot
    }

    /// Read a field by its script name.
    pub fn get(&self, field: &str) -> Value {
        match field {
            "status" => json!(self.snapshot.status),
            "statusText" => json!(self.snapshot.status_text),
            "headers" => Value::Object(self.snapshot.headers.clone()),
            "body" => self.snapshot.body.clone(),
            "responseTime" => json!(self.snapshot.response_time),
            "url" => json!(self.snapshot.url),
            other => self.snapshot.extra.get(other).cloned().unwrap_or(Value::Null),
        }
    }

    pub fn header(&self, name: &str) -> Option<Value> {
        find_header(&self.snapshot.headers, name).cloned()
    }

    pub fn set_body(&mut self, body: Value) -> Result<()> {
        if !self.permissions.response_body {
            return Err(Error::ReadOnlyField("res.body".to_string()));
        }
        self.snapshot.body = body;
        Ok(())
    }
}
