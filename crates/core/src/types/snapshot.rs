use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::variables::Variables;

// =============================================================================
// Exchange Snapshots
// =============================================================================

/// Header bag; names keep their original casing and order.
pub type Headers = serde_json::Map<String, Value>;

fn is_false(value: &bool) -> bool {
    !*value
}

/// Captured request plus the per-run variable bags the host attached to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSnapshot {
    /// HTTP method.
    #[serde(default)]
    pub method: String,

    /// Fully resolved URL.
    #[serde(default)]
    pub url: String,

    /// Request headers.
    #[serde(default)]
    pub headers: Headers,

    /// Request body as sent (string, JSON value, or null).
    #[serde(default)]
    pub body: Value,

    /// Display name of the request, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Request timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Set by scripts to ask the host to skip the remaining assertions.
    #[serde(default, skip_serializing_if = "is_false")]
    pub skip_assertions: bool,

    /// Global environment variables for this run.
    #[serde(default)]
    pub global_environment_variables: Variables,

    /// Collection variables for this run.
    #[serde(default)]
    pub collection_variables: Variables,

    /// Folder variables for this run.
    #[serde(default)]
    pub folder_variables: Variables,

    /// Request variables for this run.
    #[serde(default)]
    pub request_variables: Variables,

    /// Results of declarative assertions evaluated before the script.
    #[serde(default)]
    pub assertion_results: Vec<Value>,

    /// Any other host fields, carried through untouched.
    #[serde(flatten)]
    pub extra: Variables,
}

impl RequestSnapshot {
    /// Look up a header ignoring case.
    pub fn header(&self, name: &str) -> Option<&Value> {
        find_header(&self.headers, name)
    }
}

/// Captured response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSnapshot {
    /// HTTP status code.
    #[serde(default)]
    pub status: u16,

    /// Reason phrase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,

    /// Response headers.
    #[serde(default)]
    pub headers: Headers,

    /// Parsed response body (JSON value, or the raw text as a string).
    #[serde(default)]
    pub body: Value,

    /// Round-trip time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,

    /// Final URL after redirects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Any other host fields, carried through untouched.
    #[serde(flatten)]
    pub extra: Variables,
}

impl ResponseSnapshot {
    /// Look up a header ignoring case.
    pub fn header(&self, name: &str) -> Option<&Value> {
        find_header(&self.headers, name)
    }
}

/// Case-insensitive header lookup.
pub fn find_header<'a>(headers: &'a Headers, name: &str) -> Option<&'a Value> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value)
}

/// Replace a header (matching case-insensitively) or append it.
pub fn upsert_header(headers: &mut Headers, name: &str, value: Value) {
    let existing = headers
        .keys()
        .find(|key| key.eq_ignore_ascii_case(name))
        .cloned();
    match existing {
        Some(key) => {
            headers.insert(key, value);
        }
        None => {
            headers.insert(name.to_string(), value);
        }
    }
}

/// Remove a header matching case-insensitively.
pub fn remove_header(headers: &mut Headers, name: &str) -> Option<Value> {
    let existing = headers
        .keys()
        .find(|key| key.eq_ignore_ascii_case(name))
        .cloned()?;
    headers.remove(&existing)
}
