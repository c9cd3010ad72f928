//! `axios`: promise-based HTTP client.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;

use scriptbox_core::{traits::Export, traits::NativeModule, Error, Result};

use super::unknown_function;

/// Axios-style HTTP client backed by `reqwest`.
///
/// Responses with a status of 400 or above reject, as axios does by default.
#[derive(Clone)]
pub struct HttpModule {
    client: reqwest::Client,
}

impl HttpModule {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("scriptbox/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    /// Build an axios request config from the call's arguments.
    fn request_config(function: &str, args: Vec<Value>) -> Result<Map<String, Value>> {
        let mut args = args.into_iter();
        let mut config = Map::new();

        let (method, takes_data) = match function {
            "default" | "request" => {
                match args.next() {
                    Some(Value::String(url)) => {
                        if let Some(Value::Object(extra)) = args.next() {
                            config.extend(extra);
                        }
                        config.insert("url".into(), Value::String(url));
                    }
                    Some(Value::Object(given)) => config.extend(given),
                    _ => return Err(Error::module_call("axios: expected a url or a config object")),
                }
                return Ok(config);
            }
            "get" | "delete" | "head" | "options" => (function, false),
            "post" | "put" | "patch" => (function, true),
            other => return Err(unknown_function("axios", other)),
        };

        let url = match args.next() {
            Some(Value::String(url)) => url,
            _ => return Err(Error::module_call(format!("axios.{}: url must be a string", method))),
        };
        let data = if takes_data { args.next() } else { None };
        if let Some(Value::Object(extra)) = args.next() {
            config.extend(extra);
        }
        config.insert("url".into(), Value::String(url));
        config.insert("method".into(), Value::String(method.to_string()));
        if let Some(data) = data {
            config.insert("data".into(), data);
        }
        Ok(config)
    }

    async fn send(&self, config: Map<String, Value>) -> Result<Value> {
        let text = |key: &str| config.get(key).and_then(Value::as_str).map(str::to_string);

        let mut url = text("url").unwrap_or_default();
        if let Some(base) = text("baseURL") {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                url = format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'));
            }
        }
        let method = text("method").unwrap_or_else(|| "get".to_string());
        let method = method
            .to_uppercase()
            .parse::<reqwest::Method>()
            .map_err(|_| Error::module_call(format!("Invalid HTTP method: {}", method)))?;

        let mut request = self.client.request(method.clone(), &url);

        if let Some(Value::Object(headers)) = config.get("headers") {
            for (name, value) in headers {
                let value = match value {
                    Value::String(s) => s.clone(),
                    Value::Null => continue,
                    other => other.to_string(),
                };
                request = request.header(name.as_str(), value);
            }
        }

        if let Some(Value::Object(params)) = config.get("params") {
            let pairs: Vec<(String, String)> = params
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), v)
                })
                .collect();
            request = request.query(&pairs);
        }

        if let Some(timeout) = config.get("timeout").and_then(Value::as_u64).filter(|t| *t > 0) {
            request = request.timeout(Duration::from_millis(timeout));
        }

        match config.get("data") {
            None | Some(Value::Null) => {}
            Some(Value::String(body)) => request = request.body(body.clone()),
            Some(other) => request = request.json(other),
        }

        tracing::debug!(method = %method, url = %url, "Script HTTP request");

        let response = request
            .send()
            .await
            .map_err(|e| Error::module_call(format!("Network Error: {}", e)))?;

        let status = response.status();
        let headers: Map<String, Value> = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    Value::String(String::from_utf8_lossy(v.as_bytes()).into_owned()),
                )
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| Error::module_call(format!("Failed to read response: {}", e)))?;
        let data = serde_json::from_str::<Value>(&body).unwrap_or(Value::String(body));

        if status.as_u16() >= 400 {
            return Err(Error::module_call(format!(
                "Request failed with status code {}",
                status.as_u16()
            )));
        }

        Ok(json!({
            "status": status.as_u16(),
            "statusText": status.canonical_reason().unwrap_or_default(),
            "headers": headers,
            "data": data,
        }))
    }
}

impl Default for HttpModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NativeModule for HttpModule {
    fn name(&self) -> &str {
        "axios"
    }

    fn exports(&self) -> Vec<Export> {
        [
            "default", "request", "get", "delete", "head", "options", "post", "put", "patch",
        ]
        .into_iter()
        .map(Export::asynchronous)
        .collect()
    }

    fn is_callable(&self) -> bool {
        true
    }

    async fn call_async(&self, function: &str, args: Vec<Value>) -> Result<Value> {
        let config = Self::request_config(function, args)?;
        self.send(config).await
    }
}
