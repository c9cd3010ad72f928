//! `url`: parse and resolve URLs.

use serde_json::{json, Map, Value};

use scriptbox_core::{traits::Export, traits::NativeModule, Error, Result};

use super::{arg_str, unknown_function};

/// Legacy `url.parse`/`url.resolve` plus `format`.
pub struct UrlModule;

fn parse(input: &str) -> Result<Value> {
    let (parsed, relative) = match ::url::Url::parse(input) {
        Ok(parsed) => (parsed, false),
        Err(::url::ParseError::RelativeUrlWithoutBase) => {
            let base = ::url::Url::parse("http://relative.invalid/")
                .map_err(|e| Error::internal(e.to_string()))?;
            let joined = base
                .join(input)
                .map_err(|e| Error::module_call(format!("url.parse: {}", e)))?;
            (joined, true)
        }
        Err(e) => return Err(Error::module_call(format!("url.parse: {}", e))),
    };

    let query: Map<String, Value> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect();
    let search = parsed.query().map(|q| format!("?{}", q));
    let hash = parsed.fragment().map(|f| format!("#{}", f));
    let path = format!("{}{}", parsed.path(), search.as_deref().unwrap_or_default());

    if relative {
        return Ok(json!({
            "protocol": null,
            "host": null,
            "hostname": null,
            "port": null,
            "pathname": parsed.path(),
            "search": search,
            "query": query,
            "hash": hash,
            "path": path,
            "href": input,
        }));
    }

    let hostname = parsed.host_str().map(str::to_string);
    let port = parsed.port().map(|p| p.to_string());
    let host = match (&hostname, &port) {
        (Some(h), Some(p)) => Some(format!("{}:{}", h, p)),
        (Some(h), None) => Some(h.clone()),
        _ => None,
    };
    let auth = match (parsed.username(), parsed.password()) {
        ("", None) => None,
        (user, None) => Some(user.to_string()),
        (user, Some(pass)) => Some(format!("{}:{}", user, pass)),
    };

    Ok(json!({
        "protocol": format!("{}:", parsed.scheme()),
        "auth": auth,
        "host": host,
        "hostname": hostname,
        "port": port,
        "pathname": parsed.path(),
        "search": search,
        "query": query,
        "hash": hash,
        "path": path,
        "href": parsed.as_str(),
    }))
}

fn format_parts(parts: &Value) -> Result<Value> {
    if let Some(href) = parts.get("href").and_then(Value::as_str) {
        return Ok(json!(href));
    }

    fn text<'a>(parts: &'a Value, key: &str) -> &'a str {
        parts.get(key).and_then(Value::as_str).unwrap_or_default()
    }

    let mut out = String::new();
    let protocol = text(parts, "protocol");
    if !protocol.is_empty() {
        out.push_str(protocol);
        if !protocol.ends_with(':') {
            out.push(':');
        }
        out.push_str("//");
    }
    match text(parts, "host") {
        "" => out.push_str(text(parts, "hostname")),
        host => out.push_str(host),
    }
    out.push_str(text(parts, "pathname"));
    let search = text(parts, "search");
    if !search.is_empty() && !search.starts_with('?') {
        out.push('?');
    }
    out.push_str(search);
    out.push_str(text(parts, "hash"));
    Ok(json!(out))
}

impl NativeModule for UrlModule {
    fn name(&self) -> &str {
        "url"
    }

    fn exports(&self) -> Vec<Export> {
        vec![Export::sync("parse"), Export::sync("resolve"), Export::sync("format")]
    }

    fn call(&self, function: &str, args: &[Value]) -> Result<Value> {
        match function {
            "parse" => parse(arg_str(args, 0, "url.parse")?),
            "resolve" => {
                let from = arg_str(args, 0, "url.resolve")?;
                let to = arg_str(args, 1, "url.resolve")?;
                let base = ::url::Url::parse(from)
                    .map_err(|e| Error::module_call(format!("url.resolve: {}", e)))?;
                let joined = base
                    .join(to)
                    .map_err(|e| Error::module_call(format!("url.resolve: {}", e)))?;
                Ok(json!(joined.as_str()))
            }
            "format" => format_parts(args.first().unwrap_or(&Value::Null)),
            other => Err(unknown_function("url", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_absolute() {
        let parsed = UrlModule
            .call("parse", &[json!("https://user:pw@api.example.com:8443/v1/users?page=2#top")])
            .unwrap();

        assert_eq!(parsed["protocol"], "https:");
        assert_eq!(parsed["auth"], "user:pw");
        assert_eq!(parsed["host"], "api.example.com:8443");
        assert_eq!(parsed["port"], "8443");
        assert_eq!(parsed["pathname"], "/v1/users");
        assert_eq!(parsed["search"], "?page=2");
        assert_eq!(parsed["query"]["page"], "2");
        assert_eq!(parsed["hash"], "#top");
    }

    #[test]
    fn test_parse_relative() {
        let parsed = UrlModule.call("parse", &[json!("/users?id=7")]).unwrap();
        assert!(parsed["protocol"].is_null());
        assert_eq!(parsed["pathname"], "/users");
        assert_eq!(parsed["query"]["id"], "7");
    }

    #[test]
    fn test_resolve_and_format() {
        let resolved = UrlModule
            .call("resolve", &[json!("https://example.com/a/b"), json!("../c")])
            .unwrap();
        assert_eq!(resolved, json!("https://example.com/c"));

        let formatted = UrlModule
            .call(
                "format",
                &[json!({"protocol": "https", "host": "example.com", "pathname": "/x", "search": "q=1"})],
            )
            .unwrap();
        assert_eq!(formatted, json!("https://example.com/x?q=1"));
    }
}
