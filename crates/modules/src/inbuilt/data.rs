//! `lodash`: data helpers over plain JSON values.
//!
//! Only the value-oriented part of lodash is provided. Functions passed as
//! iteratees do not survive the trip to native code, so predicate-driven
//! helpers are left out.

use serde_json::{json, Map, Value};

use scriptbox_core::{traits::Export, traits::NativeModule, Result};

use super::{arg, unknown_function};

/// Lodash subset exposed as `_`.
pub struct LodashModule;

const EXPORTS: &[&str] = &[
    "get",
    "has",
    "isEmpty",
    "isEqual",
    "isNil",
    "pick",
    "omit",
    "keys",
    "values",
    "uniq",
    "flatten",
    "flattenDeep",
    "compact",
    "chunk",
    "sum",
    "merge",
    "cloneDeep",
    "size",
    "head",
    "last",
    "includes",
];

/// Split `a.b[0].c` (or an array of keys) into path segments.
fn path_segments(path: &Value) -> Vec<String> {
    match path {
        Value::Array(parts) => parts
            .iter()
            .map(|p| match p {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Value::String(s) => s
            .replace('[', ".")
            .replace(']', "")
            .split('.')
            .filter(|segment| !segment.is_empty())
            .map(|segment| segment.trim_matches(|c| c == '"' || c == '\'').to_string())
            .collect(),
        Value::Number(n) => vec![n.to_string()],
        _ => Vec::new(),
    }
}

fn lookup<'a>(value: &'a Value, segments: &[String]) -> Option<&'a Value> {
    segments.iter().try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f == 0.0),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Keys named by the remaining arguments, flattening arrays.
fn key_list(args: &[Value]) -> Vec<String> {
    args.iter()
        .flat_map(|a| match a {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        })
        .filter_map(|k| k.as_str().map(str::to_string))
        .collect()
}

fn flatten_into(items: &[Value], deep: bool, out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Array(inner) if deep => flatten_into(inner, true, out),
            Value::Array(inner) => out.extend(inner.iter().cloned()),
            other => out.push(other.clone()),
        }
    }
}

fn merge_into(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_into(existing, value)
                    }
                    _ => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, source) if !source.is_null() => *target = source.clone(),
        _ => {}
    }
}

fn as_items(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Object(map) => map.values().cloned().collect(),
        Value::String(s) => s.chars().map(|c| json!(c.to_string())).collect(),
        _ => Vec::new(),
    }
}

impl NativeModule for LodashModule {
    fn name(&self) -> &str {
        "lodash"
    }

    fn exports(&self) -> Vec<Export> {
        EXPORTS.iter().copied().map(Export::sync).collect()
    }

    fn call(&self, function: &str, args: &[Value]) -> Result<Value> {
        let target = arg(args, 0);
        let result = match function {
            "get" => lookup(target, &path_segments(arg(args, 1)))
                .filter(|v| !v.is_null())
                .cloned()
                .unwrap_or_else(|| arg(args, 2).clone()),
            "has" => {
                let segments = path_segments(arg(args, 1));
                json!(!segments.is_empty() && lookup(target, &segments).is_some())
            }
            "isEmpty" => json!(is_empty(target)),
            "isEqual" => json!(target == arg(args, 1)),
            "isNil" => json!(target.is_null()),
            "pick" => {
                let keys = key_list(&args[1.min(args.len())..]);
                let picked: Map<String, Value> = target
                    .as_object()
                    .map(|map| {
                        keys.iter()
                            .filter_map(|k| map.get(k).map(|v| (k.clone(), v.clone())))
                            .collect()
                    })
                    .unwrap_or_default();
                Value::Object(picked)
            }
            "omit" => {
                let keys = key_list(&args[1.min(args.len())..]);
                let kept: Map<String, Value> = target
                    .as_object()
                    .map(|map| {
                        map.iter()
                            .filter(|(k, _)| !keys.contains(k))
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                Value::Object(kept)
            }
            "keys" => match target {
                Value::Object(map) => json!(map.keys().collect::<Vec<_>>()),
                Value::Array(items) => json!((0..items.len()).map(|i| i.to_string()).collect::<Vec<_>>()),
                _ => json!([]),
            },
            "values" => Value::Array(as_items(target)),
            "uniq" => {
                let mut seen: Vec<Value> = Vec::new();
                for item in as_items(target) {
                    if !seen.contains(&item) {
                        seen.push(item);
                    }
                }
                Value::Array(seen)
            }
            "flatten" | "flattenDeep" => {
                let mut out = Vec::new();
                flatten_into(&as_items(target), function == "flattenDeep", &mut out);
                Value::Array(out)
            }
            "compact" => Value::Array(as_items(target).into_iter().filter(|v| !is_falsy(v)).collect()),
            "chunk" => {
                let items = as_items(target);
                // lodash truncates the size; below one yields no chunks
                let size = match arg(args, 1) {
                    Value::Null => 1.0,
                    Value::Number(n) => n.as_f64().unwrap_or(0.0).trunc(),
                    Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0).trunc(),
                    _ => 0.0,
                };
                if size < 1.0 || items.is_empty() {
                    Value::Array(Vec::new())
                } else {
                    let size = if size >= items.len() as f64 { items.len() } else { size as usize };
                    Value::Array(items.chunks(size).map(|c| Value::Array(c.to_vec())).collect())
                }
            }
            "sum" => json!(as_items(target).iter().filter_map(Value::as_f64).sum::<f64>()),
            "merge" => {
                let mut merged = if target.is_object() { target.clone() } else { json!({}) };
                for source in args.iter().skip(1) {
                    merge_into(&mut merged, source);
                }
                merged
            }
            "cloneDeep" => target.clone(),
            "size" => json!(match target {
                Value::String(s) => s.chars().count(),
                other => as_items(other).len(),
            }),
            "head" => as_items(target).into_iter().next().unwrap_or(Value::Null),
            "last" => as_items(target).pop().unwrap_or(Value::Null),
            "includes" => {
                let needle = arg(args, 1);
                json!(match (target, needle) {
                    (Value::String(haystack), Value::String(n)) => haystack.contains(n.as_str()),
                    _ => as_items(target).contains(needle),
                })
            }
            other => return Err(unknown_function("lodash", other)),
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(function: &str, args: Value) -> Value {
        let args = args.as_array().cloned().unwrap_or_default();
        LodashModule.call(function, &args).unwrap()
    }

    #[test]
    fn test_get_and_has() {
        let data = json!({"user": {"tags": ["a", "b"], "name": "ada"}});
        assert_eq!(call("get", json!([data, "user.tags[1]"])), json!("b"));
        assert_eq!(call("get", json!([data, ["user", "name"]])), json!("ada"));
        assert_eq!(call("get", json!([data, "user.missing", "dflt"])), json!("dflt"));
        assert_eq!(call("has", json!([data, "user.name"])), json!(true));
        assert_eq!(call("has", json!([data, "user.age"])), json!(false));
    }

    #[test]
    fn test_pick_omit() {
        let data = json!({"a": 1, "b": 2, "c": 3});
        assert_eq!(call("pick", json!([data, ["a", "c"]])), json!({"a": 1, "c": 3}));
        assert_eq!(call("omit", json!([data, "b"])), json!({"a": 1, "c": 3}));
    }

    #[test]
    fn test_collections() {
        assert_eq!(call("uniq", json!([[1, 2, 1, 3]])), json!([1, 2, 3]));
        assert_eq!(call("flatten", json!([[1, [2, [3]]]])), json!([1, 2, [3]]));
        assert_eq!(call("flattenDeep", json!([[1, [2, [3]]]])), json!([1, 2, 3]));
        assert_eq!(call("compact", json!([[0, 1, false, "", "x", null]])), json!([1, "x"]));
        assert_eq!(call("chunk", json!([[1, 2, 3], 2])), json!([[1, 2], [3]]));
        assert_eq!(call("chunk", json!([[1, 2, 3], 1e20])), json!([[1, 2, 3]]));
        assert_eq!(call("chunk", json!([[1, 2, 3], 2.9])), json!([[1, 2], [3]]));
        assert_eq!(call("chunk", json!([[1, 2, 3], 0])), json!([]));
        assert_eq!(call("chunk", json!([[1, 2, 3]])), json!([[1], [2], [3]]));
        assert_eq!(call("sum", json!([[1, 2, 3.5]])), json!(6.5));
        assert_eq!(call("isEmpty", json!([{}])), json!(true));
        assert_eq!(call("isEqual", json!([{"a": [1]}, {"a": [1]}])), json!(true));
    }

    #[test]
    fn test_merge() {
        assert_eq!(
            call("merge", json!([{"a": {"x": 1}}, {"a": {"y": 2}, "b": 3}])),
            json!({"a": {"x": 1, "y": 2}, "b": 3})
        );
    }
}
