//! `path`: POSIX path manipulation.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use scriptbox_core::{fs_policy::normalize_path, traits::Export, traits::NativeModule, Result};

use super::{arg_str, arg_text, unknown_function};

/// POSIX flavoured `path` helpers. `resolve` anchors at the collection path.
pub struct PathModule {
    cwd: PathBuf,
}

impl PathModule {
    /// Resolve relative paths against `cwd`.
    pub fn with_cwd(cwd: &Path) -> Self {
        Self {
            cwd: cwd.to_path_buf(),
        }
    }
}

fn display(path: &Path) -> String {
    let rendered = path.to_string_lossy().into_owned();
    if rendered.is_empty() {
        ".".to_string()
    } else {
        rendered
    }
}

fn basename(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

fn extname(path: &str) -> &str {
    let base = basename(path);
    match base.rfind('.') {
        Some(0) | None => "",
        Some(i) => &base[i..],
    }
}

fn dirname(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(i) => trimmed[..i].to_string(),
        None if path.starts_with('/') => "/".to_string(),
        None => ".".to_string(),
    }
}

impl NativeModule for PathModule {
    fn name(&self) -> &str {
        "path"
    }

    fn exports(&self) -> Vec<Export> {
        [
            "join",
            "resolve",
            "normalize",
            "basename",
            "dirname",
            "extname",
            "isAbsolute",
            "relative",
        ]
        .into_iter()
        .map(Export::sync)
        .collect()
    }

    fn call(&self, function: &str, args: &[Value]) -> Result<Value> {
        match function {
            "join" => {
                let joined = args
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|segment| !segment.is_empty())
                    .collect::<Vec<_>>()
                    .join("/");
                Ok(json!(display(&normalize_path(Path::new(&joined)))))
            }
            "resolve" => {
                let mut resolved = self.cwd.clone();
                for segment in args.iter().filter_map(Value::as_str) {
                    resolved.push(segment);
                }
                Ok(json!(display(&normalize_path(&resolved))))
            }
            "normalize" => {
                let input = arg_str(args, 0, "path.normalize")?;
                let mut normalized = display(&normalize_path(Path::new(input)));
                if input.ends_with('/') && !normalized.ends_with('/') {
                    normalized.push('/');
                }
                Ok(json!(normalized))
            }
            "basename" => {
                let input = arg_str(args, 0, "path.basename")?;
                let base = basename(input);
                let ext = arg_text(args, 1);
                let stripped = match base.strip_suffix(ext.as_str()) {
                    Some(stem) if !ext.is_empty() && !stem.is_empty() => stem,
                    _ => base,
                };
                Ok(json!(stripped))
            }
            "dirname" => Ok(json!(dirname(arg_str(args, 0, "path.dirname")?))),
            "extname" => Ok(json!(extname(arg_str(args, 0, "path.extname")?))),
            "isAbsolute" => Ok(json!(arg_str(args, 0, "path.isAbsolute")?.starts_with('/'))),
            "relative" => {
                let from = normalize_path(&self.cwd.join(arg_str(args, 0, "path.relative")?));
                let to = normalize_path(&self.cwd.join(arg_str(args, 1, "path.relative")?));

                let from_parts: Vec<_> = from.components().collect();
                let to_parts: Vec<_> = to.components().collect();
                let common = from_parts
                    .iter()
                    .zip(&to_parts)
                    .take_while(|(a, b)| a == b)
                    .count();

                let mut relative = PathBuf::new();
                for _ in common..from_parts.len() {
                    relative.push("..");
                }
                for part in &to_parts[common..] {
                    relative.push(part.as_os_str());
                }
                Ok(json!(relative.to_string_lossy()))
            }
            other => Err(unknown_function("path", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(function: &str, args: Value) -> Value {
        let module = PathModule::with_cwd(Path::new("/collections/petstore"));
        let args = args.as_array().cloned().unwrap_or_default();
        module.call(function, &args).unwrap()
    }

    #[test]
    fn test_join_and_normalize() {
        assert_eq!(call("join", json!(["a", "b", "../c.json"])), json!("a/c.json"));
        assert_eq!(call("join", json!(["/root", "./x"])), json!("/root/x"));
        assert_eq!(call("normalize", json!(["a//b/./c/"])), json!("a/b/c/"));
    }

    #[test]
    fn test_resolve_uses_collection_path() {
        assert_eq!(
            call("resolve", json!(["data", "users.json"])),
            json!("/collections/petstore/data/users.json")
        );
        assert_eq!(call("resolve", json!(["/tmp", "x"])), json!("/tmp/x"));
    }

    #[test]
    fn test_components() {
        assert_eq!(call("basename", json!(["/a/b/file.txt"])), json!("file.txt"));
        assert_eq!(call("basename", json!(["/a/b/file.txt", ".txt"])), json!("file"));
        assert_eq!(call("dirname", json!(["/a/b/file.txt"])), json!("/a/b"));
        assert_eq!(call("dirname", json!(["file.txt"])), json!("."));
        assert_eq!(call("extname", json!(["archive.tar.gz"])), json!(".gz"));
        assert_eq!(call("extname", json!([".bashrc"])), json!(""));
        assert_eq!(call("isAbsolute", json!(["/a"])), json!(true));
    }

    #[test]
    fn test_relative() {
        assert_eq!(call("relative", json!(["/a/b/c", "/a/d"])), json!("../../d"));
    }
}
