//! `fs`: filesystem access scoped to the collection and its context roots.
//!
//! Only bound when a collection opts into filesystem access. Every path is
//! checked with [`resolve_within_roots`] before it is touched.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use scriptbox_core::{
    fs_policy::resolve_within_roots, traits::Export, traits::NativeModule, Error, Result,
};

use crate::inbuilt::{arg, arg_str, arg_text, unknown_function};

/// Synchronous subset of Node's `fs`.
pub struct FilesystemModule {
    /// Relative paths resolve against this directory.
    base: PathBuf,
    /// Directories the module may touch.
    roots: Vec<PathBuf>,
}

impl FilesystemModule {
    /// Scope the module to `base` plus any additional roots.
    pub fn new(base: PathBuf, additional_roots: Vec<PathBuf>) -> Self {
        let mut roots = vec![base.clone()];
        roots.extend(additional_roots);
        Self { base, roots }
    }

    /// Directories this module may touch.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn resolve(&self, args: &[Value], function: &str) -> Result<PathBuf> {
        let input = arg_str(args, 0, function)?;
        resolve_within_roots(&self.roots, &self.base, input)
    }

    fn io_error(function: &str, path: &str, err: std::io::Error) -> Error {
        Error::module_call(format!("{}: {} '{}'", function, err, path))
    }
}

/// Encoding named by a Node-style `encoding` argument or options object.
fn encoding(options: &Value) -> Option<&str> {
    match options {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get("encoding").and_then(Value::as_str),
        _ => None,
    }
}

impl NativeModule for FilesystemModule {
    fn name(&self) -> &str {
        "fs"
    }

    fn exports(&self) -> Vec<Export> {
        [
            "readFileSync",
            "writeFileSync",
            "appendFileSync",
            "existsSync",
            "readdirSync",
            "mkdirSync",
            "unlinkSync",
            "statSync",
        ]
        .into_iter()
        .map(Export::sync)
        .collect()
    }

    fn adapter(&self) -> Option<&str> {
        Some("fs")
    }

    fn call(&self, function: &str, args: &[Value]) -> Result<Value> {
        let raw = arg_text(args, 0);
        match function {
            "existsSync" => Ok(json!(self
                .resolve(args, function)
                .map(|path| path.exists())
                .unwrap_or(false))),
            "readFileSync" => {
                let path = self.resolve(args, function)?;
                let bytes = std::fs::read(&path).map_err(|e| Self::io_error(function, &raw, e))?;
                match encoding(arg(args, 1)) {
                    Some("base64") => Ok(json!(STANDARD.encode(bytes))),
                    Some("latin1") | Some("binary") => {
                        Ok(json!(bytes.into_iter().map(char::from).collect::<String>()))
                    }
                    _ => Ok(json!(String::from_utf8_lossy(&bytes))),
                }
            }
            "writeFileSync" | "appendFileSync" => {
                let path = self.resolve(args, function)?;
                let contents = match arg(args, 1) {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let result = if function == "writeFileSync" {
                    std::fs::write(&path, contents)
                } else {
                    use std::io::Write;
                    std::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&path)
                        .and_then(|mut file| file.write_all(contents.as_bytes()))
                };
                result.map_err(|e| Self::io_error(function, &raw, e))?;
                Ok(Value::Null)
            }
            "readdirSync" => {
                let path = self.resolve(args, function)?;
                let mut names: Vec<String> = std::fs::read_dir(&path)
                    .map_err(|e| Self::io_error(function, &raw, e))?
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.file_name().to_string_lossy().into_owned())
                    .collect();
                names.sort();
                Ok(json!(names))
            }
            "mkdirSync" => {
                let path = self.resolve(args, function)?;
                let recursive = arg(args, 1)
                    .get("recursive")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let result = if recursive {
                    std::fs::create_dir_all(&path)
                } else {
                    std::fs::create_dir(&path)
                };
                result.map_err(|e| Self::io_error(function, &raw, e))?;
                Ok(Value::Null)
            }
            "unlinkSync" => {
                let path = self.resolve(args, function)?;
                std::fs::remove_file(&path).map_err(|e| Self::io_error(function, &raw, e))?;
                Ok(Value::Null)
            }
            "statSync" => {
                let path = self.resolve(args, function)?;
                let meta = std::fs::metadata(&path).map_err(|e| Self::io_error(function, &raw, e))?;
                let mtime_ms = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_millis() as u64);
                Ok(json!({
                    "size": meta.len(),
                    "isFile": meta.is_file(),
                    "isDirectory": meta.is_dir(),
                    "mtimeMs": mtime_ms,
                }))
            }
            other => Err(unknown_function("fs", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_within_root() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FilesystemModule::new(dir.path().to_path_buf(), Vec::new());

        fs.call("writeFileSync", &[json!("out.txt"), json!("hello")]).unwrap();
        fs.call("appendFileSync", &[json!("out.txt"), json!(" world")]).unwrap();

        let read = fs.call("readFileSync", &[json!("out.txt"), json!("utf8")]).unwrap();
        assert_eq!(read, json!("hello world"));
        assert_eq!(fs.call("existsSync", &[json!("out.txt")]).unwrap(), json!(true));

        let stat = fs.call("statSync", &[json!("out.txt")]).unwrap();
        assert_eq!(stat["size"], json!(11));
        assert_eq!(stat["isFile"], json!(true));
    }

    #[test]
    fn test_escape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FilesystemModule::new(dir.path().to_path_buf(), Vec::new());

        let err = fs.call("readFileSync", &[json!("../../etc/passwd")]).unwrap_err();
        assert!(matches!(err, Error::SecurityViolation(_)));
        assert_eq!(fs.call("existsSync", &[json!("/etc/passwd")]).unwrap(), json!(false));
    }

    #[test]
    fn test_additional_root() {
        let collection = tempfile::tempdir().unwrap();
        let shared = tempfile::tempdir().unwrap();
        std::fs::write(shared.path().join("fixture.json"), "{\"ok\":true}").unwrap();

        let fs = FilesystemModule::new(
            collection.path().to_path_buf(),
            vec![shared.path().to_path_buf()],
        );
        let path = shared.path().join("fixture.json");
        let read = fs
            .call("readFileSync", &[json!(path.to_string_lossy()), json!({"encoding": "utf8"})])
            .unwrap();
        assert_eq!(read, json!("{\"ok\":true}"));
    }

    #[test]
    fn test_directories() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FilesystemModule::new(dir.path().to_path_buf(), Vec::new());

        fs.call("mkdirSync", &[json!("a/b"), json!({"recursive": true})]).unwrap();
        fs.call("writeFileSync", &[json!("a/b/x.txt"), json!("1")]).unwrap();
        assert_eq!(fs.call("readdirSync", &[json!("a/b")]).unwrap(), json!(["x.txt"]));

        fs.call("unlinkSync", &[json!("a/b/x.txt")]).unwrap();
        assert_eq!(fs.call("readdirSync", &[json!("a/b")]).unwrap(), json!([]));
    }
}
