//! Filesystem security policy enforcement.
//!
//! Scripts that are granted filesystem access only ever see paths inside the
//! collection directory or one of the configured additional roots. Paths are
//! normalized lexically first, then re-checked after symlink resolution. Paths
//! that do not exist yet are resolved through their deepest existing ancestor.

use crate::{Error, Result};
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Normalize `.` and `..` components without touching the filesystem.
///
/// Leading `..` components that would climb above the path's start are kept,
/// so callers can still detect an escape with `starts_with`.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                let popped = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                ) && normalized.pop();
                if !popped && !normalized.has_root() {
                    normalized.push("..");
                }
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Turn configured context roots into absolute paths.
///
/// Absolute entries are kept as-is; relative entries are joined onto the
/// collection path.
pub fn resolve_context_roots(collection_path: &Path, roots: &[String]) -> Vec<PathBuf> {
    roots
        .iter()
        .map(|root| {
            let root = Path::new(root);
            if root.is_absolute() {
                normalize_path(root)
            } else {
                normalize_path(&collection_path.join(root))
            }
        })
        .collect()
}

/// Where `path` really lands once symlinks are followed.
///
/// The deepest existing ancestor is canonicalized and the missing tail is
/// appended, so a path that does not exist yet is still judged by the
/// directory it would be created in. A dangling symlink on the way is an error.
pub fn real_location(path: &Path) -> Result<PathBuf> {
    let mut existing = if path.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        path.to_path_buf()
    };
    let mut missing: Vec<OsString> = Vec::new();

    loop {
        match std::fs::symlink_metadata(&existing) {
            Ok(meta) => {
                if meta.file_type().is_symlink() && std::fs::metadata(&existing).is_err() {
                    return Err(Error::SecurityViolation(format!(
                        "Access denied: {} is a dangling symlink",
                        existing.display()
                    )));
                }
                break;
            }
            Err(_) => match (existing.file_name(), existing.parent()) {
                (Some(name), Some(parent)) => {
                    missing.push(name.to_os_string());
                    existing = if parent.as_os_str().is_empty() {
                        PathBuf::from(".")
                    } else {
                        parent.to_path_buf()
                    };
                }
                _ => break,
            },
        }
    }

    let mut real = existing.canonicalize()?;
    for part in missing.iter().rev() {
        real.push(part);
    }
    Ok(real)
}

/// Resolve `input` against `base` and ensure the result stays inside one of `roots`.
///
/// This function:
/// 1. Joins relative input onto `base` (absolute input is taken as-is).
/// 2. Normalizes the result lexically.
/// 3. Rejects it unless it lies under a root.
/// 4. Re-checks the real location (symlinks followed) against the real roots.
pub fn resolve_within_roots(roots: &[PathBuf], base: &Path, input: &str) -> Result<PathBuf> {
    if input.is_empty() {
        return Err(Error::SecurityViolation(
            "Empty path is not allowed".to_string(),
        ));
    }

    let candidate = Path::new(input);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    };
    let normalized = normalize_path(&joined);

    if !roots.iter().any(|root| normalized.starts_with(root)) {
        return Err(Error::SecurityViolation(format!(
            "Access denied: path {} is outside of the allowed roots",
            input
        )));
    }

    // Symlinks can point anywhere; check where the path really lands
    let real = real_location(&normalized)?;
    let inside = roots.iter().any(|root| {
        real_location(root)
            .map(|real_root| real.starts_with(real_root))
            .unwrap_or(false)
    });
    if !inside {
        return Err(Error::SecurityViolation(format!(
            "Access denied: path {} resolves outside of the allowed roots",
            input
        )));
    }

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize_path(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(normalize_path(Path::new("/../etc")), PathBuf::from("/etc"));
        assert_eq!(normalize_path(Path::new("a/../../b")), PathBuf::from("../b"));
    }

    #[test]
    fn test_context_roots() {
        let roots = resolve_context_roots(
            Path::new("/collections/petstore"),
            &["../shared".to_string(), "/opt/scripts".to_string()],
        );
        assert_eq!(
            roots,
            vec![PathBuf::from("/collections/shared"), PathBuf::from("/opt/scripts")]
        );
    }

    #[test]
    fn test_valid_paths() {
        let roots = vec![PathBuf::from("/workspace"), PathBuf::from("/shared")];
        let base = Path::new("/workspace");

        assert_eq!(
            resolve_within_roots(&roots, base, "data/users.json").unwrap(),
            PathBuf::from("/workspace/data/users.json")
        );
        assert_eq!(
            resolve_within_roots(&roots, base, "./local.txt").unwrap(),
            PathBuf::from("/workspace/local.txt")
        );
        assert_eq!(
            resolve_within_roots(&roots, base, "/shared/lib.js").unwrap(),
            PathBuf::from("/shared/lib.js")
        );
    }

    #[test]
    fn test_traversal_rejection() {
        let roots = vec![PathBuf::from("/workspace")];
        let base = Path::new("/workspace");

        assert!(resolve_within_roots(&roots, base, "../etc/passwd").is_err());
        assert!(resolve_within_roots(&roots, base, "src/../../etc/passwd").is_err());
        assert!(resolve_within_roots(&roots, base, "/etc/passwd").is_err());
        assert!(resolve_within_roots(&roots, base, "").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejection() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "s3cr3t").unwrap();

        let root = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("link")).unwrap();

        let roots = vec![root.path().to_path_buf()];
        let result = resolve_within_roots(&roots, root.path(), "link/secret.txt");
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected_for_new_files() {
        let outside = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("link")).unwrap();

        let roots = vec![root.path().to_path_buf()];
        assert!(resolve_within_roots(&roots, root.path(), "link/new.txt").is_err());
        assert!(resolve_within_roots(&roots, root.path(), "link/deeper/new.txt").is_err());
        assert!(resolve_within_roots(&roots, root.path(), "plain/new.txt").is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_rejected() {
        let root = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink("/nonexistent/scriptbox-target", root.path().join("dangling"))
            .unwrap();

        let roots = vec![root.path().to_path_buf()];
        let err = resolve_within_roots(&roots, root.path(), "dangling").unwrap_err();
        assert!(err.to_string().contains("dangling symlink"));
        assert!(resolve_within_roots(&roots, root.path(), "dangling/child.txt").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_inside_root_allowed() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("data")).unwrap();
        std::os::unix::fs::symlink(root.path().join("data"), root.path().join("alias")).unwrap();

        let roots = vec![root.path().to_path_buf()];
        let resolved = resolve_within_roots(&roots, root.path(), "alias/out.txt").unwrap();
        assert_eq!(resolved, root.path().join("alias/out.txt"));
    }
}
