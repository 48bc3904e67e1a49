//! Path canonicalization helpers.
//!
//! All request strings travel through the build in unix form; output paths
//! are reconciled against the rendition extension in exactly one place
//! (`reconcile_extension`) so the `.es6 -> .js` style rewrites cannot drift
//! between the dist mapper and the asset writer.

use std::path::{Component, Path, PathBuf};

/// Replace platform separators with `/`. Idempotent.
#[must_use]
pub fn to_unix(p: &str) -> String {
    p.replace('\\', "/")
}

/// Prefix `./` unless the string already begins with `.` or `/`.
///
/// Produces require-style relative strings for emitted code.
#[must_use]
pub fn promote_relative(p: &str) -> String {
    if p.starts_with('.') || p.starts_with('/') {
        p.to_string()
    } else {
        format!("./{p}")
    }
}

/// Normalize a path by folding `.` and `..` components without touching the
/// filesystem.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut result = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if matches!(result.last(), Some(Component::Normal(_))) {
                    result.pop();
                } else if !matches!(result.last(), Some(Component::RootDir)) {
                    result.push(component);
                }
            }
            Component::CurDir => {}
            other => result.push(other),
        }
    }
    result.iter().collect()
}

/// Compute `target` relative to `base` (both absolute), lexically.
#[must_use]
pub fn relative(base: &Path, target: &Path) -> PathBuf {
    pathdiff::diff_paths(target, base).unwrap_or_else(|| target.to_path_buf())
}

/// Reconcile a chosen output path against a rendition extension.
///
/// If the path has no extension the extension is appended; if it has one
/// that differs, it is replaced. `ext` carries its leading dot (`".js"`);
/// `None` or an empty string leaves the path untouched.
#[must_use]
pub fn reconcile_extension(path: &Path, ext: Option<&str>) -> PathBuf {
    let Some(ext) = ext.filter(|e| !e.is_empty()) else {
        return path.to_path_buf();
    };
    let bare = ext.trim_start_matches('.');

    match path.extension().and_then(|e| e.to_str()) {
        None => {
            let mut s = path.as_os_str().to_os_string();
            s.push(format!(".{bare}"));
            PathBuf::from(s)
        }
        Some(current) if current != bare => path.with_extension(bare),
        Some(_) => path.to_path_buf(),
    }
}
