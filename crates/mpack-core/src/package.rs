//! package.json reading and caching.
//!
//! A missing or malformed manifest is simply "no package here"; read and
//! parse failures never escape this module. Records are memoized by absolute
//! manifest path and shared by reference, so each manifest is read at most
//! once per build.

use rustc_hash::FxHashMap as HashMap;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::config::Target;

/// A package manifest, as far as the resolver cares about it.
#[derive(Debug, Clone)]
pub struct Package {
    /// Absolute path of the manifest file.
    pub pkgfile: PathBuf,
    /// Directory containing the manifest.
    pub pkgdir: PathBuf,
    pub name: Option<String>,
    pub main: Option<String>,
    pub module: Option<String>,
    /// Retained only when the package is reached through a symlink
    /// (a linked source checkout). String or object form.
    pub source: Option<Value>,
    /// String or object form.
    pub browser: Option<Value>,
    pub alias: Option<Value>,
    pub miniprogram: Option<String>,
    /// The full manifest value, for consumers keyed by arbitrary fields.
    pub raw: Value,
}

#[derive(Debug, Default, Deserialize)]
struct RawManifest {
    name: Option<String>,
    main: Option<String>,
    module: Option<String>,
    source: Option<Value>,
    browser: Option<Value>,
    alias: Option<Value>,
    miniprogram: Option<String>,
}

/// Reader with a process- or build-scoped manifest cache.
///
/// Negative results are cached too: a directory probed once without a
/// readable manifest is never read again during the build.
#[derive(Debug, Default)]
pub struct PackageReader {
    cache: RwLock<HashMap<PathBuf, Option<Arc<Package>>>>,
}

impl PackageReader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the manifest of `dir`, consulting the cache first.
    pub fn read(&self, dir: &Path) -> Option<Arc<Package>> {
        let pkgfile = dir.join("package.json");

        if let Some(cached) = self.cache.read().unwrap().get(&pkgfile) {
            return cached.clone();
        }

        let pkg = Self::read_uncached(&pkgfile, dir).map(Arc::new);
        self.cache
            .write()
            .unwrap()
            .insert(pkgfile, pkg.clone());
        pkg
    }

    fn read_uncached(pkgfile: &Path, dir: &Path) -> Option<Package> {
        let content = std::fs::read_to_string(pkgfile).ok()?;
        let value: Value = serde_json::from_str(&content).ok()?;
        let raw: RawManifest = serde_json::from_value(value.clone()).ok()?;

        let mut source = raw.source;
        if source.is_some() {
            // A `source` field only means anything for a linked checkout.
            // When the manifest's real path is the manifest itself (no
            // symlink on the way), the package is a published artifact and
            // the field is dropped.
            let real = std::fs::canonicalize(pkgfile).unwrap_or_else(|_| pkgfile.to_path_buf());
            if real == pkgfile {
                source = None;
            }
        }

        Some(Package {
            pkgfile: pkgfile.to_path_buf(),
            pkgdir: dir.to_path_buf(),
            name: raw.name,
            main: raw.main,
            module: raw.module,
            source,
            browser: raw.browser,
            alias: raw.alias,
            miniprogram: raw.miniprogram,
            raw: value,
        })
    }

    /// Find the nearest enclosing package of `dir`.
    ///
    /// Walks parents upward and returns the first readable manifest,
    /// stopping at a `node_modules` boundary so a nested dependency never
    /// inherits an outer project's manifest.
    pub fn find_package(&self, dir: &Path) -> Option<Arc<Package>> {
        let mut current = Some(dir);

        while let Some(d) = current {
            if d.file_name().is_some_and(|n| n == "node_modules") {
                break;
            }
            if let Some(pkg) = self.read(d) {
                return Some(pkg);
            }
            current = d.parent();
        }
        None
    }

    /// The `browser` field, when the build targets the browser.
    ///
    /// An object keyed by the package's own name is dereferenced once, so
    /// `{"my-pkg": "./lib/browser.js"}` yields the string directly.
    #[must_use]
    pub fn browser_field(pkg: &Package, target: &Target) -> Option<Value> {
        if !target.is_browser() {
            return None;
        }
        let browser = pkg.browser.as_ref()?;

        if let (Value::Object(map), Some(name)) = (browser, pkg.name.as_deref()) {
            if let Some(inner) = map.get(name) {
                return Some(inner.clone());
            }
        }
        Some(browser.clone())
    }

    /// Ordered entry-point candidates: `source`, `browser`, `main`,
    /// `module`. Non-string values are dropped, `"." | "./" | ""` defaults
    /// to `index`, and every candidate is joined onto the package dir.
    #[must_use]
    pub fn entries(pkg: &Package, target: &Target) -> Vec<PathBuf> {
        let browser = Self::browser_field(pkg, target);

        let candidates = [
            pkg.source.as_ref().and_then(Value::as_str),
            browser.as_ref().and_then(Value::as_str),
            pkg.main.as_deref(),
            pkg.module.as_deref(),
        ];

        candidates
            .into_iter()
            .flatten()
            .map(|entry| match entry {
                "." | "./" | "" => "index",
                other => other,
            })
            .map(|entry| pkg.pkgdir.join(entry))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_pkg(dir: &Path, json: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("package.json"), json).unwrap();
    }

    #[test]
    fn test_read_basic_fields() {
        let dir = tempdir().unwrap();
        write_pkg(
            dir.path(),
            r#"{"name": "demo", "main": "lib/index.js", "miniprogram": "miniprogram_dist"}"#,
        );

        let reader = PackageReader::new();
        let pkg = reader.read(dir.path()).unwrap();
        assert_eq!(pkg.name.as_deref(), Some("demo"));
        assert_eq!(pkg.main.as_deref(), Some("lib/index.js"));
        assert_eq!(pkg.miniprogram.as_deref(), Some("miniprogram_dist"));
        assert_eq!(pkg.pkgdir, dir.path());
    }

    #[test]
    fn test_read_is_cached() {
        let dir = tempdir().unwrap();
        write_pkg(dir.path(), r#"{"name": "first"}"#);

        let reader = PackageReader::new();
        let first = reader.read(dir.path()).unwrap();

        // Rewrite on disk; the cached record must win.
        write_pkg(dir.path(), r#"{"name": "second"}"#);
        let second = reader.read(dir.path()).unwrap();
        assert_eq!(second.name, first.name);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_read_malformed_is_absent() {
        let dir = tempdir().unwrap();
        write_pkg(dir.path(), "not json at all");

        let reader = PackageReader::new();
        assert!(reader.read(dir.path()).is_none());
        // Negative result cached: still absent.
        assert!(reader.read(dir.path()).is_none());
    }

    #[test]
    fn test_source_stripped_without_symlink() {
        let dir = tempdir().unwrap();
        write_pkg(
            dir.path(),
            r#"{"name": "compiled", "source": "src/index.ts", "main": "lib/index.js"}"#,
        );

        let reader = PackageReader::new();
        let pkg = reader.read(&fs::canonicalize(dir.path()).unwrap()).unwrap();
        assert!(pkg.source.is_none());
        assert_eq!(pkg.main.as_deref(), Some("lib/index.js"));
    }

    #[cfg(unix)]
    #[test]
    fn test_source_kept_through_symlink() {
        let dir = tempdir().unwrap();
        let real = fs::canonicalize(dir.path()).unwrap();
        let target = real.join("checkout");
        write_pkg(
            &target,
            r#"{"name": "linked", "source": "src/index.ts"}"#,
        );
        let link = real.join("linked");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let reader = PackageReader::new();
        let pkg = reader.read(&link).unwrap();
        assert_eq!(
            pkg.source.as_ref().and_then(Value::as_str),
            Some("src/index.ts")
        );
    }

    #[test]
    fn test_find_package_stops_at_node_modules() {
        let dir = tempdir().unwrap();
        write_pkg(dir.path(), r#"{"name": "outer"}"#);
        let inner = dir.path().join("node_modules").join("dep").join("lib");
        fs::create_dir_all(&inner).unwrap();

        let reader = PackageReader::new();
        // No manifest between lib/ and the node_modules boundary: the walk
        // must not escape into the outer project.
        assert!(reader.find_package(&inner).is_none());

        write_pkg(
            &dir.path().join("node_modules").join("dep"),
            r#"{"name": "dep"}"#,
        );
        let reader = PackageReader::new();
        let pkg = reader.find_package(&inner).unwrap();
        assert_eq!(pkg.name.as_deref(), Some("dep"));
    }

    #[test]
    fn test_browser_field_target_gated() {
        let dir = tempdir().unwrap();
        write_pkg(dir.path(), r#"{"name": "p", "browser": "./b.js"}"#);

        let reader = PackageReader::new();
        let pkg = reader.read(dir.path()).unwrap();

        let browser = PackageReader::browser_field(&pkg, &Target::Browser);
        assert_eq!(browser.as_ref().and_then(Value::as_str), Some("./b.js"));
        assert!(
            PackageReader::browser_field(&pkg, &Target::Other("wechat".into())).is_none()
        );
    }

    #[test]
    fn test_browser_field_self_name_dereferenced() {
        let dir = tempdir().unwrap();
        write_pkg(
            dir.path(),
            r#"{"name": "p", "browser": {"p": "./browser.js"}}"#,
        );

        let reader = PackageReader::new();
        let pkg = reader.read(dir.path()).unwrap();
        let browser = PackageReader::browser_field(&pkg, &Target::Browser);
        assert_eq!(
            browser.as_ref().and_then(Value::as_str),
            Some("./browser.js")
        );
    }

    #[test]
    fn test_entries_order_and_defaults() {
        let dir = tempdir().unwrap();
        write_pkg(
            dir.path(),
            r#"{"name": "p", "main": ".", "module": "esm/index.js"}"#,
        );

        let reader = PackageReader::new();
        let pkg = reader.read(dir.path()).unwrap();
        let entries = PackageReader::entries(&pkg, &Target::Browser);
        assert_eq!(
            entries,
            vec![dir.path().join("index"), dir.path().join("esm/index.js")]
        );
    }
}
