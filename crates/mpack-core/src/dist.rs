//! Source-path to output-path mapping.
//!
//! Every discovered file lands under `out_dir` at a location derived from
//! where it came from: source files mirror the source tree, alias-rooted
//! files land under their configured dist prefix, and third-party modules
//! collapse into the flat `npm/` convention mini-program runtimes expect.

use rustc_hash::FxHashMap as HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::config::{AliasEntry, InitOptions};
use crate::paths::{normalize_path, reconcile_extension, relative, to_unix};

/// Maps real source paths to dist paths. Memoized per instance, so a
/// long-running process with several builds keeps them isolated.
#[derive(Debug)]
pub struct DistPathMapper {
    options: Arc<InitOptions>,
    alias: Vec<(String, AliasEntry)>,
    /// Chosen path before extension reconciliation, keyed by source path.
    cache: RwLock<HashMap<PathBuf, PathBuf>>,
}

impl DistPathMapper {
    #[must_use]
    pub fn new(options: Arc<InitOptions>) -> Self {
        let alias = options.alias_entries();
        Self {
            options,
            alias,
            cache: RwLock::new(HashMap::default()),
        }
    }

    /// Compute the output path for `source_path`, reconciling against the
    /// rendition extension `ext` (leading dot, may be `None`).
    ///
    /// Deterministic and idempotent for a fixed configuration.
    #[must_use]
    pub fn generate(&self, source_path: &Path, ext: Option<&str>) -> PathBuf {
        if let Some(chosen) = self.cache.read().unwrap().get(source_path) {
            return reconcile_extension(chosen, ext);
        }

        let chosen = self.choose(source_path);
        self.cache
            .write()
            .unwrap()
            .insert(source_path.to_path_buf(), chosen.clone());
        reconcile_extension(&chosen, ext)
    }

    /// Pick the pre-reconciliation output location; first rule that fires
    /// wins.
    fn choose(&self, source_path: &Path) -> PathBuf {
        let out_dir = &self.options.out_dir;

        // Source files mirror the source tree.
        if let Ok(rel) = source_path.strip_prefix(&self.options.source_dir) {
            return out_dir.join(rel);
        }

        // Alias-rooted files: out/<dist or npm>/<aliasName>/<rel>.
        for (name, entry) in &self.alias {
            let alias_root = self.alias_root(&entry.path);
            if let Ok(rel) = source_path.strip_prefix(&alias_root) {
                let dist = entry.dist.as_deref().unwrap_or("npm");
                return out_dir.join(dist).join(name).join(rel);
            }
        }

        // Anything reached through node_modules (or an already-flattened
        // npm tree) collapses under out/npm, keyed by the last such
        // segment so nested installs stay flat.
        let unix = to_unix(&source_path.display().to_string());
        for marker in ["/node_modules/", "/npm/"] {
            if let Some(pos) = unix.rfind(marker) {
                let remainder = &unix[pos + marker.len()..];
                return out_dir.join("npm").join(remainder);
            }
        }

        // Fallback: relative to the source dir. A path outside it yields
        // `..` components, which the writer reports as ignored.
        out_dir.join(relative(&self.options.source_dir, source_path))
    }

    /// Anchor a configured alias path the same way the resolver does.
    fn alias_root(&self, path: &str) -> PathBuf {
        if path.starts_with('.') {
            normalize_path(&self.options.root_dir.join(path))
        } else {
            PathBuf::from(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AliasValue;

    fn mapper(opts: InitOptions) -> DistPathMapper {
        DistPathMapper::new(Arc::new(opts))
    }

    fn options() -> InitOptions {
        InitOptions::new("/proj/src", "/proj/dist").with_root_dir("/proj")
    }

    #[test]
    fn test_source_file_mirrors_tree() {
        let m = mapper(options());
        assert_eq!(
            m.generate(Path::new("/proj/src/pages/home/home.js"), None),
            PathBuf::from("/proj/dist/pages/home/home.js")
        );
    }

    #[test]
    fn test_extension_rewrite() {
        let m = mapper(options());
        assert_eq!(
            m.generate(Path::new("/proj/src/utils/index.ts"), Some(".js")),
            PathBuf::from("/proj/dist/utils/index.js")
        );
        assert_eq!(
            m.generate(Path::new("/proj/src/app.less"), Some(".wxss")),
            PathBuf::from("/proj/dist/app.wxss")
        );
    }

    #[test]
    fn test_alias_with_dist_prefix() {
        let opts = options().with_alias(
            "@navbar",
            AliasValue::Record {
                path: "./node_modules/miniprogram-navigation-bar".to_string(),
                dist: Some("pages/aliasComponent/".to_string()),
            },
        );
        let m = mapper(opts);
        assert_eq!(
            m.generate(
                Path::new("/proj/node_modules/miniprogram-navigation-bar/index.js"),
                Some(".js"),
            ),
            PathBuf::from("/proj/dist/pages/aliasComponent/@navbar/index.js")
        );
    }

    #[test]
    fn test_alias_without_dist_defaults_to_npm() {
        let opts = options().with_alias(
            "@ui",
            AliasValue::Path("./vendor/ui".to_string()),
        );
        let m = mapper(opts);
        assert_eq!(
            m.generate(Path::new("/proj/vendor/ui/button.js"), None),
            PathBuf::from("/proj/dist/npm/@ui/button.js")
        );
    }

    #[test]
    fn test_node_modules_collapse() {
        let m = mapper(options());
        assert_eq!(
            m.generate(Path::new("/proj/node_modules/lodash/index.js"), None),
            PathBuf::from("/proj/dist/npm/lodash/index.js")
        );
    }

    #[test]
    fn test_nested_node_modules_keyed_by_last_segment() {
        let m = mapper(options());
        assert_eq!(
            m.generate(
                Path::new("/proj/node_modules/a/node_modules/b/lib/x.js"),
                None,
            ),
            PathBuf::from("/proj/dist/npm/b/lib/x.js")
        );
    }

    #[test]
    fn test_outside_source_dir_fallback() {
        let m = mapper(options());
        let dist = m.generate(Path::new("/elsewhere/x.js"), None);
        assert!(relative(Path::new("/proj/dist"), &dist)
            .starts_with(".."));
    }

    #[test]
    fn test_generate_is_idempotent_and_memoized() {
        let m = mapper(options());
        let p = Path::new("/proj/src/a.es6");
        let first = m.generate(p, Some(".js"));
        let second = m.generate(p, Some(".js"));
        assert_eq!(first, second);
        assert_eq!(first, PathBuf::from("/proj/dist/a.js"));
        // A different rendition extension still reconciles correctly after
        // the memo hit.
        assert_eq!(m.generate(p, None), PathBuf::from("/proj/dist/a.es6"));
    }
}
