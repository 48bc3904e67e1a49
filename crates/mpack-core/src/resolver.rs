//! Request resolution.
//!
//! Maps `(request, parent)` pairs to concrete files on disk. A request may
//! be relative, absolute-to-source-root, home-rooted (`~`), a bare module
//! name, or an aliased form of any of these; resolution layers alias
//! substitution, extension probing, package-manifest inspection, and an
//! upward `node_modules` walk.
//!
//! Probing failures inside the walk are expected negatives and are
//! swallowed; only a fully exhausted pipeline surfaces
//! [`Error::ModuleNotFound`].

use rustc_hash::FxHashMap as HashMap;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::config::{AliasEntry, InitOptions};
use crate::error::{Error, Result};
use crate::package::{Package, PackageReader};
use crate::paths::{normalize_path, promote_relative, relative, to_unix};

/// A successful resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Absolute path of the resolved file. Empty when the request was
    /// intentionally elided by an alias value of `false`.
    pub real_path: PathBuf,
    /// Nearest package enclosing the resolved file.
    pub pkg: Option<Arc<Package>>,
}

impl Resolution {
    fn elided() -> Self {
        Self {
            real_path: PathBuf::new(),
            pkg: None,
        }
    }

    /// True when an alias mapped this request to `false`: the dependency
    /// is skipped, no file exists for it.
    #[must_use]
    pub fn is_elided(&self) -> bool {
        self.real_path.as_os_str().is_empty()
    }
}

/// Intermediate shape of a bare-module lookup.
#[derive(Debug, Default)]
struct ModuleRequest {
    sub_path: String,
    module_dir: Option<PathBuf>,
    file_path: Option<PathBuf>,
}

/// Split a request into module-head parts. A scoped name (`@scope/name`)
/// counts as a single head segment.
#[must_use]
pub fn module_parts(name: &str) -> Vec<&str> {
    let parts: Vec<&str> = name.split(['/', '\\']).collect();
    if name.starts_with('@') && parts.len() >= 2 {
        let head_len = parts[0].len() + 1 + parts[1].len();
        let mut out = vec![&name[..head_len]];
        out.extend_from_slice(&parts[2..]);
        out
    } else {
        parts
    }
}

fn split_module(request: &str) -> (String, String) {
    let parts = module_parts(request);
    let head = parts.first().copied().unwrap_or_default().to_string();
    let tail = parts[1..].join("/");
    (head, tail)
}

/// Accept regular files and FIFOs (so piped fixtures resolve too).
fn is_file_like(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if meta.is_file() {
        return true;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        meta.file_type().is_fifo()
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// The resolver. Shareable across assets (and workers) behind an `Arc`;
/// the cache is append-only and populated only on success.
#[derive(Debug)]
pub struct Resolver {
    options: Arc<InitOptions>,
    packages: Arc<PackageReader>,
    /// Normalized global alias table, configuration order.
    alias: Vec<(String, AliasEntry)>,
    /// Keyed by `dirname(parent ?? "") + ":" + request`.
    cache: RwLock<HashMap<String, Resolution>>,
}

impl Resolver {
    #[must_use]
    pub fn new(options: Arc<InitOptions>, packages: Arc<PackageReader>) -> Self {
        let alias = options.alias_entries();
        Self {
            options,
            packages,
            alias,
            cache: RwLock::new(HashMap::default()),
        }
    }

    #[must_use]
    pub fn options(&self) -> &Arc<InitOptions> {
        &self.options
    }

    #[must_use]
    pub fn packages(&self) -> &Arc<PackageReader> {
        &self.packages
    }

    /// Resolve `request` as seen from `parent`.
    ///
    /// # Errors
    /// `Error::ModuleNotFound` when every strategy is exhausted.
    pub fn resolve(&self, request: &str, parent: Option<&Path>) -> Result<Resolution> {
        let parent_dir = parent.and_then(Path::parent);
        let key = format!(
            "{}:{request}",
            parent_dir.map(|d| d.display().to_string()).unwrap_or_default()
        );

        if let Some(hit) = self.cache.read().unwrap().get(&key) {
            return Ok(hit.clone());
        }

        let base_dir = parent_dir.unwrap_or(self.options.source_dir.as_path());
        let resolved = self.resolve_request(request, parent, base_dir);

        match resolved {
            Some(resolution) => {
                self.cache
                    .write()
                    .unwrap()
                    .insert(key, resolution.clone());
                Ok(resolution)
            }
            None => Err(Error::ModuleNotFound {
                request: request.to_string(),
                from_dir: base_dir.to_path_buf(),
            }),
        }
    }

    fn resolve_request(
        &self,
        request: &str,
        parent: Option<&Path>,
        base_dir: &Path,
    ) -> Option<Resolution> {
        let canonical = if parent.is_some() {
            self.resolve_filename(request, base_dir)
        } else {
            to_unix(request)
        };

        let request = match self.apply_alias(&canonical, base_dir) {
            Some(s) if s.is_empty() => return Some(Resolution::elided()),
            Some(s) => s,
            None => canonical,
        };

        let exts = self.extensions_for(parent);
        let shape = if Path::new(&request).is_absolute() {
            ModuleRequest {
                file_path: Some(PathBuf::from(&request)),
                ..ModuleRequest::default()
            }
        } else {
            self.find_node_module_path(&request, base_dir)
        };

        let found = if shape.module_dir.is_some() {
            let file_path = shape.file_path.as_deref()?;
            let by_file = if shape.sub_path.is_empty() {
                None
            } else {
                self.load_as_file(file_path, &exts)
            };
            by_file.or_else(|| self.load_directory(file_path, &exts, 0))
        } else if let Some(file_path) = &shape.file_path {
            self.load_as_file(file_path, &exts)
                .or_else(|| self.load_directory(file_path, &exts, 0))
        } else if parent.is_some() {
            // Last resort: a bare name with no node_modules hit is probed
            // as a sibling of the requesting file.
            let sibling = normalize_path(&base_dir.join(&request));
            self.load_as_file(&sibling, &exts)
                .or_else(|| self.load_directory(&sibling, &exts, 0))
        } else {
            None
        }?;

        let pkg = found.parent().and_then(|d| self.packages.find_package(d));
        Some(Resolution {
            real_path: found,
            pkg,
        })
    }

    /// Canonicalize a request by its first character.
    ///
    /// `/` is source-root-absolute unless the literal path exists; `~`
    /// resolves against the nearest `node_modules`-owned ancestor or
    /// `root_dir`; `.` is parent-relative; anything else is a bare module
    /// name and passes through.
    pub(crate) fn resolve_filename(&self, request: &str, dir: &Path) -> String {
        match request.chars().next() {
            Some('/') => {
                if Path::new(request).exists() {
                    request.to_string()
                } else {
                    self.options
                        .source_dir
                        .join(request.trim_start_matches('/'))
                        .display()
                        .to_string()
                }
            }
            Some('~') => {
                let tail = request[1..].trim_start_matches('/');
                let mut d = dir.to_path_buf();
                loop {
                    if d == self.options.root_dir {
                        break;
                    }
                    let Some(parent) = d.parent() else { break };
                    if parent.file_name().is_some_and(|n| n == "node_modules") {
                        break;
                    }
                    d = parent.to_path_buf();
                }
                d.join(tail).display().to_string()
            }
            Some('.') => normalize_path(&dir.join(request)).display().to_string(),
            _ => to_unix(request),
        }
    }

    /// Extension probe order for a resolution: the empty string first (a
    /// fully-specified request wins as-is), then the parent file's
    /// extension, then the configured list.
    fn extensions_for(&self, parent: Option<&Path>) -> Vec<String> {
        let mut exts = Vec::with_capacity(self.options.extensions.len() + 2);
        exts.push(String::new());

        if let Some(pext) = parent
            .and_then(Path::extension)
            .and_then(|e| e.to_str())
        {
            exts.push(format!(".{pext}"));
        }
        for ext in &self.options.extensions {
            if !exts.contains(ext) {
                exts.push(ext.clone());
            }
        }
        exts
    }

    // ------------------------------------------------------------------
    // Alias resolution
    // ------------------------------------------------------------------

    /// Apply the global alias table, then the nearest package's own alias
    /// maps. `Some("")` means the request is intentionally elided.
    fn apply_alias(&self, request: &str, dir: &Path) -> Option<String> {
        // The root package participates in nearest-package lookups below;
        // warm it so its manifest is read once up front.
        let _root = self.packages.read(&self.options.root_dir);

        let unixified = to_unix(request);

        // Global table: the first key appearing anywhere in the request
        // fires. Substring (not prefix) matching is intentional.
        for (key, entry) in &self.alias {
            if unixified.contains(key.as_str()) {
                let substituted = unixified.replacen(key.as_str(), &entry.path, 1);
                return Some(self.rebase_alias_target(&substituted, self.options.root_dir.as_path()));
            }
        }

        let pkg = self.packages.find_package(dir)?;
        let source_map = pkg.source.clone().filter(Value::is_object);
        let browser = PackageReader::browser_field(&pkg, &self.options.target);

        for map in [source_map.as_ref(), pkg.alias.as_ref(), browser.as_ref()] {
            if let Some(target) = Self::get_alias(&unixified, &pkg, map) {
                if target.is_empty() {
                    return Some(target);
                }
                return Some(self.rebase_alias_target(&target, &pkg.pkgdir));
            }
        }
        None
    }

    /// Anchor a substituted alias target: relative values are rooted at
    /// `base`, absolute and bare values pass through.
    fn rebase_alias_target(&self, target: &str, base: &Path) -> String {
        if target.starts_with('.') {
            normalize_path(&base.join(target)).display().to_string()
        } else {
            target.to_string()
        }
    }

    /// Look up `request` in a package alias map (the object forms of
    /// `source`, `alias`, and `browser`).
    ///
    /// Absolute requests are relativized to the package dir first; bare
    /// requests fall back from the full string to just the module head
    /// with the tail re-appended. A literal `false` value resolves to the
    /// empty string: the file is intentionally elided.
    fn get_alias(request: &str, pkg: &Package, aliases: Option<&Value>) -> Option<String> {
        let map = aliases?.as_object()?;

        let lookup = |key: &str| -> Option<String> {
            match map.get(key) {
                Some(Value::Bool(false)) => Some(String::new()),
                Some(Value::String(s)) => Some(s.clone()),
                _ => None,
            }
        };

        if Path::new(request).is_absolute() {
            let rel = relative(&pkg.pkgdir, Path::new(request));
            let key = promote_relative(&to_unix(rel.to_str()?));
            return lookup(&key);
        }

        if let Some(found) = lookup(request) {
            return Some(found);
        }

        let (head, tail) = split_module(request);
        if !tail.is_empty() {
            if let Some(found) = lookup(&head) {
                if found.is_empty() {
                    return Some(found);
                }
                return Some(format!("{}/{tail}", found.trim_end_matches('/')));
            }
        }
        None
    }

    // ------------------------------------------------------------------
    // node_modules walk
    // ------------------------------------------------------------------

    /// Walk `base_dir` upward looking for `node_modules/<head>`.
    /// Directories that are themselves named `node_modules` are skipped.
    fn find_node_module_path(&self, request: &str, base_dir: &Path) -> ModuleRequest {
        let (head, tail) = split_module(request);

        let mut dir = Some(base_dir);
        while let Some(d) = dir {
            if d.file_name().is_none_or(|n| n != "node_modules") {
                let module_dir = d.join("node_modules").join(&head);
                if module_dir.is_dir() {
                    tracing::trace!(module = %head, dir = %d.display(), "node_modules hit");
                    return ModuleRequest {
                        file_path: Some(d.join("node_modules").join(request)),
                        sub_path: tail,
                        module_dir: Some(module_dir),
                    };
                }
            }
            dir = d.parent();
        }

        ModuleRequest {
            sub_path: tail,
            ..ModuleRequest::default()
        }
    }

    // ------------------------------------------------------------------
    // File and directory loading
    // ------------------------------------------------------------------

    /// Probe `path` against the extension list, letting package aliases
    /// rewrite each extended candidate once.
    fn load_as_file(&self, path: &Path, exts: &[String]) -> Option<PathBuf> {
        let pkg = path.parent().and_then(|d| self.packages.find_package(d));
        self.expand_file(path, exts, pkg.as_deref(), true)
    }

    /// For each extension, try `path + ext`; when `expand_aliases` is on,
    /// also try the alias-rewritten form of the extended name (one level
    /// only, aliases off on the recursive probe).
    fn expand_file(
        &self,
        path: &Path,
        exts: &[String],
        pkg: Option<&Package>,
        expand_aliases: bool,
    ) -> Option<PathBuf> {
        for ext in exts {
            let mut candidate = path.as_os_str().to_os_string();
            candidate.push(ext);
            let candidate = PathBuf::from(candidate);

            if is_file_like(&candidate) {
                return Some(candidate);
            }

            if expand_aliases {
                if let Some(pkg) = pkg {
                    let name = candidate.display().to_string();
                    let source_map = pkg.source.clone().filter(Value::is_object);
                    let browser =
                        PackageReader::browser_field(pkg, &self.options.target);
                    for map in [source_map.as_ref(), pkg.alias.as_ref(), browser.as_ref()] {
                        let Some(target) = Self::get_alias(&name, pkg, map) else {
                            continue;
                        };
                        if target.is_empty() {
                            continue;
                        }
                        let rebased = self.rebase_alias_target(&target, &pkg.pkgdir);
                        if let Some(found) =
                            self.expand_file(Path::new(&rebased), exts, Some(pkg), false)
                        {
                            return Some(found);
                        }
                    }
                }
            }
        }
        None
    }

    /// Resolve a directory through its manifest entries, falling back to
    /// `<dir>/index` with the same extension list.
    fn load_directory(&self, dir: &Path, exts: &[String], depth: u8) -> Option<PathBuf> {
        if depth > 4 {
            return None;
        }

        if let Some(pkg) = self.packages.read(dir) {
            for entry in PackageReader::entries(&pkg, &self.options.target) {
                if entry == dir {
                    continue;
                }
                if let Some(found) = self.load_as_file(&entry, exts) {
                    return Some(found);
                }
                if let Some(found) = self.load_directory(&entry, exts, depth + 1) {
                    return Some(found);
                }
            }
        }

        self.load_as_file(&dir.join("index"), exts)
    }
}
