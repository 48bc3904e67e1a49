//! The per-file asset lifecycle.
//!
//! Every discovered file becomes an [`Asset`] and moves through the same
//! phases: load, pretransform, dependency collection, transform, generate,
//! output. Content-specific behavior (parsing, dependency discovery, code
//! generation) comes from an [`AssetKind`] capability; the default kind
//! does nothing at every hook, so unknown files flow through untouched.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use percent_encoding::percent_decode_str;
use rustc_hash::FxHashMap as HashMap;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::InitOptions;
use crate::dist::DistPathMapper;
use crate::error::Result;
use crate::package::{Package, PackageReader};
use crate::paths::{normalize_path, promote_relative, reconcile_extension, relative, to_unix};
use crate::resolver::Resolver;
use crate::sourcemap::SourceMap;

/// Options attached to a recorded dependency edge.
#[derive(Debug, Clone, Default)]
pub struct DepOptions {
    /// Discovered at runtime (URL reference, dynamic import).
    pub dynamic: bool,
    /// The file's content is already part of this asset's output; the
    /// edge exists for invalidation only, not for processing.
    pub included_in_parent: bool,
    /// Arbitrary capability metadata.
    pub meta: Option<Value>,
}

/// Recorded dependencies of one asset: request string to options, last
/// write wins, discovery order retained.
#[derive(Debug, Default)]
pub struct Dependencies {
    order: Vec<String>,
    map: HashMap<String, DepOptions>,
}

impl Dependencies {
    pub fn insert(&mut self, request: impl Into<String>, opts: DepOptions) {
        let request = request.into();
        if !self.map.contains_key(&request) {
            self.order.push(request.clone());
        }
        self.map.insert(request, opts);
    }

    #[must_use]
    pub fn get(&self, request: &str) -> Option<&DepOptions> {
        self.map.get(request)
    }

    #[must_use]
    pub fn contains(&self, request: &str) -> bool {
        self.map.contains_key(request)
    }

    /// Iterate in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DepOptions)> {
        self.order
            .iter()
            .filter_map(|r| self.map.get(r).map(|o| (r.as_str(), o)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.map.clear();
    }
}

/// One generated output of an asset. `generate` may return several (a
/// component template and its style sheet, say); each is written on its
/// own.
#[derive(Debug, Clone, Default)]
pub struct Rendition {
    pub code: String,
    /// Output extension with leading dot; empty keeps the source one.
    pub ext: String,
    pub map: Option<SourceMap>,
}

/// Result of writing (or skipping) one rendition.
#[derive(Debug, Clone)]
pub struct Output {
    pub dist_path: PathBuf,
    /// Set when the computed path escapes `out_dir`; nothing was written.
    pub ignored: bool,
}

/// Content-specific behavior plugged into the lifecycle. All hooks default
/// to doing nothing, so a kind only implements what it cares about.
///
/// Kinds are stateless capability providers shared across assets.
pub trait AssetKind: Send + Sync {
    /// Kind name for logs and hook errors.
    fn name(&self) -> &str;

    /// Read the file. The default is a lossy UTF-8 read.
    fn load(&self, asset: &Asset) -> Result<String> {
        Ok(mpack_util::fs::read_to_string_lossy(&asset.name)?)
    }

    fn pretransform(&self, _asset: &mut Asset) -> Result<()> {
        Ok(())
    }

    /// Produce an AST from the loaded contents.
    fn parse(&self, _asset: &Asset) -> Result<Option<Value>> {
        Ok(None)
    }

    /// Record dependency edges on the asset.
    fn collect_dependencies(&self, _asset: &mut Asset) -> Result<()> {
        Ok(())
    }

    fn transform(&self, _asset: &mut Asset) -> Result<()> {
        Ok(())
    }

    /// Produce the output renditions.
    fn generate(&self, _asset: &Asset) -> Result<Vec<Rendition>> {
        Ok(vec![Rendition::default()])
    }

    /// Rework the generated renditions before they are written.
    fn post_process(&self, _asset: &Asset, renditions: Vec<Rendition>) -> Result<Vec<Rendition>> {
        Ok(renditions)
    }

    /// Whether a cached asset must be reprocessed.
    fn should_invalidate(&self, _asset: &Asset) -> bool {
        false
    }

    /// Gate for the parse + collect phase.
    fn might_have_dependencies(&self, _asset: &Asset) -> bool {
        true
    }
}

/// The do-nothing kind: emits the loaded contents unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawAsset;

impl AssetKind for RawAsset {
    fn name(&self) -> &str {
        "raw"
    }

    fn might_have_dependencies(&self, _asset: &Asset) -> bool {
        false
    }

    fn generate(&self, asset: &Asset) -> Result<Vec<Rendition>> {
        Ok(vec![Rendition {
            code: asset.contents.clone(),
            ext: String::new(),
            map: None,
        }])
    }
}

/// A reference resolved for rewriting inside emitted code.
#[derive(Debug, Clone)]
pub struct ResolvedRef {
    /// The request as it was resolved.
    pub real_name: String,
    /// Absolute source path of the dependency.
    pub absolute_path: PathBuf,
    /// Output path of the dependency.
    pub dist_path: PathBuf,
    /// `./`-promoted path from this asset's output to the dependency's.
    pub relative_require_path: String,
}

/// Parameters for [`Asset::get_config`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigRequest<'a> {
    /// Manifest key that short-circuits file discovery.
    pub package_key: Option<&'a str>,
    /// Load and return the file content instead of its path.
    pub load: bool,
}

/// One file moving through the build.
pub struct Asset {
    /// Absolute source path.
    pub name: PathBuf,
    /// Source-dir-relative identifier; defaults to `relative_name`.
    pub id: Option<String>,
    pub basename: String,
    pub relative_name: String,
    pub contents: String,
    pub ast: Option<Value>,
    pub generated: Option<Vec<Rendition>>,
    pub hash: Option<String>,
    /// Explicit output override; computed from the dist mapper otherwise.
    pub dist_path: Option<PathBuf>,
    pub dependencies: Dependencies,
    pub cache_data: Value,
    pub processed: bool,
    pub pkg: Option<Arc<Package>>,

    kind: Arc<dyn AssetKind>,
    resolver: Arc<Resolver>,
    dist: Arc<DistPathMapper>,
}

impl std::fmt::Debug for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Asset")
            .field("name", &self.name)
            .field("kind", &self.kind.name())
            .field("processed", &self.processed)
            .field("dependencies", &self.dependencies.len())
            .finish_non_exhaustive()
    }
}

impl Asset {
    /// Construct with a private resolver and dist mapper.
    #[must_use]
    pub fn new(name: impl Into<PathBuf>, kind: Arc<dyn AssetKind>, options: Arc<InitOptions>) -> Self {
        let packages = Arc::new(PackageReader::new());
        let resolver = Arc::new(Resolver::new(Arc::clone(&options), packages));
        let dist = Arc::new(DistPathMapper::new(options));
        Self::with_resolver(name, kind, resolver, dist)
    }

    /// Construct against a shared resolver and dist mapper (the worker-pool
    /// configuration). Semantics are identical to [`new`](Self::new).
    #[must_use]
    pub fn with_resolver(
        name: impl Into<PathBuf>,
        kind: Arc<dyn AssetKind>,
        resolver: Arc<Resolver>,
        dist: Arc<DistPathMapper>,
    ) -> Self {
        let name = name.into();
        let options = Arc::clone(resolver.options());
        let basename = name
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let relative_name = to_unix(
            &relative(&options.source_dir, &name).display().to_string(),
        );

        Self {
            name,
            id: None,
            basename,
            relative_name,
            contents: String::new(),
            ast: None,
            generated: None,
            hash: None,
            dist_path: None,
            dependencies: Dependencies::default(),
            cache_data: Value::Null,
            processed: false,
            pkg: None,
            kind,
            resolver,
            dist,
        }
    }

    #[must_use]
    pub fn options(&self) -> &Arc<InitOptions> {
        self.resolver.options()
    }

    #[must_use]
    pub fn kind_name(&self) -> &str {
        self.kind.name()
    }

    /// Run the full lifecycle once: load, pretransform, dependency
    /// collection, transform, generate, output. Returns one record per
    /// written (or ignored) rendition. A second call is a no-op.
    pub fn process(&mut self) -> Result<Vec<Output>> {
        if self.processed {
            return Ok(Vec::new());
        }
        self.processed = true;
        let started = Instant::now();

        if self.id.is_none() {
            self.id = Some(self.relative_name.clone());
        }

        let kind = Arc::clone(&self.kind);
        self.load_if_needed(&kind)?;
        kind.pretransform(self)?;
        self.get_dependencies(&kind)?;
        kind.transform(self)?;

        let generated = kind.generate(self)?;
        let generated = kind.post_process(self, generated)?;
        self.generated = Some(generated.clone());

        let mut outputs = Vec::new();
        for rendition in &generated {
            self.hash = Some(mpack_util::hash::blake3_str(&rendition.code));
            let out = self.output(&rendition.code, &rendition.ext, rendition.map.as_ref())?;
            if !out.ignored {
                debug!(
                    asset = %self.relative_name,
                    dist = %out.dist_path.display(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "generated"
                );
            }
            outputs.push(out);
        }
        Ok(outputs)
    }

    fn load_if_needed(&mut self, kind: &Arc<dyn AssetKind>) -> Result<()> {
        if self.contents.is_empty() {
            self.contents = kind.load(self)?;
        }
        Ok(())
    }

    fn get_dependencies(&mut self, kind: &Arc<dyn AssetKind>) -> Result<()> {
        if !kind.might_have_dependencies(self) {
            return Ok(());
        }
        self.parse_if_needed(kind)?;
        kind.collect_dependencies(self)
    }

    fn parse_if_needed(&mut self, kind: &Arc<dyn AssetKind>) -> Result<()> {
        if self.ast.is_none() {
            self.ast = kind.parse(self)?;
        }
        Ok(())
    }

    /// Record a dependency edge. Requests are unique per asset; a repeat
    /// insert overwrites the options.
    pub fn add_dependency(&mut self, request: impl Into<String>, opts: DepOptions) {
        self.dependencies.insert(request, opts);
    }

    /// Write one rendition. The dist path is the asset's override, the
    /// mapper's answer, or the mirrored relative name, reconciled against
    /// `ext`; a path escaping `out_dir` is reported ignored and skipped.
    pub fn output(&mut self, code: &str, ext: &str, map: Option<&SourceMap>) -> Result<Output> {
        let options = Arc::clone(self.resolver.options());
        let ext_opt = Some(ext).filter(|e| !e.is_empty());

        let dist_path = self
            .dist_path
            .clone()
            .unwrap_or_else(|| self.dist.generate(&self.name, ext_opt));
        let dist_path = reconcile_extension(&dist_path, ext_opt);

        let pretty = promote_relative(&to_unix(
            &relative(&options.out_dir, &dist_path).display().to_string(),
        ));
        if pretty.starts_with("..") {
            warn!(asset = %self.relative_name, dist = %dist_path.display(), "outside out_dir, ignored");
            return Ok(Output {
                dist_path,
                ignored: true,
            });
        }

        let mut code = code.to_string();
        if let Some(map) = map {
            let file = Path::new(&pretty)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let json = map.stringify(&file, "/");
            code.push_str(&format!(
                "\r\n//# sourceMappingURL=data:application/json;charset=utf-8;base64,{}",
                BASE64.encode(json)
            ));
        }

        mpack_util::fs::write_file(&dist_path, code.as_bytes())?;

        if self.dist_path.is_none() {
            self.dist_path = Some(dist_path.clone());
        }
        Ok(Output {
            dist_path,
            ignored: false,
        })
    }

    /// Resolve a reference for rewriting inside emitted code: the real
    /// file, its output path, and the `./`-style path from this asset's
    /// output location to it.
    pub fn resolve_alias_name(&self, name: &str, ext: Option<&str>) -> Result<ResolvedRef> {
        let resolution = self.resolver.resolve(name, Some(&self.name))?;
        if resolution.is_elided() {
            // Alias value of `false`: the reference is skipped, all paths
            // stay empty.
            return Ok(ResolvedRef {
                real_name: name.to_string(),
                absolute_path: PathBuf::new(),
                dist_path: PathBuf::new(),
                relative_require_path: String::new(),
            });
        }

        let dist_path = self.dist.generate(&resolution.real_path, ext);
        let parent_dist = self
            .dist_path
            .clone()
            .unwrap_or_else(|| self.dist.generate(&self.name, ext));
        let parent_dir = parent_dist
            .parent()
            .unwrap_or_else(|| Path::new(""));

        let relative_require_path = promote_relative(&to_unix(
            &relative(parent_dir, &dist_path).display().to_string(),
        ));

        Ok(ResolvedRef {
            real_name: name.to_string(),
            absolute_path: resolution.real_path,
            dist_path,
            relative_require_path,
        })
    }

    /// Record a URL reference as a dynamic dependency and rewrite the
    /// URL's pathname to the dependency name. Full URLs pass through.
    pub fn add_url_dependency(&mut self, url: &str) -> String {
        if url.is_empty()
            || url.contains("://")
            || url.starts_with("data:")
            || url.starts_with("//")
        {
            return url.to_string();
        }

        let split_at = url.find(['?', '#']).unwrap_or(url.len());
        let (path_part, suffix) = url.split_at(split_at);
        let decoded = percent_decode_str(path_part)
            .decode_utf8_lossy()
            .into_owned();
        if decoded.is_empty() {
            return url.to_string();
        }

        let options = Arc::clone(self.resolver.options());
        let dir = self
            .name
            .parent()
            .map_or_else(PathBuf::new, Path::to_path_buf);

        let dep_name = match decoded.chars().next() {
            Some('~' | '/') => {
                let mut request = decoded.clone();
                if decoded.starts_with('/') && !self.name.starts_with(&options.source_dir) {
                    // An asset outside the source tree anchors root-slashed
                    // URLs at its own package, not the app's source root.
                    if let Some(pkg) = &self.pkg {
                        let base = match pkg.main.as_deref() {
                            Some(main) if main.contains('/') => pkg
                                .pkgdir
                                .join(Path::new(main).parent().unwrap_or_else(|| Path::new(""))),
                            _ => pkg.pkgdir.clone(),
                        };
                        request = base
                            .join(decoded.trim_start_matches('/'))
                            .display()
                            .to_string();
                    }
                }
                self.resolver.resolve_filename(&request, &dir)
            }
            _ => {
                let resolved = normalize_path(&dir.join(&decoded));
                promote_relative(&to_unix(&relative(&dir, &resolved).display().to_string()))
            }
        };

        self.dependencies.insert(
            dep_name.clone(),
            DepOptions {
                dynamic: true,
                ..DepOptions::default()
            },
        );
        format!("{dep_name}{suffix}")
    }

    /// Fetch configuration for this asset.
    ///
    /// When `package_key` is set and the nearest manifest carries it, a
    /// deep clone of that value is returned. Otherwise the parent chain is
    /// searched for the first of `filenames`; a hit is registered as an
    /// `included_in_parent` dependency and either its path or its loaded
    /// content is returned.
    pub fn get_config(
        &mut self,
        filenames: &[&str],
        request: ConfigRequest<'_>,
    ) -> Result<Option<Value>> {
        let dir = self
            .name
            .parent()
            .map_or_else(PathBuf::new, Path::to_path_buf);

        if let Some(key) = request.package_key {
            let pkg = self
                .pkg
                .clone()
                .or_else(|| self.resolver.packages().find_package(&dir));
            if let Some(found) = pkg.as_ref().and_then(|p| p.raw.get(key)) {
                return Ok(Some(found.clone()));
            }
        }

        let root_dir = self.resolver.options().root_dir.clone();
        let mut current = Some(dir.as_path());
        while let Some(d) = current {
            for filename in filenames {
                let candidate = d.join(filename);
                if candidate.is_file() {
                    self.dependencies.insert(
                        candidate.display().to_string(),
                        DepOptions {
                            included_in_parent: true,
                            ..DepOptions::default()
                        },
                    );
                    if !request.load {
                        return Ok(Some(Value::String(candidate.display().to_string())));
                    }
                    let content = mpack_util::fs::read_to_string_lossy(&candidate)?;
                    if candidate.extension().is_some_and(|e| e == "json") {
                        return Ok(serde_json::from_str(&content).ok());
                    }
                    return Ok(Some(Value::String(content)));
                }
            }
            if d == root_dir {
                break;
            }
            current = d.parent();
        }
        Ok(None)
    }

    /// Drop derived state (contents, ast, renditions, hash, dependencies)
    /// while keeping identity, so the asset can be reprocessed.
    pub fn invalidate(&mut self) {
        self.contents.clear();
        self.ast = None;
        self.generated = None;
        self.hash = None;
        self.dependencies.clear();
        self.processed = false;
    }

    /// Whether the kind wants this asset reprocessed despite a cache hit.
    #[must_use]
    pub fn should_invalidate(&self) -> bool {
        self.kind.should_invalidate(self)
    }
}
