//! Asset graph and build driver.
//!
//! Assets are stored in a graph keyed by absolute source path. The graph is
//! cyclic in general (page A may reference component B which references A),
//! so edges are path references into the map, never ownership.

use rustc_hash::FxHashMap as HashMap;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::asset::{Asset, AssetKind, RawAsset};
use crate::config::InitOptions;
use crate::dist::DistPathMapper;
use crate::error::Result;
use crate::package::PackageReader;
use crate::resolver::Resolver;

/// All assets of one build, keyed by absolute path.
#[derive(Default)]
pub struct AssetGraph {
    assets: HashMap<PathBuf, Asset>,
    edges: HashMap<PathBuf, Vec<PathBuf>>,
}

impl AssetGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, asset: Asset) {
        self.assets.insert(asset.name.clone(), asset);
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&Asset> {
        self.assets.get(path)
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut Asset> {
        self.assets.get_mut(path)
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.assets.contains_key(path)
    }

    /// Record a resolved dependency edge. Duplicate edges collapse.
    pub fn add_edge(&mut self, from: &Path, to: &Path) {
        let targets = self.edges.entry(from.to_path_buf()).or_default();
        if !targets.iter().any(|t| t == to) {
            targets.push(to.to_path_buf());
        }
    }

    /// Resolved dependency targets of `path`, in discovery order.
    #[must_use]
    pub fn dependencies_of(&self, path: &Path) -> &[PathBuf] {
        self.edges.get(path).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &Asset)> {
        self.assets.iter()
    }
}

/// Callback surface for external manifest handlers (app.json, page.json):
/// receives a processed asset and may push additional absolute paths to
/// pull into the graph.
pub type DependencyCollector = Box<dyn Fn(&Asset, &mut Vec<PathBuf>) + Send + Sync>;

/// Summary of one build run.
#[derive(Debug, Default)]
pub struct BuildSummary {
    /// Files written under `out_dir`.
    pub written: Vec<PathBuf>,
    /// Renditions whose dist path escaped `out_dir`.
    pub ignored: Vec<PathBuf>,
    /// Number of assets in the graph.
    pub assets: usize,
}

/// Drives the build: seeds the graph from the entry files, processes each
/// asset, resolves its recorded dependencies, and enqueues unseen targets.
pub struct Build {
    options: Arc<InitOptions>,
    resolver: Arc<Resolver>,
    dist: Arc<DistPathMapper>,
    kinds: HashMap<String, Arc<dyn AssetKind>>,
    default_kind: Arc<dyn AssetKind>,
    collectors: Vec<DependencyCollector>,
    pub graph: AssetGraph,
}

impl Build {
    /// A build with its own resolver and caches.
    #[must_use]
    pub fn new(options: Arc<InitOptions>) -> Self {
        let packages = Arc::new(PackageReader::new());
        let resolver = Arc::new(Resolver::new(Arc::clone(&options), packages));
        Self::with_resolver(options, resolver)
    }

    /// A build against a resolver published by the worker pool. Semantics
    /// are identical to [`new`](Self::new).
    #[must_use]
    pub fn with_resolver(options: Arc<InitOptions>, resolver: Arc<Resolver>) -> Self {
        let dist = Arc::new(DistPathMapper::new(Arc::clone(&options)));
        Self {
            options,
            resolver,
            dist,
            kinds: HashMap::default(),
            default_kind: Arc::new(RawAsset),
            collectors: Vec::new(),
            graph: AssetGraph::new(),
        }
    }

    #[must_use]
    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    /// Register a kind for an extension (no leading dot).
    pub fn register_kind(&mut self, ext: impl Into<String>, kind: Arc<dyn AssetKind>) {
        self.kinds.insert(ext.into(), kind);
    }

    /// Register a manifest-dependency collector.
    pub fn add_collector(
        &mut self,
        collector: impl Fn(&Asset, &mut Vec<PathBuf>) + Send + Sync + 'static,
    ) {
        self.collectors.push(Box::new(collector));
    }

    fn kind_for(&self, path: &Path) -> Arc<dyn AssetKind> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| self.kinds.get(e))
            .map_or_else(|| Arc::clone(&self.default_kind), Arc::clone)
    }

    /// Process every reachable asset, breadth-first from the entry files.
    ///
    /// # Errors
    /// Fails on the first unresolvable request or failing capability hook.
    pub fn run(&mut self) -> Result<BuildSummary> {
        let mut summary = BuildSummary::default();
        let mut queue: VecDeque<(String, Option<PathBuf>)> = self
            .options
            .entry_files
            .iter()
            .map(|entry| {
                let path = if entry.is_absolute() {
                    entry.clone()
                } else {
                    self.options.source_dir.join(entry)
                };
                (path.display().to_string(), None)
            })
            .collect();

        debug!(entries = queue.len(), "build start");

        while let Some((request, parent)) = queue.pop_front() {
            let resolution = self.resolver.resolve(&request, parent.as_deref())?;
            if resolution.is_elided() {
                continue;
            }

            let real_path = resolution.real_path.clone();
            if let Some(parent) = &parent {
                self.graph.add_edge(parent, &real_path);
            }
            if self.graph.contains(&real_path) {
                continue;
            }

            let mut asset = Asset::with_resolver(
                real_path.clone(),
                self.kind_for(&real_path),
                Arc::clone(&self.resolver),
                Arc::clone(&self.dist),
            );
            asset.pkg = resolution.pkg.clone();

            for output in asset.process()? {
                if output.ignored {
                    summary.ignored.push(output.dist_path);
                } else {
                    summary.written.push(output.dist_path);
                }
            }

            for (request, opts) in asset.dependencies.iter() {
                if opts.included_in_parent {
                    continue;
                }
                queue.push_back((request.to_string(), Some(real_path.clone())));
            }

            let mut extra = Vec::new();
            for collector in &self.collectors {
                collector(&asset, &mut extra);
            }
            for path in extra {
                queue.push_back((path.display().to_string(), Some(real_path.clone())));
            }

            self.graph.insert(asset);
        }

        summary.assets = self.graph.len();
        debug!(
            assets = summary.assets,
            written = summary.written.len(),
            ignored = summary.ignored.len(),
            "build done"
        );
        Ok(summary)
    }
}
