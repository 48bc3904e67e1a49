use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::paths::to_unix;

/// An alias value as written in user configuration: either a bare path
/// fragment or a record carrying an output-directory prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AliasValue {
    Path(String),
    Record { path: String, dist: Option<String> },
}

impl AliasValue {
    /// Normalize to the record form. A bare string `s` becomes
    /// `{path: s, dist: None}`. Idempotent.
    #[must_use]
    pub fn normalize(&self) -> AliasEntry {
        match self {
            Self::Path(p) => AliasEntry {
                path: to_unix(p),
                dist: None,
            },
            Self::Record { path, dist } => AliasEntry {
                path: to_unix(path),
                dist: dist.clone(),
            },
        }
    }
}

/// The normalized form every alias value reduces to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasEntry {
    /// Path fragment substituted into matching requests.
    pub path: String,
    /// Output-directory prefix for files reached through this alias;
    /// `None` falls back to `npm`.
    pub dist: Option<String>,
}

impl AliasEntry {
    #[must_use]
    pub fn normalize(&self) -> AliasEntry {
        self.clone()
    }
}

/// Build target. Controls whether `pkg.browser` is consulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum Target {
    #[default]
    Browser,
    Other(String),
}

impl Target {
    #[must_use]
    pub fn is_browser(&self) -> bool {
        matches!(self, Self::Browser)
    }
}

impl From<String> for Target {
    fn from(s: String) -> Self {
        if s == "browser" {
            Self::Browser
        } else {
            Self::Other(s)
        }
    }
}

impl From<Target> for String {
    fn from(t: Target) -> Self {
        match t {
            Target::Browser => "browser".to_string(),
            Target::Other(s) => s,
        }
    }
}

/// Extensions probed when a request does not name one, in order.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".js", ".ts", ".json", ".wxml", ".wxss"];

/// Build configuration.
///
/// Alias order is significant: both request substitution and dist-path
/// mapping take the first entry that fires, so the table is kept as an
/// ordered list rather than a map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitOptions {
    /// Root for source-rooted (`/`) requests and the dist-path rel base.
    pub source_dir: PathBuf,

    /// Ceiling for `~` walks and nearest-package discovery.
    pub root_dir: PathBuf,

    /// Output root.
    pub out_dir: PathBuf,

    /// Extension probe order, each with its leading dot.
    pub extensions: Vec<String>,

    /// Alias table, order significant.
    pub alias: Vec<(String, AliasValue)>,

    /// Build target.
    pub target: Target,

    /// Seed files for the asset graph.
    pub entry_files: Vec<PathBuf>,

    /// Reserved; does not affect core semantics.
    pub cache: bool,
}

impl InitOptions {
    /// Create options rooted at `source_dir`, writing to `out_dir`.
    ///
    /// `root_dir` defaults to `source_dir`; override with
    /// [`with_root_dir`](Self::with_root_dir).
    #[must_use]
    pub fn new(source_dir: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        let source_dir = source_dir.into();
        Self {
            root_dir: source_dir.clone(),
            source_dir,
            out_dir: out_dir.into(),
            extensions: DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect(),
            alias: Vec::new(),
            target: Target::default(),
            entry_files: Vec::new(),
            cache: false,
        }
    }

    #[must_use]
    pub fn with_root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = root_dir.into();
        self
    }

    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Append an alias. Entries fire in insertion order.
    #[must_use]
    pub fn with_alias(mut self, key: impl Into<String>, value: AliasValue) -> Self {
        self.alias.push((key.into(), value));
        self
    }

    #[must_use]
    pub fn with_entry(mut self, entry: impl Into<PathBuf>) -> Self {
        self.entry_files.push(entry.into());
        self
    }

    #[must_use]
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    /// The normalized alias table in configuration order.
    #[must_use]
    pub fn alias_entries(&self) -> Vec<(String, AliasEntry)> {
        self.alias
            .iter()
            .map(|(k, v)| (k.clone(), v.normalize()))
            .collect()
    }
}
