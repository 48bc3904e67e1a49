#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]

//! Module resolution and asset pipeline for the mpack mini-program bundler.
//!
//! Two subsystems carry the weight:
//!
//! 1. **The resolver** maps request strings (relative, source-rooted,
//!    home-rooted, bare, or aliased) to concrete files, layering alias
//!    substitution, extension probing, package-manifest inspection, and an
//!    upward `node_modules` walk.
//! 2. **The asset pipeline** drives each discovered file through load,
//!    pretransform, dependency collection, transform, generate, and output,
//!    reusing the resolver to pair every dependency with a deterministic
//!    output path under `out_dir`.

pub mod asset;
pub mod config;
pub mod dist;
pub mod error;
pub mod graph;
pub mod package;
pub mod paths;
pub mod resolver;
pub mod sourcemap;

pub use asset::{
    Asset, AssetKind, ConfigRequest, DepOptions, Dependencies, Output, RawAsset, Rendition,
    ResolvedRef,
};
pub use config::{AliasEntry, AliasValue, InitOptions, Target, DEFAULT_EXTENSIONS};
pub use dist::DistPathMapper;
pub use error::{Error, Result};
pub use graph::{AssetGraph, Build, BuildSummary, DependencyCollector};
pub use package::{Package, PackageReader};
pub use resolver::{module_parts, Resolution, Resolver};
pub use sourcemap::SourceMap;
