//! Minimal V3 source-map record.
//!
//! The core does not build mappings itself; transformers hand over a
//! finished map and the writer only decides when (and under which file
//! name) it is appended.

use serde::Serialize;

/// A V3 source map as produced by a transform capability.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_root: Option<String>,
    pub sources: Vec<String>,
    pub sources_content: Vec<Option<String>>,
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: 3,
            ..Self::default()
        }
    }

    /// Register a source file and its content, returning its index.
    pub fn add_source(&mut self, path: impl Into<String>, content: Option<String>) -> usize {
        self.sources.push(path.into());
        self.sources_content.push(content);
        self.sources.len() - 1
    }

    #[must_use]
    pub fn with_mappings(mut self, mappings: impl Into<String>) -> Self {
        self.mappings = mappings.into();
        self
    }

    /// Serialize with the output file name and source root filled in.
    #[must_use]
    pub fn stringify(&self, file: &str, source_root: &str) -> String {
        let mut map = self.clone();
        map.version = 3;
        map.file = Some(file.to_string());
        map.source_root = Some(source_root.to_string());
        serde_json::to_string(&map).unwrap_or_else(|_| String::from("{}"))
    }
}
