use std::path::PathBuf;
use thiserror::Error;

/// Core error type for mpack build operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Cannot resolve module '{request}' from '{from_dir}'")]
    ModuleNotFound { request: String, from_dir: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("[{kind}] {phase}: {message}")]
    Hook {
        kind: String,
        phase: &'static str,
        message: String,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    #[must_use]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Wrap a capability failure, tagging the asset kind and lifecycle phase.
    #[must_use]
    pub fn hook(kind: impl Into<String>, phase: &'static str, msg: impl Into<String>) -> Self {
        Self::Hook {
            kind: kind.into(),
            phase,
            message: msg.into(),
        }
    }
}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
