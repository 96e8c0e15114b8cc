//! Error types for gymgate-sync.

use std::path::PathBuf;

use thiserror::Error;

use gymgate_core::RegistryError;
use gymgate_renderer::RenderError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// The rendered config could not be written; the previous file is intact.
    #[error("cannot write proxy config {path}: {source}")]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("proxy reload failed: {diagnostic}")]
    ReloadFailed { diagnostic: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("background task failed: {0}")]
    Join(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn write_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::ConfigWrite {
        path: path.into(),
        source,
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::Join(err.to_string())
    }
}
