use std::path::PathBuf;

use thiserror::Error;

/// Failures reading or writing the on-disk authorization store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path:?}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },

    #[error("failed to create temp file next to {path:?}: {source}")]
    TempFile { path: PathBuf, #[source] source: std::io::Error },

    #[error("failed to lock {path:?}: {source}")]
    Lock { path: PathBuf, #[source] source: std::io::Error },
}
