//! Crate-level error type.
//!
//! Inner failure paths are fire-and-forget and log instead of returning
//! errors; only bootstrap-time problems surface here. Per-concern errors
//! live with their modules (`ResolveError`, `SourceError`, `StorageError`).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriftmixError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Node error: {0}")]
    Node(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type DriftmixResult<T> = std::result::Result<T, DriftmixError>;

impl From<reqwest::Error> for DriftmixError {
    fn from(err: reqwest::Error) -> Self {
        DriftmixError::Node(err.to_string())
    }
}
