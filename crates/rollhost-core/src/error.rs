//! Core error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by configuration loading and daemon bootstrap
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid configuration value
    #[error("invalid configuration for {key}: {reason}")]
    InvalidConfig { key: String, reason: String },

    /// IO errors with path context
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for core operations
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
