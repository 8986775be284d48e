//! Store error types.

use thiserror::Error;

use ss_core::ValidationError;

/// Errors that can occur in preference store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend rejected a read or write.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// IO error from a file-backed storage area.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed domain or endpoint.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Preset id not present in the catalog.
    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    /// Import document failed a structural check; nothing was written.
    #[error("Invalid import data: {0}")]
    InvalidImport(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
