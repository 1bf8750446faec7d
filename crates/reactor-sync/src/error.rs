//! Error types for the notebook persistence contract.

use std::path::PathBuf;

/// Result type for persistence operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while loading or saving a notebook structure.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Failed to read the backing store.
    #[error("failed to read {path}: {message}")]
    ReadError { path: PathBuf, message: String },

    /// Failed to write the backing store.
    #[error("failed to write {path}: {message}")]
    WriteError { path: PathBuf, message: String },

    /// The stored structure didn't decode to a valid notebook.
    #[error("invalid notebook structure: {0}")]
    InvalidNotebook(String),

    /// No notebook exists at the given id.
    #[error("notebook not found: {0}")]
    NotFound(String),

    /// Failed to serialize/deserialize JSON.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
