//! Error types for the session coordinator.

use std::path::PathBuf;

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// IO error.
    #[error("IO error at {path}: {message}")]
    Io { path: PathBuf, message: String },

    /// The kernel child process could not be spawned or has died.
    #[error("kernel process error: {0}")]
    Kernel(String),

    /// Reactor core error, surfaced verbatim from an in-process call.
    #[error("core error: {0}")]
    Core(#[from] reactor_core::Error),

    /// The external persistence layer failed.
    #[error("persistence error: {0}")]
    Sync(#[from] reactor_sync::SyncError),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No session exists for the requested notebook id.
    #[error("no session for notebook: {0}")]
    NoSession(String),
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::new(),
            message: e.to_string(),
        }
    }
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
