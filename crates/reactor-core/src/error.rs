//! Error types for reactor-core.

use thiserror::Error;

/// Result type for reactor-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in reactor-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Updating a cell would close a cycle in the dependency graph.
    ///
    /// Carries the prospective edge `U -> V` that would have closed the cycle.
    #[error("cycle detected: adding {0} -> {1} would close a cycle")]
    CycleDetected(String, String),

    /// Referenced a cell id that has no node in the graph.
    #[error("cell not registered: {0}")]
    CellNotRegistered(String),

    /// A required SQL template variable was missing from the namespace.
    #[error("missing SQL template variable: {0}")]
    MissingTemplateVariable(String),

    /// No database connection has been configured for this session.
    #[error("no database connection configured")]
    NoDatabaseConfigured,

    /// The SQL backend rejected the query.
    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// Failure encoding or decoding an IPC envelope.
    #[error("IPC codec error: {0}")]
    Codec(String),

    /// IO error, typically on the IPC transport.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A Python cell raised during execution; carries the formatted
    /// traceback exactly as it would be printed to stderr by the
    /// interpreter.
    #[error("{0}")]
    PythonException(String),
}
