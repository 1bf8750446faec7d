//! Cell identity and kind.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Opaque unique identifier for a cell within a session.
///
/// Clients mint these (typically a UUID string); the core never generates
/// them itself, since cell identity crosses the coordinator/client boundary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Encode, Decode)]
pub struct CellId(pub String);

impl CellId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reserved id for system-scoped notifications that are not tied to any
    /// registered cell (e.g. the result of `set_db_config`).
    pub fn system() -> Self {
        Self("__system__".to_string())
    }

    pub fn is_system(&self) -> bool {
        self.0 == "__system__"
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CellId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CellId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The language a cell's source is written in.
///
/// Closed by design: no plugin mechanism for additional fragment languages.
/// The data model names exactly these two kinds and nothing in the spec asks
/// for extensibility here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    Python,
    Sql,
}

impl std::fmt::Display for CellKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellKind::Python => write!(f, "python"),
            CellKind::Sql => write!(f, "sql"),
        }
    }
}
