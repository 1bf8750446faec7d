//! The external notebook-persistence contract (spec §6.3).
//!
//! The wire format a notebook is stored in is explicitly out of this
//! system's scope — only the entity schema the coordinator depends on
//! matters: `load(id) -> {id, name, db_conn_string?, cells:[{id, kind,
//! code}]}` and `save(structure)`. This crate defines that schema as the
//! [`NotebookStore`] trait plus one concrete collaborator, [`JsonFileStore`],
//! so the CLI and the coordinator's tests have something real to drive
//! end-to-end without pulling in a real database or document format.
//!
//! Execution state (outputs, statuses, `has_run`) is never part of this
//! schema — it lives only in the kernel process and is re-derived by
//! re-execution, per §3.

mod error;
mod json_store;

pub use error::{SyncError, SyncResult};
pub use json_store::JsonFileStore;

use serde::{Deserialize, Serialize};

use reactor_core::cell::{CellId, CellKind};

/// One cell as known to the persistence layer: identity, kind, and current
/// source. Execution status and outputs are not part of this schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedCell {
    pub id: CellId,
    pub kind: CellKind,
    pub code: String,
}

/// The minimal notebook structure the coordinator rebuilds a session's
/// graph from at startup and writes back to after a successful mutation.
///
/// Cell order here is a pure presentation/persistence concern (§3): it
/// round-trips through save/load but never influences execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotebookStructure {
    pub id: String,
    pub name: String,
    pub db_conn_string: Option<String>,
    pub cells: Vec<PersistedCell>,
}

impl NotebookStructure {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            db_conn_string: None,
            cells: Vec::new(),
        }
    }

    pub fn cell_index(&self, id: &CellId) -> Option<usize> {
        self.cells.iter().position(|c| &c.id == id)
    }
}

/// External persistence collaborator (spec §6.3). Implementations own
/// whatever storage medium they like; the coordinator only ever calls
/// `load`/`save` and never inspects the medium directly.
pub trait NotebookStore: Send + Sync {
    fn load(&self, id: &str) -> SyncResult<NotebookStructure>;
    fn save(&self, structure: &NotebookStructure) -> SyncResult<()>;
}
