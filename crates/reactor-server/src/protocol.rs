//! Client <-> coordinator session protocol (spec §6.1).
//!
//! A bidirectional transport (WebSocket, in this implementation) carrying
//! JSON-tagged messages. `ClientMessage` flows client -> coordinator;
//! `ServerMessage` is the coordinator's translation of kernel notifications
//! (plus a handful of coordinator-local acks) back out to every attached
//! client of a session, per the broadcast semantics in §4.4/§5.

use serde::{Deserialize, Serialize};

use reactor_core::cell::{CellId, CellKind};

/// Messages sent from a client to the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Edit a cell's source code; triggers `register_cell` on the kernel.
    CellUpdate { cell_id: CellId, code: String },

    /// Create a new, empty cell of the given kind.
    CreateCell {
        cell_type: CellKind,
        after_cell_id: Option<CellId>,
    },

    /// Delete a cell; its descendants are re-executed afterward.
    DeleteCell { cell_id: CellId },

    /// Run the stale-filtered cascade rooted at a cell.
    RunCell { cell_id: CellId },

    /// Configure (or replace) the session's SQL backend.
    UpdateDbConnection { connection_string: String },
}

/// Messages sent from the coordinator to every client attached to a
/// session, translated from kernel notifications (§4.3.2) or produced
/// directly by a handler acking a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// A cell's status changed.
    CellStatus { cell_id: CellId, status: CellStatusWire },

    /// A chunk of captured stdout.
    CellStdout { cell_id: CellId, data: String },

    /// A chunk of captured stderr.
    CellStderr { cell_id: CellId, data: String },

    /// The rich result of a cell's trailing expression, or a SQL table.
    CellOutput { cell_id: CellId, output: MimeOutput },

    /// Structured error detail for a failed cell.
    CellError { cell_id: CellId, error: ErrorDetail },

    /// Reads/writes metadata, emitted on registration and after execution.
    CellUpdated { cell_id: CellId, cell: CellMetadata },

    /// A new cell was created, with its position in the persisted order.
    CellCreated {
        cell_id: CellId,
        cell: PersistedCellWire,
        index: usize,
    },

    /// A cell (and its id) was removed from the notebook.
    CellDeleted { cell_id: CellId },

    /// The result of a `set_db_config` request.
    DbConnectionUpdated {
        connection_string: String,
        status: DbConnectionStatus,
        error: Option<String>,
    },

    /// The kernel process died or could not be reached; the session is
    /// terminal and clients must reconnect to a new one.
    KernelError { error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStatusWire {
    Idle,
    Running,
    Success,
    Error,
    Blocked,
}

impl From<reactor_core::ipc::Status> for CellStatusWire {
    /// `DbConfigured` only ever attaches to the system sentinel cell id and
    /// is translated through `DbConnectionUpdated` instead, never through a
    /// `CellStatus` message; this conversion still needs a total arm for
    /// the encoder to be callable on system-scoped notifications in tests.
    fn from(status: reactor_core::ipc::Status) -> Self {
        use reactor_core::ipc::Status;
        match status {
            Status::Idle => CellStatusWire::Idle,
            Status::Running => CellStatusWire::Running,
            Status::Success => CellStatusWire::Success,
            Status::Error => CellStatusWire::Error,
            Status::Blocked => CellStatusWire::Blocked,
            Status::DbConfigured => CellStatusWire::Idle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbConnectionStatus {
    Connected,
    Error,
}

/// `{mimetype, data}` — the client-facing rendering of a kernel `Output`
/// channel result (§6.1's `cell_output.output`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MimeOutput {
    pub mimetype: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub error_type: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CellMetadata {
    pub reads: Vec<String>,
    pub writes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedCellWire {
    pub id: CellId,
    #[serde(rename = "type")]
    pub kind: CellKind,
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_uses_camel_case_tag() {
        let msg = ClientMessage::RunCell { cell_id: CellId::new("c1") };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"runCell\""));
        let parsed: ClientMessage = serde_json::from_str(&json).unwrap();
        match parsed {
            ClientMessage::RunCell { cell_id } => assert_eq!(cell_id, CellId::new("c1")),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn server_message_round_trips() {
        let msg = ServerMessage::CellStatus {
            cell_id: CellId::new("c1"),
            status: CellStatusWire::Running,
        };
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: ServerMessage = serde_json::from_str(&json).unwrap();
        match parsed {
            ServerMessage::CellStatus { cell_id, status } => {
                assert_eq!(cell_id, CellId::new("c1"));
                assert_eq!(status, CellStatusWire::Running);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn db_configured_status_maps_to_idle() {
        assert_eq!(
            CellStatusWire::from(reactor_core::ipc::Status::DbConfigured),
            CellStatusWire::Idle
        );
    }
}
