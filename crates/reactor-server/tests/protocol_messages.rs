//! Integration tests for the client/server session protocol (spec §6.1):
//! every message variant round-trips through JSON with the expected tag.

use reactor_core::cell::{CellId, CellKind};
use reactor_server::protocol::*;

#[test]
fn all_client_messages_round_trip() {
    let messages = vec![
        ClientMessage::CellUpdate { cell_id: CellId::new("c1"), code: "x = 10".to_string() },
        ClientMessage::CreateCell { cell_type: CellKind::Python, after_cell_id: Some(CellId::new("c1")) },
        ClientMessage::CreateCell { cell_type: CellKind::Sql, after_cell_id: None },
        ClientMessage::DeleteCell { cell_id: CellId::new("c1") },
        ClientMessage::RunCell { cell_id: CellId::new("c1") },
        ClientMessage::UpdateDbConnection { connection_string: ":memory:".to_string() },
    ];

    for message in messages {
        let json = serde_json::to_string(&message).unwrap();
        let parsed: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(format!("{parsed:?}"), format!("{message:?}"));
    }
}

#[test]
fn all_server_messages_round_trip() {
    let messages = vec![
        ServerMessage::CellStatus { cell_id: CellId::new("c1"), status: CellStatusWire::Running },
        ServerMessage::CellStdout { cell_id: CellId::new("c1"), data: "hi\n".to_string() },
        ServerMessage::CellStderr { cell_id: CellId::new("c1"), data: "oops\n".to_string() },
        ServerMessage::CellOutput {
            cell_id: CellId::new("c1"),
            output: MimeOutput { mimetype: "text/plain".to_string(), data: "42".to_string() },
        },
        ServerMessage::CellError {
            cell_id: CellId::new("c1"),
            error: ErrorDetail { error_type: "CycleDetected".to_string(), message: "boom".to_string() },
        },
        ServerMessage::CellUpdated {
            cell_id: CellId::new("c1"),
            cell: CellMetadata { reads: vec!["x".to_string()], writes: vec!["y".to_string()] },
        },
        ServerMessage::CellCreated {
            cell_id: CellId::new("c2"),
            cell: PersistedCellWire { id: CellId::new("c2"), kind: CellKind::Python, code: String::new() },
            index: 1,
        },
        ServerMessage::CellDeleted { cell_id: CellId::new("c1") },
        ServerMessage::DbConnectionUpdated {
            connection_string: ":memory:".to_string(),
            status: DbConnectionStatus::Connected,
            error: None,
        },
        ServerMessage::KernelError { error: "process died".to_string() },
    ];

    for message in messages {
        let json = serde_json::to_string(&message).unwrap();
        let parsed: ServerMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(format!("{parsed:?}"), format!("{message:?}"));
    }
}

#[test]
fn client_message_tag_is_camel_case() {
    let json = serde_json::to_string(&ClientMessage::UpdateDbConnection {
        connection_string: "x".to_string(),
    })
    .unwrap();
    assert!(json.contains("\"type\":\"updateDbConnection\""));
}

#[test]
fn server_message_tag_is_camel_case() {
    let json = serde_json::to_string(&ServerMessage::KernelError { error: "x".to_string() }).unwrap();
    assert!(json.contains("\"type\":\"kernelError\""));
}
