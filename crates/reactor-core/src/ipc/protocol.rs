//! Kernel IPC envelope: requests flowing coordinator -> kernel, and
//! notifications flowing kernel -> coordinator.
//!
//! Framing is a 4-byte little-endian length prefix followed by a
//! `bincode`-encoded value, one envelope per frame, read/written with
//! blocking `Read`/`Write` calls on the kernel child's stdio pipes. This is
//! the same discipline this codebase uses for any child-process IPC,
//! applied here to a long-lived kernel instead of a one-shot worker.

use std::io::{Read, Write};

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::cell::{CellId, CellKind};
use crate::error::{Error, Result};
use crate::extractor::NameSet;

/// Request sent from the coordinator to the kernel (§4.3.1).
#[derive(Debug, Clone, Encode, Decode)]
pub enum KernelRequest {
    /// Re-extract deps, update the graph, store source, invalidate
    /// `has_run` for this cell and all descendants.
    RegisterCell {
        id: CellId,
        code: String,
        kind: CellKind,
    },
    /// Register with empty code, no dependencies, status idle.
    CreateCell { id: CellId, kind: CellKind },
    /// Remove from registry and graph; affected descendants are
    /// re-executed afterward.
    DeleteCell { id: CellId },
    /// Run the stale-filtered cascade rooted at `id`.
    Execute { id: CellId },
    /// Configure the SQL backend for this session.
    SetDbConfig { connection_string: String },
    /// Drain and exit.
    Shutdown,
}

/// Status values a cell (or the system sentinel) can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Idle,
    Running,
    Success,
    Error,
    Blocked,
    DbConfigured,
}

/// The channel an `Output` was emitted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Status,
    Metadata,
    Stdout,
    Stderr,
    Output,
    Error,
}

/// `{channel, mime_type, data, timestamp}` — the unified output structure
/// every notification wraps (§3, §4.3.2). `data` carries raw text for
/// stdout/stderr, and a JSON-encoded payload for the structured channels
/// (status, metadata, error) as well as for rich `output` results whose
/// own MIME type (e.g. `application/json`, `image/png`) describes it.
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct Output {
    pub channel: Channel,
    pub mime_type: String,
    pub data: String,
    pub timestamp_ms: u64,
}

impl Output {
    fn now_ms() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    pub fn status(status: Status) -> Self {
        Self {
            channel: Channel::Status,
            mime_type: "application/json".to_string(),
            data: serde_json::json!({ "status": status }).to_string(),
            timestamp_ms: Self::now_ms(),
        }
    }

    pub fn metadata(reads: &NameSet, writes: &NameSet) -> Self {
        Self {
            channel: Channel::Metadata,
            mime_type: "application/json".to_string(),
            data: serde_json::json!({ "reads": reads, "writes": writes }).to_string(),
            timestamp_ms: Self::now_ms(),
        }
    }

    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            channel: Channel::Stdout,
            mime_type: "text/plain".to_string(),
            data: text.into(),
            timestamp_ms: Self::now_ms(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            channel: Channel::Stderr,
            mime_type: "text/plain".to_string(),
            data: text.into(),
            timestamp_ms: Self::now_ms(),
        }
    }

    pub fn result(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            channel: Channel::Output,
            mime_type: mime_type.into(),
            data: data.into(),
            timestamp_ms: Self::now_ms(),
        }
    }

    pub fn error(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            channel: Channel::Error,
            mime_type: "application/json".to_string(),
            data: serde_json::json!({
                "error_type": error_type.into(),
                "message": message.into(),
            })
            .to_string(),
            timestamp_ms: Self::now_ms(),
        }
    }
}

/// Notification sent from the kernel to the coordinator (§4.3.2).
///
/// `is_last` marks the final notification of an execution that terminates
/// a cascade early (e.g. `execute` on an unregistered cell), so the drain
/// loop knows not to wait for further notifications tied to that request.
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct Notification {
    pub cell_id: CellId,
    pub output: Output,
    pub is_last: bool,
}

impl Notification {
    pub fn new(cell_id: CellId, output: Output) -> Self {
        Self {
            cell_id,
            output,
            is_last: false,
        }
    }

    pub fn terminal(cell_id: CellId, output: Output) -> Self {
        Self {
            cell_id,
            output,
            is_last: true,
        }
    }
}

/// Write a length-prefixed bincode-encoded value.
pub fn write_message<W: Write, T: Encode>(writer: &mut W, message: &T) -> Result<()> {
    let config = bincode::config::standard();
    let bytes = bincode::encode_to_vec(message, config)
        .map_err(|e| Error::Codec(format!("failed to encode IPC message: {e}")))?;

    let len = bytes.len() as u32;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Maximum accepted frame size, guarding against a corrupt length prefix.
const MAX_FRAME_BYTES: usize = 100 * 1024 * 1024;

/// Read a length-prefixed bincode-encoded value.
pub fn read_message<R: Read, T: Decode<()>>(reader: &mut R) -> Result<T> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > MAX_FRAME_BYTES {
        return Err(Error::Codec(format!("IPC message too large: {len} bytes")));
    }

    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;

    let config = bincode::config::standard();
    let (message, _) = bincode::decode_from_slice(&bytes, config)
        .map_err(|e| Error::Codec(format!("failed to decode IPC message: {e}")))?;
    Ok(message)
}
