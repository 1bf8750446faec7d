//! The session coordinator (spec §4.4): a router between attached clients
//! and one dedicated kernel child process.
//!
//! A session owns exactly one kernel. Two OS threads carry the IPC: a
//! writer thread owns the child's stdin and serializes `KernelRequest`s
//! onto it, and a single drain thread owns the child's stdout, blocking on
//! `read_message` and translating every `Notification` it decodes into a
//! `ServerMessage` broadcast to every attached client (§5 — the blocking
//! `get` is offloaded to a worker thread so the async event loop is never
//! starved by it). Handlers never block on a specific kernel reply; they
//! enqueue a request and return, and the drain thread updates persisted
//! state and broadcasts as replies arrive.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;

use reactor_core::cell::{CellId, CellKind};
use reactor_core::ipc::{Channel, KernelRequest, Notification, Status, read_message, write_message};
use reactor_sync::{NotebookStore, NotebookStructure, PersistedCell};

use crate::error::{ServerError, ServerResult};
use crate::protocol::{
    CellMetadata, CellStatusWire, DbConnectionStatus, ErrorDetail, MimeOutput, PersistedCellWire,
    ServerMessage,
};

/// Capacity for the broadcast channel. If a client falls behind, older
/// messages are dropped for it rather than the whole session stalling.
const MESSAGE_CHANNEL_CAPACITY: usize = 1024;

/// Shared coordinator state the drain thread mutates as notifications
/// arrive and handlers read to serve `GetState`-style queries.
struct SharedState {
    structure: NotebookStructure,
    /// Code a `CellUpdate` most recently sent for a cell, applied to the
    /// persisted structure once the kernel confirms registration succeeded
    /// (status=idle rather than blocked).
    pending_code: HashMap<CellId, String>,
}

/// A session: one kernel child process, a background drain thread, and a
/// broadcast channel every attached client subscribes to.
pub struct NotebookSession {
    id: String,
    store: Arc<dyn NotebookStore>,
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    state: Arc<Mutex<SharedState>>,
    tx: broadcast::Sender<ServerMessage>,
    alive: Arc<AtomicBool>,
}

impl NotebookSession {
    /// Spawn a kernel, load the notebook structure from `store`, rebuild
    /// the kernel's graph by re-registering every cell, and start the
    /// drain thread. This is the coordinator's startup sequence (§4.4).
    pub fn open(id: &str, store: Arc<dyn NotebookStore>) -> ServerResult<Self> {
        let structure = match store.load(id) {
            Ok(s) => s,
            Err(reactor_sync::SyncError::NotFound(_)) => NotebookStructure::new(id, id),
            Err(err) => return Err(ServerError::Sync(err)),
        };

        let kernel_path = find_kernel_binary()?;
        let mut child = Command::new(&kernel_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| ServerError::Kernel(format!("failed to spawn {}: {e}", kernel_path.display())))?;

        tracing::info!(notebook = %id, pid = child.id(), "kernel spawned");

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");

        let (tx, _rx) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);
        let state = Arc::new(Mutex::new(SharedState {
            structure: structure.clone(),
            pending_code: HashMap::new(),
        }));
        let alive = Arc::new(AtomicBool::new(true));

        let session = Self {
            id: id.to_string(),
            store,
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            state: state.clone(),
            tx: tx.clone(),
            alive: alive.clone(),
        };

        spawn_drain_thread(stdout, state, tx, alive, session.store.clone());

        for cell in &structure.cells {
            session.send(KernelRequest::RegisterCell {
                id: cell.id.clone(),
                code: cell.code.clone(),
                kind: cell.kind,
            })?;
        }
        if let Some(conn) = &structure.db_conn_string {
            session.send(KernelRequest::SetDbConfig {
                connection_string: conn.clone(),
            })?;
        }

        Ok(session)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.tx.subscribe()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// The kind a cell was created with, per the persisted structure. A
    /// cell's language never changes after creation (§3), so `CellUpdate`
    /// — which carries only new source, not a kind — looks this up rather
    /// than requiring the client to resend it on every edit.
    pub fn kind_of(&self, id: &CellId) -> Option<CellKind> {
        self.state
            .lock()
            .expect("state mutex poisoned")
            .structure
            .cells
            .iter()
            .find(|c| &c.id == id)
            .map(|c| c.kind)
    }

    fn send(&self, request: KernelRequest) -> ServerResult<()> {
        let mut stdin = self.stdin.lock().expect("stdin mutex poisoned");
        write_message(&mut *stdin, &request).map_err(|e| ServerError::Kernel(e.to_string()))
    }

    /// `cell_update(id, code)`: register the new source and remember it as
    /// pending until the drain thread sees registration succeed.
    pub fn cell_update(&self, cell_id: CellId, code: String, kind: CellKind) -> ServerResult<()> {
        self.state
            .lock()
            .expect("state mutex poisoned")
            .pending_code
            .insert(cell_id.clone(), code.clone());
        self.send(KernelRequest::RegisterCell { id: cell_id, code, kind })
    }

    /// `create_cell(kind, after_id?)`: register an empty cell, then persist
    /// it and broadcast `cell_created` with its insertion index.
    pub fn create_cell(&self, cell_id: CellId, kind: CellKind, after_id: Option<CellId>) -> ServerResult<()> {
        self.send(KernelRequest::CreateCell { id: cell_id.clone(), kind })?;

        let index = {
            let mut state = self.state.lock().expect("state mutex poisoned");
            let index = match &after_id {
                Some(after) => state
                    .structure
                    .cell_index(after)
                    .map(|i| i + 1)
                    .unwrap_or(state.structure.cells.len()),
                None => state.structure.cells.len(),
            };
            state.structure.cells.insert(
                index,
                PersistedCell {
                    id: cell_id.clone(),
                    kind,
                    code: String::new(),
                },
            );
            self.persist_locked(&state.structure);
            index
        };

        let _ = self.tx.send(ServerMessage::CellCreated {
            cell_id: cell_id.clone(),
            cell: PersistedCellWire { id: cell_id, kind, code: String::new() },
            index,
        });
        Ok(())
    }

    /// `delete_cell(id)`: remove from the persisted structure, broadcast
    /// the deletion ack, then send the request; the kernel streams the
    /// cascade's re-executions as they arrive through the drain thread.
    pub fn delete_cell(&self, cell_id: CellId) -> ServerResult<()> {
        {
            let mut state = self.state.lock().expect("state mutex poisoned");
            state.structure.cells.retain(|c| c.id != cell_id);
            self.persist_locked(&state.structure);
        }
        let _ = self.tx.send(ServerMessage::CellDeleted { cell_id: cell_id.clone() });
        self.send(KernelRequest::DeleteCell { id: cell_id })
    }

    /// `run_cell(id)`: the drain thread broadcasts the resulting stream.
    pub fn run_cell(&self, cell_id: CellId) -> ServerResult<()> {
        self.send(KernelRequest::Execute { id: cell_id })
    }

    /// `set_db(connection_string)`: send the config and persist the string
    /// immediately — the drain thread still broadcasts the acked status.
    pub fn set_db(&self, connection_string: String) -> ServerResult<()> {
        {
            let mut state = self.state.lock().expect("state mutex poisoned");
            state.structure.db_conn_string = Some(connection_string.clone());
            self.persist_locked(&state.structure);
        }
        self.send(KernelRequest::SetDbConfig { connection_string })
    }

    fn persist_locked(&self, structure: &NotebookStructure) {
        if let Err(err) = self.store.save(structure) {
            tracing::warn!(notebook = %self.id, %err, "failed to persist notebook structure");
        }
    }

    /// Signal shutdown, wait briefly, then kill the kernel if it hasn't
    /// exited on its own.
    pub fn shutdown(&self) {
        let _ = self.send(KernelRequest::Shutdown);
        std::thread::sleep(std::time::Duration::from_millis(200));
        let mut child = self.child.lock().expect("child mutex poisoned");
        if matches!(child.try_wait(), Ok(None)) {
            let _ = child.kill();
        }
        self.alive.store(false, Ordering::SeqCst);
    }
}

fn spawn_drain_thread(
    stdout: ChildStdout,
    state: Arc<Mutex<SharedState>>,
    tx: broadcast::Sender<ServerMessage>,
    alive: Arc<AtomicBool>,
    store: Arc<dyn NotebookStore>,
) {
    std::thread::spawn(move || {
        let mut reader = stdout;
        loop {
            let notification: Notification = match read_message(&mut reader) {
                Ok(n) => n,
                Err(_) => break,
            };
            for message in translate(&notification, &state, &store) {
                let _ = tx.send(message);
            }
        }
        alive.store(false, Ordering::SeqCst);
        tracing::warn!("kernel process died; session is now terminal");
        let _ = tx.send(ServerMessage::KernelError {
            error: "kernel process exited".to_string(),
        });
    });
}

/// Translate one kernel [`Notification`] into zero or more client-facing
/// [`ServerMessage`]s, applying any persisted-state side effect the
/// translation implies (§4.4's "update the persisted structure's code
/// field if registration succeeded").
fn translate(
    note: &Notification,
    state: &Arc<Mutex<SharedState>>,
    store: &Arc<dyn NotebookStore>,
) -> Vec<ServerMessage> {
    let cell_id = note.cell_id.clone();

    if cell_id.is_system() {
        return match note.output.channel {
            Channel::Status => {
                let status = decode_status(&note.output.data);
                vec![ServerMessage::DbConnectionUpdated {
                    connection_string: current_db_string(state),
                    status: match status {
                        Some(Status::DbConfigured) => DbConnectionStatus::Connected,
                        _ => DbConnectionStatus::Error,
                    },
                    error: None,
                }]
            }
            Channel::Error => vec![ServerMessage::DbConnectionUpdated {
                connection_string: current_db_string(state),
                status: DbConnectionStatus::Error,
                error: Some(decode_error_message(&note.output.data)),
            }],
            _ => Vec::new(),
        };
    }

    match note.output.channel {
        Channel::Status => {
            let status = decode_status(&note.output.data);
            if let Some(Status::Idle) = status {
                let mut state = state.lock().expect("state mutex poisoned");
                if let Some(code) = state.pending_code.remove(&cell_id) {
                    if let Some(cell) = state.structure.cells.iter_mut().find(|c| c.id == cell_id) {
                        cell.code = code;
                    }
                    if let Err(err) = store.save(&state.structure) {
                        tracing::warn!(%err, "failed to persist notebook structure after registration");
                    }
                }
            }
            status
                .map(|s| ServerMessage::CellStatus { cell_id, status: s.into() })
                .into_iter()
                .collect()
        }
        Channel::Stdout => vec![ServerMessage::CellStdout { cell_id, data: note.output.data.clone() }],
        Channel::Stderr => vec![ServerMessage::CellStderr { cell_id, data: note.output.data.clone() }],
        Channel::Output => vec![ServerMessage::CellOutput {
            cell_id,
            output: MimeOutput { mimetype: note.output.mime_type.clone(), data: note.output.data.clone() },
        }],
        Channel::Error => {
            let value: serde_json::Value = serde_json::from_str(&note.output.data).unwrap_or_default();
            vec![ServerMessage::CellError {
                cell_id,
                error: ErrorDetail {
                    error_type: value["error_type"].as_str().unwrap_or("Error").to_string(),
                    message: value["message"].as_str().unwrap_or(&note.output.data).to_string(),
                },
            }]
        }
        Channel::Metadata => {
            let value: serde_json::Value = serde_json::from_str(&note.output.data).unwrap_or_default();
            let reads = value["reads"]
                .as_array()
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            let writes = value["writes"]
                .as_array()
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            vec![ServerMessage::CellUpdated { cell_id, cell: CellMetadata { reads, writes } }]
        }
    }
}

fn current_db_string(state: &Arc<Mutex<SharedState>>) -> String {
    state
        .lock()
        .expect("state mutex poisoned")
        .structure
        .db_conn_string
        .clone()
        .unwrap_or_default()
}

fn decode_status(data: &str) -> Option<Status> {
    let value: serde_json::Value = serde_json::from_str(data).ok()?;
    serde_json::from_value(value["status"].clone()).ok()
}

fn decode_error_message(data: &str) -> String {
    let value: serde_json::Value = serde_json::from_str(data).unwrap_or_default();
    value["message"].as_str().unwrap_or(data).to_string()
}

/// Locate the `reactor-kernel` binary: `REACTOR_KERNEL_PATH` first, then
/// alongside this process's own executable (the normal case for a
/// workspace build), falling back to `PATH` via `which` for an installed
/// layout.
fn find_kernel_binary() -> ServerResult<PathBuf> {
    if let Ok(path) = std::env::var("REACTOR_KERNEL_PATH") {
        return Ok(PathBuf::from(path));
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let candidate = dir.join(if cfg!(windows) { "reactor-kernel.exe" } else { "reactor-kernel" });
            if candidate.exists() {
                return Ok(candidate);
            }
        }
    }
    which::which("reactor-kernel")
        .map_err(|e| ServerError::Kernel(format!("reactor-kernel binary not found: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_translation_is_idle_on_idle() {
        let data = serde_json::json!({ "status": "idle" }).to_string();
        assert_eq!(decode_status(&data), Some(Status::Idle));
    }

    #[test]
    fn error_message_is_extracted() {
        let data = serde_json::json!({ "error_type": "CycleDetected", "message": "boom" }).to_string();
        assert_eq!(decode_error_message(&data), "boom");
    }

    #[test]
    fn kernel_path_env_override_wins() {
        std::env::set_var("REACTOR_KERNEL_PATH", "/tmp/some-custom-kernel");
        let path = find_kernel_binary().unwrap();
        std::env::remove_var("REACTOR_KERNEL_PATH");
        assert_eq!(path, PathBuf::from("/tmp/some-custom-kernel"));
    }
}
