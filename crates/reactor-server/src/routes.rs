//! HTTP and WebSocket routes for the Reactor session coordinator.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Path as AxumPath, State, WebSocketUpgrade, ws::{Message, WebSocket}},
    response::{IntoResponse, Json},
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex as TokioMutex;
use tower_http::cors::CorsLayer;

use reactor_core::cell::CellId;
use reactor_sync::NotebookStore;

use crate::error::ServerError;
use crate::protocol::ClientMessage;
use crate::session::NotebookSession;

/// Application state shared across handlers: the persistence collaborator
/// and a lazily-populated map of open sessions, one per notebook id.
pub struct AppState {
    pub store: Arc<dyn NotebookStore>,
    pub sessions: TokioMutex<HashMap<String, Arc<NotebookSession>>>,
}

impl AppState {
    pub fn new(store: Arc<dyn NotebookStore>) -> Self {
        Self {
            store,
            sessions: TokioMutex::new(HashMap::new()),
        }
    }

    async fn session_for(&self, notebook_id: &str) -> Result<Arc<NotebookSession>, ServerError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(notebook_id) {
            if session.is_alive() {
                return Ok(session.clone());
            }
            sessions.remove(notebook_id);
        }
        let session = Arc::new(NotebookSession::open(notebook_id, self.store.clone())?);
        sessions.insert(notebook_id.to_string(), session.clone());
        Ok(session)
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws/{notebook_id}", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn ws_handler(
    AxumPath(notebook_id): AxumPath<String>,
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, notebook_id, state))
}

/// One client's lifetime on a session: subscribe to the broadcast channel
/// (a late joiner sees only subsequent broadcasts, never replayed history,
/// per §9's open question), then run the forward loop and the inbound
/// command loop concurrently until either side closes.
async fn handle_socket(socket: WebSocket, notebook_id: String, state: Arc<AppState>) {
    let session = match state.session_for(&notebook_id).await {
        Ok(session) => session,
        Err(err) => {
            tracing::warn!(%notebook_id, %err, "failed to open session");
            return;
        }
    };

    let mut rx = session.subscribe();
    let (mut sink, mut stream) = socket.split();

    let forward = async {
        while let Ok(message) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&message) else {
                continue;
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    };

    let inbound = async {
        while let Some(Ok(message)) = stream.next().await {
            if let Message::Text(text) = message {
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_message) => dispatch(&session, client_message),
                    Err(err) => tracing::warn!(%err, "malformed client message"),
                }
            }
        }
    };

    tokio::select! {
        _ = forward => {}
        _ = inbound => {}
    }
}

/// Handlers (§4.4): enqueue the request and return immediately — the
/// drain thread broadcasts whatever the kernel streams back.
fn dispatch(session: &Arc<NotebookSession>, message: ClientMessage) {
    let result = match message {
        ClientMessage::CellUpdate { cell_id, code } => {
            let kind = session.kind_of(&cell_id).unwrap_or(reactor_core::cell::CellKind::Python);
            session.cell_update(cell_id, code, kind)
        }
        ClientMessage::CreateCell { cell_type, after_cell_id } => {
            let cell_id = CellId::new(uuid::Uuid::new_v4().to_string());
            session.create_cell(cell_id, cell_type, after_cell_id)
        }
        ClientMessage::DeleteCell { cell_id } => session.delete_cell(cell_id),
        ClientMessage::RunCell { cell_id } => session.run_cell(cell_id),
        ClientMessage::UpdateDbConnection { connection_string } => session.set_db(connection_string),
    };
    if let Err(err) = result {
        tracing::warn!(%err, "request to kernel failed");
    }
}
