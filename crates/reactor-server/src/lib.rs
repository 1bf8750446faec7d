//! The Reactor session coordinator: a WebSocket router in front of one
//! kernel child process per notebook (spec §4.4).
//!
//! # Architecture
//!
//! - [`session`] — `NotebookSession`, the per-notebook coordinator: owns
//!   the kernel child process, the drain thread, and the broadcast channel
//!   every attached client subscribes to.
//! - [`protocol`] — the client/server WebSocket message types (§6.1).
//! - [`routes`] — the `axum` router: `/health` and a per-notebook
//!   `/ws/{notebook_id}` upgrade endpoint.
//!
//! Client UI, authentication, and multi-tenancy are all out of this
//! crate's scope (§1) — it exposes exactly the session protocol and
//! nothing that renders it.

pub mod error;
pub mod protocol;
pub mod routes;
pub mod session;

use std::net::SocketAddr;
use std::sync::Arc;

pub use error::{ServerError, ServerResult};
pub use protocol::{ClientMessage, ServerMessage};
pub use routes::{AppState, create_router};
pub use session::NotebookSession;

use reactor_sync::NotebookStore;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Start the coordinator's HTTP/WebSocket server. Sessions are opened
/// lazily, one per distinct `notebook_id` a client connects with under
/// `/ws/{notebook_id}`, each backed by `store` for persistence.
pub async fn serve(store: Arc<dyn NotebookStore>, config: ServerConfig) -> ServerResult<()> {
    let state = Arc::new(AppState::new(store));
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|_| ServerError::Io {
            path: std::path::PathBuf::new(),
            message: format!("invalid address: {}:{}", config.host, config.port),
        })?;

    tracing::info!("starting reactor-server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received shutdown signal");
            let _ = shutdown_tx.send(());
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .await?;

    tracing::info!("reactor-server shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_binds_localhost() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
    }
}
