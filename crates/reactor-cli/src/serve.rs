//! `serve` command: start the interactive WebSocket coordinator over a
//! JSON-file-backed notebook store.

use std::path::Path;
use std::sync::Arc;

use reactor_server::ServerConfig;
use reactor_sync::JsonFileStore;

pub async fn execute(store_dir: &Path, port: u16) -> anyhow::Result<()> {
    let store = Arc::new(JsonFileStore::new(store_dir)?);

    println!("Reactor server");
    println!("{}", "-".repeat(50));
    println!("  notebook store: {}", store_dir.display());
    println!("  listening:      http://127.0.0.1:{port}");
    println!("  websocket:      ws://127.0.0.1:{port}/ws/{{notebook_id}}");
    println!("{}", "-".repeat(50));
    println!("Press Ctrl+C to stop");

    let config = ServerConfig { host: "127.0.0.1".to_string(), port };
    reactor_server::serve(store, config).await?;
    Ok(())
}
