//! Reactor CLI — headless notebook execution and the interactive server,
//! both built directly on `reactor-core`/`reactor-server`.

mod run;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "reactor")]
#[command(about = "Reactive notebook execution engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding one JSON notebook file per id (defaults to a
    /// per-user data directory).
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    /// Enable verbose (debug) logging.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a notebook headlessly: execute every registered cell in-process
    /// and print the resulting notification stream.
    Run {
        /// Notebook id (the JSON store's `{id}.json` file).
        notebook_id: String,

        /// Run only this cell's stale-filtered cascade instead of every cell.
        #[arg(long)]
        cell: Option<String>,
    },

    /// Start the interactive WebSocket server.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

fn default_store_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("reactor")
        .join("notebooks")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let store_dir = cli.store_dir.unwrap_or_else(default_store_dir);

    match cli.command {
        Commands::Run { notebook_id, cell } => run::execute(&store_dir, &notebook_id, cell.as_deref())?,
        Commands::Serve { port } => serve::execute(&store_dir, port).await?,
    }

    Ok(())
}
