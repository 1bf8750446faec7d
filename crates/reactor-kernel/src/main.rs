//! Kernel process entry point: parse the few flags this process needs, set
//! up logging, construct the interpreter, and hand stdin/stdout to the
//! kernel's blocking request loop for the rest of the process's life.
//!
//! Deliberately thin. Everything that isn't "own this process's stdio and
//! argv" lives in `reactor_core::kernel`.

use clap::Parser;
use reactor_core::kernel::{self, Kernel};

#[derive(Parser)]
#[command(name = "reactor-kernel")]
#[command(about = "Kernel process for a single Reactor notebook session")]
struct Cli {
    /// Enable verbose (debug) logging on stderr.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("kernel process starting");

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();

    kernel::interpreter().enter(|vm| {
        let mut kernel = Kernel::new(vm);
        kernel.run_loop(stdin.lock(), stdout.lock())
    })?;

    tracing::info!("kernel process exiting");
    Ok(())
}
