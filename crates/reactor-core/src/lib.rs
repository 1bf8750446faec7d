//! Core engine for the Reactor reactive notebook environment.
//!
//! This crate holds every piece of logic that doesn't need a process
//! boundary to make sense on its own:
//!
//! - [`extractor`] — static `(reads, writes)` extraction from cell source.
//! - [`graph`] — the incrementally maintained dependency DAG.
//! - [`kernel`] — the stale-tracking execution runtime: namespace, Python
//!   and SQL execution, MIME bundle conversion, and the request/notification
//!   loop that a thin process entry point (the `reactor-kernel` binary)
//!   wires up to stdio.
//! - [`ipc`] — the wire envelope shared between the kernel process and its
//!   coordinator.
//!
//! `reactor-server` only ever reaches the kernel across the IPC boundary:
//! it spawns the `reactor-kernel` binary and talks to it over the wire
//! envelope in [`ipc`], never touching [`kernel`] directly. `reactor-cli`
//! is the exception: its headless `run` subcommand builds a [`Kernel`]
//! in-process for a single notebook invocation, skipping IPC entirely
//! since there's no long-lived session to coordinate.

pub mod cell;
pub mod error;
pub mod extractor;
pub mod graph;
pub mod ipc;
pub mod kernel;

pub use cell::{CellId, CellKind};
pub use error::{Error, Result};
pub use graph::DependencyGraph;
pub use kernel::Kernel;
