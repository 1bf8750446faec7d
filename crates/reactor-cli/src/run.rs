//! Headless notebook execution: build an in-process kernel (no child
//! process, no IPC — this runs on the CLI's own thread and exits when
//! done), register every persisted cell, run the requested cascade, and
//! print the notification stream to stdout.

use std::path::Path;

use reactor_core::cell::CellId;
use reactor_core::ipc::{Channel, KernelRequest, Notification};
use reactor_core::kernel::{self, Kernel};
use reactor_sync::{JsonFileStore, NotebookStore};

pub fn execute(store_dir: &Path, notebook_id: &str, cell_filter: Option<&str>) -> anyhow::Result<()> {
    let store = JsonFileStore::new(store_dir)?;
    let structure = store.load(notebook_id)?;

    if structure.cells.is_empty() {
        println!("No cells in notebook '{notebook_id}'.");
        return Ok(());
    }

    println!("Running '{}' ({} cells)", structure.name, structure.cells.len());
    println!("{}", "-".repeat(50));

    kernel::interpreter().enter(|vm| -> anyhow::Result<()> {
        let mut engine = Kernel::new(vm);

        let print = |notes: Vec<Notification>| {
            for note in &notes {
                print_notification(note);
            }
        };

        for cell in &structure.cells {
            let mut notes = Vec::new();
            engine.handle(
                KernelRequest::RegisterCell { id: cell.id.clone(), code: cell.code.clone(), kind: cell.kind },
                &mut |note| notes.push(note),
            );
            print(notes);
        }

        if let Some(conn) = &structure.db_conn_string {
            let mut notes = Vec::new();
            engine.handle(
                KernelRequest::SetDbConfig { connection_string: conn.clone() },
                &mut |note| notes.push(note),
            );
            print(notes);
        }

        match cell_filter {
            Some(id) => {
                let mut notes = Vec::new();
                engine.handle(KernelRequest::Execute { id: CellId::new(id) }, &mut |note| notes.push(note));
                print(notes);
            }
            None => {
                for cell in &structure.cells {
                    let mut notes = Vec::new();
                    engine.handle(KernelRequest::Execute { id: cell.id.clone() }, &mut |note| notes.push(note));
                    print(notes);
                }
            }
        }

        Ok(())
    })?;

    println!("{}", "-".repeat(50));
    println!("Done.");
    Ok(())
}

fn print_notification(note: &Notification) {
    match note.output.channel {
        Channel::Status => {
            let value: serde_json::Value = serde_json::from_str(&note.output.data).unwrap_or_default();
            let status = value["status"].as_str().unwrap_or("unknown");
            println!("[{}] status = {status}", note.cell_id);
        }
        Channel::Stdout => print!("[{}] {}", note.cell_id, note.output.data),
        Channel::Stderr => eprint!("[{}] {}", note.cell_id, note.output.data),
        Channel::Output => println!("[{}] -> ({}) {}", note.cell_id, note.output.mime_type, note.output.data),
        Channel::Error => {
            let value: serde_json::Value = serde_json::from_str(&note.output.data).unwrap_or_default();
            println!(
                "[{}] ERROR {}: {}",
                note.cell_id,
                value["error_type"].as_str().unwrap_or("Error"),
                value["message"].as_str().unwrap_or(&note.output.data)
            );
        }
        Channel::Metadata => {}
    }
}
