//! End-to-end tests for the `reactor` CLI's `run` command against real
//! JSON-backed notebook stores.

#![allow(deprecated)] // Command::cargo_bin is the documented pattern for this assert_cmd version.

use assert_cmd::Command;
use predicates::prelude::*;
use reactor_core::cell::{CellId, CellKind};
use reactor_sync::{JsonFileStore, NotebookStore, NotebookStructure, PersistedCell};
use tempfile::TempDir;

fn store_with(structure: NotebookStructure) -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    let store = JsonFileStore::new(dir.path()).expect("store");
    store.save(&structure).expect("save");
    dir
}

fn three_cell_notebook(id: &str) -> NotebookStructure {
    let mut nb = NotebookStructure::new(id, "Three Cells");
    nb.cells.push(PersistedCell { id: CellId::new("base"), kind: CellKind::Python, code: "base = 42".to_string() });
    nb.cells.push(PersistedCell { id: CellId::new("doubled"), kind: CellKind::Python, code: "doubled = base * 2".to_string() });
    nb.cells.push(PersistedCell { id: CellId::new("plus_ten"), kind: CellKind::Python, code: "plus_ten = doubled + 10".to_string() });
    nb
}

#[test]
fn run_nonexistent_notebook_fails() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("reactor")
        .expect("binary built")
        .args(["--store-dir", dir.path().to_str().unwrap(), "run", "ghost"])
        .assert()
        .failure();
}

#[test]
fn run_simple_notebook_executes_every_cell() {
    let dir = store_with(three_cell_notebook("simple"));

    let output = Command::cargo_bin("reactor")
        .expect("binary built")
        .args(["--store-dir", dir.path().to_str().unwrap(), "run", "simple"])
        .output()
        .expect("run reactor");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("3 cells"), "stdout: {stdout}");
    assert!(stdout.contains("[base] status = success"), "stdout: {stdout}");
    assert!(stdout.contains("[doubled] status = success"), "stdout: {stdout}");
    assert!(stdout.contains("[plus_ten] status = success"), "stdout: {stdout}");
    assert!(stdout.contains("Done."));
}

#[test]
fn run_with_cell_filter_cascades_through_descendants() {
    let dir = store_with(three_cell_notebook("filtered"));

    let output = Command::cargo_bin("reactor")
        .expect("binary built")
        .args(["--store-dir", dir.path().to_str().unwrap(), "run", "filtered", "--cell", "doubled"])
        .output()
        .expect("run reactor");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    // --cell targets a single cascade root: its stale ancestors, itself,
    // and everything downstream of it all re-run.
    assert!(stdout.contains("[base] status = success"));
    assert!(stdout.contains("[doubled] status = success"));
    assert!(stdout.contains("[plus_ten] status = success"));
}

#[test]
fn run_empty_notebook_reports_no_cells() {
    let dir = store_with(NotebookStructure::new("empty", "Empty"));

    Command::cargo_bin("reactor")
        .expect("binary built")
        .args(["--store-dir", dir.path().to_str().unwrap(), "run", "empty"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No cells"));
}

#[test]
fn run_surfaces_python_errors_without_crashing_cli() {
    let mut nb = NotebookStructure::new("broken", "Broken");
    nb.cells.push(PersistedCell { id: CellId::new("c1"), kind: CellKind::Python, code: "1 / 0".to_string() });
    let dir = store_with(nb);

    let output = Command::cargo_bin("reactor")
        .expect("binary built")
        .args(["--store-dir", dir.path().to_str().unwrap(), "run", "broken"])
        .output()
        .expect("run reactor");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "CLI itself should exit cleanly even on a cell error");
    assert!(stdout.contains("ERROR"), "stdout: {stdout}");
}

#[test]
fn help_mentions_notebook_engine() {
    Command::cargo_bin("reactor")
        .expect("binary built")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Reactive notebook"));
}

#[test]
fn version_flag_succeeds() {
    Command::cargo_bin("reactor")
        .expect("binary built")
        .arg("--version")
        .assert()
        .success();
}
