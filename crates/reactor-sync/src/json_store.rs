//! A concrete, file-backed [`NotebookStore`]: one notebook per JSON file
//! in a directory, named `{id}.json`. This is the simplest collaborator
//! that satisfies the persistence contract, not a format the spec asks
//! implementers to standardize on.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{SyncError, SyncResult};
use crate::{NotebookStore, NotebookStructure};

pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Use `dir` as the root for `{id}.json` files, creating it if absent.
    pub fn new(dir: impl Into<PathBuf>) -> SyncResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| SyncError::WriteError {
            path: dir.clone(),
            message: e.to_string(),
        })?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl NotebookStore for JsonFileStore {
    fn load(&self, id: &str) -> SyncResult<NotebookStructure> {
        let path = self.path_for(id);
        if !path.exists() {
            tracing::debug!(notebook = id, "no persisted structure found, starting empty");
            return Err(SyncError::NotFound(id.to_string()));
        }
        let text = fs::read_to_string(&path).map_err(|e| SyncError::ReadError {
            path: path.clone(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(SyncError::JsonError)
    }

    fn save(&self, structure: &NotebookStructure) -> SyncResult<()> {
        let path = self.path_for(&structure.id);
        let text = serde_json::to_string_pretty(structure)?;
        fs::write(&path, text).map_err(|e| SyncError::WriteError {
            path,
            message: e.to_string(),
        })?;
        tracing::debug!(notebook = %structure.id, path = %self.path_for(&structure.id).display(), "notebook saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reactor_core::cell::{CellId, CellKind};

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();

        let mut structure = NotebookStructure::new("nb1", "My Notebook");
        structure.db_conn_string = Some(":memory:".to_string());
        structure.cells.push(crate::PersistedCell {
            id: CellId::new("c1"),
            kind: CellKind::Python,
            code: "x = 10".to_string(),
        });

        store.save(&structure).unwrap();
        let loaded = store.load("nb1").unwrap();
        assert_eq!(loaded, structure);
    }

    #[test]
    fn missing_notebook_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();
        assert!(matches!(store.load("ghost"), Err(SyncError::NotFound(_))));
    }

    #[test]
    fn save_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();
        let structure = NotebookStructure::new("nb1", "Notebook");
        store.save(&structure).unwrap();
        store.save(&structure).unwrap();
        assert_eq!(store.load("nb1").unwrap(), structure);
    }

    #[test]
    fn cell_index_finds_position() {
        let mut structure = NotebookStructure::new("nb1", "Notebook");
        structure.cells.push(crate::PersistedCell {
            id: CellId::new("a"),
            kind: CellKind::Python,
            code: String::new(),
        });
        structure.cells.push(crate::PersistedCell {
            id: CellId::new("b"),
            kind: CellKind::Python,
            code: String::new(),
        });
        assert_eq!(structure.cell_index(&CellId::new("b")), Some(1));
        assert_eq!(structure.cell_index(&CellId::new("c")), None);
    }
}
