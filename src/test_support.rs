// Shared fixtures for unit tests.
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use crate::repository::BaseRepository;
use crate::store::{DocumentStore, MemoryStore};

/// A fresh store and a repository over it.
pub fn memory_repo(db_name: &str) -> (Arc<MemoryStore>, BaseRepository) {
    let store = Arc::new(MemoryStore::new(db_name));
    let backend: Arc<dyn DocumentStore> = store.clone();
    (store, BaseRepository::new(backend))
}

/// A path named `file` inside a temp dir; the dir lives as long as the guard.
pub fn scratch_file(file: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join(file);
    (dir, path)
}
