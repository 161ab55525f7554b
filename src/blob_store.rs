//! Key/value blob storage behind the augmentation cache

use crate::error::{PipelineError, Result};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Storage for cached generations. Entries are permanent: no TTL and no
/// re-validation; an existing entry is returned verbatim.
pub trait KeyValueBlobStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` unless `key` exists. Returns whether it was written.
    fn put_if_absent(&self, key: &str, value: &str) -> Result<bool>;
}

/// One text file per key under a directory.
///
/// Writes are not atomic: a crash mid-write leaves a truncated file that
/// the next run will trust.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    dir: PathBuf,
}

impl FsBlobStore {
    /// Creates the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl KeyValueBlobStore for FsBlobStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::io(path, e)),
        }
    }

    fn put_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let path = self.path_for(key);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(PipelineError::io(path, e)),
        };
        file.write_all(value.as_bytes())
            .map_err(|e| PipelineError::io(&path, e))?;
        Ok(true)
    }
}

/// In-memory store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueBlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn put_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exercise(store: &dyn KeyValueBlobStore) {
        assert_eq!(store.get("a-llama.txt").unwrap(), None);
        assert!(store.put_if_absent("a-llama.txt", "first").unwrap());
        assert!(!store.put_if_absent("a-llama.txt", "second").unwrap());
        assert_eq!(store.get("a-llama.txt").unwrap().as_deref(), Some("first"));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryBlobStore::new();
        exercise(&store);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_fs_store() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path().join("cache")).unwrap();
        exercise(&store);
        let on_disk = fs::read_to_string(store.path_for("a-llama.txt")).unwrap();
        assert_eq!(on_disk, "first");
    }

    #[test]
    fn test_fs_store_trusts_existing_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("x-llama.txt"), "truncated resp").unwrap();
        let store = FsBlobStore::new(dir.path()).unwrap();
        assert_eq!(
            store.get("x-llama.txt").unwrap().as_deref(),
            Some("truncated resp")
        );
    }
}
