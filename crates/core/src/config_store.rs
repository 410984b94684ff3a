//! Simple key/value persistence of small scalars: tail offsets, file
//! ctimes, and probe last-run timestamps.
//!
//! Writes are serialized by the store itself and committed atomically
//! via write-to-temp-file + rename, without WAL/backup-rotation
//! machinery, since this store only ever holds small scalars and a
//! single authoritative file.

use crate::error::ConfigStoreError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Well-known key helpers.
pub mod keys {
    pub fn tail_offset(path: &str) -> String {
        format!("tail/{path}/offset")
    }

    pub fn tail_ctime(path: &str) -> String {
        format!("tail/{path}/ctime")
    }

    pub fn probe_last_run(name: &str) -> String {
        format!("probe/{name}/last_run")
    }
}

/// Get/set scalar values keyed by string; atomically durable.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), ConfigStoreError>;
}

/// A [`ConfigStore`] backed by a single JSON file on disk.
pub struct FileConfigStore {
    path: PathBuf,
    data: Mutex<HashMap<String, String>>,
}

impl FileConfigStore {
    /// Open (or create) a config store at `path`. Corrupt or missing
    /// files start from an empty map rather than failing — a missing
    /// config file on first boot is the common case, not an error.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "config store file unreadable, starting empty");
                HashMap::new()
            }),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no existing config store, starting empty");
                HashMap::new()
            }
        };
        Self { path, data: Mutex::new(data) }
    }

    fn persist(&self, data: &HashMap<String, String>) -> Result<(), ConfigStoreError> {
        let serialized = serde_json::to_vec_pretty(data)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, &serialized)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl ConfigStore for FileConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        self.data.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ConfigStoreError> {
        let mut guard = self.data.lock();
        guard.insert(key.to_string(), value.to_string());
        self.persist(&guard)
    }
}

/// In-memory store for tests that don't need filesystem durability.
#[derive(Default)]
pub struct MemoryConfigStore {
    data: Mutex<HashMap<String, String>>,
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        self.data.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ConfigStoreError> {
        self.data.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_a_value_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        {
            let store = FileConfigStore::open(&path);
            store.set(&keys::tail_offset("/var/log/x"), "123").unwrap();
        }
        let store2 = FileConfigStore::open(&path);
        assert_eq!(store2.get(&keys::tail_offset("/var/log/x")), Some("123".to_string()));
    }

    #[test]
    fn missing_file_starts_empty_not_erroring() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::open(dir.path().join("nope.json"));
        assert_eq!(store.get("anything"), None);
    }

    #[test]
    fn memory_store_roundtrips() {
        let store = MemoryConfigStore::default();
        assert_eq!(store.get("k"), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k"), Some("v".to_string()));
    }
}
