//! Key-value storage backends
//!
//! Persistence talks to a synchronous, string-valued store with a
//! quota-exceeded failure mode. Two backends ship here: an in-memory map with
//! an optional byte quota and a directory of JSON files.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::StorageError;

/// Linux `ENOSPC`
const NO_SPACE_OS_ERROR: i32 = 28;

/// Synchronous string key-value store
pub trait KeyValueStore: Send + Sync + Debug {
    /// Read a value
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value; either the whole value is stored or nothing is
    ///
    /// # Errors
    /// Returns `StorageError::QuotaExceeded` when the write does not fit
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value; missing keys are ignored
    fn remove(&self, key: &str);

    /// All keys currently stored
    fn keys(&self) -> Vec<String>;
}

/// In-memory store with an optional byte quota
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    /// Unbounded store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects writes once keys plus values exceed `quota_bytes`
    #[must_use]
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Bytes currently used
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        if let Some(quota) = self.quota_bytes {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    bytes: value.len(),
                });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }
}

/// Directory-backed store; one `<key>.json` file per key
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create) a store rooted at `dir`
    ///
    /// # Errors
    /// Returns `StorageError::Io` if the directory cannot be created
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Root directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.path_for(key).ok()?;
        fs::read_to_string(path).ok()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        let map_io = |source: std::io::Error| {
            if source.raw_os_error() == Some(NO_SPACE_OS_ERROR) {
                StorageError::QuotaExceeded {
                    key: key.to_string(),
                    bytes: value.len(),
                }
            } else {
                StorageError::Io {
                    key: key.to_string(),
                    source,
                }
            }
        };

        let written = fs::File::create(&tmp)
            .and_then(|mut file| {
                file.write_all(value.as_bytes())?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&tmp, &path));
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp);
            return Err(map_io(err));
        }
        Ok(())
    }

    fn remove(&self, key: &str) {
        if let Ok(path) = self.path_for(key) {
            let _ = fs::remove_file(path);
        }
    }

    fn keys(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut keys: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                name.strip_suffix(".json").map(str::to_string)
            })
            .collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").as_deref(), Some("1"));
        store.remove("a");
        assert!(store.get("a").is_none());
        store.remove("missing");
    }

    #[test]
    fn memory_store_quota_rejects_without_partial_write() {
        let store = MemoryStore::with_quota(10);
        store.set("k", "12345").unwrap();
        let err = store.set("other", "1234567890").unwrap_err();
        assert!(err.is_quota());
        assert!(store.get("other").is_none());
        assert_eq!(store.get("k").as_deref(), Some("12345"));
    }

    #[test]
    fn memory_store_quota_counts_replacement_once() {
        let store = MemoryStore::with_quota(8);
        store.set("k", "1234567").unwrap();
        store.set("k", "7654321").unwrap();
        assert_eq!(store.used_bytes(), 8);
    }

    #[test]
    fn file_store_roundtrip_and_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.set("canvas-storage", "{}").unwrap();
        store.set("canvas-snapshot-1", "[]").unwrap();
        assert_eq!(store.get("canvas-storage").as_deref(), Some("{}"));
        assert_eq!(
            store.keys(),
            vec!["canvas-snapshot-1".to_string(), "canvas-storage".to_string()]
        );
        store.remove("canvas-storage");
        assert!(store.get("canvas-storage").is_none());
    }

    #[test]
    fn file_store_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.set("../escape", "x"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(store.get("../escape").is_none());
    }
}
