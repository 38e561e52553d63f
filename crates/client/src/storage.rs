//! Persistent key/value storage for cart and auth state.
//!
//! Values are JSON documents stored under fixed keys (see [`keys`]). The
//! [`KeyValueStore`] trait has an in-memory backend for tests and ephemeral
//! sessions and a file backend (one `<key>.json` per key) for the CLI.
//!
//! Nothing here coordinates between processes sharing the same directory;
//! the last writer wins.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, warn};

/// Storage keys for persisted state.
pub mod keys {
    /// Key for the persisted cart (`{ "items": [...] }`).
    pub const CART: &str = "cart-storage";

    /// Key for the persisted auth session.
    pub const AUTH: &str = "auth-storage";
}

/// Errors that can occur reading or writing storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("storage I/O error for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },

    /// Stored value could not be (de)serialized.
    #[error("storage serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A previous holder of the storage lock panicked.
    #[error("storage lock poisoned")]
    Poisoned,

    /// Key contains characters that cannot be used as a file name.
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

/// Abstraction over browser-style local storage.
///
/// Implementations are synchronous; values are small JSON documents.
pub trait KeyValueStore: Send + Sync {
    /// Read the raw value for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write the raw value for `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Shared handle to a storage backend.
pub type SharedStore = Arc<dyn KeyValueStore>;

/// Read and deserialize the JSON value under `key`.
///
/// A value that no longer parses (e.g. written by an older version) is
/// logged and treated as absent.
///
/// # Errors
///
/// Returns an error only if the backend itself fails.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(key, error = %e, "Discarding unreadable persisted value");
            Ok(None)
        }
    }
}

/// Serialize `value` as JSON and store it under `key`.
///
/// # Errors
///
/// Returns an error if serialization or the backend write fails.
pub fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

// =============================================================================
// MemoryStore
// =============================================================================

/// In-memory storage. Contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a value is stored under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .is_ok_and(|entries| entries.contains_key(key))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

// =============================================================================
// FileStore
// =============================================================================

/// File-backed storage: each key is a `<key>.json` file in one directory.
///
/// Writes go to a temporary file that is renamed over the target, so a
/// crash mid-write leaves the previous value intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a storage directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        debug!(dir = %dir.display(), "Opened file storage");
        Ok(Self { dir })
    }

    /// Directory holding the storage files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };
        fs::write(&tmp, value).map_err(io_err)?;
        fs::rename(&tmp, &path).map_err(io_err)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        n: u32,
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "cartsync-storage-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        save_json(&store, "k", &Doc { n: 3 }).unwrap();

        assert!(store.contains("k"));
        assert_eq!(load_json::<Doc>(&store, "k").unwrap(), Some(Doc { n: 3 }));

        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert!(!store.contains("k"));
    }

    #[test]
    fn test_unreadable_value_treated_as_absent() {
        let store = MemoryStore::new();
        store.set("k", "{not json").unwrap();
        assert_eq!(load_json::<Doc>(&store, "k").unwrap(), None);
    }

    #[test]
    fn test_file_store_roundtrip_and_remove() {
        let dir = temp_dir("roundtrip");
        let store = FileStore::open(&dir).unwrap();

        assert_eq!(store.get(keys::CART).unwrap(), None);
        save_json(&store, keys::CART, &Doc { n: 7 }).unwrap();
        assert!(dir.join("cart-storage.json").exists());
        assert_eq!(
            load_json::<Doc>(&store, keys::CART).unwrap(),
            Some(Doc { n: 7 })
        );

        store.remove(keys::CART).unwrap();
        assert!(!dir.join("cart-storage.json").exists());
        store.remove(keys::CART).unwrap();

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_file_store_rejects_path_keys() {
        let dir = temp_dir("keys");
        let store = FileStore::open(&dir).unwrap();

        assert!(matches!(
            store.get("../etc/passwd"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(store.set("", "x"), Err(StorageError::InvalidKey(_))));

        let _ = fs::remove_dir_all(&dir);
    }
}
