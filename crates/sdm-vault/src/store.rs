//! Vault store: named collections of encrypted records on durable storage.
//!
//! Storage is a plain key → serialized JSON array mapping, one key per
//! collection (`credentials`, `messages`, `links`). Each collection is read
//! and written on its own; there is no transaction spanning collections.
//!
//! Load policy:
//! - storage unreachable, key absent, or top level not a JSON array → empty
//! - an element of the array that is not a record → [`VaultError::CorruptRecord`]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::codec::EncryptedRecord;
use crate::error::{StorageError, VaultError};

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// Key → string persistence medium.
pub trait StorageBackend: Send + Sync {
    /// Read the value stored under `key`. `Ok(None)` if absent.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the medium cannot be read.
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the medium cannot be written.
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// One `<key>.json` file per collection inside a data directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Use `dir` as the data directory. It is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The data directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StorageBackend for FileBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        if !self.dir.is_dir() {
            return Err(StorageError::Unavailable(format!(
                "data directory {} does not exist",
                self.dir.display()
            )));
        }
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomic write: `.<key>.json.tmp` then rename, owner-only on Unix.
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{key}.json.tmp"));

        fs::write(&tmp, value)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// In-process map. Clones share the same map, so dropping a vault and
/// building a new one over a clone simulates a process restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<Mutex<HashMap<String, String>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryBackend {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read and write fail with [`StorageError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Raw stored value, for inspection.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().ok().and_then(|m| m.get(key).cloned())
    }

    /// Overwrite a raw value, bypassing the codec.
    pub fn put_raw(&self, key: &str, value: &str) {
        if let Ok(mut m) = self.entries.lock() {
            m.insert(key.to_owned(), value.to_owned());
        }
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory store disabled".into()));
        }
        Ok(())
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check()?;
        let map = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".into()))?;
        Ok(map.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check()?;
        let mut map = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".into()))?;
        map.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Vault store
// ---------------------------------------------------------------------------

/// Collection-level persistence over a [`StorageBackend`].
#[derive(Clone)]
pub struct VaultStore {
    backend: Arc<dyn StorageBackend>,
}

impl std::fmt::Debug for VaultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultStore")
    }
}

impl VaultStore {
    /// Wrap a backend.
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Write `records` as the whole content of `collection`.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if serialization or the backend write fails.
    pub fn save(&self, collection: &str, records: &[EncryptedRecord]) -> Result<(), StorageError> {
        let json = serde_json::to_string(records)?;
        self.backend.write(collection, &json)?;
        tracing::debug!(collection, count = records.len(), "collection saved");
        Ok(())
    }

    /// Read every record of `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::CorruptRecord`] if an array element is not a
    /// record. Unreachable storage and malformed top-level content are
    /// logged and read as an empty collection.
    pub fn load(&self, collection: &'static str) -> Result<Vec<EncryptedRecord>, VaultError> {
        let raw = match self.backend.read(collection) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(Vec::new()),
            Err(e) => {
                tracing::warn!(collection, "storage unavailable, treating as empty: {e}");
                return Ok(Vec::new());
            }
        };

        let elements = match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(serde_json::Value::Array(elements)) => elements,
            Ok(_) => {
                tracing::warn!(collection, "stored collection is not an array, ignoring");
                return Ok(Vec::new());
            }
            Err(e) => {
                tracing::warn!(collection, "stored collection is not valid JSON, ignoring: {e}");
                return Ok(Vec::new());
            }
        };

        elements
            .into_iter()
            .enumerate()
            .map(|(index, element)| {
                serde_json::from_value::<EncryptedRecord>(element).map_err(|e| {
                    VaultError::CorruptRecord {
                        collection,
                        detail: format!("element {index}: {e}"),
                    }
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
