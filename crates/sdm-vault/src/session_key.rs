//! Ephemeral session key stores.
//!
//! Holds the derived master key (hex) under the single `"masterKey"` slot
//! while the vault is unlocked, so a restarted front end can resume the
//! session without asking for the password again. Cleared on lock.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use zeroize::Zeroizing;

use crate::error::StorageError;

/// Name of the slot holding the session key.
pub const SESSION_KEY_SLOT: &str = "masterKey";

/// Storage for the current session's master key.
pub trait SessionKeyStore: Send + Sync {
    /// The stored key, if any. Unreadable storage reads as `None`.
    fn get(&self) -> Option<Zeroizing<String>>;

    /// Store `hex_key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the key cannot be written.
    fn set(&self, hex_key: &str) -> Result<(), StorageError>;

    /// Remove the stored key. Never fails; problems are logged.
    fn clear(&self);
}

/// Process-memory store. Clones share the slot.
#[derive(Clone, Default)]
pub struct MemorySessionKeyStore {
    slot: Arc<Mutex<Option<Zeroizing<String>>>>,
}

impl MemorySessionKeyStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for MemorySessionKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySessionKeyStore")
            .field("slot", &"***")
            .finish()
    }
}

impl SessionKeyStore for MemorySessionKeyStore {
    fn get(&self) -> Option<Zeroizing<String>> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }

    fn set(&self, hex_key: &str) -> Result<(), StorageError> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| StorageError::Unavailable("session key lock poisoned".into()))?;
        *slot = Some(Zeroizing::new(hex_key.to_owned()));
        Ok(())
    }

    fn clear(&self) {
        match self.slot.lock() {
            Ok(mut slot) => *slot = None,
            Err(_) => tracing::warn!("session key lock poisoned, cannot clear"),
        }
    }
}

/// A `masterKey` file inside a runtime directory, owner-only on Unix.
///
/// Survives process restart; the CLI uses it so consecutive invocations
/// share one unlocked session.
#[derive(Debug, Clone)]
pub struct FileSessionKeyStore {
    path: PathBuf,
}

impl FileSessionKeyStore {
    /// Store the key as `<dir>/masterKey`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(SESSION_KEY_SLOT),
        }
    }

    /// Store the key at an explicit path.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the key file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionKeyStore for FileSessionKeyStore {
    fn get(&self) -> Option<Zeroizing<String>> {
        let contents = Zeroizing::new(fs::read_to_string(&self.path).ok()?);
        let trimmed = contents.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Zeroizing::new(trimmed.to_owned()))
    }

    fn set(&self, hex_key: &str) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        fs::write(&tmp, hex_key)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("failed to remove session key file: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn memory_store_set_get_clear() {
        let store = MemorySessionKeyStore::new();
        assert!(store.get().is_none());
        store.set("abcd").expect("set");
        assert_eq!(store.get().as_deref().map(String::as_str), Some("abcd"));
        store.clear();
        assert!(store.get().is_none());
    }

    #[test]
    fn memory_store_clones_share_the_slot() {
        let store = MemorySessionKeyStore::new();
        let other = store.clone();
        store.set("00ff").expect("set");
        assert!(other.get().is_some());
        other.clear();
        assert!(store.get().is_none());
    }

    #[test]
    fn memory_store_debug_hides_key() {
        let store = MemorySessionKeyStore::new();
        store.set("deadbeef").expect("set");
        assert!(!format!("{store:?}").contains("deadbeef"));
    }

    #[test]
    fn file_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionKeyStore::in_dir(dir.path());
        assert!(store.get().is_none());
        store.set("0123").expect("set");
        assert!(dir.path().join(SESSION_KEY_SLOT).exists());

        let reopened = FileSessionKeyStore::in_dir(dir.path());
        assert_eq!(reopened.get().as_deref().map(String::as_str), Some("0123"));

        reopened.clear();
        assert!(store.get().is_none());
        assert!(!dir.path().join(SESSION_KEY_SLOT).exists());
    }

    #[test]
    fn file_store_clear_without_file_is_fine() {
        let dir = TempDir::new().unwrap();
        FileSessionKeyStore::in_dir(dir.path()).clear();
    }

    #[test]
    fn file_store_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionKeyStore::at(dir.path().join("run").join("sdm-key"));
        store.set("aa").expect("set");
        assert!(store.path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let store = FileSessionKeyStore::in_dir(dir.path());
        store.set("aa").expect("set");
        let mode = fs::metadata(store.path())
            .expect("metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
