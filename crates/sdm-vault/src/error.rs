//! Vault error types for `sdm-vault`.

use sdm_crypto_core::CryptoError;
use thiserror::Error;

/// Errors produced by vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Cryptographic operation failed (delegated from crypto-core).
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Unlock failed. Wrong password and corrupted data are deliberately
    /// reported the same way.
    #[error("unlock failed")]
    UnlockFailed,

    /// The crypto capability did not become ready within the timeout.
    #[error("crypto capability not ready after {waited_ms}ms")]
    CryptoNotReady {
        /// How long the caller waited.
        waited_ms: u64,
    },

    /// Vault is locked: operation requires an unlocked vault.
    #[error("vault is not unlocked")]
    Locked,

    /// Unlock requested while the vault is already unlocked.
    #[error("vault is already unlocked")]
    AlreadyUnlocked,

    /// Another unlock attempt is in flight.
    #[error("an unlock is already in progress")]
    UnlockInProgress,

    /// A persisted record could not be read as a record of its collection.
    #[error("corrupt record in {collection}: {detail}")]
    CorruptRecord {
        /// Collection name.
        collection: &'static str,
        /// What was wrong with it.
        detail: String,
    },

    /// Persistence medium failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors produced by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The medium cannot be reached at all (missing directory, poisoned lock).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// I/O error from the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
