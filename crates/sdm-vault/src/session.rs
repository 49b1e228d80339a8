//! Session manager: the lock/unlock state machine.
//!
//! ```text
//!            unlock(pw) / resume()                 success
//!  Locked ───────────────────────────▶ Unlocking ──────────▶ Unlocked
//!    ▲                                    │                     │
//!    └──────────── any failure ───────────┘                     │
//!    └──────────────────────────── lock() ──────────────────────┘
//! ```
//!
//! The session is an explicit value behind `Arc<Mutex<..>>`; clones of the
//! [`SessionManager`] are handles to the same session. The mutex is never
//! held across an `.await`.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use sdm_crypto_core::{derive_key, KdfParams, MasterKey};
use zeroize::Zeroizing;

use crate::codec::{decode_record, encode_record};
use crate::config::VaultConfig;
use crate::error::VaultError;
use crate::items::{Collections, Credential, Link, Message, Record};
use crate::readiness::ReadinessGate;
use crate::session_key::SessionKeyStore;
use crate::store::VaultStore;

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No key in memory. Initial state.
    Locked,
    /// An unlock or resume is in flight.
    Unlocking,
    /// Key and decrypted collections are in memory.
    Unlocked,
}

impl SessionState {
    /// Lowercase name, for display.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::Unlocking => "unlocking",
            Self::Unlocked => "unlocked",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decrypted vault held while unlocked.
///
/// Dropping it zeroizes the key (`SecretBytes`) and every item (their
/// `Drop` impls).
pub(crate) struct OpenVault {
    pub(crate) key: MasterKey,
    pub(crate) collections: Collections,
}

enum Slot {
    Locked,
    /// Owned by the unlock attempt holding this token.
    Unlocking(u64),
    Unlocked(OpenVault),
}

impl Slot {
    const fn state(&self) -> SessionState {
        match self {
            Self::Locked => SessionState::Locked,
            Self::Unlocking(_) => SessionState::Unlocking,
            Self::Unlocked(_) => SessionState::Unlocked,
        }
    }
}

/// Tuning for unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Key-derivation parameters.
    pub kdf: KdfParams,
    /// Upper bound on the wait for crypto readiness.
    pub readiness_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&VaultConfig::default())
    }
}

impl From<&VaultConfig> for SessionOptions {
    fn from(config: &VaultConfig) -> Self {
        Self {
            kdf: config.kdf_params(),
            readiness_timeout: config.readiness_timeout(),
        }
    }
}

/// Resets an abandoned unlock back to `Locked`.
///
/// Covers early returns and a dropped `unlock` future alike.
///
/// Each attempt only ever touches the `Unlocking` state carrying its own
/// token, so an attempt outlived by `lock()` and a newer unlock can
/// neither reset nor overwrite the newer one.
struct UnlockAttempt<'a> {
    slot: &'a Mutex<Slot>,
    token: u64,
    armed: bool,
}

impl UnlockAttempt<'_> {
    fn owns(&self, slot: &Slot) -> bool {
        matches!(slot, Slot::Unlocking(token) if *token == self.token)
    }

    /// Install `vault` if this attempt still owns the `Unlocking` state,
    /// running `on_commit` under the same lock. Returns `false` if a
    /// `lock()` intervened.
    fn commit(mut self, vault: OpenVault, on_commit: impl FnOnce(&OpenVault)) -> bool {
        self.armed = false;
        let mut slot = lock_slot(self.slot);
        if self.owns(&slot) {
            on_commit(&vault);
            *slot = Slot::Unlocked(vault);
            true
        } else {
            false
        }
    }

    /// Give up: back to `Locked` and run `on_abandon` under the same lock,
    /// unless a `lock()` intervened.
    fn abandon(mut self, on_abandon: impl FnOnce()) {
        self.armed = false;
        let mut slot = lock_slot(self.slot);
        if self.owns(&slot) {
            on_abandon();
            *slot = Slot::Locked;
        }
    }
}

impl Drop for UnlockAttempt<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut slot = lock_slot(self.slot);
            if self.owns(&slot) {
                *slot = Slot::Locked;
            }
        }
    }
}

fn lock_slot(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the session: key, decrypted collections and their persistence.
#[derive(Clone)]
pub struct SessionManager {
    slot: Arc<Mutex<Slot>>,
    attempts: Arc<AtomicU64>,
    store: VaultStore,
    session_keys: Arc<dyn SessionKeyStore>,
    readiness: ReadinessGate,
    options: SessionOptions,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// A locked session over `store`.
    pub fn new(
        store: VaultStore,
        session_keys: impl SessionKeyStore + 'static,
        readiness: ReadinessGate,
        options: SessionOptions,
    ) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::Locked)),
            attempts: Arc::new(AtomicU64::new(0)),
            store,
            session_keys: Arc::new(session_keys),
            readiness,
            options,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        lock_slot(&self.slot).state()
    }

    /// `true` iff [`SessionState::Unlocked`].
    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.state() == SessionState::Unlocked
    }

    /// Unlock with the master password.
    ///
    /// Waits for crypto readiness, derives the key and decodes all three
    /// collections. On success the key is also written to the session key
    /// store. Nothing is kept from a failed attempt.
    ///
    /// # Errors
    ///
    /// - [`VaultError::AlreadyUnlocked`] / [`VaultError::UnlockInProgress`]
    /// - [`VaultError::CryptoNotReady`] if the readiness gate stays closed
    /// - [`VaultError::UnlockFailed`] for a wrong password or corrupt data
    pub async fn unlock(&self, password: &[u8]) -> Result<(), VaultError> {
        let attempt = self.begin_unlock()?;
        self.readiness.wait(self.options.readiness_timeout).await?;

        let store = self.store.clone();
        let kdf = self.options.kdf;
        let password = Zeroizing::new(password.to_vec());
        let opened = run_blocking(move || {
            let key = derive_key(&password, &kdf)?;
            open_vault(&store, key)
        })
        .await;

        let vault = match opened {
            Ok(vault) => vault,
            Err(e) => {
                tracing::debug!("unlock rejected: {e}");
                attempt.abandon(|| self.session_keys.clear());
                return Err(VaultError::UnlockFailed);
            }
        };

        let committed = attempt.commit(vault, |vault| {
            if let Err(e) = self.session_keys.set(&vault.key.to_hex()) {
                tracing::warn!("session key not stored, next start will need the password: {e}");
            }
        });
        if !committed {
            tracing::debug!("unlock superseded by lock");
            return Err(VaultError::UnlockFailed);
        }
        tracing::info!("vault unlocked");
        Ok(())
    }

    /// Resume from the session key store, if it holds a key.
    ///
    /// Returns `Ok(true)` if the vault is now unlocked. A stored key that
    /// does not decode the collections is treated exactly like
    /// [`lock`](Self::lock) and yields `Ok(false)`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::UnlockInProgress`] if an unlock is in flight
    /// - [`VaultError::CryptoNotReady`] if the readiness gate stays closed;
    ///   the stored key is left in place for a later attempt
    pub async fn resume(&self) -> Result<bool, VaultError> {
        let Some(hex_key) = self.session_keys.get() else {
            return Ok(false);
        };
        let attempt = match self.begin_unlock() {
            Ok(attempt) => attempt,
            Err(VaultError::AlreadyUnlocked) => return Ok(true),
            Err(e) => return Err(e),
        };
        self.readiness.wait(self.options.readiness_timeout).await?;

        let store = self.store.clone();
        let opened = run_blocking(move || {
            let key = MasterKey::from_hex(&hex_key)?;
            open_vault(&store, key)
        })
        .await;
        let vault = match opened {
            Ok(vault) => vault,
            Err(e) => {
                tracing::debug!("stored session key rejected: {e}");
                attempt.abandon(|| self.session_keys.clear());
                return Ok(false);
            }
        };
        if attempt.commit(vault, |_| {}) {
            tracing::info!("vault session resumed");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Drop the key and every decrypted item, and clear the session key
    /// store. Never fails.
    pub fn lock(&self) {
        let previous = {
            let mut slot = lock_slot(&self.slot);
            self.session_keys.clear();
            std::mem::replace(&mut *slot, Slot::Locked)
        };
        if matches!(previous, Slot::Unlocked(_)) {
            tracing::info!("vault locked");
        }
        drop(previous);
    }

    /// Run `f` against the open vault, holding the session mutex for the
    /// whole call.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] unless unlocked.
    pub(crate) fn with_unlocked<R>(
        &self,
        f: impl FnOnce(&mut OpenVault) -> R,
    ) -> Result<R, VaultError> {
        match &mut *lock_slot(&self.slot) {
            Slot::Unlocked(vault) => Ok(f(vault)),
            Slot::Locked | Slot::Unlocking(_) => Err(VaultError::Locked),
        }
    }

    /// Re-encode and save `T`'s whole collection. Failures are logged and
    /// swallowed; the in-memory change stands.
    pub(crate) fn persist<T: Record>(&self, vault: &OpenVault) {
        let collection = T::KIND.collection();
        let records: Result<Vec<_>, _> = T::collection(&vault.collections)
            .iter()
            .map(|item| encode_record(item, &vault.key))
            .collect();
        let result = records
            .map_err(VaultError::from)
            .and_then(|records| {
                self.store
                    .save(collection, &records)
                    .map_err(VaultError::from)
            });
        if let Err(e) = result {
            tracing::warn!(collection, "failed to persist collection: {e}");
        }
    }

    fn begin_unlock(&self) -> Result<UnlockAttempt<'_>, VaultError> {
        let mut slot = lock_slot(&self.slot);
        match *slot {
            Slot::Unlocked(_) => Err(VaultError::AlreadyUnlocked),
            Slot::Unlocking(_) => Err(VaultError::UnlockInProgress),
            Slot::Locked => {
                let token = self.attempts.fetch_add(1, Ordering::Relaxed);
                *slot = Slot::Unlocking(token);
                Ok(UnlockAttempt {
                    slot: &self.slot,
                    token,
                    armed: true,
                })
            }
        }
    }
}

/// Run key derivation and record decoding off the async executor.
async fn run_blocking<F>(job: F) -> Result<OpenVault, VaultError>
where
    F: FnOnce() -> Result<OpenVault, VaultError> + Send + 'static,
{
    tokio::task::spawn_blocking(job).await.unwrap_or_else(|e| {
        tracing::debug!("unlock task did not complete: {e}");
        Err(VaultError::UnlockFailed)
    })
}

fn open_vault(store: &VaultStore, key: MasterKey) -> Result<OpenVault, VaultError> {
    let collections = Collections {
        credentials: load_collection::<Credential>(store, &key)?,
        messages: load_collection::<Message>(store, &key)?,
        links: load_collection::<Link>(store, &key)?,
    };
    Ok(OpenVault { key, collections })
}

fn load_collection<T: Record>(store: &VaultStore, key: &MasterKey) -> Result<Vec<T>, VaultError> {
    let collection = T::KIND.collection();
    let records = store.load(collection)?;
    let mut seen = HashSet::with_capacity(records.len());
    records
        .iter()
        .map(|record| {
            if !seen.insert(record.id.as_str()) {
                return Err(VaultError::CorruptRecord {
                    collection,
                    detail: format!("duplicate id {}", record.id),
                });
            }
            decode_record::<T>(record, key)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
