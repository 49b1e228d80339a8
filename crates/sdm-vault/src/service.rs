//! Vault service: CRUD over the three collections of an unlocked session.
//!
//! Every operation takes the session mutex for the in-memory change and the
//! save of the affected collection, so concurrent callers are serialized and
//! sequential mutations persist in issue order. Saves are best-effort: a
//! storage failure is logged and the in-memory change stands.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::VaultConfig;
use crate::error::VaultError;
use crate::items::{
    generate_id, Credential, CredentialDraft, CredentialPatch, Draft, Link, LinkDraft, LinkPatch,
    Message, MessageDraft, MessagePatch, Patch, Record,
};
use crate::mirror::{HttpMirror, MirrorEvent, MirrorSink};
use crate::readiness::ReadinessGate;
use crate::session::{SessionManager, SessionOptions, SessionState};
use crate::session_key::{FileSessionKeyStore, MemorySessionKeyStore};
use crate::store::{FileBackend, VaultStore};

/// Front door of the vault.
#[derive(Clone)]
pub struct VaultService {
    session: SessionManager,
    mirror: Option<Arc<dyn MirrorSink>>,
}

impl fmt::Debug for VaultService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultService")
            .field("session", &self.session)
            .field("mirror", &self.mirror.is_some())
            .finish()
    }
}

impl VaultService {
    /// Service over an existing session, no mirror.
    #[must_use]
    pub const fn new(session: SessionManager) -> Self {
        Self {
            session,
            mirror: None,
        }
    }

    /// Forward every successful add to `sink`.
    #[must_use]
    pub fn with_mirror(mut self, sink: impl MirrorSink + 'static) -> Self {
        self.mirror = Some(Arc::new(sink));
        self
    }

    /// Wire a file-backed vault in `data_dir` according to `config`.
    ///
    /// Uses the file session key store when `sessionKeyFile` is set (a
    /// relative path is taken relative to `data_dir`), gates unlock on the
    /// crypto self-test, and mirrors over HTTP when `mirrorUrl` is set.
    #[must_use]
    pub fn open(config: &VaultConfig, data_dir: &Path) -> Self {
        let store = VaultStore::new(FileBackend::new(data_dir));
        let readiness = ReadinessGate::self_tested();
        let options = SessionOptions::from(config);

        let session = match &config.session_key_file {
            Some(path) => SessionManager::new(
                store,
                FileSessionKeyStore::at(data_dir.join(path)),
                readiness,
                options,
            ),
            None => SessionManager::new(store, MemorySessionKeyStore::new(), readiness, options),
        };

        let service = Self::new(session);
        match &config.mirror_url {
            Some(url) => {
                tracing::info!(%url, "mirroring added items");
                service.with_mirror(HttpMirror::new(url.as_str()))
            }
            None => service,
        }
    }

    /// The underlying session.
    #[must_use]
    pub const fn session(&self) -> &SessionManager {
        &self.session
    }

    // -- Session ----------------------------------------------------------

    /// See [`SessionManager::unlock`].
    ///
    /// # Errors
    ///
    /// See [`SessionManager::unlock`].
    pub async fn unlock(&self, password: &str) -> Result<(), VaultError> {
        self.session.unlock(password.as_bytes()).await
    }

    /// See [`SessionManager::resume`].
    ///
    /// # Errors
    ///
    /// See [`SessionManager::resume`].
    pub async fn resume(&self) -> Result<bool, VaultError> {
        self.session.resume().await
    }

    /// See [`SessionManager::lock`].
    pub fn lock(&self) {
        self.session.lock();
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// `true` iff unlocked.
    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.session.is_unlocked()
    }

    // -- Credentials --------------------------------------------------------

    /// Add a credential; returns its new id.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] unless unlocked.
    pub fn add_credential(&self, draft: CredentialDraft) -> Result<String, VaultError> {
        self.add(draft)
    }

    /// Merge `patch` into the credential `id`. An empty or absent `pass`
    /// keeps the current password. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] unless unlocked.
    pub fn update_credential(&self, id: &str, patch: CredentialPatch) -> Result<(), VaultError> {
        self.update(id, patch)
    }

    /// Remove the credential `id`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] unless unlocked.
    pub fn delete_credential(&self, id: &str) -> Result<(), VaultError> {
        self.delete::<Credential>(id)
    }

    /// All credentials in display order.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] unless unlocked.
    pub fn credentials(&self) -> Result<Vec<Credential>, VaultError> {
        self.list()
    }

    /// The credential `id`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] unless unlocked.
    pub fn credential(&self, id: &str) -> Result<Option<Credential>, VaultError> {
        self.get(id)
    }

    /// Credentials whose site, user or url contain `term`, ignoring case.
    /// The password is never searched.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] unless unlocked.
    pub fn search_credentials(&self, term: &str) -> Result<Vec<Credential>, VaultError> {
        self.search(term)
    }

    // -- Messages -----------------------------------------------------------

    /// Add a message template; returns its new id.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] unless unlocked.
    pub fn add_message(&self, draft: MessageDraft) -> Result<String, VaultError> {
        self.add(draft)
    }

    /// Merge `patch` into the message `id`. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] unless unlocked.
    pub fn update_message(&self, id: &str, patch: MessagePatch) -> Result<(), VaultError> {
        self.update(id, patch)
    }

    /// Remove the message `id`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] unless unlocked.
    pub fn delete_message(&self, id: &str) -> Result<(), VaultError> {
        self.delete::<Message>(id)
    }

    /// All messages in display order.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] unless unlocked.
    pub fn messages(&self) -> Result<Vec<Message>, VaultError> {
        self.list()
    }

    /// The message `id`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] unless unlocked.
    pub fn message(&self, id: &str) -> Result<Option<Message>, VaultError> {
        self.get(id)
    }

    /// Messages whose title or body contain `term`, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] unless unlocked.
    pub fn search_messages(&self, term: &str) -> Result<Vec<Message>, VaultError> {
        self.search(term)
    }

    // -- Links ----------------------------------------------------------------

    /// Add a link; returns its new id.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] unless unlocked.
    pub fn add_link(&self, draft: LinkDraft) -> Result<String, VaultError> {
        self.add(draft)
    }

    /// Merge `patch` into the link `id`. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] unless unlocked.
    pub fn update_link(&self, id: &str, patch: LinkPatch) -> Result<(), VaultError> {
        self.update(id, patch)
    }

    /// Remove the link `id`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] unless unlocked.
    pub fn delete_link(&self, id: &str) -> Result<(), VaultError> {
        self.delete::<Link>(id)
    }

    /// All links in display order.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] unless unlocked.
    pub fn links(&self) -> Result<Vec<Link>, VaultError> {
        self.list()
    }

    /// The link `id`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] unless unlocked.
    pub fn link(&self, id: &str) -> Result<Option<Link>, VaultError> {
        self.get(id)
    }

    /// Links whose name or url contain `term`, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] unless unlocked.
    pub fn search_links(&self, term: &str) -> Result<Vec<Link>, VaultError> {
        self.search(term)
    }

    // -- Generic operations -------------------------------------------------

    fn add<D: Draft>(&self, draft: D) -> Result<String, VaultError> {
        let kind = <D::Output as Record>::KIND;
        let id = generate_id();
        let record = draft.into_record(id.clone());
        let mirrored = self.mirror.as_ref().map(|_| record.clone().into_item());

        self.session.with_unlocked(|vault| {
            <D::Output as Record>::collection_mut(&mut vault.collections).push(record);
            self.session.persist::<D::Output>(vault);
        })?;
        tracing::debug!(%kind, %id, "item added");

        if let (Some(sink), Some(item)) = (&self.mirror, mirrored) {
            sink.publish(MirrorEvent::added(item));
        }
        Ok(id)
    }

    fn update<P: Patch>(&self, id: &str, patch: P) -> Result<(), VaultError> {
        let kind = <P::Target as Record>::KIND;
        self.session.with_unlocked(|vault| {
            let items = <P::Target as Record>::collection_mut(&mut vault.collections);
            let Some(item) = items.iter_mut().find(|item| item.id() == id) else {
                tracing::debug!(%kind, %id, "update of unknown id ignored");
                return;
            };
            patch.apply(item);
            self.session.persist::<P::Target>(vault);
            tracing::debug!(%kind, %id, "item updated");
        })
    }

    fn delete<T: Record>(&self, id: &str) -> Result<(), VaultError> {
        self.session.with_unlocked(|vault| {
            let items = T::collection_mut(&mut vault.collections);
            let before = items.len();
            items.retain(|item| item.id() != id);
            if items.len() == before {
                tracing::debug!(kind = %T::KIND, %id, "delete of unknown id ignored");
                return;
            }
            self.session.persist::<T>(vault);
            tracing::debug!(kind = %T::KIND, %id, "item deleted");
        })
    }

    fn list<T: Record>(&self) -> Result<Vec<T>, VaultError> {
        self.session
            .with_unlocked(|vault| T::collection(&vault.collections).clone())
    }

    fn get<T: Record>(&self, id: &str) -> Result<Option<T>, VaultError> {
        self.session.with_unlocked(|vault| {
            T::collection(&vault.collections)
                .iter()
                .find(|item| item.id() == id)
                .cloned()
        })
    }

    fn search<T: Record>(&self, term: &str) -> Result<Vec<T>, VaultError> {
        let needle = term.trim().to_lowercase();
        self.session.with_unlocked(|vault| {
            T::collection(&vault.collections)
                .iter()
                .filter(|item| needle.is_empty() || item.matches(&needle))
                .cloned()
                .collect()
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
