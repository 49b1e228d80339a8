//! `sdm-vault`: the Secure Data Manager vault.
//!
//! Credentials, message templates and links live in three collections of
//! per-field encrypted records. A [`VaultService`] unlocks them with the
//! master password, keeps the decrypted items in memory while unlocked,
//! and persists each change through a [`VaultStore`].

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod codec;
pub mod config;
pub mod error;
pub mod items;
pub mod mirror;
pub mod readiness;
pub mod service;
pub mod session;
pub mod session_key;
pub mod store;

pub use codec::{decode_item, decode_record, encode_item, encode_record, EncryptedRecord};
pub use config::VaultConfig;
pub use error::{StorageError, VaultError};
pub use items::{
    Collections, Credential, CredentialDraft, CredentialPatch, ItemKind, Link, LinkDraft,
    LinkPatch, Message, MessageDraft, MessagePatch, VaultItem,
};
pub use mirror::{HttpMirror, MirrorEvent, MirrorSink};
pub use readiness::{ReadinessGate, ReadinessSignal};
pub use service::VaultService;
pub use session::{SessionManager, SessionOptions, SessionState};
pub use session_key::{FileSessionKeyStore, MemorySessionKeyStore, SessionKeyStore};
pub use store::{FileBackend, MemoryBackend, StorageBackend, VaultStore};
