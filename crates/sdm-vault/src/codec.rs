//! Record codec: typed items ↔ per-field encrypted records.
//!
//! Each confidential field is sealed on its own with the session key. The
//! associated data binds every ciphertext to `collection/id/field`, so a
//! value moved to another field or record no longer authenticates. The
//! `id` is copied through in plaintext.

use std::collections::BTreeMap;

use sdm_crypto_core::cipher::{decrypt_text, encrypt_text};
use sdm_crypto_core::{CryptoError, MasterKey};
use serde::{Deserialize, Serialize};

use crate::error::VaultError;
use crate::items::{Credential, ItemKind, Link, Message, Record, VaultItem};

/// On-disk form of a vault item: plaintext `id`, every other field ciphertext.
///
/// Serializes as a flat JSON object with the item's own field names, e.g.
/// `{"id": "...", "site": "<b64>", "url": "<b64>", "user": "<b64>", "pass": "<b64>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedRecord {
    /// Plaintext identifier.
    pub id: String,
    /// Field name → base64 ciphertext.
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

fn field_aad(kind: ItemKind, id: &str, field: &str) -> Vec<u8> {
    format!("{}/{id}/{field}", kind.collection()).into_bytes()
}

/// Encrypt every field of `item` except `id`.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if the key is unusable.
pub fn encode_record<T: Record>(item: &T, key: &MasterKey) -> Result<EncryptedRecord, CryptoError> {
    let id = item.id();
    let mut fields = BTreeMap::new();
    for (name, value) in item.fields() {
        let aad = field_aad(T::KIND, id, name);
        fields.insert(name.to_owned(), encrypt_text(value, key.expose(), &aad)?);
    }
    Ok(EncryptedRecord {
        id: id.to_owned(),
        fields,
    })
}

/// Decrypt a record of type `T`.
///
/// Fails as a whole if any single field is missing or does not decrypt.
/// Fields not in `T`'s table are ignored.
///
/// # Errors
///
/// - [`VaultError::CorruptRecord`] if a field is missing
/// - [`VaultError::Crypto`] if a field fails to decrypt
pub fn decode_record<T: Record>(
    record: &EncryptedRecord,
    key: &MasterKey,
) -> Result<T, VaultError> {
    let id = record.id.as_str();
    let decoded = T::from_fields(record.id.clone(), |name| {
        let ciphertext = record
            .fields
            .get(name)
            .ok_or_else(|| VaultError::CorruptRecord {
                collection: T::KIND.collection(),
                detail: format!("missing field `{name}`"),
            })?;
        let aad = field_aad(T::KIND, id, name);
        Ok(decrypt_text(ciphertext, key.expose(), &aad)?)
    })?;

    let expected = T::KIND.fields();
    if record.fields.keys().any(|k| !expected.contains(&k.as_str())) {
        tracing::debug!(
            collection = T::KIND.collection(),
            "ignoring unknown fields in stored record"
        );
    }
    Ok(decoded)
}

/// Encrypt any [`VaultItem`].
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if the key is unusable.
pub fn encode_item(item: &VaultItem, key: &MasterKey) -> Result<EncryptedRecord, CryptoError> {
    match item {
        VaultItem::Credential(c) => encode_record(c, key),
        VaultItem::Message(m) => encode_record(m, key),
        VaultItem::Link(l) => encode_record(l, key),
    }
}

/// Decrypt a record stored in `kind`'s collection.
///
/// # Errors
///
/// See [`decode_record`].
pub fn decode_item(
    record: &EncryptedRecord,
    kind: ItemKind,
    key: &MasterKey,
) -> Result<VaultItem, VaultError> {
    Ok(match kind {
        ItemKind::Credential => decode_record::<Credential>(record, key)?.into_item(),
        ItemKind::Message => decode_record::<Message>(record, key)?.into_item(),
        ItemKind::Link => decode_record::<Link>(record, key)?.into_item(),
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
