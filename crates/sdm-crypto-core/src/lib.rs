//! `sdm-crypto-core`: cryptographic primitives for the Secure Data Manager vault.
//!
//! Zero network, zero async, zero file I/O. The vault crate builds on:
//! - [`kdf`]: master password → 256-bit key (PBKDF2-HMAC-SHA256, fixed salt)
//! - [`symmetric`]: AES-256-GCM sealing of byte strings
//! - [`cipher`]: per-field text codec (sealed bytes as base64)
//! - [`selftest`]: start-up check gating the vault's readiness

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod memory;

pub mod cipher;
pub mod kdf;
pub mod symmetric;

pub mod selftest;

pub use cipher::{decrypt_text, encrypt_text};
pub use error::CryptoError;
pub use kdf::{derive_key, KdfParams, MasterKey, DEFAULT_ITERATIONS, SALT};
pub use memory::{SecretBuffer, SecretBytes};
pub use symmetric::{decrypt, encrypt, SealedData, KEY_LEN};
