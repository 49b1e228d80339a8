//! Master-password key derivation (PBKDF2-HMAC-SHA256).
//!
//! This module provides:
//! - [`derive_key`]: derive the 256-bit vault key from a master password
//! - [`KdfParams`]: iteration count (the salt is fixed application-wide)
//! - [`MasterKey`]: the derived key, zeroized on drop
//!
//! # Fixed salt
//!
//! The vault has no header to carry a per-vault salt: the same password must
//! always yield the same key so that existing ciphertext stays readable. A
//! single application-wide salt constant is used instead. Brute-force cost
//! comes entirely from the iteration count.

use crate::error::CryptoError;
use crate::memory::SecretBytes;
use crate::symmetric::KEY_LEN;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroize;

/// Application-wide PBKDF2 salt.
pub const SALT: &[u8] = b"secure-data-manager-static-salt";

/// Default PBKDF2-HMAC-SHA256 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 600_000;

/// The derived 256-bit vault key.
pub type MasterKey = SecretBytes<KEY_LEN>;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// PBKDF2 parameter set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Number of PBKDF2 rounds. Must be non-zero.
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

// ---------------------------------------------------------------------------
// Core KDF
// ---------------------------------------------------------------------------

/// Derive the vault key from a master password.
///
/// Deterministic: the same password and parameters always yield the same
/// key. Any password is accepted, including the empty one; password policy
/// belongs to the caller.
///
/// # Errors
///
/// Returns `CryptoError::KeyDerivation` if `params.iterations` is zero.
pub fn derive_key(password: &[u8], params: &KdfParams) -> Result<MasterKey, CryptoError> {
    if params.iterations == 0 {
        return Err(CryptoError::KeyDerivation(
            "iteration count must be non-zero".into(),
        ));
    }

    let mut output = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, SALT, params.iterations, &mut output);

    let key = MasterKey::new(output);
    output.zeroize();
    Ok(key)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
