//! Cryptographic error types for `sdm-crypto-core`.

use thiserror::Error;

/// Errors produced by cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key derivation failed (PBKDF2 parameter validation).
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Encryption failure: missing or malformed key, or the AEAD seal failed.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Decryption failure: missing key, structurally invalid ciphertext,
    /// authentication tag mismatch (wrong key or tampering), or plaintext
    /// that is not valid UTF-8.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Invalid key material (wrong length, bad encoding).
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Secure memory allocation failure.
    #[error("secure memory error: {0}")]
    SecureMemory(String),

    /// The known-answer self-test did not reproduce its expected output.
    #[error("crypto self-test failed: {0}")]
    SelfTest(String),
}
