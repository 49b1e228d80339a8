//! Text cipher codec for individual vault field values.
//!
//! A field value is sealed with AES-256-GCM ([`crate::symmetric`]) and the
//! wire bytes (`nonce || ciphertext || tag`) are rendered as standard base64
//! so the result can sit in a JSON string. A fresh nonce per call makes two
//! encryptions of the same value unrelated.
//!
//! Decryption reports a single [`CryptoError::Decryption`] for every failure
//! mode: missing key, bad base64, truncated input, tag mismatch, or
//! plaintext that is not UTF-8.

use data_encoding::BASE64;
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::symmetric::{self, SealedData};

/// Encrypt a text value.
///
/// `aad` binds the ciphertext to its context (e.g. the field it belongs to);
/// the same `aad` must be supplied to [`decrypt_text`].
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if the key is absent or not 32 bytes.
pub fn encrypt_text(plaintext: &str, key: &[u8], aad: &[u8]) -> Result<String, CryptoError> {
    let sealed = symmetric::encrypt(plaintext.as_bytes(), key, aad)?;
    let mut wire = sealed.to_bytes();
    let encoded = BASE64.encode(&wire);
    wire.zeroize();
    Ok(encoded)
}

/// Decrypt a text value produced by [`encrypt_text`].
///
/// # Errors
///
/// Returns `CryptoError::Decryption` if the key is absent or not 32 bytes,
/// the ciphertext is not valid base64 or too short, authentication fails,
/// or the decrypted bytes are not valid UTF-8.
pub fn decrypt_text(ciphertext: &str, key: &[u8], aad: &[u8]) -> Result<String, CryptoError> {
    if key.is_empty() {
        return Err(CryptoError::Decryption("decryption key is missing".into()));
    }
    let wire = BASE64
        .decode(ciphertext.as_bytes())
        .map_err(|e| CryptoError::Decryption(format!("ciphertext is not base64: {e}")))?;
    let sealed = SealedData::from_bytes(&wire)?;
    let plaintext = symmetric::decrypt(&sealed, key, aad)?;
    plaintext.to_utf8()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symmetric::{KEY_LEN, MIN_SEALED_LEN};

    const KEY: [u8; KEY_LEN] = [0x11; KEY_LEN];
    const OTHER_KEY: [u8; KEY_LEN] = [0x22; KEY_LEN];
    const AAD: &[u8] = b"credentials/pass";

    #[test]
    fn roundtrip_plain_ascii() {
        let ct = encrypt_text("s3cr3t", &KEY, AAD).expect("encrypt");
        assert_eq!(decrypt_text(&ct, &KEY, AAD).expect("decrypt"), "s3cr3t");
    }

    #[test]
    fn roundtrip_unicode_and_empty() {
        for value in ["", "mot de passe é", "日本語のパスワード", "line1\nline2"] {
            let ct = encrypt_text(value, &KEY, AAD).expect("encrypt");
            assert_eq!(decrypt_text(&ct, &KEY, AAD).expect("decrypt"), value);
        }
    }

    #[test]
    fn ciphertext_is_base64_of_sealed_bytes() {
        let ct = encrypt_text("abc", &KEY, AAD).expect("encrypt");
        let raw = BASE64.decode(ct.as_bytes()).expect("valid base64");
        assert_eq!(raw.len(), 3 + MIN_SEALED_LEN);
    }

    #[test]
    fn same_plaintext_encrypts_differently() {
        let a = encrypt_text("same", &KEY, AAD).expect("encrypt");
        let b = encrypt_text("same", &KEY, AAD).expect("encrypt");
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_is_detected() {
        let ct = encrypt_text("s3cr3t", &KEY, AAD).expect("encrypt");
        let err = decrypt_text(&ct, &OTHER_KEY, AAD).expect_err("wrong key must fail");
        assert!(matches!(err, CryptoError::Decryption(_)));
    }

    #[test]
    fn wrong_context_is_detected() {
        let ct = encrypt_text("s3cr3t", &KEY, AAD).expect("encrypt");
        assert!(decrypt_text(&ct, &KEY, b"credentials/user").is_err());
    }

    #[test]
    fn missing_key_fails_both_ways() {
        assert!(matches!(
            encrypt_text("x", &[], AAD),
            Err(CryptoError::Encryption(_))
        ));
        let ct = encrypt_text("x", &KEY, AAD).expect("encrypt");
        assert!(matches!(
            decrypt_text(&ct, &[], AAD),
            Err(CryptoError::Decryption(_))
        ));
    }

    #[test]
    fn structurally_invalid_ciphertext_fails() {
        for bad in ["", "not base64 at all!", "AAAA"] {
            assert!(
                matches!(decrypt_text(bad, &KEY, AAD), Err(CryptoError::Decryption(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn truncated_ciphertext_fails() {
        let ct = encrypt_text("s3cr3t", &KEY, AAD).expect("encrypt");
        let truncated = &ct[..ct.len() - 1];
        assert!(decrypt_text(truncated, &KEY, AAD).is_err());
    }

    #[test]
    fn non_utf8_plaintext_fails() {
        let sealed = symmetric::encrypt(&[0xFF, 0xFE], &KEY, AAD).expect("encrypt");
        let ct = BASE64.encode(&sealed.to_bytes());
        assert!(matches!(
            decrypt_text(&ct, &KEY, AAD),
            Err(CryptoError::Decryption(_))
        ));
    }
}
