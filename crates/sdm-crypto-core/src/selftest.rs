//! Start-up self-test for the primitives the vault depends on.
//!
//! The vault refuses to derive keys until this check has passed once (see
//! the readiness gate in `sdm-vault`). It exercises the same code paths an
//! unlock uses: key derivation, text sealing, and wrong-key detection.

use crate::cipher::{decrypt_text, encrypt_text};
use crate::error::CryptoError;
use crate::kdf::{derive_key, KdfParams};

const PROBE_PASSWORD: &[u8] = b"sdm-self-test-password";
const PROBE_OTHER_PASSWORD: &[u8] = b"sdm-self-test-password-2";
const PROBE_TEXT: &str = "sdm self-test \u{2713}";
const PROBE_AAD: &[u8] = b"sdm-self-test";

/// Cheap parameters: the test checks behaviour, not work factor.
const PROBE_PARAMS: KdfParams = KdfParams { iterations: 1 };

/// Run the self-test.
///
/// # Errors
///
/// Returns `CryptoError::SelfTest` describing the first check that failed.
pub fn run() -> Result<(), CryptoError> {
    let key = derive_key(PROBE_PASSWORD, &PROBE_PARAMS)?;
    let again = derive_key(PROBE_PASSWORD, &PROBE_PARAMS)?;
    if key.expose() != again.expose() {
        return Err(CryptoError::SelfTest("key derivation is not deterministic".into()));
    }

    let other = derive_key(PROBE_OTHER_PASSWORD, &PROBE_PARAMS)?;
    if key.expose() == other.expose() {
        return Err(CryptoError::SelfTest(
            "distinct passwords derived the same key".into(),
        ));
    }

    let first = encrypt_text(PROBE_TEXT, key.expose(), PROBE_AAD)?;
    let second = encrypt_text(PROBE_TEXT, key.expose(), PROBE_AAD)?;
    if first == second {
        return Err(CryptoError::SelfTest("encryption is deterministic".into()));
    }

    let opened = decrypt_text(&first, key.expose(), PROBE_AAD)?;
    if opened != PROBE_TEXT {
        return Err(CryptoError::SelfTest("round-trip mismatch".into()));
    }

    if decrypt_text(&first, other.expose(), PROBE_AAD).is_ok() {
        return Err(CryptoError::SelfTest("wrong key was not detected".into()));
    }

    Ok(())
}
