#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Property-based tests for master-password key derivation.

use proptest::prelude::*;
use sdm_crypto_core::kdf::{derive_key, KdfParams};

/// Low iteration count for fast property tests.
const PROP_PARAMS: KdfParams = KdfParams { iterations: 2 };

proptest! {
    /// The same password always derives the same key.
    #[test]
    fn derive_is_deterministic(password in ".{0,64}") {
        let a = derive_key(password.as_bytes(), &PROP_PARAMS)
            .expect("derive should succeed");
        let b = derive_key(password.as_bytes(), &PROP_PARAMS)
            .expect("derive should succeed");
        prop_assert_eq!(a.expose(), b.expose());
    }

    /// Distinct passwords derive distinct keys.
    #[test]
    fn distinct_passwords_distinct_keys(a in ".{0,32}", b in ".{0,32}") {
        prop_assume!(a != b);
        let key_a = derive_key(a.as_bytes(), &PROP_PARAMS).expect("derive should succeed");
        let key_b = derive_key(b.as_bytes(), &PROP_PARAMS).expect("derive should succeed");
        prop_assert_ne!(key_a.expose(), key_b.expose());
    }
}
