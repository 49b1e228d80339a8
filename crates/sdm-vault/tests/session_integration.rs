#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Integration tests for the session lifecycle: resume from the session key
//! store, readiness gating and concurrent unlock attempts.

use std::time::Duration;

use sdm_crypto_core::KdfParams;
use sdm_vault::{
    CredentialDraft, FileSessionKeyStore, MemoryBackend, MemorySessionKeyStore, MessageDraft,
    ReadinessGate, SessionKeyStore, SessionManager, SessionOptions, SessionState, VaultConfig,
    VaultError, VaultService, VaultStore,
};

const fn test_options() -> SessionOptions {
    SessionOptions {
        kdf: KdfParams { iterations: 2 },
        readiness_timeout: Duration::from_secs(1),
    }
}

/// A vault as a freshly started process would build it: new session, same
/// durable storage, same session key store.
fn fresh_process(backend: &MemoryBackend, keys: &MemorySessionKeyStore) -> VaultService {
    VaultService::new(SessionManager::new(
        VaultStore::new(backend.clone()),
        keys.clone(),
        ReadinessGate::ready(),
        test_options(),
    ))
}

fn credential() -> CredentialDraft {
    CredentialDraft {
        site: "Example".into(),
        url: "https://example.com".into(),
        user: "alice".into(),
        pass: "hunter2-pass".into(),
    }
}

// ---------------------------------------------------------------------------
// Session continuity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn session_resumes_in_a_fresh_process() {
    let backend = MemoryBackend::new();
    let keys = MemorySessionKeyStore::new();

    let first = fresh_process(&backend, &keys);
    first.unlock("hunter2").await.unwrap();
    let id = first.add_credential(credential()).unwrap();
    drop(first);

    let second = fresh_process(&backend, &keys);
    assert_eq!(second.state(), SessionState::Locked);
    assert!(second.resume().await.unwrap());
    assert!(second.is_unlocked());
    let creds = second.credentials().unwrap();
    assert_eq!(creds.len(), 1);
    assert_eq!(creds[0].id, id);
    assert_eq!(creds[0].pass, "hunter2-pass");
}

#[tokio::test]
async fn resume_without_stored_key_stays_locked() {
    let vault = fresh_process(&MemoryBackend::new(), &MemorySessionKeyStore::new());
    assert!(!vault.resume().await.unwrap());
    assert_eq!(vault.state(), SessionState::Locked);
}

#[tokio::test]
async fn resume_after_lock_needs_the_password() {
    let backend = MemoryBackend::new();
    let keys = MemorySessionKeyStore::new();
    let first = fresh_process(&backend, &keys);
    first.unlock("hunter2").await.unwrap();
    first.lock();

    let second = fresh_process(&backend, &keys);
    assert!(!second.resume().await.unwrap());
    assert_eq!(second.state(), SessionState::Locked);
}

#[tokio::test]
async fn stale_session_key_behaves_like_lock() {
    let backend = MemoryBackend::new();
    let keys = MemorySessionKeyStore::new();
    let first = fresh_process(&backend, &keys);
    first.unlock("hunter2").await.unwrap();
    first
        .add_message(MessageDraft {
            title: "t".into(),
            body: "b".into(),
        })
        .unwrap();
    drop(first);

    keys.set(&"ab".repeat(32)).unwrap();
    let second = fresh_process(&backend, &keys);
    assert!(!second.resume().await.unwrap());
    assert_eq!(second.state(), SessionState::Locked);
    assert!(keys.get().is_none());
}

#[tokio::test]
async fn garbage_session_key_behaves_like_lock() {
    let keys = MemorySessionKeyStore::new();
    keys.set("not hex at all").unwrap();
    let vault = fresh_process(&MemoryBackend::new(), &keys);
    assert!(!vault.resume().await.unwrap());
    assert!(keys.get().is_none());
}

#[tokio::test]
async fn file_session_key_survives_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = VaultConfig {
        kdf_iterations: 2,
        session_key_file: Some("masterKey".into()),
        ..VaultConfig::default()
    };

    let first = VaultService::open(&config, dir.path());
    first.unlock("hunter2").await.unwrap();
    first.add_credential(credential()).unwrap();
    drop(first);
    assert!(FileSessionKeyStore::in_dir(dir.path()).get().is_some());

    let second = VaultService::open(&config, dir.path());
    assert!(second.resume().await.unwrap());
    assert_eq!(second.credentials().unwrap().len(), 1);

    second.lock();
    assert!(!dir.path().join("masterKey").exists());
}

// ---------------------------------------------------------------------------
// Readiness
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn unlock_times_out_when_crypto_never_becomes_ready() {
    let vault = VaultService::new(SessionManager::new(
        VaultStore::new(MemoryBackend::new()),
        MemorySessionKeyStore::new(),
        ReadinessGate::pending(),
        test_options(),
    ));
    assert!(matches!(
        vault.unlock("hunter2").await,
        Err(VaultError::CryptoNotReady { waited_ms: 1000 })
    ));
    assert_eq!(vault.state(), SessionState::Locked);
}

#[tokio::test(start_paused = true)]
async fn resume_timeout_keeps_the_stored_key() {
    let keys = MemorySessionKeyStore::new();
    keys.set(&"00".repeat(32)).unwrap();
    let vault = VaultService::new(SessionManager::new(
        VaultStore::new(MemoryBackend::new()),
        keys.clone(),
        ReadinessGate::pending(),
        test_options(),
    ));
    assert!(matches!(
        vault.resume().await,
        Err(VaultError::CryptoNotReady { .. })
    ));
    assert!(keys.get().is_some());
    assert_eq!(vault.state(), SessionState::Locked);
}

#[tokio::test]
async fn unlock_waits_for_readiness_then_succeeds() {
    let (signal, gate) = ReadinessGate::channel();
    let vault = VaultService::new(SessionManager::new(
        VaultStore::new(MemoryBackend::new()),
        MemorySessionKeyStore::new(),
        gate,
        test_options(),
    ));

    let pending = {
        let vault = vault.clone();
        tokio::spawn(async move { vault.unlock("hunter2").await })
    };
    while vault.state() != SessionState::Unlocking {
        tokio::task::yield_now().await;
    }

    assert!(matches!(
        vault.unlock("hunter2").await,
        Err(VaultError::UnlockInProgress)
    ));

    signal.mark_ready();
    pending.await.unwrap().unwrap();
    assert!(vault.is_unlocked());
}

#[tokio::test]
async fn lock_during_unlock_wins() {
    let (signal, gate) = ReadinessGate::channel();
    let vault = VaultService::new(SessionManager::new(
        VaultStore::new(MemoryBackend::new()),
        MemorySessionKeyStore::new(),
        gate,
        test_options(),
    ));

    let pending = {
        let vault = vault.clone();
        tokio::spawn(async move { vault.unlock("hunter2").await })
    };
    while vault.state() != SessionState::Unlocking {
        tokio::task::yield_now().await;
    }
    vault.lock();
    signal.mark_ready();

    assert!(pending.await.unwrap().is_err());
    assert_eq!(vault.state(), SessionState::Locked);
}

#[tokio::test]
async fn abandoned_unlock_does_not_reset_a_newer_one() {
    let (signal, gate) = ReadinessGate::channel();
    let vault = VaultService::new(SessionManager::new(
        VaultStore::new(MemoryBackend::new()),
        MemorySessionKeyStore::new(),
        gate,
        test_options(),
    ));

    let first = {
        let vault = vault.clone();
        tokio::spawn(async move { vault.unlock("hunter2").await })
    };
    while vault.state() != SessionState::Unlocking {
        tokio::task::yield_now().await;
    }
    vault.lock();

    let second = {
        let vault = vault.clone();
        tokio::spawn(async move { vault.unlock("hunter2").await })
    };
    while vault.state() != SessionState::Unlocking {
        tokio::task::yield_now().await;
    }

    first.abort();
    assert!(first.await.unwrap_err().is_cancelled());
    assert_eq!(vault.state(), SessionState::Unlocking);

    signal.mark_ready();
    second.await.unwrap().unwrap();
    assert!(vault.is_unlocked());
}

#[tokio::test]
async fn superseded_unlock_commits_nothing() {
    let backend = MemoryBackend::new();
    let keys = MemorySessionKeyStore::new();
    let (signal, gate) = ReadinessGate::channel();
    let vault = VaultService::new(SessionManager::new(
        VaultStore::new(backend.clone()),
        keys.clone(),
        gate,
        test_options(),
    ));

    let first = {
        let vault = vault.clone();
        tokio::spawn(async move { vault.unlock("first-password").await })
    };
    while vault.state() != SessionState::Unlocking {
        tokio::task::yield_now().await;
    }
    vault.lock();

    let second = {
        let vault = vault.clone();
        tokio::spawn(async move { vault.unlock("second-password").await })
    };
    while vault.state() != SessionState::Unlocking {
        tokio::task::yield_now().await;
    }

    signal.mark_ready();
    assert!(matches!(first.await.unwrap(), Err(VaultError::UnlockFailed)));
    second.await.unwrap().unwrap();
    assert!(vault.is_unlocked());

    // The session key is the one derived from the second password.
    vault
        .add_message(MessageDraft {
            title: "t".into(),
            body: "b".into(),
        })
        .unwrap();
    let other = fresh_process(&backend, &keys);
    assert!(other.resume().await.unwrap());
    assert_eq!(other.messages().unwrap().len(), 1);
    other.lock();

    let check = fresh_process(&backend, &MemorySessionKeyStore::new());
    assert!(matches!(
        check.unlock("first-password").await,
        Err(VaultError::UnlockFailed)
    ));
    check.unlock("second-password").await.unwrap();
    assert_eq!(check.messages().unwrap().len(), 1);
}
