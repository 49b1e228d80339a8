#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Integration tests for the vault service: CRUD over an unlocked session,
//! persistence, fail-closed unlock and the mirror hook.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use data_encoding::BASE64;
use sdm_crypto_core::KdfParams;
use sdm_vault::{
    CredentialDraft, CredentialPatch, ItemKind, LinkDraft, LinkPatch, MemoryBackend,
    MemorySessionKeyStore, MessageDraft, MessagePatch, MirrorEvent, MirrorSink, ReadinessGate,
    SessionKeyStore, SessionManager, SessionOptions, SessionState, VaultConfig, VaultError,
    VaultItem, VaultService, VaultStore,
};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

const fn test_options() -> SessionOptions {
    SessionOptions {
        kdf: KdfParams { iterations: 2 },
        readiness_timeout: Duration::from_secs(1),
    }
}

/// A vault over `backend` with its own session key store.
fn vault_over(backend: &MemoryBackend) -> VaultService {
    VaultService::new(SessionManager::new(
        VaultStore::new(backend.clone()),
        MemorySessionKeyStore::new(),
        ReadinessGate::ready(),
        test_options(),
    ))
}

async fn unlocked_vault() -> (VaultService, MemoryBackend) {
    let backend = MemoryBackend::new();
    let vault = vault_over(&backend);
    vault.unlock("hunter2").await.expect("unlock should succeed");
    (vault, backend)
}

fn draft(site: &str, pass: &str) -> CredentialDraft {
    CredentialDraft {
        site: site.into(),
        url: format!("https://{}", site.to_lowercase()),
        user: "alice".into(),
        pass: pass.into(),
    }
}

#[derive(Clone, Default)]
struct RecordingMirror(Arc<Mutex<Vec<MirrorEvent>>>);

impl RecordingMirror {
    fn events(&self) -> Vec<MirrorEvent> {
        self.0.lock().unwrap().clone()
    }
}

impl MirrorSink for RecordingMirror {
    fn publish(&self, event: MirrorEvent) {
        self.0.lock().unwrap().push(event);
    }
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hunter2_round_trip_and_wrong_password() {
    let (vault, backend) = unlocked_vault().await;
    let id = vault.add_credential(draft("Example", "s3cret")).expect("add");
    vault.lock();
    assert_eq!(vault.state(), SessionState::Locked);
    assert!(matches!(vault.credentials(), Err(VaultError::Locked)));

    vault.unlock("hunter2").await.expect("unlock again");
    let creds = vault.credentials().expect("list");
    assert_eq!(creds.len(), 1);
    assert_eq!(creds[0].id, id);
    assert_eq!(creds[0].site, "Example");
    assert_eq!(creds[0].pass, "s3cret");
    vault.lock();

    let other = vault_over(&backend);
    assert!(matches!(
        other.unlock("wrong-password").await,
        Err(VaultError::UnlockFailed)
    ));
    assert_eq!(other.state(), SessionState::Locked);
    assert!(other.credentials().is_err());
}

#[tokio::test]
async fn storage_never_contains_plaintext() {
    let (vault, backend) = unlocked_vault().await;
    vault.add_credential(draft("Example", "s3cret")).expect("add");
    vault
        .add_message(MessageDraft {
            title: "Greeting".into(),
            body: "Hello there".into(),
        })
        .expect("add");

    let stored = format!(
        "{}{}",
        backend.raw("credentials").unwrap(),
        backend.raw("messages").unwrap()
    );
    for plaintext in ["Example", "s3cret", "alice", "Greeting", "Hello there"] {
        assert!(!stored.contains(plaintext), "{plaintext} stored in clear");
    }
}

#[tokio::test]
async fn file_backed_vault_survives_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = VaultConfig {
        kdf_iterations: 2,
        ..VaultConfig::default()
    };

    let vault = VaultService::open(&config, dir.path());
    vault.unlock("hunter2").await.expect("unlock");
    vault
        .add_link(LinkDraft {
            name: "Docs".into(),
            url: "https://docs.rs".into(),
        })
        .expect("add");
    vault.lock();
    assert!(dir.path().join("links.json").exists());

    let reopened = VaultService::open(&config, dir.path());
    reopened.unlock("hunter2").await.expect("unlock");
    let links = reopened.links().expect("list");
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].name, "Docs");
}

// ---------------------------------------------------------------------------
// Fail closed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn truncated_pass_ciphertext_fails_the_whole_unlock() {
    let (vault, backend) = unlocked_vault().await;
    vault.add_credential(draft("One", "p1")).expect("add");
    vault.add_credential(draft("Two", "p2")).expect("add");
    vault
        .add_link(LinkDraft {
            name: "Docs".into(),
            url: "https://docs.rs".into(),
        })
        .expect("add");
    vault.lock();

    let mut records: serde_json::Value =
        serde_json::from_str(&backend.raw("credentials").unwrap()).unwrap();
    let pass = records[1]["pass"].as_str().unwrap();
    let mut sealed = BASE64.decode(pass.as_bytes()).unwrap();
    sealed.pop();
    records[1]["pass"] = serde_json::Value::String(BASE64.encode(&sealed));
    backend.put_raw("credentials", &records.to_string());

    let fresh = vault_over(&backend);
    assert!(matches!(
        fresh.unlock("hunter2").await,
        Err(VaultError::UnlockFailed)
    ));
    assert_eq!(fresh.state(), SessionState::Locked);
    assert!(fresh.links().is_err());
}

#[tokio::test]
async fn malformed_item_in_array_fails_unlock() {
    let backend = MemoryBackend::new();
    backend.put_raw("messages", r#"[{"id": "m1", "title": 3}]"#);
    let vault = vault_over(&backend);
    assert!(matches!(
        vault.unlock("hunter2").await,
        Err(VaultError::UnlockFailed)
    ));
}

#[tokio::test]
async fn malformed_top_level_reads_as_empty() {
    let backend = MemoryBackend::new();
    backend.put_raw("messages", r#"{"not": "an array"}"#);
    let vault = vault_over(&backend);
    vault.unlock("hunter2").await.expect("unlock");
    assert!(vault.messages().expect("list").is_empty());
}

#[tokio::test]
async fn unlock_failure_clears_session_key() {
    let (vault, backend) = unlocked_vault().await;
    vault.add_credential(draft("Example", "x")).expect("add");
    vault.lock();

    let keys = MemorySessionKeyStore::new();
    keys.set("00").unwrap();
    let other = VaultService::new(SessionManager::new(
        VaultStore::new(backend),
        keys.clone(),
        ReadinessGate::ready(),
        test_options(),
    ));
    assert!(other.unlock("nope").await.is_err());
    assert!(keys.get().is_none());
}

// ---------------------------------------------------------------------------
// CRUD invariants
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_grows_by_one_and_item_is_retrievable() {
    let (vault, _) = unlocked_vault().await;
    let before = vault.credentials().unwrap().len();
    let id = vault.add_credential(draft("Example", "pw")).expect("add");
    assert_eq!(vault.credentials().unwrap().len(), before + 1);

    let found = vault.credential(&id).unwrap().expect("present");
    assert_eq!(found.user, "alice");
    assert_eq!(id.len(), 36);
    assert_eq!(&id[14..15], "4");
}

#[tokio::test]
async fn ids_are_unique() {
    let (vault, _) = unlocked_vault().await;
    let a = vault.add_link(LinkDraft::default()).unwrap();
    let b = vault.add_link(LinkDraft::default()).unwrap();
    assert_ne!(a, b);
}

#[tokio::test]
async fn update_changes_only_given_field_and_keeps_order() {
    let (vault, _) = unlocked_vault().await;
    let first = vault.add_credential(draft("First", "p1")).unwrap();
    let second = vault.add_credential(draft("Second", "p2")).unwrap();
    let third = vault.add_credential(draft("Third", "p3")).unwrap();

    vault
        .update_credential(
            &second,
            CredentialPatch {
                site: None,
                url: None,
                user: Some("bob".into()),
                pass: None,
            },
        )
        .unwrap();

    let creds = vault.credentials().unwrap();
    let ids: Vec<_> = creds.iter().map(|c| c.id.clone()).collect();
    assert_eq!(ids, [first, second, third]);
    assert_eq!(creds[1].user, "bob");
    assert_eq!(creds[1].site, "Second");
    assert_eq!(creds[1].pass, "p2");
    assert_eq!(creds[0].user, "alice");
}

#[tokio::test]
async fn empty_pass_in_update_keeps_password() {
    let (vault, _) = unlocked_vault().await;
    let id = vault.add_credential(draft("Example", "keep-me")).unwrap();
    vault
        .update_credential(
            &id,
            CredentialPatch {
                site: Some("Renamed".into()),
                url: None,
                user: None,
                pass: Some(String::new()),
            },
        )
        .unwrap();
    let c = vault.credential(&id).unwrap().unwrap();
    assert_eq!(c.site, "Renamed");
    assert_eq!(c.pass, "keep-me");
}

#[tokio::test]
async fn update_and_delete_of_unknown_id_are_no_ops() {
    let (vault, backend) = unlocked_vault().await;
    vault
        .add_message(MessageDraft {
            title: "t".into(),
            body: "b".into(),
        })
        .unwrap();
    let before = backend.raw("messages");

    vault
        .update_message(
            "missing",
            MessagePatch {
                title: Some("x".into()),
                body: None,
            },
        )
        .expect("no-op");
    vault.delete_message("missing").expect("no-op");

    assert_eq!(vault.messages().unwrap().len(), 1);
    assert_eq!(backend.raw("messages"), before);
}

#[tokio::test]
async fn delete_removes_exactly_one() {
    let (vault, _) = unlocked_vault().await;
    let keep = vault.add_link(LinkDraft::default()).unwrap();
    let gone = vault.add_link(LinkDraft::default()).unwrap();
    vault.delete_link(&gone).unwrap();
    let links = vault.links().unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].id, keep);
    assert!(vault.link(&gone).unwrap().is_none());
}

#[tokio::test]
async fn mutations_persist_only_their_collection() {
    let (vault, backend) = unlocked_vault().await;
    let id = vault
        .add_link(LinkDraft {
            name: "n".into(),
            url: "u".into(),
        })
        .unwrap();
    vault
        .update_link(
            &id,
            LinkPatch {
                name: Some("m".into()),
                url: None,
            },
        )
        .unwrap();
    assert!(backend.raw("links").is_some());
    assert!(backend.raw("credentials").is_none());
    assert!(backend.raw("messages").is_none());
}

#[tokio::test]
async fn locked_vault_rejects_mutations_without_side_effects() {
    let backend = MemoryBackend::new();
    let vault = vault_over(&backend);
    assert!(matches!(
        vault.add_message(MessageDraft::default()),
        Err(VaultError::Locked)
    ));
    assert!(matches!(
        vault.update_link("x", LinkPatch::default()),
        Err(VaultError::Locked)
    ));
    assert!(matches!(
        vault.delete_credential("x"),
        Err(VaultError::Locked)
    ));
    assert!(backend.raw("messages").is_none());
}

#[tokio::test]
async fn save_failure_keeps_in_memory_change() {
    let (vault, backend) = unlocked_vault().await;
    backend.set_unavailable(true);
    let id = vault.add_credential(draft("Example", "pw")).expect("add still succeeds");
    assert!(vault.credential(&id).unwrap().is_some());
    backend.set_unavailable(false);
    assert!(backend.raw("credentials").is_none());
}

// ---------------------------------------------------------------------------
// Mirror
// ---------------------------------------------------------------------------

#[tokio::test]
async fn successful_adds_are_mirrored() {
    let backend = MemoryBackend::new();
    let mirror = RecordingMirror::default();
    let vault = vault_over(&backend).with_mirror(mirror.clone());
    vault.unlock("hunter2").await.unwrap();

    let id = vault.add_credential(draft("Example", "pw")).unwrap();
    vault.add_message(MessageDraft::default()).unwrap();
    vault.delete_credential(&id).unwrap();

    let events = mirror.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, ItemKind::Credential);
    match &events[0].data {
        VaultItem::Credential(c) => {
            assert_eq!(c.id, id);
            assert_eq!(c.pass, "pw");
        }
        other => panic!("unexpected item {other:?}"),
    }
    assert_eq!(events[1].kind, ItemKind::Message);
}

#[tokio::test]
async fn locked_add_is_not_mirrored() {
    let mirror = RecordingMirror::default();
    let vault = vault_over(&MemoryBackend::new()).with_mirror(mirror.clone());
    assert!(vault.add_link(LinkDraft::default()).is_err());
    assert!(mirror.events().is_empty());
}
