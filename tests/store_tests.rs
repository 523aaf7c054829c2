//! Integration tests for the bunker store.

use std::fs;
use std::num::NonZeroU32;
use std::thread;

use chrono::{Duration, Utc};
use knox::bunker::{CredentialStore, KnoxState};
use knox::crypto::{generate_secret_key, PassphraseCipher};
use knox::errors::KnoxError;
use tempfile::TempDir;

const RELAY: &str = "wss://relay.example.com/";

fn cipher(passphrase: &str) -> PassphraseCipher {
    PassphraseCipher::new(passphrase).with_work_factor(4)
}

/// Helper: create a temporary bunker path inside a fresh temp dir.
fn bunker_path() -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("knox.bunker");
    (dir, path)
}

fn secret_of(uri: &url::Url) -> String {
    uri.query_pairs()
        .find(|(k, _)| k == "secret")
        .map(|(_, v)| v.into_owned())
        .expect("uri has a secret")
}

// ---------------------------------------------------------------------------
// Create and re-open round-trip
// ---------------------------------------------------------------------------

#[test]
fn create_add_save_and_reopen() {
    let (_dir, path) = bunker_path();

    let mut store = CredentialStore::create(&path, cipher("pw")).expect("create bunker");
    let sec = generate_secret_key();
    store.add_key("alex", sec.clone()).unwrap();
    let uri = store
        .generate_uri("alex", &[RELAY.into()], NonZeroU32::new(2), None)
        .unwrap();
    store.save().unwrap();

    let reopened = CredentialStore::open(&path, cipher("pw")).expect("open bunker");
    let state = reopened.state();
    assert_eq!(state.keys.len(), 1);
    assert_eq!(state.keys[0].sec, sec);
    assert_eq!(state.authorizations.len(), 1);
    assert_eq!(state.authorizations[0].secret, secret_of(&uri));
    assert_eq!(state.authorizations[0].relays, vec![RELAY.to_string()]);
}

#[test]
fn wrong_passphrase_fails_to_open() {
    let (_dir, path) = bunker_path();
    CredentialStore::create(&path, cipher("right")).unwrap();

    let result = CredentialStore::open(&path, cipher("wrong"));
    assert!(matches!(result, Err(KnoxError::DecryptionFailed)));
}

#[test]
fn create_refuses_existing_bunker() {
    let (_dir, path) = bunker_path();
    CredentialStore::create(&path, cipher("pw")).unwrap();

    let result = CredentialStore::create(&path, cipher("pw"));
    assert!(matches!(result, Err(KnoxError::StoreAlreadyExists(_))));
}

#[test]
fn open_missing_bunker_fails() {
    let (_dir, path) = bunker_path();
    let result = CredentialStore::open(&path, cipher("pw"));
    assert!(matches!(result, Err(KnoxError::StoreNotFound(_))));
}

#[test]
fn file_is_an_envelope_not_plaintext() {
    let (_dir, path) = bunker_path();
    let mut store = CredentialStore::create(&path, cipher("pw")).unwrap();
    store.add_key("very-recognizable-name", generate_secret_key()).unwrap();
    store.save().unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes[0], 0x02);
    assert_eq!(bytes[1], 4);
    let text = String::from_utf8_lossy(&bytes);
    assert!(!text.contains("very-recognizable-name"));
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

#[test]
fn failed_transaction_leaves_file_untouched() {
    let (_dir, path) = bunker_path();
    CredentialStore::create(&path, cipher("pw")).unwrap();
    let before = fs::read(&path).unwrap();

    let result = CredentialStore::transaction(&path, &cipher("pw"), |state| {
        state.add_key("alex", generate_secret_key())?;
        state.remove_key("ghost")
    });

    assert!(matches!(result, Err(KnoxError::KeyNotFound(_))));
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn transaction_returns_closure_output() {
    let (_dir, path) = bunker_path();
    let mut store = CredentialStore::create(&path, cipher("pw")).unwrap();
    store.add_key("alex", generate_secret_key()).unwrap();
    store.save().unwrap();

    let uri = CredentialStore::transaction(&path, &cipher("pw"), |state| {
        state.generate_uri("alex", &[RELAY.into()], None, None)
    })
    .unwrap();

    store.reload().unwrap();
    assert_eq!(store.state().authorizations.len(), 1);
    assert_eq!(store.state().authorizations[0].secret, secret_of(&uri));
}

#[test]
fn concurrent_transactions_lose_no_updates() {
    let (_dir, path) = bunker_path();
    CredentialStore::create(&path, cipher("pw")).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let path = path.clone();
            thread::spawn(move || {
                CredentialStore::transaction(&path, &cipher("pw"), |state| {
                    state.add_key(&format!("key-{i}"), generate_secret_key())
                })
                .unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let state = CredentialStore::load(&path, &cipher("pw")).unwrap();
    assert_eq!(state.keys.len(), 8);
}

// ---------------------------------------------------------------------------
// Authorization policy through the store
// ---------------------------------------------------------------------------

#[test]
fn redemption_limit_is_persisted() {
    let (_dir, path) = bunker_path();
    let mut store = CredentialStore::create(&path, cipher("pw")).unwrap();
    store.add_key("alex", generate_secret_key()).unwrap();
    let uri = store
        .generate_uri("alex", &[RELAY.into()], NonZeroU32::new(1), None)
        .unwrap();
    store.save().unwrap();
    let secret = secret_of(&uri);

    let first = "a".repeat(64);
    let second = "b".repeat(64);

    CredentialStore::transaction(&path, &cipher("pw"), |state| state.authorize(&first, &secret))
        .unwrap();
    // Re-authorizing the same pubkey is a no-op, even at the limit.
    CredentialStore::transaction(&path, &cipher("pw"), |state| state.authorize(&first, &secret))
        .unwrap();
    let result =
        CredentialStore::transaction(&path, &cipher("pw"), |state| state.authorize(&second, &secret));
    assert!(matches!(result, Err(KnoxError::UsageLimitExceeded)));

    let state = CredentialStore::load(&path, &cipher("pw")).unwrap();
    assert_eq!(state.authorizations[0].pubkeys, vec![first]);
}

#[test]
fn expired_authorizations_vanish_on_load() {
    let (_dir, path) = bunker_path();
    let mut store = CredentialStore::create(&path, cipher("pw")).unwrap();
    store.add_key("alex", generate_secret_key()).unwrap();
    store
        .generate_uri("alex", &[RELAY.into()], None, Some(Utc::now() - Duration::hours(1)))
        .unwrap();
    store
        .generate_uri("alex", &[RELAY.into()], None, Some(Utc::now() + Duration::days(1)))
        .unwrap();
    store.save().unwrap();

    let state = CredentialStore::load(&path, &cipher("pw")).unwrap();
    assert_eq!(state.authorizations.len(), 1);
    assert!(state.authorizations[0].expires_at.unwrap() > Utc::now());
}

#[test]
fn removing_key_revokes_its_authorizations() {
    let (_dir, path) = bunker_path();
    let mut store = CredentialStore::create(&path, cipher("pw")).unwrap();
    store.add_key("alex", generate_secret_key()).unwrap();
    store.add_key("sam", generate_secret_key()).unwrap();
    store.generate_uri("alex", &[RELAY.into()], None, None).unwrap();
    store.generate_uri("sam", &[RELAY.into()], None, None).unwrap();
    store.save().unwrap();

    CredentialStore::transaction(&path, &cipher("pw"), |state| state.remove_key("alex")).unwrap();

    let state: KnoxState = CredentialStore::load(&path, &cipher("pw")).unwrap();
    assert_eq!(state.keys.len(), 1);
    assert_eq!(state.authorizations.len(), 1);
    assert_eq!(state.authorizations[0].key, "sam");
}

#[test]
fn malformed_pubkey_never_reaches_disk() {
    let (_dir, path) = bunker_path();
    let mut store = CredentialStore::create(&path, cipher("pw")).unwrap();
    store.add_key("alex", generate_secret_key()).unwrap();
    let uri = store.generate_uri("alex", &[RELAY.into()], None, None).unwrap();
    let secret = secret_of(&uri);

    let app = "a".repeat(64);
    store.authorize(&app, &secret).unwrap();
    assert!(matches!(
        store.authorize("NOT-HEX-PUBKEY", &secret),
        Err(KnoxError::InvalidPubkey(_))
    ));
    store.save().unwrap();

    let state = CredentialStore::load(&path, &cipher("pw")).unwrap();
    assert_eq!(state.authorizations.len(), 1);
    assert_eq!(state.authorizations[0].pubkeys, vec![app]);
}

#[test]
fn unparseable_relay_is_refused_before_minting() {
    let (_dir, path) = bunker_path();
    let mut store = CredentialStore::create(&path, cipher("pw")).unwrap();
    store.add_key("alex", generate_secret_key()).unwrap();

    let result = store.generate_uri("alex", &["relay.example".into()], None, None);
    assert!(matches!(result, Err(KnoxError::InvalidRelayUrl(_))));
    store.save().unwrap();

    let state = CredentialStore::load(&path, &cipher("pw")).unwrap();
    assert!(state.authorizations.is_empty());
}
