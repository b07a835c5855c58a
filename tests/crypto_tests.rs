//! Integration tests for the CredVault crypto module.

use credvault::crypto::keys::{derive_field_key, derive_session_envelope_key, MasterKey};
use credvault::crypto::{
    fingerprint, generate_keyfile, open, seal, FieldEncryptor, KeyScope, KeyfileFieldEncryptor,
    SessionCipher,
};
use credvault::errors::{ErrorKind, VaultError};
use credvault::vault::{EntryInput, EntrySummary};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// AEAD primitive
// ---------------------------------------------------------------------------

#[test]
fn seal_open_with_associated_data() {
    let key = [0xABu8; 32];
    let sealed = seal(&key, b"hunter2", b"u1:0").expect("seal");

    // 12-byte nonce + 16-byte tag.
    assert_eq!(sealed.len(), b"hunter2".len() + 28);
    assert_eq!(open(&key, &sealed, b"u1:0").unwrap(), b"hunter2");
    assert!(open(&key, &sealed, b"u2:0").is_err());
}

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

#[test]
fn field_keys_differ_per_user_and_generation() {
    let master = [7u8; 32];
    let a = derive_field_key(&master, "alice", 0).unwrap();
    let b = derive_field_key(&master, "bob", 0).unwrap();
    let c = derive_field_key(&master, "alice", 1).unwrap();
    assert_ne!(a, b);
    assert_ne!(a, c);
    assert_eq!(a, derive_field_key(&master, "alice", 0).unwrap());
}

#[test]
fn session_keys_depend_on_salt() {
    let a = derive_session_envelope_key(b"session", &[1u8; 16]).unwrap();
    let b = derive_session_envelope_key(b"session", &[2u8; 16]).unwrap();
    assert_ne!(a, b);
}

// ---------------------------------------------------------------------------
// Session envelopes
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Probe {
    url: String,
    count: u32,
}

#[test]
fn session_envelope_roundtrip() {
    let cipher = SessionCipher::new("sk-123");
    let probe = Probe {
        url: "bank.com".into(),
        count: 3,
    };

    let envelope = cipher.encrypt(&probe).unwrap();
    let back: Probe = cipher.decrypt(&envelope).unwrap();
    assert_eq!(back, probe);
}

#[test]
fn session_envelope_decodes_entry_input() {
    let cipher = SessionCipher::new("sk-123");
    let envelope = cipher
        .encrypt(&serde_json::json!({
            "url": "bank.com",
            "username": "alice",
            "password": "P@ss1",
        }))
        .unwrap();

    let input: EntryInput = cipher.decrypt(&envelope).unwrap();
    assert_eq!(input.url, "bank.com");
    assert_eq!(input.username, "alice");
    assert_eq!(input.password, "P@ss1");
}

#[test]
fn session_envelope_is_randomized() {
    let cipher = SessionCipher::new("sk-123");
    let a = cipher.encrypt(&"same").unwrap();
    let b = cipher.encrypt(&"same").unwrap();
    assert_ne!(a, b);
}

#[test]
fn session_envelope_wrong_key_is_crypto_error() {
    let envelope = SessionCipher::new("sk-a").encrypt(&"payload").unwrap();
    let err = SessionCipher::new("sk-b")
        .decrypt::<String>(&envelope)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Crypto);
}

#[test]
fn session_envelope_garbage_is_validation_error() {
    let err = SessionCipher::new("sk")
        .decrypt::<String>("not base64 !!")
        .unwrap_err();
    assert!(matches!(err, VaultError::MalformedCiphertext(_)));
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn session_envelope_shape_mismatch_is_validation_error() {
    let cipher = SessionCipher::new("sk");
    let envelope = cipher.encrypt(&serde_json::json!({"foo": 1})).unwrap();
    let err = cipher.decrypt::<Vec<EntrySummary>>(&envelope).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

// ---------------------------------------------------------------------------
// Field encryption and keyfiles
// ---------------------------------------------------------------------------

#[tokio::test]
async fn field_encryptor_from_keyfile() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("field.key");
    let bytes = generate_keyfile(&path).unwrap();

    let fields = KeyfileFieldEncryptor::from_keyfile(&path, Some(&fingerprint(&bytes))).unwrap();
    let scope = KeyScope::new("alice", 0);
    let ct = fields.encrypt(scope, "P@ss1").await.unwrap();
    assert_eq!(fields.decrypt(scope, &ct).await.unwrap().as_str(), "P@ss1");

    // A different user's scope cannot open it.
    assert!(fields.decrypt(KeyScope::new("bob", 0), &ct).await.is_err());
    // Neither can the next generation.
    assert!(fields.decrypt(scope.next(), &ct).await.is_err());
}

#[test]
fn keyfile_fingerprint_mismatch_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("field.key");
    generate_keyfile(&path).unwrap();

    assert!(KeyfileFieldEncryptor::from_keyfile(&path, Some("bm90IGl0")).is_err());
}

#[test]
fn master_key_debug_is_redacted() {
    let key = MasterKey::new([9u8; 32]);
    let debug = format!("{key:?}");
    assert!(!debug.contains('9'));
}
