//! Field cipher for the stored password value.
//!
//! Independent of the session: even a client holding a valid session key
//! cannot read another user's stored ciphertext, and the document store
//! never sees the field master key.

use std::path::Path;

use async_trait::async_trait;
use zeroize::{Zeroize, Zeroizing};

use super::encryption::{open, seal};
use super::keyfile;
use super::keys::MasterKey;
use crate::errors::{VaultError, Result};

/// Names the per-user field key a ciphertext is wrapped under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyScope<'a> {
    pub user_id: &'a str,
    pub generation: u32,
}

impl<'a> KeyScope<'a> {
    pub fn new(user_id: &'a str, generation: u32) -> Self {
        Self {
            user_id,
            generation,
        }
    }

    /// The scope a rotation moves entries to.
    pub fn next(self) -> Self {
        Self {
            generation: self.generation.wrapping_add(1),
            ..self
        }
    }

    fn aad(&self) -> Vec<u8> {
        format!("{}:{}", self.user_id, self.generation).into_bytes()
    }
}

/// Encrypts and decrypts single secret strings at rest.
#[async_trait]
pub trait FieldEncryptor: Send + Sync {
    async fn encrypt(&self, scope: KeyScope<'_>, plaintext: &str) -> Result<Vec<u8>>;

    async fn decrypt(&self, scope: KeyScope<'_>, ciphertext: &[u8]) -> Result<Zeroizing<String>>;
}

/// [`FieldEncryptor`] backed by a master key read from a keyfile.
#[derive(Debug)]
pub struct KeyfileFieldEncryptor {
    master_key: MasterKey,
}

impl KeyfileFieldEncryptor {
    pub fn new(master_key: MasterKey) -> Self {
        Self { master_key }
    }

    /// Load the master key from `path`, checking the pinned fingerprint
    /// when one is given.
    pub fn from_keyfile(path: &Path, pinned_fingerprint: Option<&str>) -> Result<Self> {
        let mut bytes = keyfile::load_keyfile(path)?;
        if let Some(expected) = pinned_fingerprint {
            if let Err(e) = keyfile::verify_fingerprint(&bytes, expected) {
                bytes.zeroize();
                return Err(e);
            }
        }
        let master_key = MasterKey::from_slice(&bytes);
        bytes.zeroize();
        Ok(Self::new(master_key?))
    }

    pub fn master_key(&self) -> &MasterKey {
        &self.master_key
    }
}

#[async_trait]
impl FieldEncryptor for KeyfileFieldEncryptor {
    async fn encrypt(&self, scope: KeyScope<'_>, plaintext: &str) -> Result<Vec<u8>> {
        let mut key = self
            .master_key
            .derive_field_key(scope.user_id, scope.generation)?;
        let sealed = seal(&key, plaintext.as_bytes(), &scope.aad());
        key.zeroize();
        sealed
    }

    async fn decrypt(&self, scope: KeyScope<'_>, ciphertext: &[u8]) -> Result<Zeroizing<String>> {
        let mut key = self
            .master_key
            .derive_field_key(scope.user_id, scope.generation)?;
        let plaintext = open(&key, ciphertext, &scope.aad());
        key.zeroize();

        String::from_utf8(plaintext?)
            .map(Zeroizing::new)
            .map_err(|e| {
                let mut bad_bytes = e.into_bytes();
                bad_bytes.zeroize();
                VaultError::SerializationError("stored password is not valid UTF-8".into())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encryptor() -> KeyfileFieldEncryptor {
        KeyfileFieldEncryptor::new(MasterKey::new([3u8; 32]))
    }

    #[tokio::test]
    async fn roundtrip_in_scope() {
        let fe = encryptor();
        let scope = KeyScope::new("alice", 0);
        let ct = fe.encrypt(scope, "P@ss1").await.unwrap();
        assert_ne!(ct, b"P@ss1");
        assert_eq!(fe.decrypt(scope, &ct).await.unwrap().as_str(), "P@ss1");
    }

    #[tokio::test]
    async fn other_user_cannot_decrypt() {
        let fe = encryptor();
        let ct = fe.encrypt(KeyScope::new("alice", 0), "s3cret").await.unwrap();
        assert!(fe.decrypt(KeyScope::new("bob", 0), &ct).await.is_err());
    }

    #[tokio::test]
    async fn next_generation_is_a_different_key() {
        let fe = encryptor();
        let scope = KeyScope::new("alice", 4);
        assert_eq!(scope.next().generation, 5);
        let ct = fe.encrypt(scope, "s3cret").await.unwrap();
        assert!(fe.decrypt(scope.next(), &ct).await.is_err());
    }

    #[test]
    fn from_keyfile_checks_fingerprint() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("field.key");
        let bytes = keyfile::generate_keyfile(&path).unwrap();
        let good = keyfile::fingerprint(&bytes);

        assert!(KeyfileFieldEncryptor::from_keyfile(&path, Some(&good)).is_ok());
        assert!(KeyfileFieldEncryptor::from_keyfile(&path, Some("bogus")).is_err());
        assert!(KeyfileFieldEncryptor::from_keyfile(&path, None).is_ok());
    }
}
