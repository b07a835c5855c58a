//! Session envelope cipher.
//!
//! Wraps every JSON payload exchanged with an authenticated client.  The
//! key is the user's session key, established at login and read fresh from
//! the user record on every request.
//!
//! Envelope layout (base64 of the whole buffer):
//!
//! ```text
//! [CVS1: 4 bytes][salt: 16 bytes][nonce: 12 bytes][ciphertext + tag]
//! ```
//!
//! A fresh salt per call gives a fresh AES key per envelope, so encrypting
//! the same payload twice never yields the same string.  The magic and salt
//! are authenticated as associated data.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use zeroize::Zeroize;

use super::encryption::{open, seal, NONCE_LEN, TAG_LEN};
use super::keys::derive_session_envelope_key;
use crate::errors::{VaultError, Result};

/// Magic bytes at the start of every session envelope.
const MAGIC: &[u8; 4] = b"CVS1";

/// Length of the per-envelope salt.
const SALT_LEN: usize = 16;

/// Fixed-size header: magic + salt.
const HEADER_LEN: usize = MAGIC.len() + SALT_LEN;

/// Encrypts and decrypts payloads under one session key.
pub struct SessionCipher<'a> {
    session_key: &'a [u8],
}

impl<'a> SessionCipher<'a> {
    pub fn new(session_key: &'a str) -> Self {
        Self {
            session_key: session_key.as_bytes(),
        }
    }

    /// Serialize `payload` to JSON and seal it into an envelope string.
    pub fn encrypt<T: Serialize + ?Sized>(&self, payload: &T) -> Result<String> {
        let mut json = serde_json::to_vec(payload)
            .map_err(|e| VaultError::SerializationError(format!("session payload: {e}")))?;

        let mut header = [0u8; HEADER_LEN];
        header[..MAGIC.len()].copy_from_slice(MAGIC);
        rand::rng().fill_bytes(&mut header[MAGIC.len()..]);

        let mut key = derive_session_envelope_key(self.session_key, &header[MAGIC.len()..])?;
        let sealed = seal(&key, &json, &header);
        key.zeroize();
        json.zeroize();
        let sealed = sealed?;

        let mut envelope = Vec::with_capacity(HEADER_LEN + sealed.len());
        envelope.extend_from_slice(&header);
        envelope.extend_from_slice(&sealed);
        Ok(BASE64.encode(envelope))
    }

    /// Open an envelope produced by [`SessionCipher::encrypt`] and
    /// deserialize its JSON into `T`.
    pub fn decrypt<T: DeserializeOwned>(&self, envelope: &str) -> Result<T> {
        let raw = BASE64
            .decode(envelope.trim())
            .map_err(|_| VaultError::MalformedCiphertext("not valid base64".into()))?;

        if raw.len() < HEADER_LEN + NONCE_LEN + TAG_LEN {
            return Err(VaultError::MalformedCiphertext(
                "envelope too short".into(),
            ));
        }

        let (header, sealed) = raw.split_at(HEADER_LEN);
        if &header[..MAGIC.len()] != MAGIC {
            return Err(VaultError::MalformedCiphertext(
                "missing CVS1 magic bytes".into(),
            ));
        }

        let mut key = derive_session_envelope_key(self.session_key, &header[MAGIC.len()..])?;
        let plaintext = open(&key, sealed, header);
        key.zeroize();
        let mut plaintext = plaintext?;

        let parsed = serde_json::from_slice(&plaintext)
            .map_err(|e| VaultError::InvalidPayload(format!("session payload: {e}")));
        plaintext.zeroize();
        parsed
    }
}
