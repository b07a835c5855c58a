//! Key derivation helpers using HKDF-SHA256.
//!
//! From high-entropy input keying material we derive:
//! - A one-shot **session envelope** key per payload (session key + random salt).
//! - A **per-user field** key for each `(user, generation)` scope.
//! - A dedicated **document HMAC** key for on-disk store integrity.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::errors::{VaultError, Result};

/// Length of derived sub-keys (256 bits).
pub const KEY_LEN: usize = 32;

/// Derive the AES key for one session envelope.
///
/// The session key is the client-shared secret established at login; the
/// salt is fresh per envelope so two envelopes never share a key.
pub fn derive_session_envelope_key(session_key: &[u8], salt: &[u8]) -> Result<[u8; KEY_LEN]> {
    hkdf_derive(Some(salt), session_key, b"credvault-session")
}

/// Derive the field key for one user at one key generation.
///
/// `info` is `"credvault-field:<user_id>:<generation>"`, so bumping the
/// generation yields an unrelated key.
pub fn derive_field_key(
    master_key: &[u8],
    user_id: &str,
    generation: u32,
) -> Result<[u8; KEY_LEN]> {
    let info = format!("credvault-field:{user_id}:{generation}");
    hkdf_derive(None, master_key, info.as_bytes())
}

/// Derive the HMAC key used to seal user documents on disk.
pub fn derive_document_hmac_key(master_key: &[u8]) -> Result<[u8; KEY_LEN]> {
    hkdf_derive(None, master_key, b"credvault-document-hmac")
}

fn hkdf_derive(salt: Option<&[u8]>, ikm: &[u8], info: &[u8]) -> Result<[u8; KEY_LEN]> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);

    let mut okm = [0u8; KEY_LEN];
    hk.expand(info, &mut okm)
        .map_err(|e| VaultError::KeyDerivationFailed(format!("HKDF expand failed: {e}")))?;

    Ok(okm)
}

/// The server's field master key, zeroed when dropped.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct MasterKey {
    bytes: [u8; KEY_LEN],
}

impl MasterKey {
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Build a master key from a byte slice, which must be exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let mut buf = [0u8; KEY_LEN];
        if bytes.len() != KEY_LEN {
            return Err(VaultError::KeyfileError(format!(
                "master key must be exactly {KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        buf.copy_from_slice(bytes);
        Ok(Self::new(buf))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    pub fn derive_field_key(&self, user_id: &str, generation: u32) -> Result<[u8; KEY_LEN]> {
        derive_field_key(&self.bytes, user_id, generation)
    }

    pub fn derive_document_hmac_key(&self) -> Result<[u8; KEY_LEN]> {
        derive_document_hmac_key(&self.bytes)
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}
