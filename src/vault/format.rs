//! On-disk user document format and HMAC integrity verification.
//!
//! A `.doc` file has this layout:
//!
//! ```text
//! [CVDB: 4 bytes][version: 1 byte][user JSON][HMAC-SHA256: 32 bytes]
//! ```
//!
//! The HMAC covers the prefix and the JSON so a document swapped in from
//! another user or edited by hand is rejected before it is trusted.  The
//! HMAC key is derived from the field master key, which never lives in the
//! store directory.

use std::path::Path;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use super::model::User;
use crate::errors::{VaultError, Result};

/// Magic bytes at the start of every document file.
const MAGIC: &[u8; 4] = b"CVDB";

/// Current document format version.
pub const CURRENT_VERSION: u8 = 1;

/// Size of the HMAC tag appended to the file.
const HMAC_LEN: usize = 32;

/// Fixed-size prefix: 4 (magic) + 1 (version).
const PREFIX_LEN: usize = 5;

/// Serialize a user into document bytes, sealed with an HMAC tag.
pub fn encode_document(user: &User, hmac_key: &[u8]) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(user)
        .map_err(|e| VaultError::SerializationError(format!("user document: {e}")))?;

    let mut buf = Vec::with_capacity(PREFIX_LEN + body.len() + HMAC_LEN);
    buf.extend_from_slice(MAGIC);
    buf.push(CURRENT_VERSION);
    buf.extend_from_slice(&body);

    let tag = compute_hmac(hmac_key, user.id.as_bytes(), &buf)?;
    buf.extend_from_slice(&tag);
    Ok(buf)
}

/// Verify and parse document bytes read for `user_id`.
pub fn decode_document(user_id: &str, data: &[u8], hmac_key: &[u8]) -> Result<User> {
    if data.len() < PREFIX_LEN + HMAC_LEN {
        return Err(VaultError::InvalidDocumentFormat(
            "file too small to be a valid document".into(),
        ));
    }

    if &data[0..4] != MAGIC {
        return Err(VaultError::InvalidDocumentFormat(
            "missing CVDB magic bytes".into(),
        ));
    }

    let version = data[4];
    if version != CURRENT_VERSION {
        return Err(VaultError::InvalidDocumentFormat(format!(
            "unsupported version {version}, expected {CURRENT_VERSION}"
        )));
    }

    let body_end = data.len() - HMAC_LEN;
    verify_hmac(hmac_key, user_id.as_bytes(), &data[..body_end], &data[body_end..])
        .map_err(|_| VaultError::DocumentTampered(user_id.to_string()))?;

    let user: User = serde_json::from_slice(&data[PREFIX_LEN..body_end])
        .map_err(|e| VaultError::InvalidDocumentFormat(format!("user JSON: {e}")))?;

    if user.id != user_id {
        return Err(VaultError::DocumentTampered(user_id.to_string()));
    }

    Ok(user)
}

/// Write `bytes` to `path` atomically: temp file in the same directory,
/// then rename over the target.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    tokio::fs::write(&tmp_path, bytes).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// HMAC-SHA256 over the owning user id and the document bytes.
pub fn compute_hmac(hmac_key: &[u8], user_id: &[u8], body: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(hmac_key)
        .map_err(|e| VaultError::Store(format!("invalid HMAC key: {e}")))?;

    mac.update(user_id);
    mac.update(body);

    Ok(mac.finalize().into_bytes().to_vec())
}

/// Constant-time HMAC verification.
pub fn verify_hmac(hmac_key: &[u8], user_id: &[u8], body: &[u8], expected: &[u8]) -> Result<()> {
    let mut mac = Hmac::<Sha256>::new_from_slice(hmac_key)
        .map_err(|e| VaultError::Store(format!("invalid HMAC key: {e}")))?;

    mac.update(user_id);
    mac.update(body);

    mac.verify_slice(expected)
        .map_err(|_| VaultError::DocumentTampered(String::from_utf8_lossy(user_id).into_owned()))
}

// ---------------------------------------------------------------------------
// Serde helpers for base64-encoded Vec<u8> fields
// ---------------------------------------------------------------------------

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

pub(crate) fn base64_encode<S>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&BASE64.encode(data))
}

pub(crate) fn base64_decode<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    BASE64.decode(&s).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [5u8; 32];

    #[test]
    fn encode_decode_roundtrip() {
        let user = User::new("u1").with_session_key("sk");
        let bytes = encode_document(&user, &KEY).unwrap();
        let back = decode_document("u1", &bytes, &KEY).unwrap();
        assert_eq!(back.id, "u1");
        assert_eq!(back.session_key.as_deref(), Some("sk"));
    }

    #[test]
    fn flipped_byte_is_tampering() {
        let mut bytes = encode_document(&User::new("u1"), &KEY).unwrap();
        bytes[PREFIX_LEN + 2] ^= 0x20;
        assert!(matches!(
            decode_document("u1", &bytes, &KEY),
            Err(VaultError::DocumentTampered(_))
        ));
    }

    #[test]
    fn document_of_another_user_is_rejected() {
        let bytes = encode_document(&User::new("u1"), &KEY).unwrap();
        assert!(matches!(
            decode_document("u2", &bytes, &KEY),
            Err(VaultError::DocumentTampered(_))
        ));
    }

    #[test]
    fn wrong_magic_and_short_files_are_invalid() {
        assert!(matches!(
            decode_document("u1", b"tiny", &KEY),
            Err(VaultError::InvalidDocumentFormat(_))
        ));
        let mut bytes = encode_document(&User::new("u1"), &KEY).unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            decode_document("u1", &bytes, &KEY),
            Err(VaultError::InvalidDocumentFormat(_))
        ));
    }
}
