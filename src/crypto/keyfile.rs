//! Field master keyfile.
//!
//! The field cipher's master key lives in a 32-byte random file on the
//! server host, outside the document store.  A compromised store alone
//! therefore never yields plaintext passwords.
//!
//! Operators may pin the keyfile by its SHA-256 fingerprint in the config
//! so the server refuses to start against the wrong key.

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::errors::{VaultError, Result};

/// Expected length of a keyfile in bytes (256 bits).
pub const KEYFILE_LEN: usize = 32;

/// Generate a new random keyfile and write it to `path`.
///
/// The file is written with restrictive permissions (owner-only read).
/// Returns the raw keyfile bytes so the caller can use them immediately.
pub fn generate_keyfile(path: &Path) -> Result<Vec<u8>> {
    if path.exists() {
        return Err(VaultError::KeyfileError(format!(
            "keyfile already exists at {}",
            path.display()
        )));
    }

    let mut keyfile = vec![0u8; KEYFILE_LEN];
    rand::rng().fill_bytes(&mut keyfile);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                VaultError::KeyfileError(format!("cannot create keyfile directory: {e}"))
            })?;
        }
    }

    fs::write(path, &keyfile)
        .map_err(|e| VaultError::KeyfileError(format!("failed to write keyfile: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, perms).map_err(|e| {
            VaultError::KeyfileError(format!("failed to set keyfile permissions: {e}"))
        })?;
    }

    Ok(keyfile)
}

/// Load a keyfile from disk and validate its length.
pub fn load_keyfile(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(VaultError::KeyfileError(format!(
            "keyfile not found at {} (run `credvault keygen`)",
            path.display()
        )));
    }

    let data = fs::read(path)
        .map_err(|e| VaultError::KeyfileError(format!("failed to read keyfile: {e}")))?;

    if data.len() != KEYFILE_LEN {
        return Err(VaultError::KeyfileError(format!(
            "keyfile must be exactly {} bytes, got {}",
            KEYFILE_LEN,
            data.len()
        )));
    }

    Ok(data)
}

/// SHA-256 fingerprint of a keyfile, base64-encoded.
pub fn fingerprint(keyfile_bytes: &[u8]) -> String {
    BASE64.encode(Sha256::digest(keyfile_bytes))
}

/// Verify that a keyfile matches a pinned fingerprint.
pub fn verify_fingerprint(keyfile_bytes: &[u8], expected: &str) -> Result<()> {
    let actual = fingerprint(keyfile_bytes);

    if actual.as_bytes().ct_eq(expected.trim().as_bytes()).into() {
        Ok(())
    } else {
        Err(VaultError::KeyfileError(
            "wrong keyfile, fingerprint does not match the configured value".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn generate_and_load_keyfile_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("field.key");

        let generated = generate_keyfile(&path).unwrap();
        assert_eq!(generated.len(), KEYFILE_LEN);

        let loaded = load_keyfile(&path).unwrap();
        assert_eq!(generated, loaded);
    }

    #[test]
    fn generate_keyfile_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("field.key");

        generate_keyfile(&path).unwrap();
        assert!(generate_keyfile(&path).is_err());
    }

    #[test]
    fn generate_keyfile_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("keys").join("field.key");
        generate_keyfile(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn load_keyfile_fails_on_wrong_length() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.key");
        fs::write(&path, [0u8; 16]).unwrap();

        assert!(load_keyfile(&path).is_err());
    }

    #[test]
    fn load_keyfile_fails_if_missing() {
        let dir = TempDir::new().unwrap();
        assert!(load_keyfile(&dir.path().join("nope.key")).is_err());
    }

    #[test]
    fn fingerprint_pinning() {
        let keyfile = [0x42u8; 32];
        let pinned = fingerprint(&keyfile);
        assert!(verify_fingerprint(&keyfile, &pinned).is_ok());
        let err = verify_fingerprint(&[0x43u8; 32], &pinned).unwrap_err();
        assert!(err
            .to_string()
            .ends_with("wrong keyfile, fingerprint does not match the configured value"));
    }

    #[cfg(unix)]
    #[test]
    fn keyfile_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("field.key");
        generate_keyfile(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
