use std::path::PathBuf;
use thiserror::Error;

/// All errors that can occur in CredVault.
#[derive(Debug, Error)]
pub enum VaultError {
    // --- Crypto errors ---
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: wrong key or corrupted data")]
    DecryptionFailed,

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    // --- Payload errors ---
    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    #[error("Unknown setting type '{0}'")]
    UnknownSetting(String),

    #[error("Invalid value '{value}' for setting '{setting}'")]
    InvalidSettingValue { setting: String, value: String },

    // --- Lookup errors ---
    #[error("User '{0}' not found")]
    UserNotFound(String),

    #[error("Entry '{0}' not found")]
    EntryNotFound(String),

    #[error("User '{0}' has no active session")]
    NoActiveSession(String),

    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid document format: {0}")]
    InvalidDocumentFormat(String),

    #[error("Document integrity check failed for user '{0}'")]
    DocumentTampered(String),

    // --- Keyfile errors ---
    #[error("Keyfile error: {0}")]
    KeyfileError(String),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    ConfigError(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Data directory not found at {0}")]
    DataDirNotFound(PathBuf),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // --- CLI errors ---
    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Audit error: {0}")]
    AuditError(String),
}

/// Coarse classification of a [`VaultError`], used at the HTTP boundary so
/// clients can tell "bad input", "not found" and "try again" apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    NotFound,
    Crypto,
    Store,
    Internal,
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedCiphertext(_)
            | Self::InvalidPayload(_)
            | Self::InvalidEntry(_)
            | Self::UnknownSetting(_)
            | Self::InvalidSettingValue { .. } => ErrorKind::Validation,
            Self::NoActiveSession(_) => ErrorKind::Unauthorized,
            Self::UserNotFound(_) | Self::EntryNotFound(_) => ErrorKind::NotFound,
            Self::EncryptionFailed(_) | Self::DecryptionFailed | Self::KeyDerivationFailed(_) => {
                ErrorKind::Crypto
            }
            Self::Store(_) => ErrorKind::Store,
            Self::InvalidDocumentFormat(_)
            | Self::DocumentTampered(_)
            | Self::KeyfileError(_)
            | Self::ConfigError(_)
            | Self::Io(_)
            | Self::DataDirNotFound(_)
            | Self::SerializationError(_)
            | Self::CommandFailed(_)
            | Self::AuditError(_) => ErrorKind::Internal,
        }
    }
}

/// Convenience type alias for CredVault results.
pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_classify_as_validation() {
        assert_eq!(
            VaultError::UnknownSetting("x".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            VaultError::MalformedCiphertext("short".into()).kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn lookup_and_crypto_errors_are_distinct() {
        assert_eq!(
            VaultError::EntryNotFound("e".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(VaultError::DecryptionFailed.kind(), ErrorKind::Crypto);
        assert_eq!(
            VaultError::DecryptionFailed.to_string(),
            "Decryption failed: wrong key or corrupted data"
        );
        assert_eq!(VaultError::Store("down".into()).kind(), ErrorKind::Store);
        assert_eq!(
            VaultError::DocumentTampered("u1".into()).kind(),
            ErrorKind::Internal
        );
        assert_eq!(
            VaultError::InvalidDocumentFormat("bad magic".into()).kind(),
            ErrorKind::Internal
        );
        assert_eq!(
            VaultError::NoActiveSession("u".into()).kind(),
            ErrorKind::Unauthorized
        );
    }
}
