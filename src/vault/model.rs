//! User documents and credential entries.
//!
//! A `User` is one document in the external keyed store.  Its credential
//! entries live in a map keyed by entry id, so lookup, replacement and
//! removal never depend on position.  The `password` field of an entry is
//! always field-cipher output; plaintext only exists in `EntryInput` and
//! `EntryView`, which are request-scoped and wiped on drop.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::format::{base64_decode, base64_encode};
use crate::errors::{VaultError, Result};

pub type EntryId = Uuid;

/// Maximum length of a user id.
const MAX_USER_ID_LEN: usize = 128;

/// Maximum length of an entry's url label.
const MAX_URL_LEN: usize = 2048;

/// Maximum length of an entry's username.
const MAX_USERNAME_LEN: usize = 512;

/// Maximum length of a stored password.
const MAX_PASSWORD_LEN: usize = 4096;

/// Password generator policy level chosen by the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordStrength {
    Low,
    #[default]
    Medium,
    High,
}

impl PasswordStrength {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for PasswordStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PasswordStrength {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(VaultError::InvalidSettingValue {
                setting: "password-strength".into(),
                value: s.to_string(),
            }),
        }
    }
}

/// The `{salt, verifier}` pair consumed by the external auth subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierPair {
    pub salt: String,
    pub verifier: String,
}

impl VerifierPair {
    /// Serialized form stored on the user document.
    pub fn to_stored(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| VaultError::SerializationError(format!("verifier pair: {e}")))
    }
}

/// A single stored credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialEntry {
    pub id: EntryId,

    /// Display name / site label.
    pub url: String,

    pub username: String,

    /// Field-cipher output (nonce + ciphertext), base64 in documents.
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub password: Vec<u8>,

    /// Generation of the per-user field key `password` is wrapped under.
    #[serde(default)]
    pub key_generation: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user document.
#[derive(Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,

    /// Shared secret of the active session, `None` when logged out.
    #[serde(default)]
    pub session_key: Option<String>,

    #[serde(default)]
    pub password_strength: PasswordStrength,

    /// Session timeout label, e.g. `"30m"` or `"1h"`.
    #[serde(default = "default_cookie_expire")]
    pub cookie_expire: String,

    /// Serialized [`VerifierPair`].
    #[serde(default)]
    pub verifier: String,

    /// Generation new entries are wrapped under.
    #[serde(default)]
    pub key_generation: u32,

    #[serde(default)]
    pub password_list: BTreeMap<EntryId, CredentialEntry>,
}

fn default_cookie_expire() -> String {
    "1h".to_string()
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field(
                "session_key",
                &self.session_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("password_strength", &self.password_strength)
            .field("cookie_expire", &self.cookie_expire)
            .field("key_generation", &self.key_generation)
            .field("entries", &self.password_list.len())
            .finish()
    }
}

/// Result of a single-document write against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    EntryMissing,
    UserMissing,
}

/// One in-place settings mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsPatch {
    PasswordStrength(PasswordStrength),
    SessionTimeout(String),
}

/// Atomic verifier rotation: new pair, new generation, re-wrapped entries.
#[derive(Debug, Clone)]
pub struct Rewrap {
    pub expected_generation: u32,
    pub new_generation: u32,
    pub verifier: String,
    pub entries: Vec<CredentialEntry>,
}

impl User {
    /// A fresh user document as registration would create it.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            session_key: None,
            password_strength: PasswordStrength::default(),
            cookie_expire: default_cookie_expire(),
            verifier: String::new(),
            key_generation: 0,
            password_list: BTreeMap::new(),
        }
    }

    pub fn with_session_key(mut self, session_key: impl Into<String>) -> Self {
        self.session_key = Some(session_key.into());
        self
    }

    pub fn push_entry(&mut self, entry: CredentialEntry) {
        self.password_list.insert(entry.id, entry);
    }

    /// Replace url, username and password of an existing entry, keeping
    /// its creation time.
    pub fn replace_entry(&mut self, entry: CredentialEntry) -> WriteOutcome {
        match self.password_list.get_mut(&entry.id) {
            Some(existing) => {
                existing.url = entry.url;
                existing.username = entry.username;
                existing.password = entry.password;
                existing.key_generation = entry.key_generation;
                existing.updated_at = entry.updated_at;
                WriteOutcome::Applied
            }
            None => WriteOutcome::EntryMissing,
        }
    }

    pub fn pull_entry(&mut self, entry_id: EntryId) -> WriteOutcome {
        match self.password_list.remove(&entry_id) {
            Some(_) => WriteOutcome::Applied,
            None => WriteOutcome::EntryMissing,
        }
    }

    pub fn apply_settings(&mut self, patch: SettingsPatch) {
        match patch {
            SettingsPatch::PasswordStrength(strength) => self.password_strength = strength,
            SettingsPatch::SessionTimeout(timeout) => self.cookie_expire = timeout,
        }
    }

    /// Apply a rotation if the document is still in the state the rewrap
    /// was computed from.  On conflict nothing is changed.
    pub fn apply_rewrap(&mut self, rewrap: Rewrap) -> Result<()> {
        if self.key_generation != rewrap.expected_generation {
            return Err(VaultError::Store(format!(
                "concurrent rotation for user '{}', retry",
                self.id
            )));
        }

        let current: BTreeSet<(EntryId, DateTime<Utc>)> = self
            .password_list
            .values()
            .map(|e| (e.id, e.updated_at))
            .collect();
        let snapshot: BTreeSet<(EntryId, DateTime<Utc>)> =
            rewrap.entries.iter().map(|e| (e.id, e.updated_at)).collect();
        if current != snapshot {
            return Err(VaultError::Store(format!(
                "entries of user '{}' changed during rotation, retry",
                self.id
            )));
        }

        self.verifier = rewrap.verifier;
        self.key_generation = rewrap.new_generation;
        self.session_key = None;
        self.password_list = rewrap.entries.into_iter().map(|e| (e.id, e)).collect();
        Ok(())
    }
}

/// Plaintext entry as sent by the client inside a session envelope.
#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct EntryInput {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl EntryInput {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(VaultError::InvalidEntry("url cannot be empty".into()));
        }
        if self.url.len() > MAX_URL_LEN {
            return Err(VaultError::InvalidEntry(format!(
                "url cannot exceed {MAX_URL_LEN} characters"
            )));
        }
        if self.username.is_empty() {
            return Err(VaultError::InvalidEntry("username cannot be empty".into()));
        }
        if self.username.len() > MAX_USERNAME_LEN {
            return Err(VaultError::InvalidEntry(format!(
                "username cannot exceed {MAX_USERNAME_LEN} characters"
            )));
        }
        if self.password.is_empty() {
            return Err(VaultError::InvalidEntry("password cannot be empty".into()));
        }
        if self.password.len() > MAX_PASSWORD_LEN {
            return Err(VaultError::InvalidEntry(format!(
                "password cannot exceed {MAX_PASSWORD_LEN} characters"
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for EntryInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryInput")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Listing row: never carries the password, not even as ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySummary {
    pub id: EntryId,
    pub url: String,
    pub username: String,
}

impl From<&CredentialEntry> for EntrySummary {
    fn from(entry: &CredentialEntry) -> Self {
        Self {
            id: entry.id,
            url: entry.url.clone(),
            username: entry.username.clone(),
        }
    }
}

/// A single entry with its password decrypted, for one response.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct EntryView {
    #[zeroize(skip)]
    pub id: EntryId,
    pub url: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for EntryView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryView")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Non-secret account preferences, as the settings endpoint returns them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSettings {
    pub password_option: PasswordStrength,
    pub session_timeout: String,
}

/// Validate that a user id is safe to use as a document key.
///
/// Allowed: ASCII letters, digits, underscores, hyphens.
pub fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.is_empty() || user_id.len() > MAX_USER_ID_LEN {
        return Err(VaultError::UserNotFound(user_id.to_string()));
    }
    if !user_id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(VaultError::UserNotFound(user_id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str) -> CredentialEntry {
        let now = Utc::now();
        CredentialEntry {
            id: Uuid::new_v4(),
            url: url.into(),
            username: "alice".into(),
            password: vec![1, 2, 3],
            key_generation: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn strength_parses_case_insensitively() {
        assert_eq!(
            "HIGH".parse::<PasswordStrength>().unwrap(),
            PasswordStrength::High
        );
        assert!("extreme".parse::<PasswordStrength>().is_err());
    }

    #[test]
    fn strength_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&PasswordStrength::Medium).unwrap(),
            "\"medium\""
        );
    }

    #[test]
    fn replace_keeps_created_at() {
        let mut user = User::new("u1");
        let original = entry("a.com");
        let id = original.id;
        let created = original.created_at;
        user.push_entry(original);

        let mut replacement = entry("b.com");
        replacement.id = id;
        replacement.created_at = Utc::now() + chrono::Duration::days(1);
        assert_eq!(user.replace_entry(replacement), WriteOutcome::Applied);

        let stored = &user.password_list[&id];
        assert_eq!(stored.url, "b.com");
        assert_eq!(stored.created_at, created);
    }

    #[test]
    fn replace_and_pull_report_missing_entries() {
        let mut user = User::new("u1");
        assert_eq!(user.replace_entry(entry("a.com")), WriteOutcome::EntryMissing);
        assert_eq!(user.pull_entry(Uuid::new_v4()), WriteOutcome::EntryMissing);
    }

    #[test]
    fn rewrap_rejects_stale_snapshot() {
        let mut user = User::new("u1");
        user.push_entry(entry("a.com"));
        let rewrap = Rewrap {
            expected_generation: 0,
            new_generation: 1,
            verifier: "{}".into(),
            entries: Vec::new(),
        };
        let err = user.apply_rewrap(rewrap).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Store error: entries of user 'u1' changed during rotation, retry"
        );
        assert_eq!(user.key_generation, 0);
        assert_eq!(user.password_list.len(), 1);
    }

    #[test]
    fn rewrap_clears_session_key() {
        let mut user = User::new("u1").with_session_key("k");
        let e = entry("a.com");
        user.push_entry(e.clone());
        let rewrap = Rewrap {
            expected_generation: 0,
            new_generation: 1,
            verifier: "{\"salt\":\"s\",\"verifier\":\"v\"}".into(),
            entries: vec![e],
        };
        user.apply_rewrap(rewrap).unwrap();
        assert!(user.session_key.is_none());
        assert_eq!(user.key_generation, 1);
    }

    #[test]
    fn user_debug_hides_session_key() {
        let user = User::new("u1").with_session_key("super-secret");
        assert!(!format!("{user:?}").contains("super-secret"));
    }

    #[test]
    fn user_id_validation() {
        assert!(validate_user_id("64b7f0c2e1a9").is_ok());
        assert!(validate_user_id("user_1-a").is_ok());
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id("../etc").is_err());
        assert!(validate_user_id(&"a".repeat(129)).is_err());
    }

    #[test]
    fn entry_input_validation() {
        assert!(EntryInput::new("bank.com", "alice", "P@ss1").validate().is_ok());
        assert!(EntryInput::new("", "alice", "P@ss1").validate().is_err());
        assert!(EntryInput::new("bank.com", "", "P@ss1").validate().is_err());
        assert!(EntryInput::new("bank.com", "alice", "").validate().is_err());
    }

    #[test]
    fn settings_serialize_with_client_names() {
        let s = AccountSettings {
            password_option: PasswordStrength::High,
            session_timeout: "30m".into(),
        };
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["passwordOption"], "high");
        assert_eq!(v["sessionTimeout"], "30m");
    }
}
