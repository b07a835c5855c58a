//! Account preferences and master-password verifier rotation.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::model::{
    validate_user_id, AccountSettings, PasswordStrength, Rewrap, SettingsPatch, VerifierPair,
    WriteOutcome,
};
use super::store::UserStore;
use crate::crypto::{FieldEncryptor, KeyScope};
use crate::errors::{VaultError, Result};

/// The settings a client may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    PasswordStrength,
    SessionTimeout,
}

impl SettingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PasswordStrength => "password-strength",
            Self::SessionTimeout => "session-timeout",
        }
    }
}

impl fmt::Display for SettingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKind {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "password-strength" => Ok(Self::PasswordStrength),
            "session-timeout" => Ok(Self::SessionTimeout),
            other => Err(VaultError::UnknownSetting(other.to_string())),
        }
    }
}

/// Session timeouts look like `30m`, `12h` or `7d`: 1 to 9999 followed
/// by a unit of s, m, h or d.
fn is_valid_session_timeout(value: &str) -> bool {
    let Some(amount) = value.strip_suffix(['s', 'm', 'h', 'd']) else {
        return false;
    };
    !amount.is_empty()
        && amount.len() <= 4
        && !amount.starts_with('0')
        && amount.bytes().all(|b| b.is_ascii_digit())
}

pub struct AccountSettingsManager {
    users: Arc<dyn UserStore>,
    fields: Arc<dyn FieldEncryptor>,
}

impl AccountSettingsManager {
    pub fn new(users: Arc<dyn UserStore>, fields: Arc<dyn FieldEncryptor>) -> Self {
        Self { users, fields }
    }

    pub async fn get_settings(&self, user_id: &str) -> Result<AccountSettings> {
        validate_user_id(user_id)?;
        let user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or_else(|| VaultError::UserNotFound(user_id.to_string()))?;

        Ok(AccountSettings {
            password_option: user.password_strength,
            session_timeout: user.cookie_expire,
        })
    }

    /// Change one setting.  `kind` must name a known setting and `value`
    /// must be valid for it; otherwise nothing is written.
    ///
    /// Returns the confirmation message shown to the user.
    pub async fn set_setting(&self, user_id: &str, kind: &str, value: &str) -> Result<String> {
        validate_user_id(user_id)?;
        let kind: SettingKind = kind.parse()?;

        let (patch, message) = match kind {
            SettingKind::PasswordStrength => {
                let strength: PasswordStrength = value.parse()?;
                (
                    SettingsPatch::PasswordStrength(strength),
                    format!("Your password generator strength type is \"{strength}\"."),
                )
            }
            SettingKind::SessionTimeout => {
                let timeout = value.trim();
                if !is_valid_session_timeout(timeout) {
                    return Err(VaultError::InvalidSettingValue {
                        setting: kind.to_string(),
                        value: value.to_string(),
                    });
                }
                (
                    SettingsPatch::SessionTimeout(timeout.to_string()),
                    format!("Your login session timeout is \"{timeout}\"."),
                )
            }
        };

        match self.users.update_settings(user_id, patch).await? {
            WriteOutcome::UserMissing => Err(VaultError::UserNotFound(user_id.to_string())),
            _ => {
                tracing::info!(user_id, setting = %kind, "account setting changed");
                Ok(message)
            }
        }
    }

    /// Replace the verifier pair and re-wrap every stored password under
    /// the next field-key generation, in one atomic store write.
    ///
    /// The active session key is cleared, so the client must log in again.
    /// Nothing is written unless every entry re-wrapped, so a failed
    /// rotation can simply be retried.  Returns the new generation.
    pub async fn rotate_verifier(&self, user_id: &str, salt: &str, verifier: &str) -> Result<u32> {
        validate_user_id(user_id)?;
        if salt.is_empty() || verifier.is_empty() {
            return Err(VaultError::InvalidPayload(
                "salt and verifier must both be present".into(),
            ));
        }

        let user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or_else(|| VaultError::UserNotFound(user_id.to_string()))?;

        let current = KeyScope::new(user_id, user.key_generation);
        let next = current.next();

        let mut entries = Vec::with_capacity(user.password_list.len());
        for entry in user.password_list.values() {
            let plaintext = self
                .fields
                .decrypt(KeyScope::new(user_id, entry.key_generation), &entry.password)
                .await?;
            let password = self.fields.encrypt(next, &plaintext).await?;

            let mut rewrapped = entry.clone();
            rewrapped.password = password;
            rewrapped.key_generation = next.generation;
            entries.push(rewrapped);
        }

        let rewrap = Rewrap {
            expected_generation: current.generation,
            new_generation: next.generation,
            verifier: VerifierPair {
                salt: salt.to_string(),
                verifier: verifier.to_string(),
            }
            .to_stored()?,
            entries,
        };

        match self.users.rewrap(user_id, rewrap).await? {
            WriteOutcome::UserMissing => Err(VaultError::UserNotFound(user_id.to_string())),
            _ => {
                tracing::info!(
                    user_id,
                    generation = next.generation,
                    entries = user.password_list.len(),
                    "verifier rotated and entries re-wrapped"
                );
                Ok(next.generation)
            }
        }
    }

    /// Delete the whole account.  Deleting a missing account succeeds and
    /// returns `false`.
    pub async fn delete_account(&self, user_id: &str) -> Result<bool> {
        validate_user_id(user_id)?;
        let deleted = self.users.delete_user(user_id).await?;
        if !deleted {
            tracing::debug!(user_id, "delete matched no account");
        }
        Ok(deleted)
    }
}
