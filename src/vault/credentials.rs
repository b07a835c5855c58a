//! Credential CRUD for one user at a time.
//!
//! `CredentialStore` is the only place passwords cross between plaintext
//! and field ciphertext.  It works on plaintext `EntryInput` / `EntryView`
//! values; wrapping those in session envelopes is the request layer's job.

use std::sync::Arc;

use chrono::Utc;
use regex::RegexBuilder;
use uuid::Uuid;

use super::model::{
    validate_user_id, CredentialEntry, EntryId, EntryInput, EntrySummary, EntryView, User,
    WriteOutcome,
};
use super::store::UserStore;
use crate::crypto::{FieldEncryptor, KeyScope};
use crate::errors::{VaultError, Result};

/// Compiled size limit for URL search patterns.
const PATTERN_SIZE_LIMIT: usize = 1 << 16;

/// Default maximum length of a URL search pattern.
pub const DEFAULT_MAX_PATTERN_LEN: usize = 256;

/// What `update` did.  A missing id is not an error at this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    NotMatched,
}

pub struct CredentialStore {
    users: Arc<dyn UserStore>,
    fields: Arc<dyn FieldEncryptor>,
    max_pattern_len: usize,
}

impl CredentialStore {
    pub fn new(users: Arc<dyn UserStore>, fields: Arc<dyn FieldEncryptor>) -> Self {
        Self {
            users,
            fields,
            max_pattern_len: DEFAULT_MAX_PATTERN_LEN,
        }
    }

    pub fn with_max_pattern_len(mut self, max_pattern_len: usize) -> Self {
        self.max_pattern_len = max_pattern_len;
        self
    }

    /// Fetch a user document or fail with `UserNotFound`.
    pub async fn require_user(&self, user_id: &str) -> Result<User> {
        validate_user_id(user_id)?;
        self.users
            .get_user(user_id)
            .await?
            .ok_or_else(|| VaultError::UserNotFound(user_id.to_string()))
    }

    /// List entries without their passwords, sorted by url.
    pub async fn list(&self, user_id: &str) -> Result<Vec<EntrySummary>> {
        let user = self.require_user(user_id).await?;
        Ok(sorted_entries(&user).into_iter().map(EntrySummary::from).collect())
    }

    /// Fetch one entry with its password decrypted.
    pub async fn get(&self, user_id: &str, entry_id: EntryId) -> Result<EntryView> {
        let user = self.require_user(user_id).await?;
        let entry = user
            .password_list
            .get(&entry_id)
            .ok_or_else(|| VaultError::EntryNotFound(entry_id.to_string()))?;
        self.reveal(user_id, entry).await
    }

    /// Encrypt the password and append a new entry.  Returns its id.
    pub async fn add(&self, user_id: &str, input: &EntryInput) -> Result<EntryId> {
        input.validate()?;
        let user = self.require_user(user_id).await?;

        let generation = user.key_generation;
        let password = self
            .fields
            .encrypt(KeyScope::new(user_id, generation), &input.password)
            .await?;

        let now = Utc::now();
        let entry = CredentialEntry {
            id: Uuid::new_v4(),
            url: input.url.clone(),
            username: input.username.clone(),
            password,
            key_generation: generation,
            created_at: now,
            updated_at: now,
        };
        let id = entry.id;

        match self.users.push_entry(user_id, entry).await? {
            WriteOutcome::UserMissing => Err(VaultError::UserNotFound(user_id.to_string())),
            _ => {
                tracing::debug!(user_id, entry_id = %id, "credential entry added");
                Ok(id)
            }
        }
    }

    /// Re-encrypt and replace an entry's fields by id.
    pub async fn update(
        &self,
        user_id: &str,
        entry_id: EntryId,
        input: &EntryInput,
    ) -> Result<UpdateOutcome> {
        input.validate()?;
        let user = self.require_user(user_id).await?;

        let generation = user.key_generation;
        let password = self
            .fields
            .encrypt(KeyScope::new(user_id, generation), &input.password)
            .await?;

        let now = Utc::now();
        let entry = CredentialEntry {
            id: entry_id,
            url: input.url.clone(),
            username: input.username.clone(),
            password,
            key_generation: generation,
            created_at: now,
            updated_at: now,
        };

        match self.users.replace_entry(user_id, entry).await? {
            WriteOutcome::Applied => Ok(UpdateOutcome::Updated),
            WriteOutcome::EntryMissing => {
                tracing::debug!(user_id, %entry_id, "update matched no entry");
                Ok(UpdateOutcome::NotMatched)
            }
            WriteOutcome::UserMissing => Err(VaultError::UserNotFound(user_id.to_string())),
        }
    }

    /// Remove an entry by id.  Removing an absent entry succeeds and
    /// returns `false`.
    pub async fn remove(&self, user_id: &str, entry_id: EntryId) -> Result<bool> {
        validate_user_id(user_id)?;
        match self.users.pull_entry(user_id, entry_id).await? {
            WriteOutcome::UserMissing => Err(VaultError::UserNotFound(user_id.to_string())),
            WriteOutcome::EntryMissing => {
                tracing::debug!(user_id, %entry_id, "remove matched no entry");
                Ok(false)
            }
            WriteOutcome::Applied => Ok(true),
        }
    }

    /// First entry (in listing order) whose url contains `pattern`,
    /// ignoring case.  The pattern is matched literally.
    pub async fn find_by_url_pattern(
        &self,
        user_id: &str,
        pattern: &str,
    ) -> Result<Option<EntryView>> {
        if pattern.chars().count() > self.max_pattern_len {
            return Err(VaultError::InvalidPayload(format!(
                "search pattern cannot exceed {} characters",
                self.max_pattern_len
            )));
        }

        let matcher = RegexBuilder::new(&regex::escape(pattern))
            .case_insensitive(true)
            .size_limit(PATTERN_SIZE_LIMIT)
            .build()
            .map_err(|e| VaultError::InvalidPayload(format!("search pattern: {e}")))?;

        let user = self.require_user(user_id).await?;
        let found = sorted_entries(&user)
            .into_iter()
            .find(|entry| matcher.is_match(&entry.url));

        match found {
            Some(entry) => self.reveal(user_id, entry).await.map(Some),
            None => Ok(None),
        }
    }

    async fn reveal(&self, user_id: &str, entry: &CredentialEntry) -> Result<EntryView> {
        let password = self
            .fields
            .decrypt(
                KeyScope::new(user_id, entry.key_generation),
                &entry.password,
            )
            .await?;

        Ok(EntryView {
            id: entry.id,
            url: entry.url.clone(),
            username: entry.username.clone(),
            password: password.as_str().to_owned(),
        })
    }
}

/// Entries ordered by url (case-insensitive), then id.
fn sorted_entries(user: &User) -> Vec<&CredentialEntry> {
    let mut entries: Vec<&CredentialEntry> = user.password_list.values().collect();
    entries.sort_by(|a, b| {
        a.url
            .to_lowercase()
            .cmp(&b.url.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{KeyfileFieldEncryptor, MasterKey};
    use crate::vault::MemoryStore;

    async fn setup() -> (Arc<MemoryStore>, CredentialStore) {
        let users = Arc::new(MemoryStore::new());
        users.insert_user(User::new("u1")).await.unwrap();
        let fields = Arc::new(KeyfileFieldEncryptor::new(MasterKey::new([8u8; 32])));
        let store = CredentialStore::new(users.clone(), fields);
        (users, store)
    }

    #[tokio::test]
    async fn stored_password_is_ciphertext() {
        let (users, store) = setup().await;
        let id = store
            .add("u1", &EntryInput::new("bank.com", "alice", "P@ss1"))
            .await
            .unwrap();

        let user = users.get_user("u1").await.unwrap().unwrap();
        let raw = &user.password_list[&id].password;
        assert!(!raw.windows(5).any(|w| w == b"P@ss1"));
    }

    #[tokio::test]
    async fn list_is_sorted_case_insensitively() {
        let (_, store) = setup().await;
        for url in ["zeta.io", "Alpha.com", "beta.org"] {
            store
                .add("u1", &EntryInput::new(url, "u", "p"))
                .await
                .unwrap();
        }
        let urls: Vec<String> = store
            .list("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.url)
            .collect();
        assert_eq!(urls, vec!["Alpha.com", "beta.org", "zeta.io"]);
    }

    #[tokio::test]
    async fn pattern_metacharacters_match_literally() {
        let (_, store) = setup().await;
        store
            .add("u1", &EntryInput::new("examplexcom", "u", "p"))
            .await
            .unwrap();
        assert!(store
            .find_by_url_pattern("u1", "example.com")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_by_url_pattern("u1", "(a+)+$")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn overlong_pattern_is_rejected() {
        let (_, store) = setup().await;
        let store = store.with_max_pattern_len(4);
        assert!(matches!(
            store.find_by_url_pattern("u1", "abcdef").await,
            Err(VaultError::InvalidPayload(_))
        ));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let (_, store) = setup().await;
        assert!(matches!(
            store.list("nobody").await,
            Err(VaultError::UserNotFound(_))
        ));
        assert!(matches!(
            store.remove("nobody", Uuid::new_v4()).await,
            Err(VaultError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_storage() {
        let (users, store) = setup().await;
        assert!(store
            .add("u1", &EntryInput::new("", "alice", "pw"))
            .await
            .is_err());
        let user = users.get_user("u1").await.unwrap().unwrap();
        assert!(user.password_list.is_empty());
    }
}
