//! The keyed document store holding user records.
//!
//! `UserStore` is the contract the rest of the crate depends on.  Every
//! mutating method is a single-document atomic operation (push, pull,
//! replace-by-id, set-fields, rewrap), which is the only consistency the
//! request layer relies on.  Two backends ship with the crate:
//! `MemoryStore` here and `FileStore` in `file_store`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::model::{CredentialEntry, EntryId, Rewrap, SettingsPatch, User, WriteOutcome};
use crate::errors::{VaultError, Result};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>>;

    /// Registration hook; fails if the id is taken.
    async fn insert_user(&self, user: User) -> Result<()>;

    /// Returns `false` when there was nothing to delete.
    async fn delete_user(&self, user_id: &str) -> Result<bool>;

    /// Login/logout hook for the external session issuer.
    async fn set_session_key(&self, user_id: &str, session_key: Option<String>)
        -> Result<WriteOutcome>;

    async fn push_entry(&self, user_id: &str, entry: CredentialEntry) -> Result<WriteOutcome>;

    async fn replace_entry(&self, user_id: &str, entry: CredentialEntry) -> Result<WriteOutcome>;

    async fn pull_entry(&self, user_id: &str, entry_id: EntryId) -> Result<WriteOutcome>;

    async fn update_settings(&self, user_id: &str, patch: SettingsPatch) -> Result<WriteOutcome>;

    async fn rewrap(&self, user_id: &str, rewrap: Rewrap) -> Result<WriteOutcome>;
}

/// In-process store, mainly for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn mutate<F>(&self, user_id: &str, f: F) -> Result<WriteOutcome>
    where
        F: FnOnce(&mut User) -> Result<WriteOutcome> + Send,
    {
        let mut users = self.users.write().await;
        match users.get_mut(user_id) {
            Some(user) => f(user),
            None => Ok(WriteOutcome::UserMissing),
        }
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.users.read().await.get(user_id).cloned())
    }

    async fn insert_user(&self, user: User) -> Result<()> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Err(VaultError::Store(format!("user '{}' already exists", user.id)));
        }
        users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn delete_user(&self, user_id: &str) -> Result<bool> {
        Ok(self.users.write().await.remove(user_id).is_some())
    }

    async fn set_session_key(
        &self,
        user_id: &str,
        session_key: Option<String>,
    ) -> Result<WriteOutcome> {
        self.mutate(user_id, |user| {
            user.session_key = session_key;
            Ok(WriteOutcome::Applied)
        })
        .await
    }

    async fn push_entry(&self, user_id: &str, entry: CredentialEntry) -> Result<WriteOutcome> {
        self.mutate(user_id, |user| {
            user.push_entry(entry);
            Ok(WriteOutcome::Applied)
        })
        .await
    }

    async fn replace_entry(&self, user_id: &str, entry: CredentialEntry) -> Result<WriteOutcome> {
        self.mutate(user_id, |user| Ok(user.replace_entry(entry)))
            .await
    }

    async fn pull_entry(&self, user_id: &str, entry_id: EntryId) -> Result<WriteOutcome> {
        self.mutate(user_id, |user| Ok(user.pull_entry(entry_id)))
            .await
    }

    async fn update_settings(&self, user_id: &str, patch: SettingsPatch) -> Result<WriteOutcome> {
        self.mutate(user_id, |user| {
            user.apply_settings(patch);
            Ok(WriteOutcome::Applied)
        })
        .await
    }

    async fn rewrap(&self, user_id: &str, rewrap: Rewrap) -> Result<WriteOutcome> {
        self.mutate(user_id, |user| {
            user.apply_rewrap(rewrap)?;
            Ok(WriteOutcome::Applied)
        })
        .await
    }
}
