//! Directory-backed document store.
//!
//! Each user is one HMAC-sealed document at `<data_dir>/users/<id>.doc`.
//! Writers are serialized by a single async mutex and every write goes
//! through temp-file + rename, so readers never observe a half-written
//! document and each mutation is atomic per document.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use super::format::{decode_document, encode_document, write_atomic};
use super::model::{
    validate_user_id, CredentialEntry, EntryId, Rewrap, SettingsPatch, User, WriteOutcome,
};
use super::store::UserStore;
use crate::crypto::keys::KEY_LEN;
use crate::errors::{VaultError, Result};

pub struct FileStore {
    users_dir: PathBuf,
    hmac_key: Zeroizing<[u8; KEY_LEN]>,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("users_dir", &self.users_dir)
            .finish_non_exhaustive()
    }
}

impl FileStore {
    /// Open (creating if needed) the store under `data_dir`.
    pub fn open(data_dir: &Path, hmac_key: [u8; KEY_LEN]) -> Result<Self> {
        let users_dir = data_dir.join("users");
        std::fs::create_dir_all(&users_dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&users_dir, std::fs::Permissions::from_mode(0o700))?;
        }

        Ok(Self {
            users_dir,
            hmac_key: Zeroizing::new(hmac_key),
            write_lock: Mutex::new(()),
        })
    }

    fn document_path(&self, user_id: &str) -> Result<PathBuf> {
        validate_user_id(user_id)?;
        Ok(self.users_dir.join(format!("{user_id}.doc")))
    }

    async fn load(&self, user_id: &str) -> Result<Option<User>> {
        let path = self.document_path(user_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => decode_document(user_id, &bytes, self.hmac_key.as_slice()).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(store_io(e)),
        }
    }

    async fn save(&self, user: &User) -> Result<()> {
        let path = self.document_path(&user.id)?;
        let bytes = encode_document(user, self.hmac_key.as_slice())?;
        write_atomic(&path, &bytes).await.map_err(|e| match e {
            VaultError::Io(io) => store_io(io),
            other => other,
        })
    }

    /// Load, mutate and save one document under the write lock.
    async fn mutate<F>(&self, user_id: &str, f: F) -> Result<WriteOutcome>
    where
        F: FnOnce(&mut User) -> Result<WriteOutcome> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let Some(mut user) = self.load(user_id).await? else {
            return Ok(WriteOutcome::UserMissing);
        };
        let outcome = f(&mut user)?;
        if outcome == WriteOutcome::Applied {
            self.save(&user).await?;
        }
        Ok(outcome)
    }
}

fn store_io(e: std::io::Error) -> VaultError {
    VaultError::Store(format!("document IO failed: {e}"))
}

#[async_trait]
impl UserStore for FileStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        if validate_user_id(user_id).is_err() {
            return Ok(None);
        }
        self.load(user_id).await
    }

    async fn insert_user(&self, user: User) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.load(&user.id).await?.is_some() {
            return Err(VaultError::Store(format!("user '{}' already exists", user.id)));
        }
        self.save(&user).await
    }

    async fn delete_user(&self, user_id: &str) -> Result<bool> {
        if validate_user_id(user_id).is_err() {
            return Ok(false);
        }
        let path = self.document_path(user_id)?;
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(store_io(e)),
        }
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
