//! `credvault user` and `credvault session` — provision users and manage
//! their session keys on the configured store.
//!
//! Usage:
//!   credvault user add 64b7f0c2e1a9 --salt S --verifier V
//!   credvault session set 64b7f0c2e1a9 <key>
//!   CREDVAULT_SESSION_KEY=<key> credvault session set 64b7f0c2e1a9
//!   credvault session clear 64b7f0c2e1a9
//!
//! These stand in for the registration and login flows, which live in an
//! external auth service.

use std::future::Future;
use std::sync::Arc;

use crate::audit::Auditor;
use crate::cli::commands::serve::{load_field_encryptor, open_store};
use crate::cli::output;
use crate::cli::{load_settings, Cli};
use crate::config::StoreBackend;
use crate::errors::{VaultError, Result};
use crate::vault::model::{validate_user_id, WriteOutcome};
use crate::vault::{User, UserStore, VerifierPair};

/// Execute `user add`.
pub fn execute_user_add(
    cli: &Cli,
    user_id: &str,
    salt: Option<&str>,
    verifier: Option<&str>,
) -> Result<()> {
    validate_user_id(user_id)?;
    let mut user = User::new(user_id);
    match (salt, verifier) {
        (Some(salt), Some(verifier)) if !salt.is_empty() && !verifier.is_empty() => {
            user.verifier = VerifierPair {
                salt: salt.to_string(),
                verifier: verifier.to_string(),
            }
            .to_stored()?;
        }
        (None, None) => {}
        _ => {
            return Err(VaultError::InvalidPayload(
                "salt and verifier must both be present".into(),
            ))
        }
    }

    let (users, auditor) = open_persistent_store(cli)?;
    block_on(users.insert_user(user))?;
    auditor.record_blocking("user-add", user_id, None);

    output::success(&format!("User '{user_id}' created"));
    output::tip(&format!("Open a session with `credvault session set {user_id} <key>`"));
    Ok(())
}

/// Execute `session set`.
pub fn execute_session_set(cli: &Cli, user_id: &str, session_key: &str) -> Result<()> {
    validate_user_id(user_id)?;
    if session_key.is_empty() {
        return Err(VaultError::InvalidPayload("session key must not be empty".into()));
    }

    let (users, auditor) = open_persistent_store(cli)?;
    set_session_key(users.as_ref(), user_id, Some(session_key.to_string()))?;
    auditor.record_blocking("session-set", user_id, None);

    output::success(&format!("Session opened for '{user_id}'"));
    Ok(())
}

/// Execute `session clear`.
pub fn execute_session_clear(cli: &Cli, user_id: &str) -> Result<()> {
    validate_user_id(user_id)?;

    let (users, auditor) = open_persistent_store(cli)?;
    set_session_key(users.as_ref(), user_id, None)?;
    auditor.record_blocking("session-clear", user_id, None);

    output::success(&format!("Session cleared for '{user_id}'"));
    Ok(())
}

fn set_session_key(users: &dyn UserStore, user_id: &str, key: Option<String>) -> Result<()> {
    match block_on(users.set_session_key(user_id, key))?? {
        WriteOutcome::UserMissing => Err(VaultError::UserNotFound(user_id.to_string())),
        WriteOutcome::Applied | WriteOutcome::EntryMissing => Ok(()),
    }
}

/// Open the configured store the same way `serve` does.  The memory
/// backend would forget the change on exit, so it is refused.
fn open_persistent_store(cli: &Cli) -> Result<(Arc<dyn UserStore>, Auditor)> {
    let settings = load_settings(cli)?;
    if settings.store == StoreBackend::Memory {
        return Err(VaultError::CommandFailed(
            "the memory store keeps nothing between runs, set store = \"file\"".into(),
        ));
    }
    let fields = load_field_encryptor(&settings)?;
    open_store(&settings, &fields)
}

fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| VaultError::CommandFailed(format!("failed to start runtime: {e}")))?;
    Ok(runtime.block_on(future))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{generate_keyfile, KeyfileFieldEncryptor};
    use crate::vault::FileStore;
    use clap::Parser;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Cli) {
        let dir = TempDir::new().unwrap();
        generate_keyfile(&dir.path().join("field.key")).unwrap();
        let config = dir.path().join("credvault.toml");
        std::fs::write(
            &config,
            format!(
                "data_dir = {:?}\nfield_keyfile = {:?}\n",
                dir.path().join("data"),
                dir.path().join("field.key"),
            ),
        )
        .unwrap();
        let cli = Cli::parse_from(["credvault", "--config", config.to_str().unwrap(), "generate"]);
        (dir, cli)
    }

    fn stored_user(dir: &TempDir, user_id: &str) -> Option<User> {
        let fields = KeyfileFieldEncryptor::from_keyfile(&dir.path().join("field.key"), None).unwrap();
        let hmac_key = fields.master_key().derive_document_hmac_key().unwrap();
        let store = FileStore::open(&dir.path().join("data"), hmac_key).unwrap();
        block_on(store.get_user(user_id)).unwrap().unwrap()
    }

    #[test]
    fn user_add_then_session_set_and_clear() {
        let (dir, cli) = setup();

        execute_user_add(&cli, "u1", Some("salt"), Some("verifier")).unwrap();
        let user = stored_user(&dir, "u1").unwrap();
        assert!(user.session_key.is_none());
        assert!(user.verifier.contains("verifier"));

        execute_session_set(&cli, "u1", "sk").unwrap();
        assert_eq!(stored_user(&dir, "u1").unwrap().session_key.as_deref(), Some("sk"));

        execute_session_clear(&cli, "u1").unwrap();
        assert!(stored_user(&dir, "u1").unwrap().session_key.is_none());
    }

    #[test]
    fn user_add_refuses_duplicates_and_bad_ids() {
        let (_dir, cli) = setup();
        execute_user_add(&cli, "u1", None, None).unwrap();
        assert!(execute_user_add(&cli, "u1", None, None).is_err());
        assert!(matches!(
            execute_user_add(&cli, "../etc", None, None),
            Err(VaultError::UserNotFound(_))
        ));
        assert!(execute_user_add(&cli, "u2", Some("salt"), None).is_err());
    }

    #[test]
    fn session_set_for_unknown_user_fails() {
        let (_dir, cli) = setup();
        assert!(matches!(
            execute_session_set(&cli, "ghost", "sk"),
            Err(VaultError::UserNotFound(_))
        ));
        assert!(execute_session_set(&cli, "ghost", "").is_err());
    }
}
