//! `credvault serve` — run the HTTP server.
//!
//! Usage:
//!   credvault serve                        # settings from ./credvault.toml
//!   credvault serve --bind 0.0.0.0:8080
//!   credvault --config /etc/credvault.toml serve

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::audit::Auditor;
use crate::cli::output;
use crate::cli::{load_settings, Cli};
use crate::config::{Settings, StoreBackend};
use crate::crypto::{fingerprint, load_keyfile, KeyfileFieldEncryptor};
use crate::errors::{VaultError, Result};
use crate::server::{self, AppState};
use crate::vault::{FileStore, MemoryStore, UserStore};

/// Execute the `serve` command.
pub fn execute(cli: &Cli, bind: Option<&str>) -> Result<()> {
    let mut settings = load_settings(cli)?;
    if let Some(bind) = bind {
        settings.bind = bind.to_string();
    }

    init_tracing(&settings.log_level);
    print_startup(&settings)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| VaultError::CommandFailed(format!("failed to start runtime: {e}")))?;

    runtime.block_on(async {
        let state = build_state(&settings)?;
        server::serve(&settings.bind, state).await
    })
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn print_startup(settings: &Settings) -> Result<()> {
    let keyfile = load_keyfile(&settings.field_keyfile)?;
    let store = match settings.store {
        StoreBackend::File => format!("file ({})", settings.data_dir.display()),
        StoreBackend::Memory => "memory".to_string(),
    };

    output::info("Starting CredVault");
    output::print_key_values(&[
        ("bind", settings.bind.clone()),
        ("store", store),
        ("field keyfile", settings.field_keyfile.display().to_string()),
        ("fingerprint", fingerprint(&keyfile)),
    ]);
    Ok(())
}

/// Wire the configured store, field cipher and audit log into handler
/// state.
pub fn build_state(settings: &Settings) -> Result<AppState> {
    let fields = load_field_encryptor(settings)?;
    let (users, auditor) = open_store(settings, &fields)?;

    Ok(AppState::new(
        users,
        Arc::new(fields),
        settings.max_pattern_len,
        auditor,
    ))
}

/// Load the field keyfile, checking the pinned fingerprint if one is set.
pub fn load_field_encryptor(settings: &Settings) -> Result<KeyfileFieldEncryptor> {
    KeyfileFieldEncryptor::from_keyfile(
        &settings.field_keyfile,
        settings.field_key_fingerprint.as_deref(),
    )
}

/// Open the configured user store and the audit log that goes with it.
///
/// The document HMAC key is derived from `fields`, so every command that
/// touches stored documents must open them through here.
pub fn open_store(
    settings: &Settings,
    fields: &KeyfileFieldEncryptor,
) -> Result<(Arc<dyn UserStore>, Auditor)> {
    match settings.store {
        StoreBackend::File => {
            let hmac_key = fields.master_key().derive_document_hmac_key()?;
            let store = FileStore::open(&settings.data_dir, hmac_key)?;
            Ok((Arc::new(store), Auditor::open(settings.audit_db_dir())))
        }
        StoreBackend::Memory => {
            tracing::warn!("memory store selected, data will not survive a restart");
            Ok((Arc::new(MemoryStore::new()), Auditor::disabled()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_keyfile;
    use tempfile::TempDir;

    fn settings_in(dir: &TempDir, store: StoreBackend) -> Settings {
        let field_keyfile = dir.path().join("field.key");
        generate_keyfile(&field_keyfile).unwrap();
        Settings {
            store,
            data_dir: dir.path().join("data"),
            field_keyfile,
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn build_state_with_file_store_creates_layout() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir, StoreBackend::File);

        let state = build_state(&settings).unwrap();
        assert!(dir.path().join("data").join("users").is_dir());
        assert_eq!(state.auditor.is_enabled(), cfg!(feature = "audit-log"));
    }

    #[test]
    fn build_state_with_memory_store() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir, StoreBackend::Memory);

        let state = build_state(&settings).unwrap();
        assert!(!state.auditor.is_enabled());
        assert!(!dir.path().join("data").exists());
    }

    #[test]
    fn build_state_rejects_wrong_fingerprint() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings_in(&dir, StoreBackend::Memory);
        settings.field_key_fingerprint = Some("AAAA".into());
        assert!(build_state(&settings).is_err());
    }

    #[test]
    fn build_state_requires_keyfile() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            field_keyfile: dir.path().join("missing.key"),
            ..Settings::default()
        };
        assert!(build_state(&settings).is_err());
    }
}
