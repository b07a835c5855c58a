use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{VaultError, Result};

/// Which `UserStore` backend the server runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    File,
    Memory,
}

/// Server configuration, loaded from `credvault.toml`.
///
/// Every field has a sensible default so CredVault starts without any
/// config file at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Address the HTTP server binds to.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Default log filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_store")]
    pub store: StoreBackend,

    /// Directory holding user documents and the audit database.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Path of the 32-byte field master keyfile.
    #[serde(default = "default_field_keyfile")]
    pub field_keyfile: PathBuf,

    /// Optional base64 SHA-256 fingerprint the keyfile must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_key_fingerprint: Option<String>,

    /// Longest accepted URL search pattern, in characters.
    #[serde(default = "default_max_pattern_len")]
    pub max_pattern_len: usize,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_store() -> StoreBackend {
    StoreBackend::File
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".credvault")
}

fn default_field_keyfile() -> PathBuf {
    PathBuf::from(".credvault/field.key")
}

fn default_max_pattern_len() -> usize {
    crate::vault::credentials::DEFAULT_MAX_PATTERN_LEN
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            log_level: default_log_level(),
            store: default_store(),
            data_dir: default_data_dir(),
            field_keyfile: default_field_keyfile(),
            field_key_fingerprint: None,
            max_pattern_len: default_max_pattern_len(),
        }
    }
}

impl Settings {
    /// Name of the config file looked up in the working directory.
    pub const FILE_NAME: &'static str = "credvault.toml";

    /// Load settings.
    ///
    /// With an explicit path the file must exist.  Without one,
    /// `<cwd>/credvault.toml` is used if present, defaults otherwise.
    /// Environment overrides are applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut settings = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(VaultError::ConfigError(format!(
                        "config file not found at {}",
                        path.display()
                    )));
                }
                Self::from_file(path)?
            }
            None => {
                let path = std::env::current_dir()?.join(Self::FILE_NAME);
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };

        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;

        toml::from_str(&contents).map_err(|e| {
            VaultError::ConfigError(format!("Failed to parse {}: {e}", path.display()))
        })
    }

    /// Apply `CREDVAULT_*` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("CREDVAULT_BIND").filter(|v| !v.is_empty()) {
            self.bind = bind;
        }
        if let Some(dir) = lookup("CREDVAULT_DATA_DIR").filter(|v| !v.is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("CREDVAULT_FIELD_KEYFILE").filter(|v| !v.is_empty()) {
            self.field_keyfile = PathBuf::from(path);
        }
    }

    /// Location of the audit database.
    pub fn audit_db_dir(&self) -> &Path {
        &self.data_dir
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn default_settings_are_sensible() {
        let s = Settings::default();
        assert_eq!(s.bind, "127.0.0.1:8080");
        assert_eq!(s.log_level, "info");
        assert_eq!(s.store, StoreBackend::File);
        assert_eq!(s.data_dir, PathBuf::from(".credvault"));
        assert_eq!(s.field_keyfile, PathBuf::from(".credvault/field.key"));
        assert!(s.field_key_fingerprint.is_none());
        assert_eq!(s.max_pattern_len, 256);
    }

    #[test]
    fn from_file_parses_toml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credvault.toml");
        let config = r#"
bind = "0.0.0.0:9000"
log_level = "debug"
store = "memory"
data_dir = "/var/lib/credvault"
field_keyfile = "/etc/credvault/field.key"
field_key_fingerprint = "abc="
max_pattern_len = 64
"#;
        fs::write(&path, config).unwrap();

        let s = Settings::from_file(&path).unwrap();
        assert_eq!(s.bind, "0.0.0.0:9000");
        assert_eq!(s.log_level, "debug");
        assert_eq!(s.store, StoreBackend::Memory);
        assert_eq!(s.data_dir, PathBuf::from("/var/lib/credvault"));
        assert_eq!(s.field_key_fingerprint.as_deref(), Some("abc="));
        assert_eq!(s.max_pattern_len, 64);
    }

    #[test]
    fn from_file_uses_defaults_for_missing_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credvault.toml");
        fs::write(&path, "bind = \"127.0.0.1:1\"\n").unwrap();

        let s = Settings::from_file(&path).unwrap();
        assert_eq!(s.bind, "127.0.0.1:1");
        assert_eq!(s.store, StoreBackend::File);
        assert_eq!(s.max_pattern_len, 256);
    }

    #[test]
    fn from_file_errors_on_invalid_toml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credvault.toml");
        fs::write(&path, "not valid {{toml").unwrap();
        assert!(Settings::from_file(&path).is_err());
    }

    #[test]
    fn unknown_store_backend_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credvault.toml");
        fs::write(&path, "store = \"mongo\"\n").unwrap();
        assert!(Settings::from_file(&path).is_err());
    }

    #[test]
    fn load_with_missing_explicit_path_fails() {
        let tmp = TempDir::new().unwrap();
        assert!(Settings::load(Some(&tmp.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn overrides_replace_values() {
        let env: HashMap<&str, &str> = [
            ("CREDVAULT_BIND", "0.0.0.0:1"),
            ("CREDVAULT_DATA_DIR", "/data"),
            ("CREDVAULT_FIELD_KEYFILE", ""),
        ]
        .into_iter()
        .collect();

        let mut s = Settings::default();
        s.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(s.bind, "0.0.0.0:1");
        assert_eq!(s.data_dir, PathBuf::from("/data"));
        // Empty values are ignored.
        assert_eq!(s.field_keyfile, PathBuf::from(".credvault/field.key"));
    }
}
