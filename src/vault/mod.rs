//! Vault module — per-user credential storage.
//!
//! This module provides:
//! - User documents and credential entry types (`model`)
//! - The keyed document store contract and in-memory backend (`store`)
//! - The HMAC-sealed on-disk document format (`format`) and backend (`file_store`)
//! - Credential CRUD over the field cipher (`credentials`)
//! - Account preferences and verifier rotation (`account`)

pub mod account;
pub mod credentials;
pub mod file_store;
pub mod format;
pub mod model;
pub mod store;

pub use account::{AccountSettingsManager, SettingKind};
pub use credentials::{CredentialStore, UpdateOutcome};
pub use file_store::FileStore;
pub use model::{
    AccountSettings, CredentialEntry, EntryId, EntryInput, EntrySummary, EntryView,
    PasswordStrength, User, VerifierPair,
};
pub use store::{MemoryStore, UserStore};
