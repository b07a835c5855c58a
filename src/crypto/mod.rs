//! Cryptographic primitives for CredVault.
//!
//! This module provides:
//! - AES-256-GCM sealing shared by both envelope layers (`encryption`)
//! - HKDF-based sub-key derivation (`keys`)
//! - The field master keyfile (`keyfile`)
//! - The session envelope cipher (`session`)
//! - The at-rest field cipher (`field`)

pub mod encryption;
pub mod field;
pub mod keyfile;
pub mod keys;
pub mod session;

pub use encryption::{open, seal};
pub use field::{FieldEncryptor, KeyScope, KeyfileFieldEncryptor};
pub use keyfile::{fingerprint, generate_keyfile, load_keyfile};
pub use keys::MasterKey;
pub use session::SessionCipher;
