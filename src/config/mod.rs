//! Server configuration (`credvault.toml` + `CREDVAULT_*` overrides).

pub mod settings;

pub use settings::{Settings, StoreBackend};
