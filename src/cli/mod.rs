//! CLI module — Clap argument parser, output helpers, and command implementations.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::Parser;

use crate::config::Settings;
use crate::errors::Result;
use crate::vault::PasswordStrength;

/// CredVault CLI: server-side credential vault.
#[derive(Parser)]
#[command(
    name = "credvault",
    about = "Server-side credential vault for a password manager",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a config file (default: ./credvault.toml if present)
    #[arg(short, long, global = true, env = "CREDVAULT_CONFIG")]
    pub config: Option<PathBuf>,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    Serve {
        /// Address to bind (overrides the config file)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Generate a new field master keyfile
    Keygen {
        /// Path for the keyfile (default: the configured field_keyfile)
        path: Option<PathBuf>,
    },

    /// Print a random password
    Generate {
        /// Strength level: low, medium (default) or high
        #[arg(short, long, default_value = "medium")]
        strength: PasswordStrength,
    },

    /// View the audit log of vault operations
    Audit {
        /// Number of entries to show (default: 50)
        #[arg(long, default_value = "50")]
        last: usize,
        /// Show entries since a duration ago (e.g. 7d, 24h, 30m)
        #[arg(long)]
        since: Option<String>,
    },

    /// Provision users on the configured store
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Open or close a user's session
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

/// User subcommands.
#[derive(clap::Subcommand)]
pub enum UserAction {
    /// Create an empty user document
    Add {
        /// User id (letters, digits, `_` or `-`)
        id: String,
        /// Verifier salt handed out by the auth service
        #[arg(long, requires = "verifier")]
        salt: Option<String>,
        /// Password verifier handed out by the auth service
        #[arg(long, requires = "salt")]
        verifier: Option<String>,
    },
}

/// Session subcommands.
#[derive(clap::Subcommand)]
pub enum SessionAction {
    /// Store the shared session key of a logged-in user
    Set {
        /// User id
        id: String,
        /// Session key (prefer the environment variable over argv)
        #[arg(env = "CREDVAULT_SESSION_KEY", hide_env_values = true)]
        key: String,
    },

    /// Log a user out by clearing the session key
    Clear {
        /// User id
        id: String,
    },
}

/// Load settings from the `--config` path (or the working directory).
pub fn load_settings(cli: &Cli) -> Result<Settings> {
    Settings::load(cli.config.as_deref())
}
