//! `credvault keygen` — create the field master keyfile.
//!
//! Usage:
//!   credvault keygen                 # write to the configured field_keyfile
//!   credvault keygen /etc/cv/field.key

use std::path::Path;

use crate::cli::output;
use crate::cli::{load_settings, Cli};
use crate::crypto::{fingerprint, generate_keyfile};
use crate::errors::Result;

/// Execute the `keygen` command.
pub fn execute(cli: &Cli, path: Option<&Path>) -> Result<()> {
    let settings = load_settings(cli)?;
    let path = path.unwrap_or(&settings.field_keyfile);

    let bytes = generate_keyfile(path)?;
    let fp = fingerprint(&bytes);

    output::success(&format!("Keyfile generated at {}", path.display()));
    output::info(&format!("Fingerprint: {fp}"));
    output::warning("Keep this file secret! Losing it makes every stored password unreadable.");
    output::tip(&format!(
        "Pin it with `field_key_fingerprint = \"{fp}\"` in {}",
        crate::config::Settings::FILE_NAME
    ));

    if settings.audit_db_dir().is_dir() {
        crate::audit::Auditor::open(settings.audit_db_dir()).record_blocking(
            "keygen",
            "-",
            Some(&path.display().to_string()),
        );
    }

    Ok(())
}
