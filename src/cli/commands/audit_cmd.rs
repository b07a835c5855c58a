//! `credvault audit` — display the audit log.
//!
//! Usage:
//!   credvault audit               # show last 50 entries
//!   credvault audit --last 20     # show last 20
//!   credvault audit --since 7d    # entries from last 7 days

use chrono::Utc;

use crate::cli::Cli;
use crate::errors::{VaultError, Result};

/// Execute the `audit` command.
#[cfg(feature = "audit-log")]
pub fn execute(cli: &Cli, last: usize, since: Option<&str>) -> Result<()> {
    use crate::audit::AuditLog;
    use crate::cli::output;

    let settings = crate::cli::load_settings(cli)?;
    let data_dir = settings.audit_db_dir();
    if !AuditLog::db_path(data_dir).exists() {
        return Err(VaultError::DataDirNotFound(data_dir.to_path_buf()));
    }

    let audit = AuditLog::open(data_dir)
        .ok_or_else(|| VaultError::AuditError("failed to open audit database".into()))?;

    let since_dt = match since {
        Some(s) => Some(parse_duration(s)?),
        None => None,
    };

    let entries = audit.query(last, since_dt)?;

    if entries.is_empty() {
        output::info("No audit entries found.");
        return Ok(());
    }

    print_audit_table(&entries);

    Ok(())
}

#[cfg(not(feature = "audit-log"))]
pub fn execute(cli: &Cli, last: usize, since: Option<&str>) -> Result<()> {
    let _ = (cli, last, since);
    Err(VaultError::AuditError(
        "audit log not compiled, rebuild with `--features audit-log`".into(),
    ))
}

/// Parse a human-friendly duration string like "7d", "24h", "30m" into
/// the point in time that far back.
pub fn parse_duration(input: &str) -> Result<chrono::DateTime<Utc>> {
    let input = input.trim();
    let invalid = || {
        VaultError::CommandFailed(format!(
            "invalid duration '{input}', use a format like 7d, 24h or 30m"
        ))
    };

    let (num_str, duration): (&str, fn(i64) -> chrono::Duration) =
        if let Some(s) = input.strip_suffix('d') {
            (s, chrono::Duration::days)
        } else if let Some(s) = input.strip_suffix('h') {
            (s, chrono::Duration::hours)
        } else if let Some(s) = input.strip_suffix('m') {
            (s, chrono::Duration::minutes)
        } else {
            return Err(invalid());
        };

    let num: i64 = num_str.parse().map_err(|_| invalid())?;
    if !(0..=36_500).contains(&num) {
        return Err(invalid());
    }

    Ok(Utc::now() - duration(num))
}

/// Print audit entries in a formatted table.
#[cfg(feature = "audit-log")]
pub fn print_audit_table(entries: &[crate::audit::AuditEntry]) {
    use comfy_table::{ContentArrangement, Table};
    use console::style;

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Time", "Operation", "User", "Entry", "Details"]);

    for entry in entries {
        let time = entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string();
        let op = colorize_operation(&entry.operation);
        let entry_id = entry.entry_id.as_deref().unwrap_or("-");
        let details = entry.details.as_deref().unwrap_or("-");

        table.add_row(vec![
            time,
            op,
            entry.user_id.clone(),
            entry_id.to_string(),
            details.to_string(),
        ]);
    }

    println!(
        "{}",
        style(format!("{} audit entries:", entries.len())).bold()
    );
    println!("{table}");
}

/// Colorize operation names for display.
#[cfg(feature = "audit-log")]
fn colorize_operation(op: &str) -> String {
    use console::style;

    match op {
        "add" | "keygen" | "user-add" => style(op).green().to_string(),
        "update" | "set-setting" | "session-set" | "session-clear" => {
            style(op).blue().to_string()
        }
        "delete" | "delete-account" => style(op).red().to_string(),
        "rotate-verifier" => style(op).yellow().to_string(),
        _ => op.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_days() {
        let dt = parse_duration("7d").unwrap();
        let diff = Utc::now() - dt;
        assert!((diff.num_days() - 7).abs() <= 1);
    }

    #[test]
    fn parse_duration_hours_and_minutes() {
        let diff = Utc::now() - parse_duration("24h").unwrap();
        assert!((diff.num_hours() - 24).abs() <= 1);
        let diff = Utc::now() - parse_duration("30m").unwrap();
        assert!((diff.num_minutes() - 30).abs() <= 1);
    }

    #[test]
    fn parse_duration_invalid() {
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("7x").is_err());
        assert!(parse_duration("d").is_err());
        assert!(parse_duration("-3d").is_err());
        assert!(parse_duration("99999999d").is_err());
    }

    #[cfg(feature = "audit-log")]
    #[test]
    fn colorize_operation_returns_string() {
        assert!(!colorize_operation("add").is_empty());
        assert!(!colorize_operation("unknown").is_empty());
    }

    #[cfg(feature = "audit-log")]
    #[test]
    fn audit_with_since_filter() {
        use crate::audit::AuditLog;

        let dir = tempfile::TempDir::new().unwrap();
        let audit = AuditLog::open(dir.path()).unwrap();
        audit.log("add", "u1", Some("e1"), None);

        let since = parse_duration("1h").unwrap();
        assert_eq!(audit.query(10, Some(since)).unwrap().len(), 1);
    }
}
