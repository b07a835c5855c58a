//! Audit log — SQLite-based history of mutating vault operations.
//!
//! Stores one row per add / update / delete / account deletion / setting
//! change / verifier rotation in `<data_dir>/audit.db`.  Never stores
//! passwords, urls or usernames: only the operation, user id and entry id.
//!
//! Designed for graceful degradation: if the database can't be opened or
//! written to, requests continue without logging.

use std::path::Path;
#[cfg(feature = "audit-log")]
use std::path::PathBuf;
#[cfg(feature = "audit-log")]
use std::sync::{Arc, Mutex};

#[cfg(feature = "audit-log")]
use chrono::{DateTime, Utc};
#[cfg(feature = "audit-log")]
use rusqlite::Connection;

#[cfg(feature = "audit-log")]
use crate::errors::{VaultError, Result};

/// A single audit log entry.
#[cfg(feature = "audit-log")]
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub user_id: String,
    pub entry_id: Option<String>,
    pub details: Option<String>,
}

/// SQLite-backed audit log.
#[cfg(feature = "audit-log")]
pub struct AuditLog {
    conn: Connection,
}

#[cfg(feature = "audit-log")]
impl AuditLog {
    /// Open (or create) the audit database at `<data_dir>/audit.db`.
    ///
    /// Returns `None` if the database can't be opened — callers should
    /// treat this as "audit logging unavailable" and continue normally.
    pub fn open(data_dir: &Path) -> Option<Self> {
        let db_path = Self::db_path(data_dir);
        let conn = Connection::open(&db_path).ok()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&db_path, perms);
        }

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS audit_log (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp   TEXT NOT NULL,
                operation   TEXT NOT NULL,
                user_id     TEXT NOT NULL,
                entry_id    TEXT,
                details     TEXT
            );",
        )
        .ok()?;

        Some(Self { conn })
    }

    /// Record an operation. Fire-and-forget — errors are only traced.
    pub fn log(&self, operation: &str, user_id: &str, entry_id: Option<&str>, details: Option<&str>) {
        let now = Utc::now().to_rfc3339();
        if let Err(e) = self.conn.execute(
            "INSERT INTO audit_log (timestamp, operation, user_id, entry_id, details)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![now, operation, user_id, entry_id, details],
        ) {
            tracing::warn!(error = %e, operation, "audit write failed");
        }
    }

    /// Query recent audit entries, most recent first.
    ///
    /// - `limit`: maximum number of entries to return.
    /// - `since`: if provided, only return entries at or after this time.
    pub fn query(&self, limit: usize, since: Option<DateTime<Utc>>) -> Result<Vec<AuditEntry>> {
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let (sql, params): (&str, Vec<Box<dyn rusqlite::types::ToSql>>) = match since {
            Some(ref ts) => (
                "SELECT id, timestamp, operation, user_id, entry_id, details
                 FROM audit_log
                 WHERE timestamp >= ?1
                 ORDER BY id DESC
                 LIMIT ?2",
                vec![
                    Box::new(ts.to_rfc3339()) as Box<dyn rusqlite::types::ToSql>,
                    Box::new(limit_i64),
                ],
            ),
            None => (
                "SELECT id, timestamp, operation, user_id, entry_id, details
                 FROM audit_log
                 ORDER BY id DESC
                 LIMIT ?1",
                vec![Box::new(limit_i64) as Box<dyn rusqlite::types::ToSql>],
            ),
        };

        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| VaultError::AuditError(format!("query prepare: {e}")))?;

        let params_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| &**p).collect();

        let rows = stmt
            .query_map(params_refs.as_slice(), |row| {
                let ts_str: String = row.get(1)?;
                let timestamp = DateTime::parse_from_rfc3339(&ts_str)
                    .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc));

                Ok(AuditEntry {
                    id: row.get(0)?,
                    timestamp,
                    operation: row.get(2)?,
                    user_id: row.get(3)?,
                    entry_id: row.get(4)?,
                    details: row.get(5)?,
                })
            })
            .map_err(|e| VaultError::AuditError(format!("query exec: {e}")))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| VaultError::AuditError(format!("row parse: {e}")))?);
        }

        Ok(entries)
    }

    pub fn db_path(data_dir: &Path) -> PathBuf {
        data_dir.join("audit.db")
    }
}

/// Cheap, cloneable handle the request layer records through.
///
/// Disabled when the `audit-log` feature is off or the database could not
/// be opened.
#[derive(Clone, Default)]
pub struct Auditor {
    #[cfg(feature = "audit-log")]
    log: Option<Arc<Mutex<AuditLog>>>,
}

impl std::fmt::Debug for Auditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auditor")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl Auditor {
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Open the audit database under `data_dir`, falling back to a
    /// disabled handle.
    pub fn open(data_dir: &Path) -> Self {
        #[cfg(feature = "audit-log")]
        {
            let log = AuditLog::open(data_dir).map(|log| Arc::new(Mutex::new(log)));
            if log.is_none() {
                tracing::warn!(
                    path = %data_dir.display(),
                    "audit database unavailable, continuing without audit log"
                );
            }
            Self { log }
        }

        #[cfg(not(feature = "audit-log"))]
        {
            let _ = data_dir;
            Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        #[cfg(feature = "audit-log")]
        {
            self.log.is_some()
        }

        #[cfg(not(feature = "audit-log"))]
        {
            false
        }
    }

    /// Record an operation on the blocking pool.  The row is written when
    /// this returns.  Never fails the caller.
    pub async fn record(
        &self,
        operation: &'static str,
        user_id: &str,
        entry_id: Option<String>,
        details: Option<String>,
    ) {
        #[cfg(feature = "audit-log")]
        if let Some(log) = self.log.clone() {
            let user_id = user_id.to_string();
            let written = tokio::task::spawn_blocking(move || {
                if let Ok(log) = log.lock() {
                    log.log(operation, &user_id, entry_id.as_deref(), details.as_deref());
                }
            })
            .await;
            if let Err(e) = written {
                tracing::warn!(error = %e, operation, "audit task failed");
            }
        }

        #[cfg(not(feature = "audit-log"))]
        let _ = (operation, user_id, entry_id, details);
    }

    /// Synchronous variant for callers outside the runtime.
    pub fn record_blocking(&self, operation: &str, user_id: &str, details: Option<&str>) {
        #[cfg(feature = "audit-log")]
        if let Some(log) = &self.log {
            if let Ok(log) = log.lock() {
                log.log(operation, user_id, None, details);
            }
        }

        #[cfg(not(feature = "audit-log"))]
        let _ = (operation, user_id, details);
    }
}
