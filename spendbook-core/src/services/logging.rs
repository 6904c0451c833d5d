//! Event log kept in `logs.duckdb` beside the ledger
//!
//! One row per command outcome: the event name, the command, the import run
//! it belongs to and, on failure, the error chain. Statement contents
//! (parties, descriptions, amounts) never reach this table.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use duckdb::{params, params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::log_migrations::LOG_MIGRATIONS;
use crate::services::migration::MigrationService;

pub const LOG_DATABASE_FILE: &str = "logs.duckdb";

const ENTRY_COLUMNS: &str = "id, recorded_at, app_version, platform, event, command, \
                             run_id, error_message, error_details";

/// Text form used in `recorded_at`; fixed width so it orders like time
fn stamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_stamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("invalid recorded_at '{}'", s))
}

/// Something worth remembering about a command run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

impl LogEvent {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            command: None,
            run_id: None,
            error_message: None,
            error_details: None,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Tie the event to a recorded import run
    pub fn with_run_id(mut self, run_id: Option<Uuid>) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Cause chain below the error message; empty strings are dropped
    pub fn with_error_details(mut self, details: Option<String>) -> Self {
        self.error_details = details.filter(|d| !d.is_empty());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub recorded_at: DateTime<Utc>,
    pub app_version: String,
    pub platform: String,
    pub event: String,
    pub command: Option<String>,
    pub run_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub error_details: Option<String>,
}

/// Which entries a listing returns
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub errors_only: bool,
    pub command: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventCount {
    pub event: String,
    pub count: u64,
}

/// Totals over the whole log
#[derive(Debug, Clone, Serialize)]
pub struct LogStats {
    pub total: u64,
    pub errors: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    /// Most frequent first
    pub by_event: Vec<EventCount>,
}

pub struct LoggingService {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    app_version: String,
}

impl LoggingService {
    /// Open (or create) the event log in `data_dir` and bring its schema up to date
    pub fn new(data_dir: &Path, app_version: impl Into<String>) -> Result<Self> {
        let db_path = data_dir.join(LOG_DATABASE_FILE);
        let conn = Connection::open(&db_path)
            .with_context(|| format!("cannot open event log {}", db_path.display()))?;

        MigrationService::with_migrations(&conn, LOG_MIGRATIONS).run_pending()?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
            app_version: app_version.into(),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow!("event log lock poisoned: {}", e))
    }

    pub fn log(&self, event: LogEvent) -> Result<()> {
        self.log_at(event, Utc::now())
    }

    fn log_at(&self, event: LogEvent, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sys_logs (recorded_at, app_version, platform, event, command, \
                                   run_id, error_message, error_details) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                stamp(at),
                self.app_version,
                std::env::consts::OS,
                event.event,
                event.command,
                event.run_id.map(|id| id.to_string()),
                event.error_message,
                event.error_details,
            ],
        )?;
        Ok(())
    }

    /// Newest entries matching `filter`
    pub fn entries(&self, filter: &LogFilter, limit: usize) -> Result<Vec<LogEntry>> {
        let mut conditions = Vec::new();
        let mut args: Vec<String> = Vec::new();
        if filter.errors_only {
            conditions.push("error_message IS NOT NULL");
        }
        if let Some(command) = &filter.command {
            conditions.push("command = ?");
            args.push(command.clone());
        }

        let mut sql = format!("SELECT {} FROM sys_logs", ENTRY_COLUMNS);
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY recorded_at DESC, id DESC LIMIT {}", limit));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<String>>(8)?,
                ))
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(
                |(id, recorded_at, app_version, platform, event, command, run_id, error_message, error_details)| {
                    Ok(LogEntry {
                        id,
                        recorded_at: parse_stamp(&recorded_at)?,
                        app_version,
                        platform,
                        event,
                        command,
                        run_id: run_id
                            .map(|id| Uuid::parse_str(&id))
                            .transpose()
                            .context("invalid run_id in event log")?,
                        error_message,
                        error_details,
                    })
                },
            )
            .collect()
    }

    pub fn stats(&self) -> Result<LogStats> {
        let conn = self.conn()?;
        let (total, errors, oldest, newest): (i64, i64, Option<String>, Option<String>) = conn
            .query_row(
                "SELECT COUNT(*), COUNT(error_message), MIN(recorded_at), MAX(recorded_at) \
                 FROM sys_logs",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        let mut stmt = conn.prepare(
            "SELECT event, COUNT(*) FROM sys_logs GROUP BY event ORDER BY 2 DESC, 1",
        )?;
        let by_event = stmt
            .query_map([], |row| {
                Ok(EventCount {
                    event: row.get(0)?,
                    count: row.get::<_, i64>(1)?.max(0) as u64,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;

        Ok(LogStats {
            total: total.max(0) as u64,
            errors: errors.max(0) as u64,
            oldest: oldest.as_deref().map(parse_stamp).transpose()?,
            newest: newest.as_deref().map(parse_stamp).transpose()?,
            by_event,
        })
    }

    /// Remove entries recorded before `cutoff`; returns how many went
    pub fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM sys_logs WHERE recorded_at < ?",
            params![stamp(cutoff)],
        )?;
        Ok(deleted as u64)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}
