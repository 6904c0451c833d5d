//! DuckDB repository implementation

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use duckdb::{params, Connection};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{
    schema, ImportRun, ImportStatus, InsertOutcome, MonthlyTotal, NaturalKey, NewTransaction,
    Transaction, YearMonth,
};
use crate::ports::TransactionStore;
use crate::services::migration::{MigrationResult, MigrationService};
use crate::services::status::DateRange;

/// Maximum number of attempts when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const INSERT_TRANSACTION_SQL: &str = "
    INSERT INTO bank_transactions (date, description, amount, currency, sender, receiver)
    VALUES (CAST(? AS DATE), ?, CAST(? AS DECIMAL(10, 2)), ?, ?, ?)
    ON CONFLICT DO NOTHING
    RETURNING id";

const CONTAINS_TRANSACTION_SQL: &str = "
    SELECT COUNT(*) FROM bank_transactions
    WHERE date = CAST(? AS DATE)
      AND sender = ?
      AND receiver = ?
      AND description = ?
      AND amount = CAST(? AS DECIMAL(10, 2))
      AND currency = ?";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("could not set lock")
        || lower.contains("file is already open")
}

/// Errors that mean the database itself is unreachable, not that a statement was wrong
fn is_unavailable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    is_retryable_error(&lower)
        || lower.contains("io error")
        || lower.contains("cannot open")
        || lower.contains("unable to open")
        || lower.contains("database has been invalidated")
        || lower.contains("connection has already been closed")
}

/// A uniqueness violation surfaced as an error instead of being absorbed by ON CONFLICT
fn is_duplicate_key_error(err: &duckdb::Error) -> bool {
    let lower = err.to_string().to_lowercase();
    lower.contains("constraint") && lower.contains("duplicate key")
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        let msg = err.to_string();
        if is_unavailable_error(&msg) {
            Error::StorageUnavailable(msg)
        } else {
            Error::Database(msg)
        }
    }
}

/// DuckDB repository implementation
///
/// One connection behind a mutex. Every statement autocommits, so each
/// insert is durable as soon as it returns.
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    url: String,
}

impl DuckDbRepository {
    /// Open the database at `url` (a file path, or `:memory:`)
    ///
    /// Retries with exponential backoff while another process holds the
    /// file lock. Does not touch the schema; see [`Self::ensure_schema`].
    pub fn new(url: &str) -> Result<Self> {
        let mut attempt = 0;
        loop {
            match Self::try_open_connection(url) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        url: url.to_string(),
                    })
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    attempt += 1;
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES {
                        let delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt - 1));
                        tracing::warn!(
                            attempt,
                            max_attempts = MAX_RETRIES,
                            delay_ms = delay.as_millis() as u64,
                            "database busy, retrying"
                        );
                        thread::sleep(delay);
                        continue;
                    }
                    return Err(Error::StorageUnavailable(format!(
                        "cannot open database after {} attempt(s): {}",
                        attempt, err_msg
                    )));
                }
            }
        }
    }

    /// Attempt to open a database connection (called by new() with retry logic)
    fn try_open_connection(url: &str) -> duckdb::Result<Connection> {
        // Extension autoloading stays off; year()/month() are core functions
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Connection::open_with_flags(url, config)
    }

    /// The connection string this repository was opened with
    pub fn url(&self) -> &str {
        &self.url
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::database(format!("Connection lock poisoned: {}", e)))
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.conn()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Names of migrations not yet applied
    pub fn pending_migrations(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        MigrationService::new(&conn).get_pending()
    }

    /// Names of migrations already applied
    pub fn applied_migrations(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        MigrationService::new(&conn).get_applied()
    }

    /// Check the live table against the declared schema
    ///
    /// Fails with `SchemaMismatch` listing every declared column the table lacks.
    pub fn verify_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT column_name FROM information_schema.columns WHERE table_name = ?")?;
        let present = stmt
            .query_map([schema::TABLE], |row| row.get::<_, String>(0))?
            .collect::<duckdb::Result<HashSet<String>>>()?;

        let missing: Vec<String> = schema::COLUMNS
            .iter()
            .filter(|column| !present.contains(**column))
            .map(|column| column.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::SchemaMismatch {
                table: schema::TABLE.to_string(),
                missing,
            })
        }
    }

    /// Apply pending migrations, then verify the schema
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        self.verify_schema()
    }

    // === Transaction queries ===

    /// Most recent transactions first
    pub fn get_transactions(&self, limit: Option<usize>) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut sql = "SELECT id, date::VARCHAR, description, amount::VARCHAR, currency, sender, receiver
                       FROM bank_transactions
                       ORDER BY date DESC, id DESC"
            .to_string();
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, date, description, amount, currency, sender, receiver)| {
                Ok(Transaction {
                    id,
                    date: parse_stored_date(&date)?,
                    description,
                    amount: parse_stored_decimal(&amount)?,
                    currency,
                    sender,
                    receiver,
                })
            })
            .collect()
    }

    pub fn get_transaction_count(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM bank_transactions", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn get_transaction_date_range(&self) -> Result<DateRange> {
        let conn = self.conn()?;
        let (earliest, latest): (Option<String>, Option<String>) = conn.query_row(
            "SELECT MIN(date)::VARCHAR, MAX(date)::VARCHAR FROM bank_transactions",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(DateRange {
            earliest: earliest.as_deref().map(parse_stored_date).transpose()?,
            latest: latest.as_deref().map(parse_stored_date).transpose()?,
        })
    }

    /// Distinct currencies, alphabetical
    pub fn get_currencies(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT DISTINCT currency FROM bank_transactions ORDER BY currency")?;
        let currencies = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(currencies)
    }

    // === Import history ===

    /// Most recent runs first
    pub fn get_import_runs(&self, limit: usize) -> Result<Vec<ImportRun>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, file_name, file_sha256, started_at, finished_at,
                    created_count, duplicate_count, skipped_count, rejected_count, status
             FROM sys_import_runs
             ORDER BY started_at DESC
             LIMIT ?",
        )?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    [
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, i64>(7)?,
                        row.get::<_, i64>(8)?,
                    ],
                    row.get::<_, String>(9)?,
                ))
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(run_id, file_name, file_sha256, started, finished, counts, status)| {
                let [created, duplicates, skipped, rejected] = counts.map(|c| c.max(0) as u64);
                Ok(ImportRun {
                    run_id: Uuid::parse_str(&run_id)
                        .map_err(|e| Error::database(format!("Invalid run id '{}': {}", run_id, e)))?,
                    file_name,
                    file_sha256,
                    started_at: parse_timestamp(&started)?,
                    finished_at: parse_timestamp(&finished)?,
                    created,
                    duplicates,
                    skipped,
                    rejected,
                    status: ImportStatus::parse(&status)
                        .ok_or_else(|| Error::database(format!("Unknown import status '{}'", status)))?,
                })
            })
            .collect()
    }
}

/// Insert one row; `None` when the natural key already exists
fn insert_returning_id(conn: &Connection, key: &NaturalKey) -> duckdb::Result<Option<i64>> {
    let mut stmt = conn.prepare_cached(INSERT_TRANSACTION_SQL)?;
    let mut rows = stmt.query(params![
        key.date.to_string(),
        key.description,
        key.amount.to_string(),
        key.currency,
        key.sender,
        key.receiver,
    ])?;
    let id = rows.next()?.map(|row| row.get::<_, i64>(0)).transpose()?;
    Ok(id)
}

impl TransactionStore for DuckDbRepository {
    fn insert(&self, candidate: &NewTransaction) -> Result<InsertOutcome> {
        let key = candidate.validate()?;
        let conn = self.conn()?;

        match insert_returning_id(&conn, &key) {
            Ok(Some(id)) => Ok(InsertOutcome::Created(id)),
            Ok(None) => Ok(InsertOutcome::AlreadyExists),
            Err(e) if is_duplicate_key_error(&e) => Ok(InsertOutcome::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    fn contains(&self, key: &NaturalKey) -> Result<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            CONTAINS_TRANSACTION_SQL,
            params![
                key.date.to_string(),
                key.sender,
                key.receiver,
                key.description,
                key.amount.to_string(),
                key.currency,
            ],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn aggregate_monthly_spending(&self) -> Result<Vec<MonthlyTotal>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT CAST(year(date) AS INTEGER), CAST(month(date) AS INTEGER), CAST(SUM(amount) AS VARCHAR)
             FROM bank_transactions
             GROUP BY 1, 2
             ORDER BY 1, 2",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i32>(0)?,
                    row.get::<_, i32>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(year, month, total)| {
                let month = u32::try_from(month)
                    .ok()
                    .and_then(|m| YearMonth::new(year, m))
                    .ok_or_else(|| Error::database(format!("Invalid month {}-{}", year, month)))?;
                Ok(MonthlyTotal {
                    month,
                    total: parse_stored_decimal(&total)?,
                })
            })
            .collect()
    }

    fn record_import_run(&self, run: &ImportRun) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sys_import_runs (
                run_id, file_name, file_sha256, started_at, finished_at,
                created_count, duplicate_count, skipped_count, rejected_count, status
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                run.run_id.to_string(),
                run.file_name,
                run.file_sha256,
                run.started_at.to_rfc3339(),
                run.finished_at.to_rfc3339(),
                run.created as i64,
                run.duplicates as i64,
                run.skipped as i64,
                run.rejected as i64,
                run.status.as_str(),
            ],
        )?;
        Ok(())
    }
}

fn parse_stored_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| Error::database(format!("Invalid stored date '{}': {}", s, e)))
}

fn parse_stored_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s).map_err(|e| Error::database(format!("Invalid stored amount '{}': {}", s, e)))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::database(format!("Invalid stored timestamp '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> DuckDbRepository {
        let repo = DuckDbRepository::new(":memory:").unwrap();
        repo.ensure_schema().unwrap();
        repo
    }

    fn candidate(date: (i32, u32, u32), description: &str, amount: &str) -> NewTransaction {
        NewTransaction {
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            description: description.to_string(),
            amount: Some(Decimal::from_str(amount).unwrap()),
            currency: None,
            sender: "EE001".to_string(),
            receiver: "Shop".to_string(),
        }
    }

    #[test]
    fn test_insert_then_duplicate() {
        let repo = repo();
        let tx = candidate((2024, 3, 1), "Coffee", "3.50");

        let first = repo.insert(&tx).unwrap();
        assert!(matches!(first, InsertOutcome::Created(_)));
        assert_eq!(repo.insert(&tx).unwrap(), InsertOutcome::AlreadyExists);
        assert_eq!(repo.get_transaction_count().unwrap(), 1);
    }

    #[test]
    fn test_amount_scale_does_not_break_dedup() {
        let repo = repo();
        repo.insert(&candidate((2024, 3, 1), "Coffee", "3.5")).unwrap();
        assert_eq!(
            repo.insert(&candidate((2024, 3, 1), "Coffee", "3.50")).unwrap(),
            InsertOutcome::AlreadyExists
        );
    }

    #[test]
    fn test_ids_increase() {
        let repo = repo();
        let a = repo.insert(&candidate((2024, 3, 1), "A", "1.00")).unwrap();
        let b = repo.insert(&candidate((2024, 3, 1), "B", "1.00")).unwrap();
        match (a, b) {
            (InsertOutcome::Created(a), InsertOutcome::Created(b)) => assert!(b > a),
            other => panic!("expected two creates, got {:?}", other),
        }
    }

    #[test]
    fn test_insert_rejects_missing_fields_without_touching_store() {
        let repo = repo();
        let mut tx = candidate((2024, 3, 1), "Coffee", "3.50");
        tx.receiver = String::new();

        match repo.insert(&tx) {
            Err(Error::Validation { fields }) => assert_eq!(fields, vec!["receiver"]),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert_eq!(repo.get_transaction_count().unwrap(), 0);
    }

    #[test]
    fn test_insert_never_rounds_amount() {
        let repo = repo();

        match repo.insert(&candidate((2024, 3, 1), "Coffee", "1.004")) {
            Err(Error::Validation { fields }) => assert_eq!(fields, vec!["amount"]),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(matches!(
            repo.insert(&candidate((2024, 3, 1), "Coffee", "1.00")).unwrap(),
            InsertOutcome::Created(_)
        ));
        assert_eq!(repo.get_transaction_count().unwrap(), 1);
    }

    #[test]
    fn test_oversized_amount_is_rejected_not_fatal() {
        let repo = repo();

        match repo.insert(&candidate((2024, 3, 1), "Car", "123456789")) {
            Err(Error::Validation { fields }) => assert_eq!(fields, vec!["amount"]),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(matches!(
            repo.insert(&candidate((2024, 3, 1), "Car", "99999999.99")).unwrap(),
            InsertOutcome::Created(_)
        ));
    }

    #[test]
    fn test_contains() {
        let repo = repo();
        let tx = candidate((2024, 3, 1), "Coffee", "3.50");
        let key = tx.validate().unwrap();

        assert!(!repo.contains(&key).unwrap());
        repo.insert(&tx).unwrap();
        assert!(repo.contains(&key).unwrap());
    }

    #[test]
    fn test_round_trip_fields() {
        let repo = repo();
        let mut tx = candidate((2024, 4, 30), "Rent", "500");
        tx.currency = Some("USD".to_string());
        repo.insert(&tx).unwrap();

        let stored = repo.get_transactions(None).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].date, NaiveDate::from_ymd_opt(2024, 4, 30).unwrap());
        assert_eq!(stored[0].amount.to_string(), "500.00");
        assert_eq!(stored[0].currency, "USD");
        assert_eq!(stored[0].sender, "EE001");
        assert_eq!(stored[0].receiver, "Shop");
    }

    #[test]
    fn test_aggregate_monthly_spending() {
        let repo = repo();
        repo.insert(&candidate((2024, 3, 2), "A", "10.00")).unwrap();
        repo.insert(&candidate((2024, 3, 20), "B", "5.50")).unwrap();
        repo.insert(&candidate((2024, 4, 1), "C", "20.00")).unwrap();

        let series = repo.aggregate_monthly_spending().unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].month.to_string(), "2024-03");
        assert_eq!(series[0].total, Decimal::from_str("15.50").unwrap());
        assert_eq!(series[1].month.to_string(), "2024-04");

        let max = repo.max_spending_month().unwrap().unwrap();
        assert_eq!(max.month.to_string(), "2024-04");
    }

    #[test]
    fn test_empty_store() {
        let repo = repo();
        assert!(repo.aggregate_monthly_spending().unwrap().is_empty());
        assert!(repo.max_spending_month().unwrap().is_none());
        assert_eq!(repo.get_transaction_date_range().unwrap(), DateRange::default());
    }

    #[test]
    fn test_verify_schema_reports_missing_columns() {
        let repo = DuckDbRepository::new(":memory:").unwrap();
        {
            let conn = repo.conn().unwrap();
            conn.execute_batch(
                "CREATE TABLE bank_transactions (
                    id BIGINT, date DATE, description VARCHAR, amount DECIMAL(10, 2), currency VARCHAR
                )",
            )
            .unwrap();
        }

        match repo.verify_schema() {
            Err(Error::SchemaMismatch { table, missing }) => {
                assert_eq!(table, "bank_transactions");
                assert_eq!(missing, vec!["sender".to_string(), "receiver".to_string()]);
            }
            other => panic!("expected schema mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_verify_schema_without_table() {
        let repo = DuckDbRepository::new(":memory:").unwrap();
        match repo.verify_schema() {
            Err(Error::SchemaMismatch { missing, .. }) => assert_eq!(missing.len(), schema::COLUMNS.len()),
            other => panic!("expected schema mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_error_classification() {
        assert!(is_unavailable_error("IO Error: Could not set lock on file"));
        assert!(is_unavailable_error("database is locked"));
        assert!(!is_unavailable_error("Binder Error: column not found"));
        assert!(is_retryable_error("The process cannot access the file because it is being used by another process"));
    }

    #[test]
    fn test_import_run_round_trip() {
        let repo = repo();
        let run = ImportRun {
            run_id: Uuid::new_v4(),
            file_name: "statement.csv".to_string(),
            file_sha256: "ab".repeat(32),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            created: 3,
            duplicates: 1,
            skipped: 2,
            rejected: 0,
            status: ImportStatus::Completed,
        };
        repo.record_import_run(&run).unwrap();

        let runs = repo.get_import_runs(10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, run.run_id);
        assert_eq!(runs[0].created, 3);
        assert_eq!(runs[0].status, ImportStatus::Completed);
    }
}
