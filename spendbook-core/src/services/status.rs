//! Status service - store summaries and history

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::Result;
use crate::domain::{ImportRun, Transaction};

/// Status service for store summaries
pub struct StatusService {
    repository: Arc<DuckDbRepository>,
}

impl StatusService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Get overall status summary
    pub fn get_status(&self) -> Result<StatusSummary> {
        let total_transactions = self.repository.get_transaction_count()?;
        let date_range = self.repository.get_transaction_date_range()?;
        let currencies = self.repository.get_currencies()?;
        let last_import = self.repository.get_import_runs(1)?.into_iter().next();
        let pending_migrations = self.repository.pending_migrations()?;

        Ok(StatusSummary {
            database_url: self.repository.url().to_string(),
            total_transactions,
            date_range,
            currencies,
            last_import,
            pending_migrations,
        })
    }

    /// Most recent transactions first
    pub fn list_transactions(&self, limit: Option<usize>) -> Result<Vec<Transaction>> {
        self.repository.get_transactions(limit)
    }

    /// Most recent import runs first
    pub fn import_history(&self, limit: usize) -> Result<Vec<ImportRun>> {
        self.repository.get_import_runs(limit)
    }
}

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub database_url: String,
    pub total_transactions: i64,
    pub date_range: DateRange,
    pub currencies: Vec<String>,
    pub last_import: Option<ImportRun>,
    pub pending_migrations: Vec<String>,
}

/// Earliest and latest stored transaction dates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub earliest: Option<NaiveDate>,
    pub latest: Option<NaiveDate>,
}
