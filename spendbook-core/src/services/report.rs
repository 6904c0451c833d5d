//! Report service - monthly spending aggregation

use std::sync::Arc;

use crate::domain::result::Result;
use crate::domain::{MonthlyTotal, SpendingReport};
use crate::ports::TransactionStore;

/// Report service for spending summaries
pub struct ReportService {
    store: Arc<dyn TransactionStore>,
}

impl ReportService {
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        Self { store }
    }

    /// Monthly totals, ascending
    pub fn monthly_spending(&self) -> Result<Vec<MonthlyTotal>> {
        self.store.aggregate_monthly_spending()
    }

    /// Month with the largest total, `None` when nothing is stored
    pub fn max_spending_month(&self) -> Result<Option<MonthlyTotal>> {
        self.store.max_spending_month()
    }

    /// Series, maximum and grand total in one pass over the store
    pub fn spending_report(&self) -> Result<SpendingReport> {
        let report = SpendingReport::from_series(self.store.aggregate_monthly_spending()?);
        tracing::debug!(months = report.months.len(), "spending report built");
        Ok(report)
    }
}
