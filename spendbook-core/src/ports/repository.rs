//! Transaction store port - persistence abstraction

use crate::domain::report::{self, MonthlyTotal};
use crate::domain::result::Result;
use crate::domain::{ImportRun, InsertOutcome, NaturalKey, NewTransaction};

/// Persistent store of deduplicated transactions
///
/// Implementations must be safe to share between threads: concurrent
/// inserts of the same natural key yield exactly one `Created`, every other
/// caller sees `AlreadyExists`. Each insert commits on its own, so rows
/// stored before a failure stay stored.
pub trait TransactionStore: Send + Sync {
    // === Transactions ===

    /// Validate and insert a candidate
    ///
    /// Missing required fields produce `Error::Validation`; a natural-key
    /// collision is `Ok(InsertOutcome::AlreadyExists)`, never an error.
    fn insert(&self, candidate: &NewTransaction) -> Result<InsertOutcome>;

    /// Whether a transaction with this natural key is stored
    ///
    /// Only for previews. Inserting never checks first, the store's
    /// uniqueness constraint decides.
    fn contains(&self, key: &NaturalKey) -> Result<bool>;

    // === Reports ===

    /// Sum of amounts per calendar month, ascending, months without rows omitted
    fn aggregate_monthly_spending(&self) -> Result<Vec<MonthlyTotal>>;

    /// Month with the largest total, earliest on ties, `None` when empty
    fn max_spending_month(&self) -> Result<Option<MonthlyTotal>> {
        let series = self.aggregate_monthly_spending()?;
        Ok(report::max_spending_month(&series))
    }

    // === Import history ===

    fn record_import_run(&self, run: &ImportRun) -> Result<()>;
}
