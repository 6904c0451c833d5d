//! Core domain entities
//!
//! Pure data structures with validation logic, no I/O.

mod direction;
mod import_run;
pub mod report;
pub mod result;
pub mod transaction;

pub use direction::{Direction, DirectionFilter};
pub use import_run::{ImportRun, ImportStatus};
pub use report::{MonthlyTotal, SpendingReport, YearMonth};
pub use transaction::{schema, InsertOutcome, NaturalKey, NewTransaction, Transaction};
