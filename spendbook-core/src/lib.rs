//! Spendbook Core - deduplicating bank statement ingestion
//!
//! This crate follows a hexagonal layout:
//!
//! - **domain**: Transactions, their natural key, monthly totals
//! - **ports**: The `TransactionStore` trait
//! - **services**: Normalization, import, reports, migrations, event log
//! - **adapters**: DuckDB implementation of the store

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use adapters::duckdb::DuckDbRepository;
use config::Config;
use ports::TransactionStore;
use services::*;

// Re-export commonly used types at crate root
pub use config::{ColumnMappings, ImportProfile, NumberFormat, PartyColumns};
pub use domain::result::Error;
pub use domain::{
    Direction, DirectionFilter, InsertOutcome, MonthlyTotal, NewTransaction, SpendingReport,
    Transaction, YearMonth,
};

/// Main context for Spendbook operations
///
/// Holds the configuration, the store and every service built on it.
pub struct SpendbookContext {
    pub config: Config,
    pub repository: Arc<DuckDbRepository>,
    pub import_service: ImportService,
    pub report_service: ReportService,
    pub status_service: StatusService,
}

impl SpendbookContext {
    /// Create a context for the given data directory
    ///
    /// Applies pending migrations when `autoMigrate` is on, then checks that
    /// the transaction table has every required column.
    pub fn new(data_dir: &Path) -> Result<Self> {
        let config = Config::load(data_dir)?;
        std::fs::create_dir_all(data_dir)?;

        let repository = Arc::new(DuckDbRepository::new(&config.database_url)?);

        if config.auto_migrate {
            repository.run_migrations()?;
        }
        repository.verify_schema()?;

        let store: Arc<dyn TransactionStore> = repository.clone();

        Ok(Self {
            import_service: ImportService::new(Arc::clone(&store), data_dir.to_path_buf()),
            report_service: ReportService::new(store),
            status_service: StatusService::new(Arc::clone(&repository)),
            repository,
            config,
        })
    }
}
