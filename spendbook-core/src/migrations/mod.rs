//! Database migrations - embedded SQL files
//!
//! Each migration is a `(name, sql)` pair compiled in with `include_str!`
//! and applied in list order.

/// Name of the bootstrap migration that creates `sys_migrations`
pub const BOOTSTRAP_MIGRATION: &str = "000_migrations.sql";

/// All migrations, embedded at compile time.
///
/// When adding a migration, create `NNN_description.sql` next to this file
/// and append it here. Never edit an applied migration.
pub const MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_bank_transactions.sql", include_str!("001_bank_transactions.sql")),
    ("002_import_runs.sql", include_str!("002_import_runs.sql")),
];
