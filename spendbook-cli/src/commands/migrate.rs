//! Migrate command - apply or inspect schema migrations
//!
//! Opens the store directly so it works while `autoMigrate` is off and the
//! schema is still behind.

use anyhow::{Context, Result};
use colored::Colorize;
use spendbook_core::adapters::duckdb::DuckDbRepository;
use spendbook_core::config::Config;
use spendbook_core::services::LogEvent;

use super::{get_data_dir, get_logger, log_event};
use crate::output;

pub fn run(status_only: bool, json: bool) -> Result<()> {
    let data_dir = get_data_dir()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

    let config = Config::load(&data_dir)?;
    let repository = DuckDbRepository::new(&config.database_url)?;

    if status_only {
        let applied = repository.applied_migrations()?;
        let pending = repository.pending_migrations()?;

        if json {
            println!(
                "{}",
                serde_json::json!({ "applied": applied, "pending": pending })
            );
            return Ok(());
        }

        println!("{}", "Migrations".bold());
        for name in &applied {
            println!("  {} {}", "applied".green(), name);
        }
        for name in &pending {
            println!("  {} {}", "pending".yellow(), name);
        }
        return Ok(());
    }

    let logger = get_logger();
    let result = match repository.run_migrations().and_then(|r| {
        repository.verify_schema()?;
        Ok(r)
    }) {
        Ok(result) => result,
        Err(e) => {
            log_event(
                &logger,
                LogEvent::new("migration_failed")
                    .with_command("migrate")
                    .with_error(e.to_string()),
            );
            return Err(e.into());
        }
    };
    log_event(&logger, LogEvent::new("migrations_applied").with_command("migrate"));

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if result.applied.is_empty() {
        output::info("Schema is up to date");
    } else {
        output::success(&format!(
            "Applied {} migration(s): {}",
            result.applied.len(),
            result.applied.join(", ")
        ));
    }

    Ok(())
}
