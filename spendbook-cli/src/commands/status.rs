//! Status command

use anyhow::Result;
use colored::Colorize;

use super::get_context;
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let status = ctx.status_service.get_status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Spendbook Status".bold());
    println!();
    println!("  Database:     {}", status.database_url);
    println!("  Transactions: {}", status.total_transactions);

    if let (Some(earliest), Some(latest)) = (status.date_range.earliest, status.date_range.latest) {
        println!("  Date range:   {} to {}", earliest, latest);
    }
    if !status.currencies.is_empty() {
        println!("  Currencies:   {}", status.currencies.join(", "));
    }

    match &status.last_import {
        Some(run) => println!(
            "  Last import:  {} ({}, {} created, {} duplicates)",
            run.file_name,
            run.finished_at.format("%Y-%m-%d %H:%M"),
            run.created,
            run.duplicates
        ),
        None => println!("  Last import:  never"),
    }

    if !status.pending_migrations.is_empty() {
        println!();
        output::warning(&format!(
            "{} pending migration(s): {}",
            status.pending_migrations.len(),
            status.pending_migrations.join(", ")
        ));
    }

    Ok(())
}
