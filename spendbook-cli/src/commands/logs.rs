//! Logs command - inspect and prune the event log

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::Subcommand;
use colored::Colorize;
use comfy_table::Cell;
use dialoguer::Confirm;
use spendbook_core::services::{LogEntry, LogFilter, LogStats, LoggingService};

use super::get_data_dir;
use crate::output;

/// Errors repeated under a plain listing
const RECENT_ERRORS_SHOWN: usize = 3;

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Show recent events, newest first
    List {
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Only events that carry an error
        #[arg(long)]
        errors: bool,
        /// Only events from one command (import, report, migrate)
        #[arg(long)]
        command: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Delete events older than a number of days
    Clear {
        #[arg(long, default_value = "30")]
        older_than_days: u64,
        /// Do not ask before deleting
        #[arg(long, short = 'f')]
        force: bool,
        #[arg(long)]
        json: bool,
    },
    /// Counts per event and where the log lives
    Stats {
        #[arg(long)]
        json: bool,
    },
}

fn open_log() -> Result<LoggingService> {
    let data_dir = get_data_dir()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;
    LoggingService::new(&data_dir, env!("CARGO_PKG_VERSION"))
}

/// Start of the retained window; ages past the calendar delete nothing
fn cutoff(now: DateTime<Utc>, older_than_days: u64) -> DateTime<Utc> {
    i64::try_from(older_than_days)
        .ok()
        .and_then(Duration::try_days)
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn short_run_id(entry: &LogEntry) -> String {
    entry
        .run_id
        .map(|id| id.to_string()[..8].to_string())
        .unwrap_or_default()
}

pub fn run(command: LogsCommands) -> Result<()> {
    match command {
        LogsCommands::List {
            limit,
            errors,
            command,
            json,
        } => list(limit, LogFilter { errors_only: errors, command }, json),
        LogsCommands::Clear {
            older_than_days,
            force,
            json,
        } => clear(older_than_days, force, json),
        LogsCommands::Stats { json } => stats(json),
    }
}

fn list(limit: usize, filter: LogFilter, json: bool) -> Result<()> {
    let log = open_log()?;
    let entries = log.entries(&filter, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No events recorded.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Recorded", "Event", "Command", "Run", "Error"]);
    for entry in &entries {
        let error = entry
            .error_message
            .as_deref()
            .map(|message| output::truncate(message, 48).red().to_string())
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(entry.recorded_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(&entry.event),
            Cell::new(entry.command.as_deref().unwrap_or("")),
            Cell::new(short_run_id(entry)),
            Cell::new(error),
        ]);
    }
    println!("{table}");

    if !filter.errors_only {
        let recent = log.entries(
            &LogFilter {
                errors_only: true,
                ..LogFilter::default()
            },
            RECENT_ERRORS_SHOWN,
        )?;
        if !recent.is_empty() {
            println!();
            println!("{}", "Latest failures".red().bold());
            for entry in &recent {
                println!(
                    "  {} {}: {}",
                    entry.recorded_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
                    entry.event,
                    entry.error_details.as_deref().or(entry.error_message.as_deref()).unwrap_or("")
                );
            }
        }
    }
    Ok(())
}

fn clear(older_than_days: u64, force: bool, json: bool) -> Result<()> {
    let log = open_log()?;
    let before = cutoff(Utc::now(), older_than_days);

    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete events recorded before {}?",
                before.format("%Y-%m-%d %H:%M")
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Nothing deleted.");
            return Ok(());
        }
    }

    let deleted = log.delete_before(before)?;
    if json {
        println!("{}", serde_json::json!({ "deleted": deleted, "before": before }));
    } else {
        output::success(&format!("Deleted {} event(s)", deleted));
    }
    Ok(())
}

fn stats(json: bool) -> Result<()> {
    let log = open_log()?;
    let stats = log.stats()?;
    let path = log.db_path();
    let size_bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    if json {
        println!(
            "{}",
            serde_json::json!({
                "stats": stats,
                "database_path": path.to_string_lossy(),
                "database_size_bytes": size_bytes,
            })
        );
        return Ok(());
    }

    print_stats(&stats);
    println!("  Database: {} ({} bytes)", path.display(), size_bytes);
    Ok(())
}

fn print_stats(stats: &LogStats) {
    println!("{}", "Event Log".bold());
    println!("  Events: {} ({} with errors)", stats.total, stats.errors);
    if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
        println!(
            "  Span:   {} to {}",
            oldest.format("%Y-%m-%d"),
            newest.format("%Y-%m-%d")
        );
    }
    if !stats.by_event.is_empty() {
        let mut table = output::create_table();
        table.set_header(vec!["Event", "Count"]);
        for row in &stats.by_event {
            table.add_row(vec![Cell::new(&row.event), Cell::new(row.count)]);
        }
        println!("{table}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cutoff_goes_back_whole_days() {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 8, 30, 0).unwrap();
        assert_eq!(
            cutoff(now, 30),
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap()
        );
        assert_eq!(cutoff(now, 0), now);
    }

    #[test]
    fn test_huge_age_deletes_nothing() {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 8, 30, 0).unwrap();
        assert_eq!(cutoff(now, u64::MAX), DateTime::<Utc>::MIN_UTC);
    }
}
