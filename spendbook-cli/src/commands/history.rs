//! History command - recorded import runs

use anyhow::Result;
use colored::Colorize;
use comfy_table::Cell;
use spendbook_core::domain::ImportStatus;

use super::get_context;
use crate::output;

pub fn run(limit: usize, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let runs = ctx.status_service.import_history(limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("No imports recorded.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec![
        "Finished",
        "File",
        "SHA-256",
        "Created",
        "Duplicates",
        "Skipped",
        "Rejected",
        "Status",
    ]);
    for run in &runs {
        let status = match run.status {
            ImportStatus::Completed => run.status.to_string().green().to_string(),
            ImportStatus::Aborted => run.status.to_string().red().to_string(),
        };
        table.add_row(vec![
            Cell::new(run.finished_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(output::truncate(&run.file_name, 32)),
            Cell::new(&run.file_sha256[..run.file_sha256.len().min(12)]),
            Cell::new(run.created),
            Cell::new(run.duplicates),
            Cell::new(run.skipped),
            Cell::new(run.rejected),
            Cell::new(status),
        ]);
    }
    println!("{table}");

    Ok(())
}
