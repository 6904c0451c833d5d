//! Report command - monthly spending totals

use anyhow::Result;
use colored::Colorize;
use comfy_table::Cell;
use spendbook_core::services::LogEvent;
use spendbook_core::SpendingReport;

use super::{get_context, get_logger, log_event};
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let logger = get_logger();

    let report = match ctx.report_service.spending_report() {
        Ok(report) => report,
        Err(e) => {
            log_event(
                &logger,
                LogEvent::new("report_failed")
                    .with_command("report")
                    .with_error(e.to_string()),
            );
            return Err(e.into());
        }
    };
    log_event(&logger, LogEvent::new("report_generated").with_command("report"));

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_report(&report);
    Ok(())
}

fn print_report(report: &SpendingReport) {
    if report.is_empty() {
        println!("No spending recorded yet.");
        return;
    }

    println!("{}", "Monthly Spending".bold());
    println!();

    let max_month = report.max_month.as_ref().map(|m| m.month);

    let mut table = output::create_table();
    table.set_header(vec!["Month", "Total", ""]);
    for entry in &report.months {
        let marker = if Some(entry.month) == max_month {
            "highest".red().to_string()
        } else {
            String::new()
        };
        table.add_row(vec![
            Cell::new(entry.month),
            output::amount_cell(entry.total),
            Cell::new(marker),
        ]);
    }
    println!("{table}");

    println!();
    println!("  Total: {}", output::format_amount(report.total).bold());
    if let Some(max) = &report.max_month {
        println!(
            "  Highest month: {} ({})",
            max.month.to_string().bold(),
            output::format_amount(max.total)
        );
    }
}
