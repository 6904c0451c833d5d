//! Import command - load a CSV statement into the ledger

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use comfy_table::Cell;
use spendbook_core::services::{
    ImportAborted, ImportOptions, ImportResult, ImportSummary, InvalidRowPolicy, LogEvent,
};
use spendbook_core::{DirectionFilter, ImportProfile, NumberFormat, PartyColumns};

use super::{error_details, get_context, get_logger, log_event};
use crate::output;

/// Rows shown in preview mode
const PREVIEW_ROWS: usize = 10;
/// Rejected rows listed after an import
const REJECTIONS_SHOWN: usize = 10;

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Path to CSV file
    pub file: Option<PathBuf>,
    /// Use saved import profile
    #[arg(long)]
    pub profile: Option<String>,
    /// Save the effective settings as a profile
    #[arg(long)]
    pub save_profile: Option<String>,
    /// List saved profiles
    #[arg(long)]
    pub list_profiles: bool,
    /// Show what would be imported without writing anything
    #[arg(long)]
    pub preview: bool,
    /// Stop at the first row missing a required field
    #[arg(long)]
    pub abort_on_invalid: bool,
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
    /// Which directions to keep (debit, credit, all)
    #[arg(long)]
    pub direction: Option<DirectionFilter>,
    /// Amount notation (us, eu, eu-space)
    #[arg(long)]
    pub number_format: Option<NumberFormat>,
    /// Field delimiter
    #[arg(long)]
    pub delimiter: Option<char>,
    /// Date format, chrono syntax (e.g. %d.%m.%Y)
    #[arg(long)]
    pub date_format: Option<String>,
    /// Column name for transaction date
    #[arg(long)]
    pub date_column: Option<String>,
    /// Column name for transaction description
    #[arg(long)]
    pub description_column: Option<String>,
    /// Column name for amount
    #[arg(long)]
    pub amount_column: Option<String>,
    /// Column name for the debit/credit marker
    #[arg(long)]
    pub direction_column: Option<String>,
    /// Column name for currency
    #[arg(long)]
    pub currency_column: Option<String>,
    /// Column with the statement holder's account
    #[arg(long, conflicts_with_all = ["sender_column", "receiver_column"])]
    pub account_column: Option<String>,
    /// Column with the other party
    #[arg(long, conflicts_with_all = ["sender_column", "receiver_column"])]
    pub counterparty_column: Option<String>,
    /// Column naming the sender directly
    #[arg(long, requires = "receiver_column")]
    pub sender_column: Option<String>,
    /// Column naming the receiver directly
    #[arg(long, requires = "sender_column")]
    pub receiver_column: Option<String>,
}

impl ImportArgs {
    fn has_column_args(&self) -> bool {
        [
            &self.date_column,
            &self.description_column,
            &self.amount_column,
            &self.direction_column,
            &self.currency_column,
            &self.account_column,
            &self.counterparty_column,
            &self.sender_column,
            &self.receiver_column,
        ]
        .iter()
        .any(|column| column.is_some())
    }

    /// Header detection stands in only for the built-in default profile
    fn should_detect_columns(&self, has_saved_default: bool) -> bool {
        self.profile.is_none() && !self.has_column_args() && !has_saved_default
    }

    /// Apply command-line settings on top of a profile
    fn apply_to(&self, profile: &mut ImportProfile) {
        let mappings = &mut profile.column_mappings;
        if let Some(column) = &self.date_column {
            mappings.date = column.clone();
        }
        if let Some(column) = &self.description_column {
            mappings.description = column.clone();
        }
        if let Some(column) = &self.amount_column {
            mappings.amount = column.clone();
        }
        if let Some(column) = &self.direction_column {
            mappings.direction = column.clone();
        }
        if self.currency_column.is_some() {
            mappings.currency = self.currency_column.clone();
        }

        if let (Some(sender), Some(receiver)) = (&self.sender_column, &self.receiver_column) {
            mappings.parties = PartyColumns::Explicit {
                sender: sender.clone(),
                receiver: receiver.clone(),
            };
        } else if self.account_column.is_some() || self.counterparty_column.is_some() {
            let mut parties = match &mappings.parties {
                PartyColumns::Counterparty { .. } => mappings.parties.clone(),
                PartyColumns::Explicit { .. } => PartyColumns::default(),
            };
            if let PartyColumns::Counterparty { account, counterparty } = &mut parties {
                if let Some(column) = &self.account_column {
                    *account = column.clone();
                }
                if let Some(column) = &self.counterparty_column {
                    *counterparty = column.clone();
                }
            }
            mappings.parties = parties;
        }

        if let Some(direction) = self.direction {
            profile.direction = direction;
        }
        if let Some(format) = self.number_format {
            profile.number_format = format;
        }
        if let Some(delimiter) = self.delimiter {
            profile.delimiter = delimiter;
        }
        if let Some(format) = &self.date_format {
            profile.date_format = format.clone();
        }
    }
}

pub fn run(args: ImportArgs) -> Result<()> {
    let ctx = get_context()?;
    let logger = get_logger();

    if args.list_profiles {
        let profiles = ctx.import_service.list_profiles()?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&profiles)?);
        } else if profiles.is_empty() {
            println!("No saved profiles.");
        } else {
            let mut names: Vec<_> = profiles.keys().collect();
            names.sort();
            println!("{}", "Import Profiles".bold());
            for name in names {
                println!("  {}", name);
            }
        }
        return Ok(());
    }

    let file_path = args
        .file
        .clone()
        .ok_or_else(|| anyhow!("File path required. Usage: spendbook import <FILE>"))?;
    if !file_path.exists() {
        return Err(anyhow!("File not found: {}", file_path.display()));
    }

    let mut profile = ctx.config.profile(args.profile.as_deref())?;

    if args.should_detect_columns(ctx.config.has_saved_default_profile()) {
        let delimiter = args.delimiter.unwrap_or(profile.delimiter);
        let detected = ctx.import_service.detect_columns(&file_path, delimiter)?;
        tracing::debug!(?detected, "auto-detected columns");
        detected.apply_to(&mut profile.column_mappings);
    }
    args.apply_to(&mut profile);

    let options = ImportOptions {
        preview: args.preview,
        on_invalid: if args.abort_on_invalid {
            InvalidRowPolicy::Abort
        } else {
            InvalidRowPolicy::Continue
        },
    };

    let outcome = ctx.import_service.import(&file_path, &profile, &options);

    match outcome {
        Ok(result) => {
            if !result.preview {
                log_event(
                    &logger,
                    LogEvent::new("import_completed")
                        .with_command("import")
                        .with_run_id(result.run_id),
                );
            }

            if let Some(name) = &args.save_profile {
                ctx.import_service.save_profile(name, &profile)?;
                if !args.json {
                    output::success(&format!("Saved import profile '{}'", name));
                }
            }

            if args.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result);
            }
            Ok(())
        }
        Err(aborted) => {
            log_event(
                &logger,
                LogEvent::new("import_failed")
                    .with_command("import")
                    .with_run_id(aborted.run_id)
                    .with_error(aborted.source.to_string())
                    .with_error_details(error_details(&aborted.source)),
            );

            if args.json {
                println!("{}", aborted_json(&aborted));
            } else {
                print_summary(&aborted.summary);
            }
            Err(aborted.into())
        }
    }
}

fn aborted_json(aborted: &ImportAborted) -> serde_json::Value {
    serde_json::json!({
        "error": aborted.source.to_string(),
        "run_id": aborted.run_id,
        "summary": aborted.summary,
    })
}

fn print_result(result: &ImportResult) {
    if result.preview {
        output::info("Preview only, nothing was written");
        println!();
        print_preview(result);
        println!();
    }

    print_summary(&result.summary);

    if let Some(run_id) = result.run_id {
        println!("  {} {}", "Run:".dimmed(), run_id.to_string().dimmed());
    }
}

fn print_preview(result: &ImportResult) {
    if result.transactions.is_empty() {
        println!("No importable rows.");
        return;
    }

    let mut table = output::create_table();
    table.set_header(vec![
        "Line",
        "Date",
        "Sender",
        "Receiver",
        "Description",
        "Amount",
        "Currency",
        "",
    ]);

    for row in result.transactions.iter().take(PREVIEW_ROWS) {
        let tx = &row.transaction;
        let status = if row.duplicate {
            "duplicate".yellow().to_string()
        } else {
            "new".green().to_string()
        };
        table.add_row(vec![
            Cell::new(row.line),
            Cell::new(tx.date),
            Cell::new(output::truncate(&tx.sender, 24)),
            Cell::new(output::truncate(&tx.receiver, 24)),
            Cell::new(output::truncate(&tx.description, 40)),
            output::amount_cell(tx.amount),
            Cell::new(&tx.currency),
            Cell::new(status),
        ]);
    }

    println!("{table}");
    if result.transactions.len() > PREVIEW_ROWS {
        println!(
            "  ... and {} more",
            result.transactions.len() - PREVIEW_ROWS
        );
    }
}

fn print_summary(summary: &ImportSummary) {
    println!("{}", "Import Summary".bold());
    println!("  Created:    {}", summary.created.to_string().green());
    println!("  Duplicates: {}", summary.duplicates);
    println!("  Skipped:    {}", summary.skipped);
    for (reason, count) in &summary.skipped_by_reason {
        println!("    {}: {}", reason, count);
    }
    println!("  Rejected:   {}", summary.rejected);

    if !summary.rejections.is_empty() {
        println!();
        output::warning("Rows with missing or invalid fields:");
        for rejected in summary.rejections.iter().take(REJECTIONS_SHOWN) {
            println!("  line {}: {}", rejected.line, rejected.fields.join(", "));
        }
        if summary.rejections.len() > REJECTIONS_SHOWN {
            println!(
                "  ... and {} more",
                summary.rejections.len() - REJECTIONS_SHOWN
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: ImportArgs,
    }

    fn parse(argv: &[&str]) -> ImportArgs {
        let mut full = vec!["import"];
        full.extend_from_slice(argv);
        Harness::try_parse_from(full).unwrap().args
    }

    #[test]
    fn test_no_column_args_by_default() {
        let args = parse(&["march.csv", "--preview"]);
        assert!(!args.has_column_args());
    }

    #[test]
    fn test_detection_only_without_profile_or_columns() {
        assert!(parse(&["march.csv"]).should_detect_columns(false));
        assert!(!parse(&["march.csv"]).should_detect_columns(true));
        assert!(!parse(&["march.csv", "--profile", "lhv"]).should_detect_columns(false));
        assert!(!parse(&["march.csv", "--date-column", "Date"]).should_detect_columns(false));
    }

    #[test]
    fn test_explicit_parties_override_counterparty_mode() {
        let args = parse(&[
            "march.csv",
            "--sender-column",
            "From",
            "--receiver-column",
            "To",
        ]);
        assert!(args.has_column_args());

        let mut profile = ImportProfile::default();
        args.apply_to(&mut profile);
        assert_eq!(
            profile.column_mappings.parties,
            PartyColumns::Explicit {
                sender: "From".to_string(),
                receiver: "To".to_string()
            }
        );
    }

    #[test]
    fn test_sender_requires_receiver() {
        let result = Harness::try_parse_from(["import", "march.csv", "--sender-column", "From"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_account_override_keeps_default_counterparty() {
        let args = parse(&["march.csv", "--account-column", "IBAN"]);
        let mut profile = ImportProfile::default();
        args.apply_to(&mut profile);
        assert_eq!(
            profile.column_mappings.parties,
            PartyColumns::Counterparty {
                account: "IBAN".to_string(),
                counterparty: "Saaja/Maksja".to_string()
            }
        );
    }

    #[test]
    fn test_format_overrides() {
        let args = parse(&[
            "march.csv",
            "--date-format",
            "%Y-%m-%d",
            "--number-format",
            "eu-space",
            "--direction",
            "credit",
            "--currency-column",
            "Currency",
        ]);
        let mut profile = ImportProfile::default();
        args.apply_to(&mut profile);

        assert_eq!(profile.date_format, "%Y-%m-%d");
        assert_eq!(profile.number_format, NumberFormat::EuSpace);
        assert_eq!(profile.direction, DirectionFilter::CreditOnly);
        assert_eq!(profile.column_mappings.currency, Some("Currency".to_string()));
        assert_eq!(profile.delimiter, ';');
    }
}
