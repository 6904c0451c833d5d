//! Spendbook CLI - bank statements into a deduplicated ledger

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{history, import, list, logs, migrate, report, status};

/// Environment variable holding a tracing filter directive
const LOG_FILTER_ENV: &str = "SPENDBOOK_LOG";

/// Spendbook - import bank statements and see where the money went
#[derive(Parser)]
#[command(name = "spendbook", version, about, long_about = None)]
struct Cli {
    /// Print diagnostic output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import transactions from a CSV statement
    Import(import::ImportArgs),

    /// Monthly spending totals and the highest month
    Report {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List stored transactions, newest first
    List {
        /// Maximum number of transactions to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Show every transaction
        #[arg(long, conflicts_with = "limit")]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show database status and summary
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show recorded import runs
    History {
        /// Number of runs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply pending schema migrations
    Migrate {
        /// Only show applied and pending migrations
        #[arg(long)]
        status: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    // try_init: a subscriber may already be installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Import(args) => import::run(args),
        Commands::Report { json } => report::run(json),
        Commands::List { limit, all, json } => list::run((!all).then_some(limit), json),
        Commands::Status { json } => status::run(json),
        Commands::History { limit, json } => history::run(limit, json),
        Commands::Migrate { status, json } => migrate::run(status, json),
        Commands::Logs { command } => logs::run(command),
    }
}
