//! CLI binary: one reconciliation run of the ledger against the feed.

use std::io::{self, Write as _};
use std::process::ExitCode;

use clap::Parser;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, Table};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

use firefly_akahu::config::Config;
use firefly_akahu::sync::{self, SyncSummary};

/// Reconcile a Firefly III ledger against the Akahu feed.
#[derive(Debug, Parser)]
#[command(name = "firefly-akahu", version, about)]
struct Cli {
    /// Compare and log, but suppress all remote writes
    /// (equivalent to DRY_RUN=true).
    #[arg(long)]
    dry_run: bool,
    /// Refresh the feed cache from Akahu before reconciling
    /// (equivalent to LOAD_AKAHU_DATA=true).
    #[arg(long)]
    fetch: bool,
}

/// Runs the CLI, returning an appropriate exit code.
fn run() -> io::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let _dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            let mut stderr = io::stderr().lock();
            writeln!(stderr, "{} {err}", "error:".red().bold())?;
            writeln!(
                stderr,
                "  {} create a .env file or export the variable before running",
                "hint:".cyan()
            )?;
            return Ok(ExitCode::FAILURE);
        }
    };
    config.dry_run = config.dry_run || cli.dry_run;
    config.load_akahu_data = config.load_akahu_data || cli.fetch;

    let spinner = make_spinner(if config.dry_run {
        "Reconciling (dry run)..."
    } else {
        "Reconciling ledger against feed..."
    });

    match sync::run(&config) {
        Ok(summary) => {
            spinner.finish_and_clear();
            print_summary(&summary, config.dry_run)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            spinner.finish_and_clear();
            writeln!(
                io::stderr().lock(),
                "{} reconciliation failed: {err}",
                "error:".red().bold()
            )?;
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Prints the run summary as a table.
fn print_summary(summary: &SyncSummary, dry_run: bool) -> io::Result<()> {
    let mut out = io::stdout().lock();
    let heading = if dry_run {
        "Reconciliation complete (dry run — nothing written)"
    } else {
        "Reconciliation complete"
    };
    writeln!(out, "{}", heading.green().bold())?;
    writeln!(out)?;

    let mut table = Table::new();
    _ = table.load_preset(UTF8_FULL);
    _ = table.set_header(vec![
        Cell::new("Step").fg(Color::Cyan),
        Cell::new("Count").fg(Color::Cyan),
    ]);

    let rows: &[(&str, usize)] = &[
        ("Ledger accounts", summary.ledger_accounts),
        ("Ledger transactions", summary.ledger_transactions),
        ("Feed transactions", summary.feed_transactions),
        ("Accounts created", summary.export.accounts_created),
        ("Accounts updated", summary.export.accounts_updated),
        ("Accounts unchanged", summary.export.accounts_unchanged),
        ("Transactions created", summary.export.transactions_created),
        ("Transactions updated", summary.export.transactions_updated),
        (
            "Transactions unchanged",
            summary.export.transactions_unchanged,
        ),
        ("Failed writes", summary.export.failed_writes),
    ];
    for &(name, count) in rows {
        let count_cell = if count > 0 {
            Cell::new(count).fg(Color::Green)
        } else {
            Cell::new(count).fg(Color::DarkGrey)
        };
        _ = table.add_row(vec![Cell::new(name), count_cell]);
    }

    writeln!(out, "{table}")?;
    Ok(())
}

/// Creates a spinner with the given message.
fn make_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_owned());
    spinner.enable_steady_tick(core::time::Duration::from_millis(80));
    spinner
}

/// Entry point.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            // Last-resort error output — if stderr itself failed,
            // nothing we can do.
            let _ignored = writeln!(io::stderr(), "fatal I/O error: {err}");
            ExitCode::FAILURE
        }
    }
}
