//! # usbdiff CLI
//!
//! Snapshot a directory and report what changed since the last run.
//!
//! ## Usage
//! ```bash
//! # First run records every file
//! usbdiff /media/usb
//!
//! # Later runs print only changes
//! usbdiff /media/usb
//!
//! # Mirror changed files elsewhere, keep the snapshot somewhere else
//! usbdiff -s ~/.usb.json -r /backup/usb /media/usb
//! ```

use clap::Parser;
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use usbdiff::utils::format_bytes;
use usbdiff::{
    DecodeMode, DiffStatus, ProgressInfo, Result, RunReport, SessionBuilder, DEFAULT_SNAPSHOT_FILE,
    MAX_DIFFS,
};

/// Report files that changed since the last snapshot of a directory
#[derive(Parser)]
#[command(name = "usbdiff")]
#[command(version)]
#[command(about = "Content-hash snapshots and change reports for a directory tree")]
#[command(long_about = None)]
struct Cli {
    /// Directory to snapshot
    directory: PathBuf,

    /// Snapshot file
    #[arg(short, long, env = "USBDIFF_SNAPSHOT", default_value = DEFAULT_SNAPSHOT_FILE)]
    snapshot: PathBuf,

    /// Copy changed files under DIRECTORY into this directory
    #[arg(short, long, value_name = "DIR")]
    replicate: Option<PathBuf>,

    /// Hashing threads (defaults to the CPU count)
    #[arg(short = 'j', long, value_name = "N")]
    workers: Option<usize>,

    /// Cap on reported changes
    #[arg(long, value_name = "N", default_value_t = MAX_DIFFS)]
    max_diffs: usize,

    /// Decode the snapshot in one pass instead of streaming it
    #[arg(long)]
    bulk: bool,

    /// Hash every file even when size and mtime are unchanged
    #[arg(long)]
    rehash: bool,

    /// Do not write the snapshot
    #[arg(long)]
    dry_run: bool,

    /// Print the diff as JSON
    #[arg(long)]
    json: bool,

    /// Show a spinner while hashing
    #[arg(long)]
    progress: bool,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e.user_message());
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut builder = SessionBuilder::new(&cli.directory)
        .snapshot_path(&cli.snapshot)
        .max_diffs(cli.max_diffs)
        .force_rehash(cli.rehash)
        .dry_run(cli.dry_run)
        .decode_mode(if cli.bulk { DecodeMode::Bulk } else { DecodeMode::Streaming });

    if let Some(workers) = cli.workers {
        builder = builder.parallel_workers(workers);
    }
    if let Some(ref destination) = cli.replicate {
        builder = builder.replicate_to(destination);
    }

    let spinner = (cli.progress && !cli.json).then(new_spinner);
    if let Some(ref pb) = spinner {
        let pb = pb.clone();
        builder = builder.progress(Arc::new(move |info: ProgressInfo| {
            let total = info.total.map(|t| t.to_string()).unwrap_or_else(|| "?".into());
            pb.set_message(format!("{} {}/{}", info.operation, info.processed, total));
        }));
    }

    let session = builder.build()?;
    let report = session.run();

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let report = report?;

    if cli.json {
        print_json(&report)?;
    } else {
        print_report(&report, cli.dry_run);
    }
    Ok(())
}

fn new_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message("Scanning files...");
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn print_report(report: &RunReport, dry_run: bool) {
    match report.diffs {
        Some(ref diffs) => {
            println!("{}", "Diffs:".bold());
            for diff in diffs {
                let line = format!("{}\t{}", diff.status.marker(), diff.path);
                match diff.status {
                    DiffStatus::Modified => println!("{}", line.green()),
                    DiffStatus::Deleted => println!("{}", line.red()),
                }
            }
        }
        None => println!("No changes to directory."),
    }

    let summary = report.summary();
    let elapsed = Duration::from_millis(report.duration.as_millis() as u64);
    println!(
        "\n{} changed, {} deleted | {} files ({} hashed, {} reused, {} unreadable) in {}",
        summary.modified.to_string().green(),
        summary.deleted.to_string().red(),
        report.current_records.to_string().cyan(),
        report.hashing.hashed,
        report.hashing.reused,
        report.hashing.skipped,
        format_duration(elapsed).to_string().cyan()
    );

    if let Some(ref replication) = report.replication {
        println!(
            "Replicated {} files ({}){}",
            replication.files_copied.to_string().cyan(),
            format_bytes(replication.bytes_copied),
            if replication.failures.is_empty() {
                String::new()
            } else {
                format!(", {} failed", replication.failures.len()).yellow().to_string()
            }
        );
    }

    if dry_run {
        println!("{}", "Dry run: snapshot not written".yellow());
    }
}

fn print_json(report: &RunReport) -> Result<()> {
    let summary = report.summary();
    let out = json!({
        "diffs": report.diffs.as_deref().unwrap_or_default(),
        "summary": summary,
        "hashing": report.hashing,
        "replication": report.replication,
        "persisted": report.persisted,
        "duration_ms": report.duration.as_millis() as u64,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
