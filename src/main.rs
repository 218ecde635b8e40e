//! opkgsync: mirror an opkg package repository into a local directory.
//!
//! Fetches the remote `Packages` index, parses it into package records,
//! and downloads every package file that is missing or stale locally.
//! Each download is streamed into a `.part` file, checked against the
//! size and digest the index declares, and only then renamed into place.
//! A failed package is reported and skipped; the rest of the batch still
//! runs.

#![warn(clippy::all)]

mod checksum;
mod cli;
mod config;
mod fetch;
mod index;
mod retry;
mod shutdown;
mod sync;
mod types;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// One or more packages were not mirrored, or the run was interrupted.
const EXIT_PACKAGES_FAILED: u8 = 1;
/// The run could not start: bad configuration or no index.
const EXIT_FATAL: u8 = 2;

/// Fetch, parse, optionally prune, then sync. Errors returned here are
/// fatal; per-package failures live in the report.
async fn run(config: &config::Config) -> anyhow::Result<sync::SyncReport> {
    if !config.dry_run {
        tokio::fs::create_dir_all(&config.directory)
            .await
            .with_context(|| {
                format!("Cannot create mirror directory {}", config.directory.display())
            })?;
    }

    let client = fetch::build_client().context("Failed to build HTTP client")?;
    let index_text = fetch::fetch_index(&client, &config.packages_url).await?;

    let parsed = index::parse_index(&index_text);
    tracing::info!(
        "Index lists {} packages ({} parse warnings)",
        parsed.records.len(),
        parsed.warnings.len()
    );

    if config.prune {
        let removed =
            sync::mirror_index::prune_removed(&config.directory, &parsed.records, config.dry_run)
                .await?;
        tracing::info!("Pruned {} packages no longer in the index", removed.len());
    }

    let shutdown_token = shutdown::install_signal_handler()?;
    let report = sync::sync_packages(
        &client,
        &config.packages_url,
        &parsed.records,
        &config.sync_config(),
        shutdown_token,
    )
    .await;

    if config.write_index {
        if config.dry_run {
            tracing::info!("[DRY RUN] Would write index to {}", config.directory.display());
        } else if report.is_success() {
            // Every package is in place; a stale saved index only affects
            // the next --prune.
            if let Err(e) =
                sync::mirror_index::write_saved_index(&config.directory, &index_text).await
            {
                tracing::error!("Could not save index: {:#}", e);
            }
        } else {
            tracing::warn!("Not updating saved index: the mirror is incomplete");
        }
    }

    Ok(report)
}

fn print_summary(config: &config::Config, report: &sync::SyncReport) {
    tracing::info!("── Summary ──");
    if config.dry_run {
        tracing::info!(
            "  {} would be downloaded, {} up to date",
            report.planned,
            report.up_to_date
        );
    } else {
        tracing::info!(
            "  {} downloaded ({} bytes), {} up to date, {} failed, {} total",
            report.downloaded,
            report.downloaded_bytes,
            report.up_to_date,
            report.failed.len(),
            report.total()
        );
    }
    if report.duplicates > 0 {
        tracing::info!("  {} duplicate entries skipped", report.duplicates);
    }
    tracing::info!("  elapsed: {}", sync::format_duration(report.elapsed));

    if report.interrupted {
        eprintln!("Interrupted: {} packages were not processed", report.skipped);
    }
    if !report.failed.is_empty() {
        eprintln!(
            "{} of {} packages failed:",
            report.failed.len(),
            report.total()
        );
        for failed in &report.failed {
            eprintln!("  {} ({}): {}", failed.name, failed.filename, failed.error);
        }
    }
}

/// Exit status for a pass that got as far as syncing.
fn exit_status(report: &sync::SyncReport) -> u8 {
    if report.is_success() {
        0
    } else {
        EXIT_PACKAGES_FAILED
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli::Cli::parse();

    let config = match config::Config::from_cli(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter())),
        )
        .init();
    tracing::debug!(?config, "Starting opkgsync");

    let report = match run(&config).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    print_summary(&config, &report);
    ExitCode::from(exit_status(&report))
}
