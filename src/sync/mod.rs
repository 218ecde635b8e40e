//! Sync engine: decides, package by package, whether the local mirror is
//! current and downloads whatever is missing or stale.
//!
//! Records are processed in index order. Every per-package problem is
//! caught, logged and collected into the [`SyncReport`]; one bad package
//! never stops the batch.

pub mod error;
pub mod file;
pub mod mirror_index;
pub mod paths;

use std::collections::HashSet;
use std::fmt;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures_util::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, Url};
use tokio_util::sync::CancellationToken;

use crate::checksum;
use crate::index::PackageRecord;
use crate::retry::RetryConfig;
use crate::types::VerifyMode;

pub use error::DownloadError;

/// Subset of application config consumed by the sync engine.
/// Decoupled from CLI parsing so the engine can be tested independently.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub(crate) directory: PathBuf,
    pub(crate) verify: VerifyMode,
    pub(crate) dry_run: bool,
    pub(crate) concurrent_downloads: usize,
    pub(crate) retry: RetryConfig,
    pub(crate) no_progress_bar: bool,
}

/// Lifecycle of one package within a pass:
/// `Pending -> {UpToDate, Downloading -> {Complete, Failed}}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageState {
    Pending,
    UpToDate,
    Downloading,
    Complete,
    Failed,
}

impl PackageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::UpToDate => "up_to_date",
            Self::Downloading => "downloading",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

/// Why a package has to be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchReason {
    Missing,
    UnknownSize,
    SizeMismatch { local: u64, expected: u64 },
    ChecksumMismatch,
}

impl fmt::Display for FetchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("missing"),
            Self::UnknownSize => f.write_str("size unknown"),
            Self::SizeMismatch { local, expected } => {
                write!(f, "local size {} != {}", local, expected)
            }
            Self::ChecksumMismatch => f.write_str("checksum mismatch"),
        }
    }
}

/// Result of comparing a record against the local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalStatus {
    UpToDate,
    Stale(FetchReason),
}

/// A package that could not be mirrored in this pass.
#[derive(Debug)]
pub struct FailedPackage {
    pub name: String,
    pub filename: String,
    pub error: DownloadError,
}

/// Aggregate outcome of one pass over the index.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub up_to_date: usize,
    pub downloaded: usize,
    pub downloaded_bytes: u64,
    /// Packages a dry run would have downloaded.
    pub planned: usize,
    pub failed: Vec<FailedPackage>,
    /// Records dropped because an earlier record has the same destination.
    pub duplicates: usize,
    /// Packages never started because shutdown was requested.
    pub skipped: usize,
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.interrupted
    }

    pub fn total(&self) -> usize {
        self.up_to_date
            + self.downloaded
            + self.planned
            + self.failed.len()
            + self.duplicates
            + self.skipped
    }
}

/// Compare a record against what is on disk.
///
/// Size is always checked. The local digest is only recomputed in
/// [`VerifyMode::Checksum`], because it means reading the whole file.
/// A record without a size is stale unless a digest can vouch for it.
pub async fn check_local(
    path: &Path,
    record: &PackageRecord,
    verify: VerifyMode,
) -> Result<LocalStatus, DownloadError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(LocalStatus::Stale(FetchReason::Missing));
        }
        Err(e) => return Err(DownloadError::Disk(e)),
    };
    if !metadata.is_file() {
        return Err(DownloadError::NotAFile(path.display().to_string()));
    }

    let verify_checksum = match (verify, record.checksum.as_ref()) {
        (VerifyMode::Checksum, Some(c)) => Some(c.clone()),
        _ => None,
    };

    match record.size {
        Some(expected) if metadata.len() != expected => {
            return Ok(LocalStatus::Stale(FetchReason::SizeMismatch {
                local: metadata.len(),
                expected,
            }));
        }
        Some(_) => {}
        None if verify_checksum.is_none() => {
            return Ok(LocalStatus::Stale(FetchReason::UnknownSize));
        }
        None => {}
    }

    if let Some(expected) = verify_checksum {
        let file_path = path.to_path_buf();
        let algorithm = expected.algorithm();
        let actual =
            tokio::task::spawn_blocking(move || checksum::file_digest(&file_path, algorithm))
                .await
                .map_err(|e| DownloadError::Other(e.into()))??;
        if !expected.matches(&actual) {
            tracing::debug!(
                path = %path.display(),
                expected = %expected.hex(),
                actual = %actual,
                "local checksum mismatch",
            );
            return Ok(LocalStatus::Stale(FetchReason::ChecksumMismatch));
        }
    }

    Ok(LocalStatus::UpToDate)
}

/// How one package ended up after [`sync_one`].
#[derive(Debug)]
enum PackageOutcome {
    UpToDate,
    /// Dry run: the package is stale and would be downloaded.
    Planned { path: PathBuf, reason: FetchReason },
    Downloaded { path: PathBuf, bytes: u64 },
}

/// Bring one package up to date. A dry run stops after the local check.
async fn sync_one(
    client: &Client,
    index_url: &Url,
    record: &PackageRecord,
    config: &SyncConfig,
) -> Result<PackageOutcome, DownloadError> {
    let download_path = paths::local_package_path(&config.directory, &record.filename)?;

    let reason = match check_local(&download_path, record, config.verify).await? {
        LocalStatus::UpToDate => {
            tracing::debug!(
                package = record.display_name(),
                state = PackageState::UpToDate.as_str(),
                "{} is up to date",
                download_path.display()
            );
            return Ok(PackageOutcome::UpToDate);
        }
        LocalStatus::Stale(reason) => reason,
    };

    if config.dry_run {
        return Ok(PackageOutcome::Planned {
            path: download_path,
            reason,
        });
    }

    if let Some(parent) = download_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let url = paths::package_url(index_url, &record.filename)?;
    tracing::debug!(
        package = record.display_name(),
        state = PackageState::Downloading.as_str(),
        size_bytes = ?record.size,
        architecture = record.field("Architecture").unwrap_or("-"),
        %url,
        path = %download_path.display(),
        reason = %reason,
        "downloading",
    );

    let bytes = file::download_file(
        client,
        &url,
        &download_path,
        file::Expected {
            size: record.size,
            checksum: record.checksum.as_ref(),
        },
        &config.retry,
    )
    .await?;

    Ok(PackageOutcome::Downloaded {
        path: download_path,
        bytes,
    })
}

/// Drop records whose `Filename` maps to a local path an earlier record
/// already claimed. Two transfers into the same destination would share
/// one `.part` file. Names that fail path validation are kept so they are
/// reported as failures.
fn unique_destinations(records: &[PackageRecord]) -> (Vec<&PackageRecord>, usize) {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(records.len());
    let mut duplicates = 0;
    for record in records {
        match paths::relative_package_path(&record.filename) {
            Some(rel) if !seen.insert(rel.clone()) => {
                tracing::warn!(
                    "Skipping {}: {} is already listed by an earlier package",
                    record.display_name(),
                    record.filename
                );
                duplicates += 1;
            }
            _ => unique.push(record),
        }
    }
    (unique, duplicates)
}

/// Create a progress bar with a consistent template.
///
/// Hidden when the user passed `--no-progress-bar` or stdout is not a
/// TTY, so cron output stays clean.
fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    match ProgressStyle::with_template(
        "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    ) {
        Ok(style) => pb.set_style(style.progress_chars("=> ")),
        Err(e) => tracing::debug!("Default progress style used: {}", e),
    }
    pb
}

/// Run one pass over `records`, mirroring each into `config.directory`.
///
/// Packages are fetched relative to `index_url`. With the default
/// concurrency of 1 this is strictly sequential; higher values overlap
/// transfers but results are still reported in index order. A record
/// whose destination repeats an earlier one is skipped and counted in
/// [`SyncReport::duplicates`]. Once `shutdown_token` is cancelled no new
/// package is started.
pub async fn sync_packages(
    client: &Client,
    index_url: &Url,
    records: &[PackageRecord],
    config: &SyncConfig,
    shutdown_token: CancellationToken,
) -> SyncReport {
    let started = Instant::now();
    let mut report = SyncReport::default();
    let (records, duplicates) = unique_destinations(records);
    report.duplicates = duplicates;
    let pb = create_progress_bar(config.no_progress_bar, records.len() as u64);
    let mut processed = 0usize;

    let results = stream::iter(records.iter().copied())
        .take_while(|_| std::future::ready(!shutdown_token.is_cancelled()))
        .map(|record| async move {
            let result = sync_one(client, index_url, record, config).await;
            (record, result)
        })
        .buffered(config.concurrent_downloads.max(1));
    tokio::pin!(results);

    while let Some((record, result)) = results.next().await {
        processed += 1;
        pb.set_message(record.display_name().to_string());
        match result {
            Ok(PackageOutcome::UpToDate) => report.up_to_date += 1,
            Ok(PackageOutcome::Planned { path, reason }) => {
                pb.suspend(|| {
                    tracing::info!(
                        state = PackageState::Pending.as_str(),
                        "[DRY RUN] Would download {} ({})",
                        path.display(),
                        reason
                    );
                });
                report.planned += 1;
            }
            Ok(PackageOutcome::Downloaded { path, bytes }) => {
                pb.suspend(|| {
                    tracing::info!(
                        state = PackageState::Complete.as_str(),
                        "Downloaded {} ({} bytes)",
                        path.display(),
                        bytes
                    );
                });
                report.downloaded += 1;
                report.downloaded_bytes += bytes;
            }
            Err(error) => {
                pb.suspend(|| {
                    tracing::error!(
                        state = PackageState::Failed.as_str(),
                        "Failed to mirror {} ({}): {}",
                        record.display_name(),
                        record.filename,
                        error
                    );
                });
                report.failed.push(FailedPackage {
                    name: record.display_name().to_string(),
                    filename: record.filename.clone(),
                    error,
                });
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    if processed < records.len() {
        tracing::info!("Shutdown requested, stopped before {} packages", records.len() - processed);
        report.skipped = records.len() - processed;
        report.interrupted = true;
    }
    report.elapsed = started.elapsed();
    report
}

pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
