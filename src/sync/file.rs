use std::path::Path;

use futures_util::StreamExt;
use reqwest::{Client, Url};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::error::{DownloadError, Mismatch};
use super::paths;
use crate::checksum::{Checksum, Hasher};
use crate::retry::{self, RetryAction, RetryConfig};

/// What a finished transfer has to match before it may replace the
/// destination. Either part may be unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct Expected<'a> {
    pub size: Option<u64>,
    pub checksum: Option<&'a Checksum>,
}

/// Download `url` to `download_path` through a `.part` file.
///
/// The body is streamed into `<download_path>.part`, checked against
/// `expected`, and only then renamed over the destination, so an
/// interrupted or corrupt transfer can never pass for a mirrored file.
/// Any failed attempt removes its `.part` file. Transfers that fail
/// verification are repeated per `retry_config`; other errors are not.
///
/// Returns the number of bytes written.
pub async fn download_file(
    client: &Client,
    url: &Url,
    download_path: &Path,
    expected: Expected<'_>,
    retry_config: &RetryConfig,
) -> Result<u64, DownloadError> {
    let part_path = paths::part_path(download_path);

    retry::retry_with_backoff(
        retry_config,
        |e: &DownloadError| {
            if e.is_retryable() {
                RetryAction::Retry
            } else {
                RetryAction::Abort
            }
        },
        || async {
            let result = attempt_download(client, url, download_path, &part_path, expected).await;
            if result.is_err() {
                let _ = fs::remove_file(&part_path).await;
            }
            result
        },
    )
    .await
}

/// Single transfer with in-stream hashing.
async fn attempt_download(
    client: &Client,
    url: &Url,
    download_path: &Path,
    part_path: &Path,
    expected: Expected<'_>,
) -> Result<u64, DownloadError> {
    let url_str = url.to_string();
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| DownloadError::Http {
            source: e,
            url: url_str.clone(),
            bytes_written: 0,
        })?;

    if !response.status().is_success() {
        return Err(DownloadError::HttpStatus {
            status: response.status().as_u16(),
            url: url_str,
        });
    }

    let content_length = response.content_length();

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(part_path)
        .await?;

    let mut hasher = expected.checksum.map(|c| Hasher::new(c.algorithm()));
    let mut bytes_written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            tracing::warn!(
                "Body error for {} (content_length={:?}, bytes_so_far={}): {}",
                url_str,
                content_length,
                bytes_written,
                e
            );
            DownloadError::Http {
                source: e,
                url: url_str.clone(),
                bytes_written,
            }
        })?;
        if let Some(hasher) = hasher.as_mut() {
            hasher.update(&chunk);
        }
        file.write_all(&chunk).await?;
        bytes_written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    let path_str = download_path.display().to_string();

    if let Some(expected_size) = expected.size {
        if bytes_written != expected_size {
            return Err(DownloadError::VerificationMismatch {
                path: path_str,
                mismatch: Mismatch::Size {
                    expected: expected_size,
                    actual: bytes_written,
                },
            });
        }
    }

    if let (Some(checksum), Some(hasher)) = (expected.checksum, hasher) {
        let actual = hasher.finalize_hex();
        if !checksum.matches(&actual) {
            return Err(DownloadError::VerificationMismatch {
                path: path_str,
                mismatch: Mismatch::Checksum {
                    algorithm: checksum.algorithm(),
                    expected: checksum.hex().to_string(),
                    actual,
                },
            });
        }
    }

    fs::rename(part_path, download_path).await?;

    Ok(bytes_written)
}
