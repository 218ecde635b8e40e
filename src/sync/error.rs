use std::fmt;

use thiserror::Error;

use crate::checksum::ChecksumAlgorithm;

/// What a verification check found wrong with a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    Size {
        expected: u64,
        actual: u64,
    },
    Checksum {
        algorithm: ChecksumAlgorithm,
        expected: String,
        actual: String,
    },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::Size { expected, actual } => {
                write!(f, "size {} bytes, expected {}", actual, expected)
            }
            Mismatch::Checksum {
                algorithm,
                expected,
                actual,
            } => write!(f, "{} {}, expected {}", algorithm, actual, expected),
        }
    }
}

/// Per-package failures. None of these stop the batch.
///
/// `is_retryable()` singles out transfers that completed but failed
/// verification: those get re-downloaded in place. Network and HTTP
/// failures are reported as-is.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP error {status} downloading {url}")]
    HttpStatus { status: u16, url: String },

    #[error("HTTP error downloading {url} (bytes_so_far={bytes_written}): {source}")]
    Http {
        source: reqwest::Error,
        url: String,
        bytes_written: u64,
    },

    #[error("Verification failed for {path}: {mismatch}")]
    VerificationMismatch { path: String, mismatch: Mismatch },

    #[error("Refusing unsafe package filename {0:?}")]
    InvalidPath(String),

    #[error("{0} exists but is not a regular file")]
    NotAFile(String),

    #[error("Disk error: {0}")]
    Disk(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DownloadError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DownloadError::VerificationMismatch { .. })
    }
}
