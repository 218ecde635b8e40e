//! Package digests as declared by the index (`MD5Sum`, `SHA256sum`).
//!
//! Digests are carried as lowercase hex. Hashing is incremental so that
//! large packages never need to be buffered in memory, both while they
//! stream off the network and when an existing file is re-checked.

use std::fmt;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha256,
}

impl ChecksumAlgorithm {
    /// Map an index field name to the algorithm it declares.
    pub fn from_field(key: &str) -> Option<Self> {
        match key.to_ascii_lowercase().as_str() {
            "md5sum" | "md5" => Some(Self::Md5),
            "sha256sum" | "sha256" => Some(Self::Sha256),
            _ => None,
        }
    }

    /// Length of the hex-encoded digest.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha256 => 64,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha256 => "SHA256",
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChecksumError {
    #[error("{algorithm} digest must be {expected} hex characters, got {actual}")]
    Length {
        algorithm: ChecksumAlgorithm,
        expected: usize,
        actual: usize,
    },

    #[error("{algorithm} digest contains non-hex characters")]
    NotHex { algorithm: ChecksumAlgorithm },
}

/// An expected digest for a package file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    algorithm: ChecksumAlgorithm,
    hex: String,
}

impl Checksum {
    /// Validate and normalize a hex digest.
    pub fn parse(algorithm: ChecksumAlgorithm, value: &str) -> Result<Self, ChecksumError> {
        let value = value.trim();
        if value.len() != algorithm.hex_len() {
            return Err(ChecksumError::Length {
                algorithm,
                expected: algorithm.hex_len(),
                actual: value.len(),
            });
        }
        if !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ChecksumError::NotHex { algorithm });
        }
        Ok(Self {
            algorithm,
            hex: value.to_ascii_lowercase(),
        })
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Compare against a computed hex digest, ignoring case.
    pub fn matches(&self, computed_hex: &str) -> bool {
        self.hex.eq_ignore_ascii_case(computed_hex)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

/// Incremental hasher for any supported algorithm.
pub enum Hasher {
    Md5(md5::Context),
    Sha256(Sha256),
}

impl Hasher {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Md5 => Self::Md5(md5::Context::new()),
            ChecksumAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(ctx) => ctx.consume(data),
            Self::Sha256(h) => h.update(data),
        }
    }

    /// Consume the hasher and return the lowercase hex digest.
    pub fn finalize_hex(self) -> String {
        match self {
            Self::Md5(ctx) => format!("{:x}", ctx.compute()),
            Self::Sha256(h) => h.finalize().iter().map(|b| format!("{:02x}", b)).collect(),
        }
    }
}

/// Hash a local file. Blocking; callers on the runtime use `spawn_blocking`.
pub fn file_digest(path: &Path, algorithm: ChecksumAlgorithm) -> io::Result<String> {
    let file = std::fs::File::open(path)?;
    let mut reader = io::BufReader::with_capacity(64 * 1024, file);
    let mut hasher = Hasher::new(algorithm);
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize_hex())
}
