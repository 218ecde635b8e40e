use thiserror::Error;

use crate::checksum::ChecksumError;

/// Recoverable problems found while parsing an index.
///
/// None of these stop the parse; the offending line or stanza is skipped
/// and the caller decides how loudly to report it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseWarning {
    #[error("line {line}: malformed line skipped: {content:?}")]
    MalformedLine { line: usize, content: String },

    #[error("line {line}: stanza for {} has no Filename, skipped", package.as_deref().unwrap_or("<unnamed>"))]
    MissingFilename {
        line: usize,
        package: Option<String>,
    },

    #[error("line {line}: invalid Size {value:?}, treating size as unknown")]
    InvalidSize { line: usize, value: String },

    #[error("line {line}: invalid {key} ignored: {source}")]
    InvalidChecksum {
        line: usize,
        key: String,
        source: ChecksumError,
    },
}

impl ParseWarning {
    /// 1-based line the warning refers to.
    pub fn line(&self) -> usize {
        match self {
            Self::MalformedLine { line, .. }
            | Self::MissingFilename { line, .. }
            | Self::InvalidSize { line, .. }
            | Self::InvalidChecksum { line, .. } => *line,
        }
    }
}
