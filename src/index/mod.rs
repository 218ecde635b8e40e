//! Parser for opkg `Packages` index documents.
//!
//! The format is a Debian-control-like sequence of stanzas: `Key: Value`
//! lines, stanzas separated by blank lines, and indented lines continuing
//! the previous value. The parser is deliberately tolerant. Upstream
//! indexes are not strictly validated anywhere else, so a malformed line
//! or an unusable stanza is reported as a [`ParseWarning`] and skipped,
//! and the rest of the document is still mirrored.

pub mod error;
pub mod record;

use std::collections::{BTreeMap, VecDeque};
use std::iter::Enumerate;
use std::str::Lines;

use crate::checksum::{Checksum, ChecksumAlgorithm};

pub use error::ParseWarning;
pub use record::PackageRecord;

/// A field as it appeared in the stanza, with the line it started on.
#[derive(Debug)]
struct RawField {
    key: String,
    value: String,
    line: usize,
}

/// Fields accumulated for the stanza currently being read.
#[derive(Debug, Default)]
struct Stanza {
    start_line: usize,
    fields: Vec<RawField>,
    /// Index into `fields` that an indented line would continue.
    current: Option<usize>,
}

impl Stanza {
    fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Insert a field; a repeated key replaces the earlier value.
    fn insert(&mut self, key: &str, value: &str, line: usize) {
        if self.fields.is_empty() {
            self.start_line = line;
        }
        let idx = match self
            .fields
            .iter()
            .position(|f| f.key.eq_ignore_ascii_case(key))
        {
            Some(idx) => {
                self.fields[idx].value = value.to_string();
                self.fields[idx].line = line;
                idx
            }
            None => {
                self.fields.push(RawField {
                    key: key.to_string(),
                    value: value.to_string(),
                    line,
                });
                self.fields.len() - 1
            }
        };
        self.current = Some(idx);
    }

    /// Fold a continuation line into the current field. Returns `false`
    /// when there is no field to continue.
    fn continue_field(&mut self, content: &str) -> bool {
        let Some(idx) = self.current else {
            return false;
        };
        let value = &mut self.fields[idx].value;
        if !value.is_empty() {
            value.push(' ');
        }
        value.push_str(content);
        true
    }
}

/// Streaming parser over index text.
///
/// Yields one `Ok` per stanza that names a `Filename` and one `Err` per
/// recoverable problem, in document order. Each stanza's warnings come
/// before its record.
pub struct IndexParser<'a> {
    lines: Enumerate<Lines<'a>>,
    stanza: Stanza,
    pending: VecDeque<Result<PackageRecord, ParseWarning>>,
    finished: bool,
}

impl<'a> IndexParser<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().enumerate(),
            stanza: Stanza::default(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    fn flush_stanza(&mut self) {
        let stanza = std::mem::take(&mut self.stanza);
        if stanza.is_empty() {
            return;
        }
        let (record, warnings) = build_record(stanza);
        self.pending.extend(warnings.into_iter().map(Err));
        if let Some(record) = record {
            self.pending.push_back(Ok(record));
        }
    }

    /// Consume one physical line. Returns a warning for malformed lines.
    fn feed_line(&mut self, line_no: usize, raw: &str) -> Option<ParseWarning> {
        if raw.trim().is_empty() {
            self.flush_stanza();
            return None;
        }

        let malformed = || ParseWarning::MalformedLine {
            line: line_no,
            content: raw.to_string(),
        };

        if raw.starts_with([' ', '\t']) {
            if self.stanza.continue_field(raw.trim()) {
                return None;
            }
            return Some(malformed());
        }

        match raw.split_once(':') {
            Some((key, value)) if !key.trim().is_empty() => {
                self.stanza.insert(key.trim(), value.trim(), line_no);
                None
            }
            _ => {
                // Indented lines after a bad line must not attach to the
                // field before it.
                self.stanza.current = None;
                Some(malformed())
            }
        }
    }
}

impl Iterator for IndexParser<'_> {
    type Item = Result<PackageRecord, ParseWarning>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            if self.finished {
                return None;
            }
            match self.lines.next() {
                Some((idx, raw)) => {
                    if let Some(warning) = self.feed_line(idx + 1, raw) {
                        return Some(Err(warning));
                    }
                }
                None => {
                    self.flush_stanza();
                    self.finished = true;
                }
            }
        }
    }
}

/// Turn a finished stanza into a record, collecting field-level warnings.
fn build_record(stanza: Stanza) -> (Option<PackageRecord>, Vec<ParseWarning>) {
    let mut warnings = Vec::new();
    let mut name = None;
    let mut version = None;
    let mut filename = None;
    let mut size = None;
    let mut checksums: Vec<(Checksum, RawField)> = Vec::new();
    let mut fields = BTreeMap::new();

    for field in stanza.fields {
        let non_empty = (!field.value.is_empty()).then(|| field.value.clone());
        match field.key.to_ascii_lowercase().as_str() {
            "package" => name = non_empty,
            "version" => version = non_empty,
            "filename" => filename = non_empty,
            "size" => match field.value.parse::<u64>() {
                Ok(n) => size = Some(n),
                Err(_) => warnings.push(ParseWarning::InvalidSize {
                    line: field.line,
                    value: field.value,
                }),
            },
            key => match ChecksumAlgorithm::from_field(key) {
                Some(algorithm) => match Checksum::parse(algorithm, &field.value) {
                    Ok(checksum) => checksums.push((checksum, field)),
                    Err(source) => warnings.push(ParseWarning::InvalidChecksum {
                        line: field.line,
                        key: field.key,
                        source,
                    }),
                },
                None => {
                    fields.insert(field.key, field.value);
                }
            },
        }
    }

    // Strongest algorithm wins; the others stay visible as plain fields.
    checksums.sort_by_key(|(c, _)| c.algorithm());
    let checksum = checksums.pop().map(|(c, _)| c);
    for (_, field) in checksums {
        fields.insert(field.key, field.value);
    }

    let Some(filename) = filename else {
        warnings.push(ParseWarning::MissingFilename {
            line: stanza.start_line,
            package: name,
        });
        return (None, warnings);
    };

    let record = PackageRecord {
        name,
        version,
        filename,
        size,
        checksum,
        fields,
    };
    (Some(record), warnings)
}

/// Fully parsed index, in document order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedIndex {
    pub records: Vec<PackageRecord>,
    pub warnings: Vec<ParseWarning>,
}

/// Parse a whole index, logging each warning.
pub fn parse_index(text: &str) -> ParsedIndex {
    let mut parsed = ParsedIndex::default();
    for item in IndexParser::new(text) {
        match item {
            Ok(record) => parsed.records.push(record),
            Err(warning) => {
                tracing::warn!(line = warning.line(), "{}", warning);
                parsed.warnings.push(warning);
            }
        }
    }
    tracing::debug!(
        records = parsed.records.len(),
        warnings = parsed.warnings.len(),
        "Parsed package index"
    );
    parsed
}
