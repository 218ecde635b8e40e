use std::collections::BTreeMap;

use crate::checksum::Checksum;

/// One package as described by a stanza of the index.
///
/// Only `filename` is guaranteed; a stanza without it never becomes a
/// record. Keys the mirror does not interpret are kept in `fields` under
/// their original spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: Option<String>,
    pub version: Option<String>,
    pub filename: String,
    /// Declared size in bytes. `None` when absent or unparsable.
    pub size: Option<u64>,
    /// Strongest digest the stanza declared.
    pub checksum: Option<Checksum>,
    pub fields: BTreeMap<String, String>,
}

impl PackageRecord {
    /// Name used in logs and the failure summary.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.filename)
    }

    /// Case-insensitive lookup of an uninterpreted field.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}
