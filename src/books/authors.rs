//! Author index built from the authors dump
//!
//! Maps author keys (e.g. "/authors/OL23919A") to display names so work
//! records can be joined to readable author names.

use serde_json::Value;
use std::collections::HashMap;
use std::io;

use crate::records::{is_kind, Record, RecordKind};

/// Author key → display name, built once per run
#[derive(Debug, Clone, Default)]
pub struct AuthorIndex {
    names: HashMap<String, String>,
}

impl AuthorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the name for `key`, returning the previous one
    pub fn insert(&mut self, key: impl Into<String>, name: impl Into<String>) -> Option<String> {
        self.names.insert(key.into(), name.into())
    }

    pub fn name(&self, key: &str) -> Option<&str> {
        self.names.get(key).map(String::as_str)
    }

    /// Name for `key` split into (first, last)
    pub fn split_name(&self, key: &str) -> Option<(String, Option<String>)> {
        self.name(key).and_then(split_name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Split a full name: every token but the last is the first name.
///
/// A single token yields `(token, None)`; blank input yields `None`.
pub fn split_name(full: &str) -> Option<(String, Option<String>)> {
    let tokens: Vec<&str> = full.split_whitespace().collect();
    match tokens.split_last() {
        None => None,
        Some((only, [])) => Some((only.to_string(), None)),
        Some((last, rest)) => Some((rest.join(" "), Some(last.to_string()))),
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Extract `(key, name)` from an author record.
///
/// `name` is preferred over `personal_name`.
pub fn author_entry(record: &Record) -> Option<(&str, &str)> {
    if !is_kind(record, RecordKind::Author) {
        return None;
    }
    let key = non_empty_str(record.get("key"))?;
    let name = non_empty_str(record.get("name"))
        .or_else(|| non_empty_str(record.get("personal_name")))?;
    Some((key, name))
}

/// Result of scanning an authors source
#[derive(Debug, Default)]
pub struct AuthorScan {
    pub index: AuthorIndex,
    /// Records examined, bounded by the scan limit
    pub scanned: u64,
}

/// Build an index from an author record stream.
///
/// `scan_limit` caps records examined, not entries kept. Later duplicates
/// replace earlier ones.
pub fn build_author_index<I>(records: I, scan_limit: Option<usize>) -> io::Result<AuthorScan>
where
    I: IntoIterator<Item = io::Result<Record>>,
{
    let mut scan = AuthorScan::default();

    for record in records.into_iter().take(scan_limit.unwrap_or(usize::MAX)) {
        let record = record?;
        scan.scanned += 1;
        if let Some((key, name)) = author_entry(&record) {
            scan.index.insert(key, name);
        }
    }

    Ok(scan)
}
