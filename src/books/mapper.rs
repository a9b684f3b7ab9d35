//! Mapping raw records to canonical book documents
//!
//! Work records are joined against an [`AuthorIndex`]; sample records are
//! coerced from their looser shape. A record that cannot produce a valid
//! document is reported as [`Ineligible`] rather than as an error.

use serde_json::Value;

use super::authors::AuthorIndex;
use super::types::{LegacyBook, SampleBook, WorkBook, LEGACY_SOURCE, UNKNOWN_COUNTRY};
use crate::dates;
use crate::records::{is_kind, Record, RecordKind};

/// Why a record produced no document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ineligible {
    /// Not a record of the expected kind
    WrongKind,
    MissingTitle,
    /// None of the author references resolved
    NoAuthors,
}

/// Key of one entry in a work's `authors` list.
///
/// Dumps use `{"author": {"key": ...}}`; older exports use
/// `{"author": "<key>"}`, `{"key": ...}` or a bare key string.
pub fn author_ref_key(reference: &Value) -> Option<&str> {
    match reference {
        Value::String(key) => Some(key.as_str()),
        Value::Object(obj) => match obj.get("author") {
            Some(Value::Object(author)) => author.get("key")?.as_str(),
            Some(Value::String(key)) => Some(key.as_str()),
            _ => obj.get("key")?.as_str(),
        },
        _ => None,
    }
}

fn author_refs(record: &Record) -> impl Iterator<Item = &str> {
    record
        .get("authors")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(author_ref_key)
}

/// Resolve every author reference; unresolved ones are dropped.
pub fn resolve_authors(record: &Record, index: &AuthorIndex) -> Vec<String> {
    author_refs(record)
        .filter_map(|key| index.name(key))
        .map(str::to_string)
        .collect()
}

fn title_of(record: &Record) -> Option<&str> {
    record
        .get("title")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
}

/// A string or list of strings as a list. An empty string counts as absent.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if s.is_empty() => Vec::new(),
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Map a work record to a document carrying all resolved authors.
pub fn map_work(record: &Record, index: &AuthorIndex) -> Result<WorkBook, Ineligible> {
    if !is_kind(record, RecordKind::Work) {
        return Err(Ineligible::WrongKind);
    }
    let title = title_of(record).ok_or(Ineligible::MissingTitle)?;
    let authors = resolve_authors(record, index);
    if authors.is_empty() {
        return Err(Ineligible::NoAuthors);
    }

    Ok(WorkBook {
        key: record.get("key").and_then(Value::as_str).map(str::to_string),
        title: title.to_string(),
        authors,
        subjects: string_list(record.get("subjects")),
    })
}

/// Map a work record to the legacy shape: first resolvable author, split
/// into first/last name, with the published date taken from
/// `first_publish_date`.
pub fn map_work_legacy(record: &Record, index: &AuthorIndex) -> Result<LegacyBook, Ineligible> {
    if !is_kind(record, RecordKind::Work) {
        return Err(Ineligible::WrongKind);
    }
    let title = title_of(record).ok_or(Ineligible::MissingTitle)?;
    let (first, last) = author_refs(record)
        .find_map(|key| index.split_name(key))
        .ok_or(Ineligible::NoAuthors)?;

    Ok(LegacyBook {
        title: title.to_string(),
        author_first_name: Some(first),
        author_last_name: last,
        country: UNKNOWN_COUNTRY.to_string(),
        published_date: record.get("first_publish_date").and_then(dates::normalize_json),
        out_of_print_date: None,
        source: LEGACY_SOURCE.to_string(),
    })
}

/// Coerce a simplified sample record.
///
/// `authors` may be a string or a list; `author` is accepted when
/// `authors` yields nothing.
pub fn coerce_sample_book(value: &Value) -> Result<SampleBook, Ineligible> {
    let record = value.as_object().ok_or(Ineligible::WrongKind)?;
    let title = title_of(record).ok_or(Ineligible::MissingTitle)?;

    let mut authors = string_list(record.get("authors"));
    if authors.is_empty() {
        authors = string_list(record.get("author"));
    }
    if authors.is_empty() {
        return Err(Ineligible::NoAuthors);
    }

    Ok(SampleBook {
        title: title.to_string(),
        authors,
        subjects: string_list(record.get("subjects")),
    })
}
