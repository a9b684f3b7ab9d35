//! Record classification for Open Library dump records
//!
//! Dump records carry their kind in two places: a `type` field (either
//! `"/type/work"` or `{"key": "/type/work"}`) and the namespace of their
//! `key` (`/works/OL1W`). Neither is reliable on its own, so the signals are
//! checked as an ordered list of predicates and the first match wins.

use serde_json::{Map, Value};

/// Prefix stripped from declared type references.
const TYPE_PREFIX: &str = "/type/";

/// Kinds of dump record the ingester cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Author,
    Work,
}

impl RecordKind {
    /// Type name after the `/type/` prefix is stripped
    pub fn type_name(self) -> &'static str {
        match self {
            RecordKind::Author => "author",
            RecordKind::Work => "work",
        }
    }

    /// Namespace prefix of keys belonging to this kind
    pub fn key_prefix(self) -> &'static str {
        match self {
            RecordKind::Author => "/authors/",
            RecordKind::Work => "/works/",
        }
    }
}

type Predicate = fn(&Map<String, Value>, RecordKind) -> bool;

/// Classification signals, most reliable first.
const CLASSIFIERS: &[(&str, Predicate)] = &[
    ("declared-type", declared_type_matches),
    ("key-prefix", key_prefix_matches),
];

/// Normalize a declared type reference to its bare name.
///
/// Accepts a plain string or an object with a string `key`.
pub fn normalize_type(value: &Value) -> Option<&str> {
    let raw = match value {
        Value::String(s) => s.as_str(),
        Value::Object(obj) => obj.get("key")?.as_str()?,
        _ => return None,
    };
    Some(raw.strip_prefix(TYPE_PREFIX).unwrap_or(raw))
}

fn declared_type_matches(record: &Map<String, Value>, kind: RecordKind) -> bool {
    record
        .get("type")
        .and_then(normalize_type)
        .is_some_and(|t| t == kind.type_name())
}

fn key_prefix_matches(record: &Map<String, Value>, kind: RecordKind) -> bool {
    record
        .get("key")
        .and_then(Value::as_str)
        .is_some_and(|k| k.starts_with(kind.key_prefix()))
}

/// Name of the first signal identifying `record` as `kind`, if any
pub fn matching_signal(record: &Map<String, Value>, kind: RecordKind) -> Option<&'static str> {
    CLASSIFIERS
        .iter()
        .find(|(_, predicate)| predicate(record, kind))
        .map(|(name, _)| *name)
}

pub fn is_kind(record: &Map<String, Value>, kind: RecordKind) -> bool {
    matching_signal(record, kind).is_some()
}
