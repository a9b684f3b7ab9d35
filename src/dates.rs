//! Date normalization
//!
//! Converts the loosely formatted date strings found in dumps and stored
//! documents into naive timestamps. Parsing never fails loudly: anything that
//! does not match a known shape becomes `None`.
//!
//! The ISO 8601 fallback accepts extended and basic layouts with optional
//! minutes, seconds, fraction and offset. Week dates and ordinal dates are
//! not recognized.
//!
//! Ambiguous day/month strings such as `01/02/1999` resolve by pattern order,
//! so `%d/%m/%Y` always wins over `%m/%d/%Y`.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use mongodb::bson::{self, Bson};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

// Shape guards keep chrono from accepting 2-digit years where a 4-digit one is expected
static DATE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (Regex::new(r"^\d{4}-\d{1,2}-\d{1,2}$").unwrap(), "%Y-%m-%d"),
        (Regex::new(r"^\d{1,2}/\d{1,2}/\d{4}$").unwrap(), "%d/%m/%Y"),
        (Regex::new(r"^\d{1,2}/\d{1,2}/\d{4}$").unwrap(), "%m/%d/%Y"),
        (Regex::new(r"^\d{4}/\d{1,2}/\d{1,2}$").unwrap(), "%Y/%m/%d"),
        (Regex::new(r"^\d{4}\.\d{1,2}\.\d{1,2}$").unwrap(), "%Y.%m.%d"),
        (Regex::new(r"^\d{1,2}-\d{1,2}-\d{4}$").unwrap(), "%d-%m-%Y"),
    ]
});

static BARE_YEAR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}$").unwrap()
});

// Basic (`20010203T0405`) and hour-only (`2001-02-03T04`) ISO forms
static ISO_COMPACT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{4})-?(\d{2})-?(\d{2})(?:[T ](\d{2})(?::?(\d{2}))?(?::?(\d{2}))?(\.\d+)?)?(?:([+-]\d{2}):?(\d{2}))?$",
    )
    .unwrap()
});

const ISO_OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

const ISO_NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse a date-like string into a naive timestamp.
///
/// Returns `None` for empty input or when no known format matches.
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    for (shape, format) in DATE_PATTERNS.iter() {
        if !shape.is_match(s) {
            continue;
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    if BARE_YEAR_REGEX.is_match(s) {
        return s
            .parse::<i32>()
            .ok()
            .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
            .and_then(|date| date.and_hms_opt(0, 0, 0));
    }

    parse_iso8601(s)
}

/// ISO-8601 fallback. Offsets are dropped and the wall-clock time is kept.
fn parse_iso8601(s: &str) -> Option<NaiveDateTime> {
    let s = match s.strip_suffix('Z') {
        Some(head) => format!("{}+00:00", head),
        None => s.to_string(),
    };

    let s = expand_compact_iso(&s).unwrap_or(s);

    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Some(dt.naive_local());
    }

    for format in ISO_OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&s, format) {
            return Some(dt.naive_local());
        }
    }

    ISO_NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&s, format).ok())
}

/// Rewrite compact ISO forms into the extended `YYYY-MM-DDTHH:MM:SS` layout.
fn expand_compact_iso(s: &str) -> Option<String> {
    let caps = ISO_COMPACT_REGEX.captures(s)?;
    let part = |i: usize| caps.get(i).map_or("00", |m| m.as_str());
    let fraction = caps.get(7).map_or("", |m| m.as_str());
    let offset = match (caps.get(8), caps.get(9)) {
        (Some(hours), Some(minutes)) => format!("{}:{}", hours.as_str(), minutes.as_str()),
        _ => String::new(),
    };
    Some(format!(
        "{}-{}-{}T{}:{}:{}{}{}",
        part(1),
        part(2),
        part(3),
        part(4),
        part(5),
        part(6),
        fraction,
        offset
    ))
}

/// Normalize a JSON value from a raw record.
///
/// Integers go through their decimal form, so `1999` means 1999-01-01.
pub fn normalize_json(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::String(s) => parse_date(s),
        Value::Number(n) if n.is_i64() || n.is_u64() => parse_date(&n.to_string()),
        _ => None,
    }
}

/// Normalize a stored BSON value. Dates pass through unchanged.
pub fn normalize_bson(value: &Bson) -> Option<NaiveDateTime> {
    match value {
        Bson::DateTime(dt) => from_bson_datetime(*dt),
        Bson::String(s) => parse_date(s),
        Bson::Int32(n) => parse_date(&n.to_string()),
        Bson::Int64(n) => parse_date(&n.to_string()),
        _ => None,
    }
}

pub fn to_bson_datetime(ts: NaiveDateTime) -> bson::DateTime {
    bson::DateTime::from_millis(ts.and_utc().timestamp_millis())
}

pub fn from_bson_datetime(dt: bson::DateTime) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(dt.timestamp_millis()).map(|utc| utc.naive_utc())
}

/// BSON representation of an optional timestamp (`null` when absent).
pub fn to_bson(ts: Option<NaiveDateTime>) -> Bson {
    match ts {
        Some(ts) => Bson::DateTime(to_bson_datetime(ts)),
        None => Bson::Null,
    }
}
