//! Record format detection
//!
//! Open Library dumps come either as JSON Lines or as tab-separated rows
//! whose JSON payload sits in a trailing column. The detector samples a
//! prefix of the source and picks a strategy for the whole file; each line
//! still falls back to the other strategy when the chosen one fails.

use serde_json::{Map, Value};
use std::io::{self, BufRead};

use super::reader::LossyLines;

/// Lines sampled when detecting a source's format
pub const DEFAULT_SAMPLE_LINES: usize = 50;

/// Line decoding strategy for a whole source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    /// Each line is a JSON object
    JsonLines,
    /// Tab-separated fields, JSON object in the last column
    TsvJson,
}

impl RecordFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordFormat::JsonLines => "json",
            RecordFormat::TsvJson => "tsv_json",
        }
    }

    /// Decode one line with this strategy, falling back to the other one.
    pub fn decode_line(self, line: &str) -> Option<Map<String, Value>> {
        match self {
            RecordFormat::JsonLines => parse_json_object(line).or_else(|| parse_tsv_object(line)),
            RecordFormat::TsvJson => parse_tsv_object(line).or_else(|| parse_json_object(line)),
        }
    }
}

impl std::fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a whole string as a JSON object.
pub fn parse_json_object(s: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(s) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => None,
    }
}

/// Parse a tab-separated line, taking the JSON object from the rightmost
/// field that holds one (normally the last).
///
/// Lines without a tab are never TSV.
pub fn parse_tsv_object(line: &str) -> Option<Map<String, Value>> {
    if !line.contains('\t') {
        return None;
    }
    line.rsplit('\t').find_map(parse_json_object)
}

/// Outcome of sampling a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub format: RecordFormat,
    pub json_hits: usize,
    pub tsv_hits: usize,
}

impl Detection {
    /// TSV wins when it has any hits and at least as many as whole-line JSON.
    pub fn from_hits(json_hits: usize, tsv_hits: usize) -> Self {
        let format = if tsv_hits > 0 && tsv_hits >= json_hits {
            RecordFormat::TsvJson
        } else {
            RecordFormat::JsonLines
        };
        Detection {
            format,
            json_hits,
            tsv_hits,
        }
    }
}

/// Sample up to `sample_lines` lines and classify the source.
///
/// Blank lines use up the sample budget without counting as hits.
pub fn detect_format<R: BufRead>(reader: R, sample_lines: usize) -> io::Result<Detection> {
    let mut json_hits = 0;
    let mut tsv_hits = 0;

    for line in LossyLines::new(reader).take(sample_lines) {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if parse_json_object(line).is_some() {
            json_hits += 1;
        } else if parse_tsv_object(line).is_some() {
            tsv_hits += 1;
        }
    }

    Ok(Detection::from_hits(json_hits, tsv_hits))
}
