//! The ingestion run modes
//!
//! Each stage streams its source, maps records to documents and writes them
//! through a [`BatchWriter`], returning a [`StageReport`]. Malformed lines
//! and ineligible records are counted, never fatal.

use indicatif::ProgressBar;
use mongodb::bson::Document;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, BufRead, Read};
use std::path::Path;
use tracing::{debug, info, warn};

use super::writer::BatchWriter;
use crate::books::{
    build_author_index, coerce_sample_book, map_work, map_work_legacy, AuthorIndex, BookDocument,
    Ineligible,
};
use crate::error::{IngestError, Result};
use crate::records::{ensure_extension, open_source, Record, RecordFormat, RecordStream};
use crate::store::BookStore;

/// Extensions accepted for dump sources (each optionally `.gz`)
pub const DUMP_EXTENSIONS: &[&str] = &["txt", "tsv", "json", "jsonl", "ndjson"];

/// Extensions accepted for the simplified sample
pub const SAMPLE_EXTENSIONS: &[&str] = &["json", "jsonl", "ndjson"];

const PROGRESS_EVERY: u64 = 10_000;

/// Per-stage counters printed at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Records read, bounded by the stage limit
    pub scanned: u64,
    /// Records that produced a document (or an index entry)
    pub kept: u64,
    /// Store-confirmed inserts
    pub inserted: u64,
    /// Non-blank lines that did not decode
    pub malformed: u64,
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scanned={} kept={} inserted={}",
            self.scanned, self.kept, self.inserted
        )?;
        if self.malformed > 0 {
            write!(f, " malformed={}", self.malformed)?;
        }
        Ok(())
    }
}

fn read_error(path: &Path) -> impl FnOnce(io::Error) -> IngestError + '_ {
    move |source| IngestError::Read {
        path: path.to_path_buf(),
        source,
    }
}

fn tick(progress: &ProgressBar, report: &StageReport) {
    progress.inc(1);
    if report.scanned % PROGRESS_EVERY == 0 {
        progress.set_message(format!("{}", report));
    }
}

/// Build the author index from an authors dump.
pub fn build_authors(
    path: &Path,
    scan_limit: Option<usize>,
    progress: &ProgressBar,
) -> Result<(AuthorIndex, StageReport)> {
    info!(path = %path.display(), limit = ?scan_limit, "building author index");
    let (mut stream, _) = RecordStream::open(path)?;

    let scan = build_author_index(stream.by_ref().inspect(|_| progress.inc(1)), scan_limit)
        .map_err(read_error(path))?;

    let report = StageReport {
        scanned: scan.scanned,
        kept: scan.index.len() as u64,
        inserted: 0,
        malformed: stream.malformed_lines(),
    };
    info!(%report, "author index ready");
    Ok((scan.index, report))
}

/// Stream `records`, map each one and write the results.
fn write_mapped<S, I, D, F>(
    store: &S,
    records: I,
    batch_size: usize,
    progress: &ProgressBar,
    mut map: F,
) -> Result<StageReport>
where
    S: BookStore + ?Sized,
    I: Iterator<Item = io::Result<Value>>,
    D: BookDocument,
    F: FnMut(&Value) -> std::result::Result<D, Ineligible>,
{
    let mut writer = BatchWriter::new(store, batch_size);
    let mut report = StageReport::default();
    let mut skipped: BTreeMap<String, u64> = BTreeMap::new();

    for record in records {
        let record = record?;
        report.scanned += 1;
        tick(progress, &report);

        match map(&record) {
            Ok(book) => {
                writer.push(&book)?;
                report.kept += 1;
            }
            Err(reason) => *skipped.entry(format!("{:?}", reason)).or_insert(0) += 1,
        }
    }

    report.inserted = writer.finish()?.inserted;
    if !skipped.is_empty() {
        debug!(?skipped, "ineligible records");
    }
    Ok(report)
}

fn work_records<'r, R: BufRead + 'r>(
    stream: &'r mut RecordStream<R>,
    limit: Option<usize>,
) -> impl Iterator<Item = io::Result<Value>> + 'r {
    stream
        .take(limit.unwrap_or(usize::MAX))
        .map(|record| record.map(Value::Object))
}

/// Works-dump mode: every resolvable author per work.
pub fn ingest_works<S: BookStore + ?Sized>(
    store: &S,
    path: &Path,
    index: &AuthorIndex,
    limit: Option<usize>,
    batch_size: usize,
    progress: &ProgressBar,
) -> Result<StageReport> {
    info!(path = %path.display(), limit = ?limit, "ingesting works");
    let (mut stream, _) = RecordStream::open(path)?;

    let mut report = write_mapped(
        store,
        work_records(&mut stream, limit),
        batch_size,
        progress,
        |value| map_work(as_record(value)?, index),
    )
    .map_err(|e| with_path(e, path))?;
    report.malformed = stream.malformed_lines();

    info!(%report, "works ingested");
    Ok(report)
}

/// Legacy mode: first resolvable author split into first/last name.
pub fn ingest_works_legacy<S: BookStore + ?Sized>(
    store: &S,
    path: &Path,
    index: &AuthorIndex,
    limit: Option<usize>,
    batch_size: usize,
    progress: &ProgressBar,
) -> Result<StageReport> {
    info!(path = %path.display(), limit = ?limit, "ingesting works (legacy shape)");
    let (mut stream, _) = RecordStream::open(path)?;

    let mut report = write_mapped(
        store,
        work_records(&mut stream, limit),
        batch_size,
        progress,
        |value| map_work_legacy(as_record(value)?, index),
    )
    .map_err(|e| with_path(e, path))?;
    report.malformed = stream.malformed_lines();

    info!(%report, "works ingested");
    Ok(report)
}

fn as_record(value: &Value) -> std::result::Result<&Record, Ineligible> {
    value.as_object().ok_or(Ineligible::WrongKind)
}

/// Attach the source path to bare I/O errors from the stream.
fn with_path(err: IngestError, path: &Path) -> IngestError {
    match err {
        IngestError::Io(source) => IngestError::Read {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    }
}

/// Skip leading whitespace and report whether the content opens a JSON array.
fn starts_with_array<R: BufRead>(reader: &mut R) -> io::Result<bool> {
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(false);
        }
        match buf.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(pos) => {
                let is_array = buf[pos] == b'[';
                reader.consume(pos);
                return Ok(is_array);
            }
            None => {
                let len = buf.len();
                reader.consume(len);
            }
        }
    }
}

/// Parse a whole-file JSON array, SIMD first with a serde_json fallback.
fn parse_array(content: Vec<u8>) -> Result<Vec<Value>> {
    // simd-json parses in place; keep the original bytes for the fallback
    let mut scratch = content.clone();
    match simd_json::serde::from_slice::<Vec<Value>>(&mut scratch) {
        Ok(values) => Ok(values),
        Err(e) => {
            debug!(error = %e, "SIMD parse failed, retrying with serde_json");
            Ok(serde_json::from_slice(&content)?)
        }
    }
}

/// Simple-sample mode: a JSON array file or JSON lines, optionally gzipped.
pub fn ingest_sample<S: BookStore + ?Sized>(
    store: &S,
    path: &Path,
    batch_size: usize,
    progress: &ProgressBar,
) -> Result<StageReport> {
    let mut reader = open_source(path)?;
    let is_array = starts_with_array(&mut reader).map_err(read_error(path))?;
    info!(path = %path.display(), array = is_array, "ingesting sample");

    let report = if is_array {
        let mut content = Vec::new();
        reader
            .read_to_end(&mut content)
            .map_err(read_error(path))?;
        let values = parse_array(content)?;
        write_mapped(
            store,
            values.into_iter().map(Ok),
            batch_size,
            progress,
            coerce_sample_book,
        )?
    } else {
        let mut stream = RecordStream::new(reader, RecordFormat::JsonLines);
        let mut report = write_mapped(
            store,
            work_records(&mut stream, None),
            batch_size,
            progress,
            coerce_sample_book,
        )
        .map_err(|e| with_path(e, path))?;
        report.malformed = stream.malformed_lines();
        report
    };

    info!(%report, "sample ingested");
    Ok(report)
}

/// Validate an input path before any store work starts.
pub fn check_input(path: &Path, allowed: &[&str]) -> Result<()> {
    if !path.exists() {
        return Err(IngestError::MissingInput(path.to_path_buf()));
    }
    ensure_extension(path, allowed)
}

/// Log the current document count and optionally drop the collection.
/// A failed drop is logged and the run continues.
pub fn prepare_collection<S: BookStore + ?Sized>(store: &S, drop: bool) -> Result<()> {
    let existing = store.count_documents(Document::new())?;
    info!(namespace = %store.namespace(), existing, "collection before ingest");
    if drop {
        match store.drop_collection() {
            Ok(()) => info!(namespace = %store.namespace(), "dropped collection"),
            Err(e) => warn!(namespace = %store.namespace(), error = %e, "drop failed, continuing"),
        }
    }
    Ok(())
}

/// Count plus one sample document, for post-run verification
pub fn verify<S: BookStore + ?Sized>(store: &S) -> Result<(u64, Option<Document>)> {
    let count = store.count_documents(Document::new())?;
    let sample = store.find_one(Document::new(), None)?;
    Ok((count, sample))
}
