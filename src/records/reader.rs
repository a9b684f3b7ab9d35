//! Record stream reading
//!
//! Opens plain or gzip-compressed sources and yields decoded records one
//! line at a time. Lines that fail to decode are skipped and tallied.

use flate2::read::MultiGzDecoder;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::debug;

use super::detect::{detect_format, Detection, RecordFormat, DEFAULT_SAMPLE_LINES};
use crate::error::{IngestError, Result};

/// A decoded dump record
pub type Record = Map<String, Value>;

pub fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// Check the extension under an optional `.gz` suffix against `allowed`.
pub fn ensure_extension(path: &Path, allowed: &[&str]) -> Result<()> {
    let inner = if is_gzip(path) {
        path.file_stem().map(Path::new)
    } else {
        Some(path)
    };
    let ext = inner
        .and_then(Path::extension)
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match ext {
        Some(ext) if allowed.contains(&ext.as_str()) => Ok(()),
        _ => Err(IngestError::UnsupportedFormat {
            path: path.to_path_buf(),
            expected: allowed
                .iter()
                .map(|ext| format!(".{}[.gz]", ext))
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

/// Open a source for reading, decompressing `.gz` files transparently.
pub fn open_source(path: &Path) -> Result<Box<dyn BufRead>> {
    if !path.exists() {
        return Err(IngestError::MissingInput(path.to_path_buf()));
    }
    let file = File::open(path).map_err(|source| IngestError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    if is_gzip(path) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Lines decoded as UTF-8 with invalid sequences replaced, line endings removed
pub struct LossyLines<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> LossyLines<R> {
    pub fn new(reader: R) -> Self {
        LossyLines {
            reader,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead> Iterator for LossyLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
                    self.buf.pop();
                }
                Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Lazy, single-pass stream of records from one source, in file order.
///
/// Yields `Err` only for I/O failures, after which the stream ends.
pub struct RecordStream<R> {
    lines: LossyLines<R>,
    format: RecordFormat,
    malformed: u64,
    failed: bool,
}

impl<R: BufRead> RecordStream<R> {
    pub fn new(reader: R, format: RecordFormat) -> Self {
        RecordStream {
            lines: LossyLines::new(reader),
            format,
            malformed: 0,
            failed: false,
        }
    }

    pub fn format(&self) -> RecordFormat {
        self.format
    }

    /// Non-blank lines that did not decode to a record so far
    pub fn malformed_lines(&self) -> u64 {
        self.malformed
    }
}

impl RecordStream<Box<dyn BufRead>> {
    /// Detect the format of the file at `path`, then reopen it for streaming.
    pub fn open(path: &Path) -> Result<(Self, Detection)> {
        let detection = detect_format(open_source(path)?, DEFAULT_SAMPLE_LINES)
            .map_err(|source| IngestError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(
            path = %path.display(),
            mode = %detection.format,
            json_hits = detection.json_hits,
            tsv_hits = detection.tsv_hits,
            "detected record format"
        );
        let stream = RecordStream::new(open_source(path)?, detection.format);
        Ok((stream, detection))
    }
}

impl<R: BufRead> Iterator for RecordStream<R> {
    type Item = io::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match self.format.decode_line(&line) {
                Some(record) => return Some(Ok(record)),
                None => self.malformed += 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};

    const MIXED: &str = "{\"key\": \"/works/OL1W\"}\n\
        not json at all\n\
        \n\
        /type/work\t/works/OL2W\t{\"key\": \"/works/OL2W\"}\n\
        {\"key\": \"/works/OL3W\"}\r\n";

    fn keys<R: BufRead>(stream: RecordStream<R>) -> Vec<String> {
        stream
            .map(|r| r.unwrap()["key"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_stream_skips_malformed_lines() {
        let mut stream = RecordStream::new(Cursor::new(MIXED), RecordFormat::JsonLines);
        let first = stream.next().unwrap().unwrap();
        assert_eq!(first["key"], "/works/OL1W");

        let rest: Vec<_> = stream.by_ref().map(|r| r.unwrap()).collect();
        assert_eq!(rest.len(), 2);
        assert_eq!(stream.malformed_lines(), 1);
    }

    #[test]
    fn test_stream_preserves_file_order() {
        let stream = RecordStream::new(Cursor::new(MIXED), RecordFormat::TsvJson);
        assert_eq!(keys(stream), vec!["/works/OL1W", "/works/OL2W", "/works/OL3W"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut bytes = b"{\"name\": \"caf".to_vec();
        bytes.push(0xff);
        bytes.extend_from_slice(b"\"}\n");
        let records: Vec<_> = RecordStream::new(Cursor::new(bytes), RecordFormat::JsonLines)
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(records.len(), 1);
        assert!(records[0]["name"].as_str().unwrap().starts_with("caf"));
    }

    #[test]
    fn test_open_gzip_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("works.txt.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(MIXED.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let (stream, detection) = RecordStream::open(&path).unwrap();
        assert_eq!(detection.json_hits, 2);
        assert_eq!(detection.tsv_hits, 1);
        assert_eq!(keys(stream).len(), 3);
    }

    #[test]
    fn test_open_concatenated_gzip_members() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("works.jsonl.gz");
        let mut file = File::create(&path).unwrap();
        for line in ["{\"key\": \"/works/OL1W\"}\n", "{\"key\": \"/works/OL2W\"}\n"] {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(line.as_bytes()).unwrap();
            file.write_all(&encoder.finish().unwrap()).unwrap();
        }
        drop(file);

        let (stream, _) = RecordStream::open(&path).unwrap();
        assert_eq!(keys(stream), vec!["/works/OL1W", "/works/OL2W"]);
    }

    #[test]
    fn test_missing_source() {
        let err = open_source(Path::new("/definitely/not/here.txt")).err().unwrap();
        assert!(matches!(err, IngestError::MissingInput(_)));
    }

    #[test]
    fn test_extension_check() {
        let allowed = ["txt", "jsonl"];
        assert!(ensure_extension(Path::new("ol_dump_authors.txt.gz"), &allowed).is_ok());
        assert!(ensure_extension(Path::new("sample.JSONL"), &allowed).is_ok());
        assert!(ensure_extension(Path::new("books.csv"), &allowed).is_err());
        assert!(ensure_extension(Path::new("books.gz"), &allowed).is_err());
        assert!(ensure_extension(Path::new("noext"), &allowed).is_err());
    }
}
