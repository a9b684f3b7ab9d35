//! Integration tests for library-ingest
//!
//! Drive the ingestion pipelines end to end against the in-memory store,
//! then run the cleanup queries over what was written.

use flate2::write::GzEncoder;
use flate2::Compression;
use indicatif::ProgressBar;
use library_ingest::{
    ingest::{
        build_authors, ensure_indexes, ensure_legacy_indexes, ingest_sample, ingest_works,
        ingest_works_legacy,
    },
    queries::{
        convert_date_fields, count_by_country_local, count_by_country_pipeline,
        distinct_author_first_names, remove_empty_or_null_author_last_name, ten_oldest_books,
        DATE_FIELDS,
    },
    records::{RecordFormat, RecordStream},
    store::{BookStore, MemoryStore},
};
use mongodb::bson::{doc, Bson};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const AUTHORS_TSV: &str = concat!(
    "/type/author\t/authors/OL1A\t3\t2021-03-01T00:00:00\t{\"key\": \"/authors/OL1A\", \"type\": {\"key\": \"/type/author\"}, \"name\": \"Jane Q. Doe\"}\n",
    "/type/author\t/authors/OL2A\t1\t2021-03-01T00:00:00\t{\"key\": \"/authors/OL2A\", \"personal_name\": \"Franz Kafka\"}\n",
    "/type/author\t/authors/OL3A\t1\t2021-03-01T00:00:00\t{\"key\": \"/authors/OL3A\", \"name\": \"Plato\"}\n",
    "garbage line without json\n",
);

const WORKS_TSV: &str = concat!(
    "/type/work\t/works/OL1W\t2\t2021-03-01T00:00:00\t{\"key\": \"/works/OL1W\", \"type\": {\"key\": \"/type/work\"}, \"title\": \"Sample Work\", \"first_publish_date\": \"2001\", \"authors\": [{\"author\": {\"key\": \"/authors/OL1A\"}}]}\n",
    "/type/work\t/works/OL2W\t2\t2021-03-01T00:00:00\t{\"key\": \"/works/OL2W\", \"title\": \"The Trial\", \"first_publish_date\": \"1925-04-26\", \"subjects\": [\"Law\"], \"authors\": [{\"author\": {\"key\": \"/authors/OL9A\"}}, {\"author\": {\"key\": \"/authors/OL2A\"}}]}\n",
    "/type/work\t/works/OL3W\t2\t2021-03-01T00:00:00\t{\"key\": \"/works/OL3W\", \"title\": \"Republic\", \"authors\": [{\"author\": {\"key\": \"/authors/OL3A\"}}]}\n",
    "/type/work\t/works/OL4W\t2\t2021-03-01T00:00:00\t{\"key\": \"/works/OL4W\", \"title\": \"Orphan\", \"authors\": [{\"author\": {\"key\": \"/authors/OL404A\"}}]}\n",
    "/type/edition\t/books/OL1M\t2\t2021-03-01T00:00:00\t{\"key\": \"/books/OL1M\", \"title\": \"An edition\"}\n",
);

fn write_plain(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn write_gzip(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    let file = std::fs::File::create(&path).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(contents.as_bytes()).unwrap();
    encoder.finish().unwrap();
    path
}

fn authors_index(path: &Path) -> library_ingest::AuthorIndex {
    let (index, report) = build_authors(path, None, &ProgressBar::hidden()).unwrap();
    assert_eq!(report.scanned, 3);
    assert_eq!(report.malformed, 1);
    index
}

/// Works dump (gzip, tab-separated) joined against the authors dump
#[test]
fn test_works_dump_end_to_end() {
    let dir = TempDir::new().unwrap();
    let authors = write_gzip(&dir, "ol_dump_authors.txt.gz", AUTHORS_TSV);
    let works = write_plain(&dir, "ol_dump_works.txt", WORKS_TSV);

    let (stream, detection) = RecordStream::open(&works).unwrap();
    assert_eq!(detection.format, RecordFormat::TsvJson);
    assert_eq!(stream.format(), RecordFormat::TsvJson);

    let index = authors_index(&authors);
    assert_eq!(index.len(), 3);

    let store = MemoryStore::default();
    let report = ingest_works(&store, &works, &index, None, 2, &ProgressBar::hidden()).unwrap();
    assert_eq!(report.scanned, 5);
    assert_eq!(report.kept, 3);
    assert_eq!(report.inserted, 3);

    let sample = store
        .find_one(doc! {"key": "/works/OL1W"}, Some(doc! {"_id": 0}))
        .unwrap()
        .unwrap();
    assert_eq!(
        sample,
        doc! {
            "key": "/works/OL1W",
            "title": "Sample Work",
            "authors": ["Jane Q. Doe"],
            "subjects": [],
        }
    );

    let trial = store.find_one(doc! {"title": "The Trial"}, None).unwrap().unwrap();
    assert_eq!(trial.get_array("authors").unwrap(), &vec![Bson::from("Franz Kafka")]);
    assert_eq!(trial.get_array("subjects").unwrap(), &vec![Bson::from("Law")]);

    assert_eq!(ensure_indexes(&store).unwrap().len(), 2);
    assert!(ensure_indexes(&store).unwrap().is_empty());
}

/// Legacy shape followed by the cleanup queries
#[test]
fn test_legacy_ingest_then_queries() {
    let dir = TempDir::new().unwrap();
    let authors = write_plain(&dir, "authors.tsv", AUTHORS_TSV);
    let works = write_gzip(&dir, "works.tsv.gz", WORKS_TSV);
    let index = authors_index(&authors);

    let store = MemoryStore::default();
    let report =
        ingest_works_legacy(&store, &works, &index, Some(4), 1000, &ProgressBar::hidden()).unwrap();
    assert_eq!(report.scanned, 4);
    assert_eq!(report.inserted, 3);
    ensure_legacy_indexes(&store).unwrap();

    // Plato has no last name
    assert_eq!(remove_empty_or_null_author_last_name(&store).unwrap(), 1);
    assert_eq!(
        distinct_author_first_names(&store).unwrap(),
        vec!["Franz", "Jane Q."]
    );

    // Published dates were normalized at ingest time; nothing is left as a string
    assert_eq!(convert_date_fields(&store, DATE_FIELDS).unwrap(), 0);

    let oldest = ten_oldest_books(&store).unwrap();
    let titles: Vec<&str> = oldest.iter().map(|d| d.get_str("title").unwrap()).collect();
    assert_eq!(titles, vec!["The Trial", "Sample Work"]);
    assert_eq!(oldest[0].get_str("country").unwrap(), "Unknown");

    let local = count_by_country_local(&store).unwrap();
    let pipeline = count_by_country_pipeline(&store).unwrap();
    assert_eq!(local.get("Unknown"), Some(&2));
    assert_eq!(pipeline.len(), 1);
    assert_eq!(pipeline[0].count, 2);
}

/// Gzipped JSON-array sample plus a JSON-lines sample into the same store
#[test]
fn test_sample_formats() {
    let dir = TempDir::new().unwrap();
    let array = write_gzip(
        &dir,
        "books.json.gz",
        r#"[{"title": "Dune", "authors": ["Frank Herbert"], "subjects": "SF"},
            {"title": "Emma", "author": "Jane Austen"},
            {"authors": ["No Title"]}]"#,
    );
    let lines = write_plain(
        &dir,
        "books.jsonl",
        "{\"title\": \"Ulysses\", \"authors\": \"James Joyce\"}\n{broken\n",
    );

    let store = MemoryStore::default();
    let progress = ProgressBar::hidden();

    let first = ingest_sample(&store, &array, 1000, &progress).unwrap();
    assert_eq!((first.scanned, first.kept, first.inserted), (3, 2, 2));

    let second = ingest_sample(&store, &lines, 1000, &progress).unwrap();
    assert_eq!((second.scanned, second.inserted, second.malformed), (1, 1, 1));

    assert_eq!(store.count_documents(doc! {}).unwrap(), 3);
    assert_eq!(
        store
            .count_documents(doc! {"authors": "Jane Austen"})
            .unwrap(),
        1
    );
    let dune = store.find_one(doc! {"title": "Dune"}, None).unwrap().unwrap();
    assert_eq!(dune.get_array("subjects").unwrap(), &vec![Bson::from("SF")]);
}
