//! # Library Ingest - bibliographic dumps into a document store
//!
//! Loads Open Library style author/work dumps and simplified JSON book
//! samples into a MongoDB collection, then runs cleanup and reporting
//! queries against it.
//!
//! ## Modules
//!
//! - **dates**: lenient date parsing into naive timestamps
//! - **records**: format detection (JSON lines vs. tab-separated with a JSON
//!   column), streaming and record classification
//! - **books**: author index, record → document mapping, document shapes
//! - **store**: the `BookStore` seam with MongoDB and in-memory backends
//! - **ingest**: batch writer, run-mode pipelines, index maintenance
//! - **queries**: cleanup and analytical helpers
//!
//! ## Quick Start
//!
//! ```rust
//! use library_ingest::books::{map_work, AuthorIndex, BookDocument};
//! use library_ingest::ingest::BatchWriter;
//! use library_ingest::records::RecordFormat;
//! use library_ingest::store::{BookStore, MemoryStore};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut authors = AuthorIndex::new();
//! authors.insert("/authors/OL1A", "Jane Q. Doe");
//!
//! let line = "/type/work\t/works/OL1W\t3\t2020-01-01\t\
//!             {\"key\": \"/works/OL1W\", \"title\": \"Sample Work\", \
//!              \"authors\": [{\"author\": {\"key\": \"/authors/OL1A\"}}]}";
//! let record = RecordFormat::TsvJson.decode_line(line).expect("decodes");
//! let book = map_work(&record, &authors).expect("eligible");
//!
//! let store = MemoryStore::default();
//! let mut writer = BatchWriter::new(&store, 1000);
//! writer.push(&book)?;
//! assert_eq!(writer.finish()?.inserted, 1);
//! assert_eq!(store.count_documents(book.to_document())?, 1);
//! # Ok(())
//! # }
//! ```

pub mod books;
pub mod config;
pub mod dates;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod queries;
pub mod records;
pub mod store;

// Re-export commonly used types for convenience
pub use books::{AuthorIndex, BookDocument, LegacyBook, SampleBook, WorkBook};
pub use config::StoreConfig;
pub use error::{IngestError, Result};
pub use ingest::{BatchWriter, StageReport};
pub use records::{Detection, RecordFormat, RecordStream};
pub use store::{BookStore, MemoryStore, MongoStore, StoreError};
