//! Ingestion: batch writing, the run-mode pipelines and index maintenance

pub mod indexes;
pub mod pipeline;
pub mod writer;

pub use indexes::{ensure_indexes, ensure_legacy_indexes};
pub use pipeline::{
    build_authors, check_input, ingest_sample, ingest_works, ingest_works_legacy,
    prepare_collection, verify, StageReport, DUMP_EXTENSIONS, SAMPLE_EXTENSIONS,
};
pub use writer::{BatchWriter, WriteTally, DEFAULT_BATCH_SIZE};
