//! library-ingest: Load Open Library dumps or a simplified JSON sample into MongoDB
//!
//! The dump format (JSON lines or tab-separated with a JSON column) is
//! detected per file; `.gz` sources are read transparently.
//!
//! Usage:
//!   # Authors + works dumps
//!   library-ingest --authors ol_dump_authors.txt.gz --works ol_dump_works.txt.gz
//!
//!   # First 50k works against a partial author scan, fresh collection
//!   library-ingest --authors a.txt --works w.txt \
//!       --authors-scan-limit 300000 --works-limit 50000 --drop --verify-after
//!
//!   # Simplified sample (JSON array or JSON lines)
//!   library-ingest --json-sample books.json

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser};
use library_ingest::config::ConnectionArgs;
use library_ingest::ingest::{
    build_authors, check_input, ensure_indexes, ingest_sample, ingest_works, prepare_collection,
    verify, DEFAULT_BATCH_SIZE, DUMP_EXTENSIONS, SAMPLE_EXTENSIONS,
};
use library_ingest::logging::{init_logging, spinner};
use library_ingest::store::{BookStore, MongoStore};
use mongodb::bson::Bson;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "library-ingest")]
#[command(about = "Ingest bibliographic dumps into MongoDB", long_about = None)]
#[command(group(ArgGroup::new("source").required(true).args(["json_sample", "authors"])))]
struct Args {
    /// Simplified sample: JSON array or JSON lines, optionally .gz
    #[arg(long, value_name = "PATH")]
    json_sample: Option<PathBuf>,

    /// Authors dump (.txt/.tsv/.json/.jsonl/.ndjson, optionally .gz)
    #[arg(long, value_name = "PATH", requires = "works")]
    authors: Option<PathBuf>,

    /// Works dump, same formats as --authors
    #[arg(long, value_name = "PATH", requires = "authors")]
    works: Option<PathBuf>,

    /// Author records to scan (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    authors_scan_limit: usize,

    /// Work records to read (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    works_limit: usize,

    /// Documents per insert batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch: usize,

    /// Drop the collection before ingesting
    #[arg(long)]
    drop: bool,

    /// Print the document count and one sample document afterwards
    #[arg(long)]
    verify_after: bool,

    #[command(flatten)]
    connection: ConnectionArgs,

    /// Debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn limit(n: usize) -> Option<usize> {
    (n > 0).then_some(n)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.batch == 0 {
        bail!("--batch must be at least 1");
    }

    // Validate inputs before touching the store
    if let Some(sample) = &args.json_sample {
        check_input(sample, SAMPLE_EXTENSIONS)?;
    }
    if let (Some(authors), Some(works)) = (&args.authors, &args.works) {
        check_input(authors, DUMP_EXTENSIONS)?;
        check_input(works, DUMP_EXTENSIONS)?;
    }

    let config = args.connection.resolve();
    let store = MongoStore::connect(&config)
        .with_context(|| format!("Failed to reach MongoDB at {}", config.uri))?;
    prepare_collection(&store, args.drop)?;

    if let Some(sample) = &args.json_sample {
        let progress = spinner("sample");
        let report = ingest_sample(&store, sample, args.batch, &progress)
            .with_context(|| format!("Failed to ingest {}", sample.display()))?;
        progress.finish_and_clear();
        println!("sample:  {}", report);
    } else if let (Some(authors), Some(works)) = (&args.authors, &args.works) {
        let progress = spinner("authors");
        let (index, author_report) =
            build_authors(authors, limit(args.authors_scan_limit), &progress)
                .with_context(|| format!("Failed to index {}", authors.display()))?;
        progress.finish_and_clear();
        println!("authors: {}", author_report);

        let progress = spinner("works");
        let report = ingest_works(
            &store,
            works,
            &index,
            limit(args.works_limit),
            args.batch,
            &progress,
        )
        .with_context(|| format!("Failed to ingest {}", works.display()))?;
        progress.finish_and_clear();
        println!("works:   {}", report);
    }

    let created = ensure_indexes(&store)?;
    info!(created = created.len(), "indexes ensured");

    if args.verify_after {
        let (count, sample) = verify(&store)?;
        println!("documents in {}: {}", store.namespace(), count);
        if let Some(doc) = sample {
            let json = Bson::Document(doc).into_relaxed_extjson();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }

    Ok(())
}
