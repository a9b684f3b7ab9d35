//! library-ingest-legacy: Load works with the first author split into first/last name
//!
//! Produces the document shape the cleanup queries in `library-tasks` work
//! on (`author_first_name`, `author_last_name`, `country`, `published_date`).
//!
//! Usage:
//!   library-ingest-legacy --authors ol_dump_authors.txt.gz --works ol_dump_works.txt.gz

use anyhow::{bail, Context, Result};
use clap::Parser;
use library_ingest::config::ConnectionArgs;
use library_ingest::ingest::{
    build_authors, check_input, ensure_legacy_indexes, ingest_works_legacy, prepare_collection,
    DEFAULT_BATCH_SIZE, DUMP_EXTENSIONS,
};
use library_ingest::logging::{init_logging, spinner};
use library_ingest::store::MongoStore;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "library-ingest-legacy")]
#[command(about = "Ingest works as first-author documents", long_about = None)]
struct Args {
    /// Authors dump
    #[arg(long, value_name = "PATH")]
    authors: PathBuf,

    /// Works dump
    #[arg(long, value_name = "PATH")]
    works: PathBuf,

    /// Author records to scan (0 = unlimited)
    #[arg(long, default_value_t = 500_000)]
    authors_scan_limit: usize,

    /// Work records to read (0 = unlimited)
    #[arg(long, default_value_t = 200_000)]
    works_limit: usize,

    /// Documents per insert batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch: usize,

    /// Drop the collection before ingesting
    #[arg(long)]
    drop: bool,

    #[command(flatten)]
    connection: ConnectionArgs,

    /// Debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.batch == 0 {
        bail!("--batch must be at least 1");
    }
    check_input(&args.authors, DUMP_EXTENSIONS)?;
    check_input(&args.works, DUMP_EXTENSIONS)?;

    let config = args.connection.resolve();
    let store = MongoStore::connect(&config)
        .with_context(|| format!("Failed to reach MongoDB at {}", config.uri))?;
    prepare_collection(&store, args.drop)?;

    let limit = |n: usize| (n > 0).then_some(n);

    let progress = spinner("authors");
    let (index, author_report) = build_authors(&args.authors, limit(args.authors_scan_limit), &progress)
        .with_context(|| format!("Failed to index {}", args.authors.display()))?;
    progress.finish_and_clear();
    println!("authors: {}", author_report);

    let progress = spinner("works");
    let report = ingest_works_legacy(
        &store,
        &args.works,
        &index,
        limit(args.works_limit),
        args.batch,
        &progress,
    )
    .with_context(|| format!("Failed to ingest {}", args.works.display()))?;
    progress.finish_and_clear();
    println!("works:   {}", report);

    ensure_legacy_indexes(&store)?;
    Ok(())
}
