//! library-tasks: Cleanup and reporting queries over the ingested collection
//!
//! Usage:
//!   library-tasks prune
//!   library-tasks first-names
//!   library-tasks convert-dates --field published_date
//!   library-tasks oldest --limit 5
//!   library-tasks countries --pipeline

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use library_ingest::config::ConnectionArgs;
use library_ingest::logging::init_logging;
use library_ingest::queries::{
    convert_date_fields, count_by_country_local, count_by_country_pipeline,
    distinct_author_first_names, oldest_by_published_date, remove_empty_or_null_author_last_name,
    DATE_FIELDS, DEFAULT_OLDEST_LIMIT,
};
use library_ingest::store::MongoStore;
use mongodb::bson::Bson;

#[derive(Parser, Debug)]
#[command(name = "library-tasks")]
#[command(about = "Run cleanup and reporting queries", long_about = None)]
struct Args {
    #[command(subcommand)]
    task: Task,

    #[command(flatten)]
    connection: ConnectionArgs,

    /// Debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Task {
    /// Delete documents with an empty or null author_last_name
    Prune,
    /// List distinct non-empty author first names
    FirstNames,
    /// Convert string date fields to dates
    ConvertDates {
        /// Field to convert (repeatable)
        #[arg(long = "field", value_name = "FIELD")]
        fields: Vec<String>,
    },
    /// Oldest documents by published_date
    Oldest {
        #[arg(long, default_value_t = DEFAULT_OLDEST_LIMIT)]
        limit: i64,
    },
    /// Document counts per country
    Countries {
        /// Use a store-side aggregation instead of an in-process tally
        #[arg(long)]
        pipeline: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = args.connection.resolve();
    let store = MongoStore::connect(&config)
        .with_context(|| format!("Failed to reach MongoDB at {}", config.uri))?;

    match args.task {
        Task::Prune => {
            let deleted = remove_empty_or_null_author_last_name(&store)?;
            println!("deleted {}", deleted);
        }
        Task::FirstNames => {
            for name in distinct_author_first_names(&store)? {
                println!("{}", name);
            }
        }
        Task::ConvertDates { fields } => {
            let fields: Vec<&str> = if fields.is_empty() {
                DATE_FIELDS.to_vec()
            } else {
                fields.iter().map(String::as_str).collect()
            };
            let modified = convert_date_fields(&store, &fields)?;
            println!("modified {}", modified);
        }
        Task::Oldest { limit } => {
            for doc in oldest_by_published_date(&store, limit)? {
                let json = Bson::Document(doc).into_relaxed_extjson();
                println!("{}", serde_json::to_string(&json)?);
            }
        }
        Task::Countries { pipeline } => {
            if pipeline {
                for row in count_by_country_pipeline(&store)? {
                    println!("{}\t{}", row.country, row.count);
                }
            } else {
                for (country, count) in count_by_country_local(&store)? {
                    println!("{}\t{}", country, count);
                }
            }
        }
    }

    Ok(())
}
