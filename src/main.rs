//! # KB Harness CLI (`kbh`)
//!
//! The `kbh` binary is the primary interface for KB Harness. It provides
//! commands for database initialization, document ingestion, search,
//! question answering, collection maintenance, and benchmarking.
//!
//! ## Usage
//!
//! ```bash
//! kbh --config ./config/kbh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kbh init` | Create the SQLite database and run schema migrations |
//! | `kbh ingest <file>` | Chunk, embed and store a JSON document batch |
//! | `kbh search "<query>"` | Similarity search with optional metadata filters |
//! | `kbh ask "<question>"` | Answer a question with the QA pipeline |
//! | `kbh info` | Print collection name, record count and metadata |
//! | `kbh peek` | Print the first few records |
//! | `kbh delete <id>...` | Delete records by id |
//! | `kbh bench full` | Benchmark the pipeline against plain vector search |
//! | `kbh bench quick` | Benchmark a subset of the test cases |
//! | `kbh bench interactive` | Ask ad-hoc questions and time the answers |
//! | `kbh bench show <file>` | Re-render a saved results file |
//!
//! ## Examples
//!
//! ```bash
//! # Ingest a connector export, replacing what was there
//! kbh ingest ./data/docs.json --clear-existing --test-search "kafka"
//!
//! # Search one service's pages only
//! kbh search "retry policy" --where service=order-processor
//!
//! # Benchmark an external answering service
//! kbh bench full --endpoint http://localhost:8000/ask
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use kb_harness::bench_cmd::{self, BenchOptions};
use kb_harness::config::{self, Config};
use kb_harness::ingest::IngestOptions;
use kb_harness::progress::ProgressMode;
use kb_harness::{ask, info, ingest, logging, migrate, search};

/// KB Harness CLI: a local-first knowledge base with a QA pipeline and a
/// documentation benchmark.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/kbh.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "kbh",
    about = "KB Harness: knowledge base retrieval, question answering and benchmarking",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kbh.toml")]
    config: PathBuf,

    /// Collection to use instead of `[collection] name`.
    #[arg(long, global = true)]
    collection: Option<String>,

    /// More log output (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the collection tables. Safe to
    /// run more than once.
    Init,

    /// Ingest a JSON array of `{id, content, metadata}` documents.
    ///
    /// The whole batch is validated before anything is written. Long
    /// documents are split into overlapping chunks.
    Ingest {
        /// Path to the document batch.
        file: PathBuf,

        /// Delete every existing record in the collection first.
        #[arg(long)]
        clear_existing: bool,

        /// Show document and chunk counts without writing.
        #[arg(long)]
        dry_run: bool,

        /// Run this query after ingesting and print the top hits.
        #[arg(long)]
        test_search: Option<String>,
    },

    /// Similarity search over the collection.
    Search {
        /// The search query string.
        query: String,

        /// Number of results (defaults to `[retrieval] top_k`).
        #[arg(short, long)]
        k: Option<usize>,

        /// Metadata filter as `key=value`; repeat to require several.
        #[arg(long = "where")]
        filters: Vec<String>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Answer a question from the collection's documents.
    Ask {
        question: String,

        /// Number of chunks to retrieve (defaults to `[retrieval] top_k`).
        #[arg(short, long)]
        k: Option<usize>,

        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print collection name, record count and metadata.
    Info,

    /// Print the first records of the collection.
    Peek {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Delete records by id. Unknown ids are ignored.
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Run the documentation benchmark.
    Bench {
        #[command(subcommand)]
        mode: BenchMode,

        /// Evaluate this HTTP answering service instead of the built-in
        /// pipeline.
        #[arg(long, global = true)]
        endpoint: Option<String>,

        /// Per-case progress: `auto`, `off`, `human` or `json` (stderr).
        #[arg(long, global = true, default_value = "auto")]
        progress: String,

        /// Directory for results files (defaults to `[benchmark] output_dir`).
        #[arg(long, global = true)]
        output_dir: Option<PathBuf>,
    },
}

/// Benchmark subcommands.
#[derive(Subcommand)]
enum BenchMode {
    /// Evaluate the pipeline and the baseline, then compare them.
    Full,
    /// Evaluate the first few test cases only.
    Quick {
        /// Number of cases (defaults to `[benchmark] quick_cases`).
        #[arg(long)]
        cases: Option<usize>,
    },
    /// Read questions from stdin and show timed answers.
    Interactive,
    /// Re-render the report of a saved results file.
    Show { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // `bench show` only reads a results file; a missing config is fine,
    // a broken one is still an error.
    if let Commands::Bench {
        mode: BenchMode::Show { file },
        ..
    } = &cli.command
    {
        let cfg = if cli.config.exists() {
            config::load_config(&cli.config)?
        } else {
            Config::minimal()
        };
        logging::init(&cfg.logging, cli.verbose, cli.quiet)?;
        return bench_cmd::run_show(file);
    }

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging, cli.verbose, cli.quiet)?;
    let collection = cli.collection.as_deref();

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            file,
            clear_existing,
            dry_run,
            test_search,
        } => {
            let options = IngestOptions {
                collection: cli.collection.clone(),
                clear_existing,
                dry_run,
                test_search,
            };
            ingest::run_ingest(&cfg, &file, &options).await?;
        }
        Commands::Search {
            query,
            k,
            filters,
            json,
        } => {
            search::run_search(&cfg, &query, k, &filters, collection, json).await?;
        }
        Commands::Ask { question, k, json } => {
            ask::run_ask(&cfg, &question, k, collection, json).await?;
        }
        Commands::Info => {
            info::run_info(&cfg, collection).await?;
        }
        Commands::Peek { limit } => {
            info::run_peek(&cfg, limit, collection).await?;
        }
        Commands::Delete { ids } => {
            info::run_delete(&cfg, &ids, collection).await?;
        }
        Commands::Bench {
            mode,
            endpoint,
            progress,
            output_dir,
        } => {
            let options = BenchOptions {
                endpoint,
                progress: ProgressMode::parse(&progress)?,
                output_dir,
            };
            match mode {
                BenchMode::Full => bench_cmd::run_full(&cfg, &options).await?,
                BenchMode::Quick { cases } => bench_cmd::run_quick(&cfg, cases, &options).await?,
                BenchMode::Interactive => bench_cmd::run_interactive(&cfg, &options).await?,
                // Handled above (before config loading)
                BenchMode::Show { .. } => unreachable!(),
            }
        }
    }

    Ok(())
}
