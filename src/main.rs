//! # Hybrid Query CLI (`hq`)
//!
//! Runs the engine against the database and index directory named in a
//! TOML config file.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hq schema` | Analyze the database and print the snapshot |
//! | `hq map "<query>"` | Show which tables and columns a query's words resemble |
//! | `hq plan "<query>"` | Show the SQL a query would run |
//! | `hq ingest <paths>...` | Extract, chunk and embed documents |
//! | `hq search "<query>"` | Vector search over ingested documents |
//! | `hq query "<query>"` | Route a query through SQL and/or documents |
//!
//! JSON goes to stdout; logs go to stderr.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hybrid_query::config::{self, Config};
use hybrid_query::files::collect_files;
use hybrid_query::orchestrator::HybridOrchestrator;

/// Hybrid Query: natural-language questions over a database and a document corpus.
#[derive(Parser)]
#[command(name = "hq", version, about = "Natural-language queries over SQL data and documents")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/hq.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze the configured database and print the schema snapshot.
    Schema,

    /// Fuzzy-match query words to table and column names.
    Map {
        query: String,
    },

    /// Print the SQL plan for a query without executing it.
    Plan {
        query: String,
    },

    /// Ingest files and directories into the vector index.
    ///
    /// Directories are walked recursively and filtered by `[ingest]` globs.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Job identifier reported with the status (generated when omitted).
        #[arg(long)]
        job_id: Option<String>,
    },

    /// Vector search over ingested documents.
    Search {
        query: String,

        /// Number of hits to return (default from `[retrieval].top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Answer a query through the SQL and/or document paths.
    Query {
        query: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cfg = config::load_config(&cli.config)?;
    let engine = HybridOrchestrator::from_config(&cfg).await?;

    match cli.command {
        Commands::Schema => {
            print_json(&*engine.schema().await)?;
        }
        Commands::Map { query } => {
            print_json(&engine.map_terms(&query).await)?;
        }
        Commands::Plan { query } => match engine.plan(&query).await {
            Some(plan) => {
                println!("{}", plan.to_sql());
                for (name, value) in &plan.params {
                    println!("  :{} = {}", name, value);
                }
            }
            None => println!("no plan"),
        },
        Commands::Ingest { paths, job_id } => {
            run_ingest(&cfg, &engine, &paths, job_id.as_deref()).await?;
        }
        Commands::Search { query, top_k } => {
            let top_k = top_k.unwrap_or(cfg.retrieval.top_k);
            let hits = engine.store().search(&query, top_k).await?;
            if hits.is_empty() {
                eprintln!("No results.");
            }
            print_json(&hits)?;
        }
        Commands::Query { query } => {
            print_json(&engine.process(&query).await)?;
        }
    }

    Ok(())
}

async fn run_ingest(
    cfg: &Config,
    engine: &HybridOrchestrator,
    paths: &[PathBuf],
    job_id: Option<&str>,
) -> Result<()> {
    let files = collect_files(paths, &cfg.ingest)?;
    if files.is_empty() {
        eprintln!("No matching files found.");
    }
    let status = engine.ingest(&files, job_id).await?;
    print_json(&status)?;
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
