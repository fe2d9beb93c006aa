//! # Find Open Data CLI (`fod`)
//!
//! Sketches JSON Lines tables into a SQLite sketch store and searches it
//! for joinable columns.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fod init` | Create the SQLite database and run schema migrations |
//! | `fod sketch <FILE>...` | Sketch JSON Lines files, one concurrent job per file |
//! | `fod query <ID>` | Rank joinable columns for a column sketch id |
//! | `fod stats` | Show table, column and per-source counts |
//! | `fod serve` | Build the LSH index and start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! fod init --config ./config/fod.toml
//! fod sketch data/parks.jsonl data/zips.jsonl --source data.cityofnewyork.us
//! fod query 3f2a0c1e-... --limit 10
//! fod serve
//! ```

mod config;
mod db;
mod ingest;
mod migrate;
mod progress;
mod query;
mod server;
mod sqlite_store;
mod stats;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use progress::ProgressMode;

/// Find Open Data CLI: column sketching and joinable column search.
#[derive(Parser)]
#[command(
    name = "fod",
    about = "Find Open Data — column sketching and joinable column search",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/fod.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Auto,
    Off,
    Human,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the `tables` and
    /// `column_sketches` tables. Safe to run repeatedly.
    Init,

    /// Sketch one or more JSON Lines files.
    ///
    /// Each file becomes one table; every key seen in its records becomes a
    /// column sketch. Files whose content hash is unchanged since the last
    /// run are skipped unless `--force` is given.
    Sketch {
        /// JSON Lines files, one object per line.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Publishing host or other origin label for these tables.
        #[arg(long)]
        source: String,

        /// Table name (single file only). Defaults to the file stem.
        #[arg(long)]
        name: Option<String>,

        /// Re-sketch even if the file content is unchanged.
        #[arg(long)]
        force: bool,

        /// Progress output on stderr.
        #[arg(long, value_enum, default_value = "auto")]
        progress: ProgressArg,
    },

    /// Rank joinable columns for a column sketch id.
    Query {
        /// Column sketch id (as printed by `fod sketch`).
        id: String,

        /// Only rank columns from this source.
        #[arg(long)]
        source: Option<String>,

        /// Maximum number of results (default: `[query] top_k_limit`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show sketch database statistics.
    Stats,

    /// Build the LSH index and start the HTTP server.
    Serve,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    init_tracing(&cfg.logging.level);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sketch {
            files,
            source,
            name,
            force,
            progress,
        } => {
            let mode = match progress {
                ProgressArg::Auto => ProgressMode::default_for_tty(),
                ProgressArg::Off => ProgressMode::Off,
                ProgressArg::Human => ProgressMode::Human,
                ProgressArg::Json => ProgressMode::Json,
            };
            let reporter = mode.reporter();
            ingest::run_sketch_cmd(&cfg, files, source, name, force, reporter.as_ref()).await?;
        }
        Commands::Query { id, source, limit } => {
            query::run_query(&cfg, &id, source, limit).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
