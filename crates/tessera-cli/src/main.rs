//! Tessera CLI - inspect and edit Tessera stores from the command line

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tessera::prelude::*;

mod commands;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendArg {
    Lmdb,
    Sqlite,
}

#[derive(Parser)]
#[command(name = "tessera")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Storage engine of the store
    #[arg(short, long, value_enum, default_value = "lmdb")]
    backend: BackendArg,

    /// LMDB directory or SQLite database file
    #[arg(short, long, default_value = "./data")]
    path: PathBuf,

    /// JSON store configuration; overrides --backend and --path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backend kind, versionstamp and entry count
    Status,

    /// Print one entry
    Get {
        /// Key as a JSON array (`["users","u1"]`) or comma-joined text (`users,u1`)
        key: String,
    },

    /// Write one entry
    Set {
        key: String,

        /// Value as JSON
        value: String,

        /// Expire the entry after this many milliseconds
        #[arg(long)]
        expire_in_ms: Option<u64>,
    },

    /// Delete one entry
    Delete { key: String },

    /// List entries under a prefix
    List {
        /// Key prefix; omit to list everything
        prefix: Option<String>,

        /// Maximum number of entries
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Descending key order
        #[arg(short, long)]
        reverse: bool,

        /// Continue after the cursor printed by a previous listing
        #[arg(long)]
        cursor: Option<String>,
    },
}

impl Cli {
    fn store_config(&self) -> Result<StoreConfig> {
        let config = match &self.config {
            Some(path) => StoreConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => match self.backend {
                BackendArg::Lmdb => StoreConfig::lmdb(&self.path),
                BackendArg::Sqlite => StoreConfig::sqlite(&self.path),
            },
        };
        // One-shot commands have no use for the background sweeper.
        Ok(config.with_expiry_sweep_interval(std::time::Duration::ZERO))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = cli.store_config()?;
    let db = TesseraDb::open(config)
        .await
        .context("Failed to open store")?;
    tracing::debug!(backend = ?db.config().backend, "Store opened");

    let result = match cli.command {
        Commands::Status => commands::status::execute(&db).await,
        Commands::Get { key } => commands::entry::get(&db, &key).await,
        Commands::Set {
            key,
            value,
            expire_in_ms,
        } => commands::entry::set(&db, &key, &value, expire_in_ms).await,
        Commands::Delete { key } => commands::entry::delete(&db, &key).await,
        Commands::List {
            prefix,
            limit,
            reverse,
            cursor,
        } => commands::list::execute(&db, prefix.as_deref(), limit, reverse, cursor.as_deref()).await,
    };

    db.close().await.context("Failed to close store")?;
    result
}
