//! # docsync CLI
//!
//! The `docsync` binary keeps a local vector index synchronized with a
//! directory of documents.
//!
//! ## Usage
//!
//! ```bash
//! docsync --config ./docsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docsync init` | Create the vector index database schema |
//! | `docsync sync` | Reconcile the documents directory against the index |
//! | `docsync search "<query>"` | Semantic search over indexed chunks |
//! | `docsync watch` | Re-sync automatically on file-system changes |
//! | `docsync status` | Show ledger and index counts |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the index
//! docsync init --config ./docsync.toml
//!
//! # Incremental sync (only new/changed documents are embedded)
//! docsync sync --config ./docsync.toml
//!
//! # Preview the classification without touching anything
//! docsync sync --dry-run
//!
//! # Re-embed everything from scratch
//! docsync sync --full
//!
//! # Search
//! docsync search "impact of tariffs on Chinese equities" --limit 5
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docsync::{config, index, search, status, sync, watch};

/// docsync — incremental document ingestion and vector-index
/// synchronization for local knowledge bases.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file with `[documents]`, `[ledger]`, `[index]`, and `[embedding]`
/// sections.
#[derive(Parser)]
#[command(
    name = "docsync",
    about = "Keep a local vector index synchronized with a directory of documents",
    version,
    long_about = "docsync fingerprints documents under a root directory and keeps a vector \
    index in step with the file system: only new or changed documents are re-chunked and \
    re-embedded, and deleted documents are purged from the index."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./docsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the vector index database.
    ///
    /// Creates the SQLite database file and schema. Idempotent — running
    /// it multiple times is safe.
    Init,

    /// Reconcile the documents directory against the index.
    ///
    /// Classifies every candidate file as new, changed, unchanged, or
    /// deleted by comparing content fingerprints against the ledger, then
    /// embeds and upserts only what actually changed.
    Sync {
        /// Ignore the ledger's fingerprints — re-embed every document.
        #[arg(long)]
        full: bool,

        /// Show the classification without embedding or writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Semantic search over indexed chunks.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long, default_value_t = 5)]
        limit: usize,

        /// Restrict results to one document path (as shown by sync).
        #[arg(long)]
        path: Option<String>,
    },

    /// Watch the documents root and re-sync on changes.
    ///
    /// Runs an initial sync, then re-runs the same batch sync after each
    /// debounced burst of file-system events. Runs until interrupted.
    Watch,

    /// Show ledger and index counts.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let idx = index::SqliteIndex::connect(
                &cfg.index.path,
                cfg.embedding.dims.unwrap_or_default(),
            )
            .await?;
            idx.init_schema().await?;
            idx.close().await;
            println!("Index initialized successfully.");
        }
        Commands::Sync { full, dry_run } => {
            sync::run_sync(&cfg, full, dry_run).await?;
        }
        Commands::Search { query, limit, path } => {
            search::run_search(&cfg, &query, limit, path.as_deref()).await?;
        }
        Commands::Watch => {
            watch::run_watch(&cfg).await?;
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
    }

    Ok(())
}
