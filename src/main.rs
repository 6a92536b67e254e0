//! # wikisync CLI
//!
//! The `wikisync` binary drives the sync engine from the command line.
//!
//! ## Usage
//!
//! ```bash
//! wikisync --config ./wikisync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `wikisync init` | Create the SQLite database and run schema migrations |
//! | `wikisync sync <source>` | Run one incremental sync for a configured source |
//! | `wikisync reconcile <source>` | Force a deletion-reconciliation pass |
//! | `wikisync status <source>` | Print a source's checkpoint and latest run |
//! | `wikisync delete-source <source>` | Remove a source, its pages and chunks |
//!
//! Progress is written to stderr; stdout carries only command output so
//! scripts can parse it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use wikisync::config::{self, Config};
use wikisync::feed::HttpChangeFeed;
use wikisync::models::SourceCheckpoint;
use wikisync::progress::ProgressMode;
use wikisync::runs::RunManager;
use wikisync::store::{PageStore, SqliteStore};
use wikisync::sync::{SyncEngine, SyncOptions};
use wikisync::{db, migrate, reconcile};

/// Sync wiki spaces into a retrieval-ready local store.
#[derive(Parser)]
#[command(
    name = "wikisync",
    about = "Sync wiki spaces into a retrieval-ready local store",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./wikisync.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to human when stderr is a TTY.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl ProgressArg {
    fn mode(opt: Option<Self>) -> ProgressMode {
        match opt {
            Some(ProgressArg::Off) => ProgressMode::Off,
            Some(ProgressArg::Human) => ProgressMode::Human,
            Some(ProgressArg::Json) => ProgressMode::Json,
            None => ProgressMode::default_for_tty(),
        }
    }
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (checkpoints, pages, chunks, sync_runs). Idempotent.
    Init,

    /// Run one incremental sync for a configured source.
    ///
    /// Detects pages changed since the last checkpoint, converts and
    /// chunks them, reconciles deletions per the source's strategy, and
    /// advances the checkpoint. Ctrl-C stops at the next page boundary.
    Sync {
        /// Source id as configured under `[sources.<id>]`.
        source: String,
    },

    /// Force a deletion-reconciliation pass for a source.
    ///
    /// Diffs the stored page set against the remote's live ids and
    /// soft-deletes anything no longer present, regardless of the
    /// source's deletion strategy.
    Reconcile {
        /// Source id as configured under `[sources.<id>]`.
        source: String,
    },

    /// Print a source's checkpoint and most recent run as JSON.
    Status {
        /// Source id as configured under `[sources.<id>]`.
        source: String,
    },

    /// Remove a source and everything derived from it.
    ///
    /// Deletes the source's pages, chunks, and checkpoint. Run history
    /// is kept for auditing.
    DeleteSource {
        /// Source id as configured under `[sources.<id>]`.
        source: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wikisync=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    if let Commands::Init = cli.command {
        let pool = db::connect(&cfg).await?;
        migrate::run_migrations(&pool).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let pool = db::connect(&cfg).await?;
    migrate::run_migrations(&pool).await?;
    let store = Arc::new(SqliteStore::new(pool));
    let feed = Arc::new(HttpChangeFeed::new(&cfg.feed)?);
    let progress = Arc::from(ProgressArg::mode(cli.progress).reporter());
    let engine = Arc::new(SyncEngine::new(
        store.clone(),
        store.clone(),
        feed.clone(),
        progress,
        SyncOptions::from_config(&cfg),
    ));
    let manager = RunManager::new(engine, cfg.clone());

    match cli.command {
        Commands::Init => unreachable!("handled above"),
        Commands::Sync { source } => {
            let cancel = CancellationToken::new();
            let ctrl_c_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("interrupt received; stopping at the next page boundary");
                    ctrl_c_cancel.cancel();
                }
            });

            let metrics = manager.run_sync_blocking(&source, cancel).await?;
            println!(
                "sync {}: {} created, {} updated, {} deleted, {} degraded, {} failed ({} API calls)",
                source,
                metrics.pages_created,
                metrics.pages_updated,
                metrics.pages_deleted,
                metrics.pages_degraded,
                metrics.pages_failed,
                metrics.api_calls
            );
            for error in &metrics.errors {
                eprintln!("  error: {}", error);
            }
            if metrics.pages_failed > 0 {
                anyhow::bail!("{} pages failed; see errors above", metrics.pages_failed);
            }
        }
        Commands::Reconcile { source } => {
            let source_cfg = cfg.source(&source)?;
            let mut checkpoint = store
                .get_checkpoint(&source)
                .await?
                .unwrap_or_else(|| SourceCheckpoint::new(&source, source_cfg.deletion_strategy));

            let outcome = reconcile::reconcile(
                feed.as_ref(),
                store.as_ref(),
                store.as_ref(),
                &mut checkpoint,
                &source_cfg.space_key,
                cfg.feed.max_retries,
                true,
            )
            .await?;
            store.put_checkpoint(&checkpoint).await?;
            println!(
                "reconcile {}: {} pages deleted",
                source,
                outcome.deleted.len()
            );
        }
        Commands::Status { source } => {
            cfg.source(&source)?;
            let checkpoint = store.get_checkpoint(&source).await?;
            let status = serde_json::json!({
                "source": source,
                "checkpoint": checkpoint.map(|cp| serde_json::json!({
                    "last_sync_at": cp.last_sync_at.to_rfc3339(),
                    "deletion_strategy": cp.deletion_strategy.as_str(),
                    "last_reconciled_at": cp.last_reconciled_at.map(|t| t.to_rfc3339()),
                })),
                "latest_run": manager.latest_run(&source).await?,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::DeleteSource { source } => {
            cfg.source(&source)?;
            manager.delete_source(&source).await?;
            println!("source '{}' deleted", source);
        }
    }

    Ok(())
}
