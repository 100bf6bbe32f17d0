//! # stockroom
//!
//! Command line front end over the offline queue.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Application Startup                               │
//! │                                                                         │
//! │  1. Initialize Logging ─── tracing-subscriber, RUST_LOG overrides       │
//! │  2. Load Config ────────── defaults → stockroom.toml → STOCKROOM_*      │
//! │  3. Open Databases ─────── document store + local offline queue        │
//! │  4. Sweep Recycle Bin ──── expired entries are purged (online only)    │
//! │  5. Run Command ────────── result printed as pretty JSON on stdout     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use stockroom_core::{Command, Method};
use stockroom_db::Database;
use stockroom_engine::{Engine, ErrorResponse};
use stockroom_sync::{ConnectionState, ConnectivityGate, OfflineQueue, SyncConfig, SyncError};

/// Order and inventory engine with an offline write queue
#[derive(Parser)]
#[command(name = "stockroom")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Treat the store as unreachable and queue every mutation
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route one call, e.g. `call POST /orders --data '{...}'`
    Call {
        method: Method,
        path: String,
        /// JSON payload
        #[arg(short, long)]
        data: Option<String>,
    },

    /// List queued mutations in replay order
    Queue,

    /// Replay queued mutations now
    Replay,

    /// Drop the head of the queue without running it
    DiscardHead,

    /// Purge recycle-bin entries past their expiry
    Sweep,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Err(e) = run(cli).await {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = SyncConfig::load(cli.config).context("loading configuration")?;
    let offline = cli.offline || config.replay.start_offline;

    ensure_parent(&config.store.path)?;
    ensure_parent(&config.queue.path)?;

    let store = Database::new(config.store_db_config())
        .await
        .context("opening document store")?;
    let queue_db = Database::new(config.queue_db_config())
        .await
        .context("opening offline queue")?;

    let engine = Engine::new(store.store());
    let gate = ConnectivityGate::new(if offline {
        ConnectionState::Offline
    } else {
        ConnectionState::Online
    });
    let queue = OfflineQueue::new(engine.clone(), queue_db.offline_queue(), gate);
    info!(state = %queue.gate().state(), "Stockroom ready");

    if offline {
        debug!("Offline, skipping startup sweep");
    } else {
        let report = engine.recycle_bin().sweep().await?;
        if report.removed > 0 {
            info!(removed = report.removed, "Startup sweep purged expired entries");
        }
    }

    let result = execute(cli.command, &queue, offline).await;

    queue_db.close().await;
    store.close().await;
    result
}

async fn execute(command: Commands, queue: &OfflineQueue, offline: bool) -> Result<()> {
    match command {
        Commands::Call { method, path, data } => {
            let payload = data
                .map(|raw| serde_json::from_str(&raw))
                .transpose()
                .context("--data is not valid JSON")?;

            match queue.call(method, &path, payload).await {
                Ok(response) => print_json(&response),
                Err(SyncError::Engine(e)) => {
                    print_json(&ErrorResponse::from(&e))?;
                    bail!("{} {} failed", method, path)
                }
                Err(e) => Err(e.into()),
            }
        }

        Commands::Queue => print_json(&queue.pending().await?),

        Commands::Replay => {
            if offline {
                bail!("cannot replay while --offline is set");
            }
            print_json(&queue.replay().await?)
        }

        Commands::DiscardHead => print_json(&queue.discard_head().await?),

        Commands::Sweep => print_json(&queue.submit(Command::SweepRecycleBin).await?),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

/// Installs the log subscriber on stderr so stdout stays valid JSON.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=stockroom_sync=trace` - Trace the queue only
/// - Default: `info,stockroom=debug,sqlx=warn`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stockroom=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
