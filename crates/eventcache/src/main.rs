//! eventcache: chat event cache tooling
//!
//! Main binary with subcommands:
//! - `reconcile`: Check which events of a range a cache dump can serve
//! - `prime`: Backfill event caches for a chat state snapshot

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::Result;
use serde::de::DeserializeOwned;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use eventcache_core::{EventIndex, MAX_EVENTS, MAX_MESSAGES, ReconcileLimits};
use eventcache_primer::PrimerConfig;

mod prime;
mod reconcile;

#[derive(Parser)]
#[command(name = "eventcache")]
#[command(about = "Chat event cache tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile an event range against a cached event dump
    Reconcile {
        /// JSON file holding an array of cached events
        #[arg(long)]
        cache: PathBuf,

        /// First index of the range (inclusive)
        #[arg(long)]
        from: EventIndex,

        /// Last index of the range (inclusive)
        #[arg(long)]
        to: EventIndex,

        /// Scan from the top of the range downwards
        #[arg(long, conflicts_with = "mid_point")]
        descending: bool,

        /// Scan outward from this index instead of linearly
        #[arg(long)]
        mid_point: Option<EventIndex>,

        /// Maximum number of indices scanned
        #[arg(long, default_value_t = MAX_EVENTS)]
        max_events: usize,

        /// Maximum number of messages returned by a linear scan
        #[arg(long, default_value_t = MAX_MESSAGES)]
        max_messages: usize,
    },

    /// Prime event caches for every chat in a state snapshot
    Prime {
        /// JSON file holding the chat state snapshot
        #[arg(long)]
        snapshot: PathBuf,

        /// Base URL of the events service
        #[arg(long, env = "EVENTCACHE_ENDPOINT")]
        endpoint: String,

        /// Bookmark file, read on start and rewritten on exit
        #[arg(long)]
        bookmarks: Option<PathBuf>,

        /// Maximum number of requests per batch
        #[arg(long, env = "EVENTCACHE_BATCH_SIZE", default_value = "20")]
        batch_size: usize,

        /// Pause between batches in milliseconds
        #[arg(long, env = "EVENTCACHE_BATCH_DELAY_MS", default_value = "500")]
        batch_delay_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "eventcache=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Reconcile {
            cache,
            from,
            to,
            descending,
            mid_point,
            max_events,
            max_messages,
        } => {
            let limits = ReconcileLimits {
                max_events,
                max_messages,
            };
            reconcile::run(&cache, from, to, descending, mid_point, limits).await
        }

        Commands::Prime {
            snapshot,
            endpoint,
            bookmarks,
            batch_size,
            batch_delay_ms,
        } => {
            let config = PrimerConfig {
                batch_size,
                batch_delay_ms,
                ..Default::default()
            };
            prime::run(&snapshot, &endpoint, bookmarks.as_deref(), config).await
        }
    }
}

/// Read and parse a JSON file.
pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| miette::miette!("failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&raw)
        .map_err(|e| miette::miette!("failed to parse {}: {}", path.display(), e))
}
