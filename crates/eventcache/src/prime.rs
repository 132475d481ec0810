//! The `prime` subcommand.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use miette::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use eventcache_core::{BookmarkStore, ChatId, EventCache, EventsClient, Timestamp, UserId};
use eventcache_primer::{CachePrimer, ChatStateSnapshot, PrimerConfig};

/// One persisted bookmark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkRecord {
    pub chat_id: ChatId,
    pub last_updated: Timestamp,
}

/// Prime every chat in the snapshot, then print the resulting bookmarks.
pub async fn run(
    snapshot_path: &Path,
    endpoint: &str,
    bookmarks_path: Option<&Path>,
    config: PrimerConfig,
) -> Result<()> {
    let snapshot: ChatStateSnapshot = crate::read_json(snapshot_path).await?;

    let bookmarks = match bookmarks_path {
        Some(path) if tokio::fs::try_exists(path).await.unwrap_or(false) => {
            let records: Vec<BookmarkRecord> = crate::read_json(path).await?;
            info!(count = records.len(), "loaded bookmarks");
            BookmarkStore::from_map(
                records
                    .into_iter()
                    .map(|r| (r.chat_id, r.last_updated))
                    .collect::<HashMap<_, _>>(),
            )
        }
        _ => BookmarkStore::new(),
    };

    let cache = EventCache::new();
    let client = EventsClient::new(endpoint);
    let loader = |users: Vec<UserId>| {
        info!(count = users.len(), "discovered users");
    };

    let primer = CachePrimer::new(
        Arc::new(client),
        Arc::new(loader),
        Arc::clone(&bookmarks),
        config,
    )
    .with_cache(Arc::clone(&cache));

    info!(
        chats = snapshot.chat_count(),
        endpoint = %endpoint,
        "starting cache primer"
    );

    let handle = primer.spawn();
    let mut status = handle.subscribe();
    handle.process_state(snapshot);

    let drained = async {
        // The first change is the primer accepting the snapshot
        status.changed().await?;
        let final_status = *status.wait_for(|s| !s.active).await?;
        Ok::<_, watch::error::RecvError>(final_status)
    };

    tokio::select! {
        result = drained => match result {
            Ok(final_status) => info!(
                batches = final_status.batches_completed,
                chats_cached = cache.chat_count(),
                "priming complete"
            ),
            Err(_) => warn!("cache primer stopped unexpectedly"),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, stopping after current batch");
        }
    }

    if handle.shutdown().is_err() {
        warn!("cache primer already stopped");
    }
    handle.stopped().await;

    let records = bookmark_records(&bookmarks);
    let output = serde_json::to_string_pretty(&records)
        .map_err(|e| miette::miette!("failed to serialize bookmarks: {}", e))?;

    if let Some(path) = bookmarks_path {
        tokio::fs::write(path, &output)
            .await
            .map_err(|e| miette::miette!("failed to write {}: {}", path.display(), e))?;
        info!(path = %path.display(), count = records.len(), "saved bookmarks");
    }

    println!("{}", output);
    Ok(())
}

/// Bookmarks sorted by chat, ready to persist.
pub fn bookmark_records(bookmarks: &BookmarkStore) -> Vec<BookmarkRecord> {
    let mut records: Vec<BookmarkRecord> = bookmarks
        .snapshot()
        .into_iter()
        .map(|(chat_id, last_updated)| BookmarkRecord {
            chat_id,
            last_updated,
        })
        .collect();
    records.sort_by(|a, b| a.chat_id.cmp(&b.chat_id));
    records
}
