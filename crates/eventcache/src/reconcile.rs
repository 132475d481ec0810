//! The `reconcile` subcommand.

use std::path::Path;

use miette::Result;
use tracing::info;

use eventcache_core::reconcile::{
    process_cached_events_window_with_limits, process_cached_events_with_limits,
};
use eventcache_core::{CachedEvents, EventEntry, EventIndex, ReconcileLimits};

/// Load a cache dump, reconcile the range and print the result as JSON.
pub async fn run(
    cache_path: &Path,
    from: EventIndex,
    to: EventIndex,
    descending: bool,
    mid_point: Option<EventIndex>,
    limits: ReconcileLimits,
) -> Result<()> {
    let cached: Vec<EventEntry> = crate::read_json(cache_path).await?;
    let result = reconcile(&cached, from, to, descending, mid_point, limits)?;

    info!(
        cached = cached.len(),
        found = result.events.len(),
        missing = result.missing.len(),
        "reconciled range"
    );

    let output = serde_json::to_string_pretty(&result)
        .map_err(|e| miette::miette!("failed to serialize result: {}", e))?;
    println!("{}", output);
    Ok(())
}

/// Validate the range, then run a linear or windowed scan.
fn reconcile(
    cached: &[EventEntry],
    from: EventIndex,
    to: EventIndex,
    descending: bool,
    mid_point: Option<EventIndex>,
    limits: ReconcileLimits,
) -> Result<CachedEvents> {
    if from > to {
        return Err(miette::miette!(
            "invalid range: --from {} is greater than --to {}",
            from,
            to
        ));
    }

    match mid_point {
        Some(mid) if mid < from || mid > to => Err(miette::miette!(
            "mid point {} is outside the range [{}, {}]",
            mid,
            from,
            to
        )),
        Some(mid) => Ok(process_cached_events_window_with_limits(
            from, to, mid, cached, limits,
        )),
        None => Ok(process_cached_events_with_limits(
            from,
            to,
            !descending,
            cached,
            limits,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventcache_core::{ChatEvent, UserId};
    use pretty_assertions::assert_eq;

    fn message(index: EventIndex) -> EventEntry {
        EventEntry::new(
            index,
            index as u64,
            ChatEvent::Message {
                message_index: index,
                sender: UserId::from("alice"),
                content: format!("message {}", index),
                mentioned: vec![],
            },
        )
    }

    #[test]
    fn test_rejects_inverted_range() {
        let err = reconcile(&[], 5, 1, false, None, ReconcileLimits::default()).unwrap_err();
        assert!(err.to_string().contains("invalid range"));
    }

    #[test]
    fn test_rejects_mid_point_outside_range() {
        let err = reconcile(&[], 0, 9, false, Some(12), ReconcileLimits::default()).unwrap_err();
        assert!(err.to_string().contains("outside the range"));
    }

    #[test]
    fn test_descending_scan_respects_message_cap() {
        let cached: Vec<_> = (0..10).map(message).collect();
        let limits = ReconcileLimits {
            max_events: 500,
            max_messages: 3,
        };

        let result = reconcile(&cached, 0, 9, true, None, limits).unwrap();
        let indices: Vec<_> = result.events.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![7, 8, 9]);
        assert!(result.missing.is_empty());
    }

    #[test]
    fn test_window_reports_gaps() {
        let cached = vec![message(4), message(5), message(7)];
        let result = reconcile(&cached, 3, 7, false, Some(5), ReconcileLimits::default()).unwrap();

        let indices: Vec<_> = result.events.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![4, 5, 7]);
        assert_eq!(result.missing.into_iter().collect::<Vec<_>>(), vec![3, 6]);
    }

    #[tokio::test]
    async fn test_run_reads_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        let cached: Vec<_> = (0..3).map(message).collect();
        tokio::fs::write(&path, serde_json::to_string(&cached).unwrap())
            .await
            .unwrap();

        run(&path, 0, 5, false, None, ReconcileLimits::default())
            .await
            .unwrap();
    }
}
