//! Reconciliation of a requested event range against a sparse local cache.
//!
//! Given a range of event indices and whatever is cached for a chat, these
//! functions work out which events can be served locally and which indices
//! still have to be fetched. A read is bounded twice: by the number of indices
//! scanned (`max_events`) and, for linear scans, by the number of message
//! events collected (`max_messages`). Indices beyond either bound are left out
//! of both the result and the missing set so that a later read can pick them
//! up.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::{EventEntry, EventIndex};

/// Maximum number of indices considered by a single read.
pub const MAX_EVENTS: usize = 500;

/// Maximum number of message events returned by a single linear read.
pub const MAX_MESSAGES: usize = 100;

/// Bounds applied to one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileLimits {
    pub max_events: usize,
    pub max_messages: usize,
}

impl Default for ReconcileLimits {
    fn default() -> Self {
        Self {
            max_events: MAX_EVENTS,
            max_messages: MAX_MESSAGES,
        }
    }
}

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedEvents {
    /// Cached events, ascending by index.
    pub events: Vec<EventEntry>,
    /// Scanned indices with no cached event.
    pub missing: BTreeSet<EventIndex>,
}

impl CachedEvents {
    /// True when every scanned index was served from cache.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// Number of message events in `events`.
    pub fn message_count(&self) -> usize {
        self.events.iter().filter(|e| e.is_message()).count()
    }
}

/// Accumulates one pass over a range of indices.
struct Scan<'a, F> {
    lookup: F,
    limits: ReconcileLimits,
    events: Vec<EventEntry>,
    missing: BTreeSet<EventIndex>,
    message_count: usize,
    _entries: std::marker::PhantomData<&'a EventEntry>,
}

impl<'a, F> Scan<'a, F>
where
    F: Fn(EventIndex) -> Option<&'a EventEntry>,
{
    fn new(limits: ReconcileLimits, lookup: F) -> Self {
        Self {
            lookup,
            limits,
            events: Vec::new(),
            missing: BTreeSet::new(),
            message_count: 0,
            _entries: std::marker::PhantomData,
        }
    }

    fn visit(&mut self, index: EventIndex) {
        match (self.lookup)(index) {
            Some(entry) => {
                if entry.is_message() {
                    self.message_count += 1;
                }
                self.events.push(entry.clone());
            }
            None => {
                self.missing.insert(index);
            }
        }
    }

    fn at_event_cap(&self) -> bool {
        self.events.len() + self.missing.len() >= self.limits.max_events
    }

    fn at_message_cap(&self) -> bool {
        self.message_count >= self.limits.max_messages
    }

    fn finish(mut self) -> CachedEvents {
        self.events.sort_by_key(|e| e.index);
        CachedEvents {
            events: self.events,
            missing: self.missing,
        }
    }
}

/// Index entries by position. Later duplicates replace earlier ones.
fn index_entries(cached: &[EventEntry]) -> HashMap<EventIndex, &EventEntry> {
    cached.iter().map(|e| (e.index, e)).collect()
}

/// Scan `[from_index, to_index]` linearly using the default limits.
///
/// # Panics
///
/// Panics if `from_index > to_index`.
pub fn process_cached_events(
    from_index: EventIndex,
    to_index: EventIndex,
    ascending: bool,
    cached: &[EventEntry],
) -> CachedEvents {
    process_cached_events_with_limits(
        from_index,
        to_index,
        ascending,
        cached,
        ReconcileLimits::default(),
    )
}

/// Scan `[from_index, to_index]` linearly.
///
/// Ascending scans start at `from_index`, descending ones at `to_index`. The
/// scan stops as soon as `max_events` indices have been considered or
/// `max_messages` message events have been collected.
///
/// # Panics
///
/// Panics if `from_index > to_index`.
pub fn process_cached_events_with_limits(
    from_index: EventIndex,
    to_index: EventIndex,
    ascending: bool,
    cached: &[EventEntry],
    limits: ReconcileLimits,
) -> CachedEvents {
    let lookup = index_entries(cached);
    scan_range(from_index, to_index, ascending, limits, |i| {
        lookup.get(&i).copied()
    })
}

/// Scan outward from `mid_point` using the default limits.
///
/// # Panics
///
/// Panics if `from_index > to_index` or `mid_point` lies outside the range.
pub fn process_cached_events_window(
    from_index: EventIndex,
    to_index: EventIndex,
    mid_point: EventIndex,
    cached: &[EventEntry],
) -> CachedEvents {
    process_cached_events_window_with_limits(
        from_index,
        to_index,
        mid_point,
        cached,
        ReconcileLimits::default(),
    )
}

/// Scan outward from `mid_point`, one index below then one above per step,
/// until the range is covered or `max_events` indices have been considered.
///
/// # Panics
///
/// Panics if `from_index > to_index` or `mid_point` lies outside the range.
pub fn process_cached_events_window_with_limits(
    from_index: EventIndex,
    to_index: EventIndex,
    mid_point: EventIndex,
    cached: &[EventEntry],
    limits: ReconcileLimits,
) -> CachedEvents {
    let lookup = index_entries(cached);
    scan_window(from_index, to_index, mid_point, limits, |i| {
        lookup.get(&i).copied()
    })
}

pub(crate) fn scan_range<'a, F>(
    from_index: EventIndex,
    to_index: EventIndex,
    ascending: bool,
    limits: ReconcileLimits,
    lookup: F,
) -> CachedEvents
where
    F: Fn(EventIndex) -> Option<&'a EventEntry>,
{
    assert!(
        from_index <= to_index,
        "invalid event range: from_index {} > to_index {}",
        from_index,
        to_index
    );

    let mut scan = Scan::new(limits, lookup);
    let indices: Box<dyn Iterator<Item = EventIndex>> = if ascending {
        Box::new(from_index..=to_index)
    } else {
        Box::new((from_index..=to_index).rev())
    };

    for index in indices {
        if scan.at_event_cap() || scan.at_message_cap() {
            break;
        }
        scan.visit(index);
    }

    scan.finish()
}

pub(crate) fn scan_window<'a, F>(
    from_index: EventIndex,
    to_index: EventIndex,
    mid_point: EventIndex,
    limits: ReconcileLimits,
    lookup: F,
) -> CachedEvents
where
    F: Fn(EventIndex) -> Option<&'a EventEntry>,
{
    assert!(
        from_index <= to_index,
        "invalid event range: from_index {} > to_index {}",
        from_index,
        to_index
    );
    assert!(
        (from_index..=to_index).contains(&mid_point),
        "mid_point {} outside event range {}..={}",
        mid_point,
        from_index,
        to_index
    );

    let mut scan = Scan::new(limits, lookup);
    if scan.at_event_cap() {
        return scan.finish();
    }
    scan.visit(mid_point);

    let mut step: EventIndex = 1;
    'expand: loop {
        let below = mid_point.checked_sub(step).filter(|i| *i >= from_index);
        let above = mid_point.checked_add(step).filter(|i| *i <= to_index);
        if below.is_none() && above.is_none() {
            break;
        }

        for index in [below, above].into_iter().flatten() {
            if scan.at_event_cap() {
                break 'expand;
            }
            scan.visit(index);
        }

        match step.checked_add(1) {
            Some(next) => step = next,
            None => break,
        }
    }

    scan.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChatEvent, UserId};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use test_case::test_case;

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

    fn reaction(index: EventIndex) -> EventEntry {
        EventEntry::new(
            index,
            index as u64,
            ChatEvent::Reaction {
                message_index: 0,
                user_id: UserId::from("bob"),
                reaction: "+1".to_string(),
            },
        )
    }

    fn indices(result: &CachedEvents) -> Vec<EventIndex> {
        result.events.iter().map(|e| e.index).collect()
    }

    // === Unit Tests ===

    #[test]
    fn test_empty_cache_reports_everything_missing() {
        let result = process_cached_events(0, 9, true, &[]);
        assert!(result.events.is_empty());
        assert_eq!(result.missing, (0..=9).collect::<BTreeSet<_>>());
    }

    #[test]
    fn test_empty_cache_bounded_by_event_cap() {
        let result = process_cached_events(0, 10_000, true, &[]);
        assert_eq!(result.missing.len(), MAX_EVENTS);
        assert_eq!(result.missing.iter().next_back(), Some(&(MAX_EVENTS as u32 - 1)));
    }

    #[test]
    fn test_single_index_cached() {
        let result = process_cached_events(7, 7, false, &[message(7)]);
        assert_eq!(indices(&result), vec![7]);
        assert!(result.is_complete());
    }

    #[test]
    fn test_sparse_cache_splits_present_and_missing() {
        let cached = vec![message(1), reaction(3), message(4)];
        let result = process_cached_events(0, 5, true, &cached);
        assert_eq!(indices(&result), vec![1, 3, 4]);
        assert_eq!(result.missing, BTreeSet::from([0, 2, 5]));
    }

    #[test]
    fn test_unordered_input_is_indexed() {
        let cached = vec![message(4), message(2), message(3)];
        let result = process_cached_events(2, 4, true, &cached);
        assert_eq!(indices(&result), vec![2, 3, 4]);
    }

    #[test_case(true ; "ascending")]
    #[test_case(false ; "descending")]
    fn test_events_always_ascending(ascending: bool) {
        let cached: Vec<_> = (0..20).map(message).collect();
        let result = process_cached_events(0, 19, ascending, &cached);
        assert_eq!(indices(&result), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_descending_message_cap_keeps_newest() {
        let limits = ReconcileLimits {
            max_events: 500,
            max_messages: 5,
        };
        let cached: Vec<_> = (0..50).map(message).collect();
        let result = process_cached_events_with_limits(0, 49, false, &cached, limits);
        assert_eq!(indices(&result), vec![45, 46, 47, 48, 49]);
        assert!(result.is_complete());
    }

    #[test]
    fn test_non_message_events_do_not_count_toward_message_cap() {
        let limits = ReconcileLimits {
            max_events: 500,
            max_messages: 2,
        };
        let cached = vec![
            reaction(0),
            reaction(1),
            message(2),
            reaction(3),
            message(4),
            message(5),
        ];
        let result = process_cached_events_with_limits(0, 5, true, &cached, limits);
        assert_eq!(indices(&result), vec![0, 1, 2, 3, 4]);
        assert_eq!(result.message_count(), 2);
    }

    #[test]
    fn test_duplicate_index_last_wins() {
        let cached = vec![message(1), reaction(1)];
        let result = process_cached_events(1, 1, true, &cached);
        assert_eq!(result.events, vec![reaction(1)]);
    }

    #[test]
    #[should_panic(expected = "invalid event range")]
    fn test_inverted_range_panics() {
        process_cached_events(5, 4, true, &[]);
    }

    #[test]
    fn test_window_fully_cached_odd_span() {
        let cached: Vec<_> = (1..=5).map(message).collect();
        let result = process_cached_events_window(1, 5, 3, &cached);
        assert_eq!(result.events.len(), 5);
        assert_eq!(indices(&result), vec![1, 2, 3, 4, 5]);
        assert!(result.is_complete());
    }

    #[test]
    fn test_window_fully_cached_even_span() {
        let cached: Vec<_> = (1..=6).map(message).collect();
        let result = process_cached_events_window(1, 6, 3, &cached);
        assert_eq!(indices(&result), vec![1, 2, 3, 4, 5, 6]);
        assert!(result.is_complete());
    }

    #[test]
    fn test_window_cap_excludes_outer_indices() {
        let limits = ReconcileLimits {
            max_events: 5,
            max_messages: 100,
        };
        let result = process_cached_events_window_with_limits(0, 100, 50, &[], limits);
        assert_eq!(result.missing, BTreeSet::from([48, 49, 50, 51, 52]));
    }

    #[test]
    fn test_window_at_range_edge_expands_one_side() {
        let cached: Vec<_> = (0..=10).map(message).collect();
        let limits = ReconcileLimits {
            max_events: 4,
            max_messages: 100,
        };
        let result = process_cached_events_window_with_limits(0, 10, 0, &cached, limits);
        assert_eq!(indices(&result), vec![0, 1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "outside event range")]
    fn test_window_mid_point_outside_range_panics() {
        process_cached_events_window(1, 5, 9, &[]);
    }

    // === Property-Based Tests ===

    fn sparse_cache() -> impl Strategy<Value = Vec<EventEntry>> {
        proptest::collection::btree_map(0u32..300, any::<bool>(), 0..200).prop_map(|m| {
            m.into_iter()
                .map(|(i, is_msg)| if is_msg { message(i) } else { reaction(i) })
                .collect()
        })
    }

    proptest! {
        // Present and missing never overlap, and together cover the scanned prefix
        #[test]
        fn linear_scan_partitions_scanned_indices(
            cache in sparse_cache(),
            from in 0u32..300,
            len in 0u32..300,
            ascending in any::<bool>(),
        ) {
            let to = from + len;
            let result = process_cached_events(from, to, ascending, &cache);

            let present: BTreeSet<_> = result.events.iter().map(|e| e.index).collect();
            prop_assert!(present.is_disjoint(&result.missing));

            let scanned: BTreeSet<_> = present.union(&result.missing).copied().collect();
            prop_assert!(scanned.iter().all(|i| (from..=to).contains(i)));

            // The scanned set is a contiguous run anchored at the scan's start
            if let (Some(lo), Some(hi)) = (scanned.first(), scanned.last()) {
                prop_assert_eq!(scanned.len() as u32, hi - lo + 1);
                if ascending {
                    prop_assert_eq!(*lo, from);
                } else {
                    prop_assert_eq!(*hi, to);
                }
            }
        }

        #[test]
        fn linear_scan_events_sorted(
            cache in sparse_cache(),
            from in 0u32..300,
            len in 0u32..300,
            ascending in any::<bool>(),
        ) {
            let result = process_cached_events(from, from + len, ascending, &cache);
            prop_assert!(result.events.windows(2).all(|w| w[0].index < w[1].index));
        }

        #[test]
        fn linear_scan_respects_caps(
            cache in sparse_cache(),
            max_events in 1usize..100,
            max_messages in 1usize..50,
            ascending in any::<bool>(),
        ) {
            let limits = ReconcileLimits { max_events, max_messages };
            let result = process_cached_events_with_limits(0, 299, ascending, &cache, limits);
            prop_assert!(result.events.len() + result.missing.len() <= max_events);
            prop_assert!(result.message_count() <= max_messages);
        }

        #[test]
        fn empty_cache_reports_whole_range(n in 0u32..1000) {
            let result = process_cached_events(0, n, true, &[]);
            prop_assert!(result.events.is_empty());
            prop_assert_eq!(result.missing.len(), (n as usize + 1).min(MAX_EVENTS));
        }

        #[test]
        fn window_over_full_cache_is_complete(
            from in 0u32..100,
            len in 0u32..100,
            offset in 0u32..100,
        ) {
            let to = from + len;
            let mid = from + offset.min(len);
            let cache: Vec<_> = (from..=to).map(message).collect();
            let result = process_cached_events_window(from, to, mid, &cache);
            prop_assert!(result.is_complete());
            prop_assert_eq!(result.events.len() as u32, len + 1);
        }

        // Window scans stay within the range and cover a contiguous run around the midpoint
        #[test]
        fn window_scan_is_contiguous_around_mid(
            cache in sparse_cache(),
            from in 0u32..150,
            len in 0u32..150,
            offset in 0u32..150,
            max_events in 1usize..60,
        ) {
            let to = from + len;
            let mid = from + offset.min(len);
            let limits = ReconcileLimits { max_events, max_messages: MAX_MESSAGES };
            let result = process_cached_events_window_with_limits(from, to, mid, &cache, limits);

            let present: BTreeSet<_> = result.events.iter().map(|e| e.index).collect();
            prop_assert!(present.is_disjoint(&result.missing));

            let scanned: BTreeSet<_> = present.union(&result.missing).copied().collect();
            prop_assert!(scanned.contains(&mid));
            prop_assert!(scanned.len() <= max_events);
            let lo = *scanned.first().unwrap();
            let hi = *scanned.last().unwrap();
            prop_assert!(lo >= from && hi <= to);
            prop_assert_eq!(scanned.len() as u32, hi - lo + 1);
            prop_assert!(result.events.windows(2).all(|w| w[0].index < w[1].index));
        }
    }
}
