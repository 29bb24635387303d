use std::collections::HashSet;

use serde::Serialize;

use super::types::{QueueEntry, QueueStatus, ShopConfig};

/// Deterministic display bands computed from one snapshot.
///
/// Every viewing surface (display board, staff console) runs this same
/// computation, so they can never disagree about who is "on deck".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplaySegments {
    /// Skipped entries waiting for a specific barber, oldest skip first.
    pub held: Vec<QueueEntry>,
    /// The next `highlight_window_size` callable entries, emphasized.
    pub highlight: Vec<QueueEntry>,
    /// Remaining callable entries, truncated to the visible budget.
    pub overflow: Vec<QueueEntry>,
    pub highlight_window_size: usize,
    pub visible_count: usize,
    pub barber_count: usize,
}

/// Partitions the waiting set into display bands.
///
/// Pure function of `(entries, config)`: input order is irrelevant (both
/// bands are re-sorted internally with `seq` tie-breaks) and no clock is
/// consulted. The highlight window shrinks by one for each barber already
/// spoken for by a held client, so the "next up" count tracks live barber
/// occupancy rather than a static number.
pub fn compute_display_segments(entries: &[QueueEntry], config: &ShopConfig) -> DisplaySegments {
    let barber_count = working_barber_count(config);

    let waiting: Vec<&QueueEntry> = entries
        .iter()
        .filter(|entry| entry.status == QueueStatus::Waiting)
        .collect();

    let mut held: Vec<&QueueEntry> = waiting
        .iter()
        .copied()
        .filter(|entry| entry.preferred_barber_id.is_some() && entry.skipped_at.is_some())
        .collect();
    held.sort_by_key(|entry| (entry.skipped_at, entry.seq));

    let mut active: Vec<&QueueEntry> = waiting
        .iter()
        .copied()
        .filter(|entry| entry.skipped_at.is_none())
        .collect();
    active.sort_by_key(|entry| entry.fifo_key());

    let barbers_with_held_clients: HashSet<&str> = held
        .iter()
        .filter_map(|entry| entry.preferred_barber_id.as_deref())
        .collect();
    let highlight_window_size = barber_count.saturating_sub(barbers_with_held_clients.len());

    let highlight_len = highlight_window_size.min(active.len());
    let overflow_budget = config
        .visible_count
        .saturating_sub(held.len())
        .saturating_sub(highlight_len);
    let overflow_len = overflow_budget.min(active.len() - highlight_len);

    let highlight = active[..highlight_len].iter().copied().cloned().collect();
    let overflow = active[highlight_len..highlight_len + overflow_len]
        .iter()
        .copied()
        .cloned()
        .collect();

    DisplaySegments {
        held: held.into_iter().cloned().collect(),
        highlight,
        overflow,
        highlight_window_size,
        visible_count: config.visible_count,
        barber_count,
    }
}

/// Effective roster size: working barbers, falling back to the configured
/// minimum (never zero) when nobody is marked working.
fn working_barber_count(config: &ShopConfig) -> usize {
    let working = config.barbers.iter().filter(|b| b.working).count();
    if working > 0 {
        working
    } else {
        config.fallback_barber_count.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::types::Barber;
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    fn ts(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    fn entry(seq: u64, created_millis: i64, preferred: Option<&str>) -> QueueEntry {
        QueueEntry {
            id: Uuid::new_v4(),
            seq,
            first_name: format!("E{seq}"),
            last_initial: "X".to_string(),
            preferred_barber_id: preferred.map(str::to_string),
            status: QueueStatus::Waiting,
            created_at: ts(created_millis),
            called_at: None,
            called_by_barber_id: None,
            served_at: None,
            skipped_at: None,
        }
    }

    fn two_barber_config() -> ShopConfig {
        ShopConfig {
            barbers: vec![
                Barber {
                    id: "p1".to_string(),
                    name: "Pat".to_string(),
                    working: true,
                },
                Barber {
                    id: "p2".to_string(),
                    name: "Lou".to_string(),
                    working: true,
                },
            ],
            visible_count: 10,
            fallback_barber_count: 1,
        }
    }

    fn seqs(entries: &[QueueEntry]) -> Vec<u64> {
        entries.iter().map(|e| e.seq).collect()
    }

    #[test]
    fn two_working_barbers_highlight_the_next_two_entries() {
        let entries: Vec<QueueEntry> = (1..=5).map(|i| entry(i, i as i64 * 100, None)).collect();

        let segments = compute_display_segments(&entries, &two_barber_config());

        assert_eq!(segments.highlight_window_size, 2);
        assert_eq!(seqs(&segments.highlight), vec![1, 2]);
        assert_eq!(seqs(&segments.overflow), vec![3, 4, 5]);
        assert!(segments.held.is_empty());
    }

    #[test]
    fn held_entry_shrinks_the_highlight_window() {
        let mut e1 = entry(1, 100, Some("p1"));
        e1.skipped_at = Some(ts(900));
        let rest: Vec<QueueEntry> = (2..=5).map(|i| entry(i, i as i64 * 100, None)).collect();
        let mut entries = vec![e1];
        entries.extend(rest);

        let segments = compute_display_segments(&entries, &two_barber_config());

        assert_eq!(seqs(&segments.held), vec![1]);
        assert_eq!(segments.highlight_window_size, 1, "p1 is spoken for");
        assert_eq!(seqs(&segments.highlight), vec![2]);
        assert_eq!(seqs(&segments.overflow), vec![3, 4, 5]);
    }

    #[test]
    fn two_holds_for_the_same_barber_count_once() {
        let mut e1 = entry(1, 100, Some("p1"));
        e1.skipped_at = Some(ts(900));
        let mut e2 = entry(2, 200, Some("p1"));
        e2.skipped_at = Some(ts(950));
        let e3 = entry(3, 300, None);

        let segments = compute_display_segments(&[e1, e2, e3], &two_barber_config());

        assert_eq!(seqs(&segments.held), vec![1, 2]);
        assert_eq!(
            segments.highlight_window_size, 1,
            "distinct barbers, not held entries, shrink the window"
        );
    }

    #[test]
    fn output_is_independent_of_input_order() {
        let mut held = entry(1, 100, Some("p1"));
        held.skipped_at = Some(ts(500));
        let a = entry(2, 200, None);
        let b = entry(3, 300, Some("p2"));
        let c = entry(4, 400, None);

        let config = two_barber_config();
        let forward =
            compute_display_segments(&[held.clone(), a.clone(), b.clone(), c.clone()], &config);
        let shuffled = compute_display_segments(&[c, b, held, a], &config);

        assert_eq!(forward, shuffled);
    }

    #[test]
    fn window_size_never_exceeds_barber_count() {
        let config = two_barber_config();
        let mut entries = Vec::new();
        for i in 1..=4u64 {
            let mut e = entry(i, i as i64 * 100, Some(if i % 2 == 0 { "p1" } else { "p2" }));
            e.skipped_at = Some(ts(1000 + i as i64));
            entries.push(e);
        }

        let segments = compute_display_segments(&entries, &config);
        assert_eq!(segments.barber_count, 2);
        assert_eq!(
            segments.highlight_window_size, 0,
            "window floors at zero when every barber is spoken for"
        );
        assert!(segments.highlight.is_empty());
    }

    #[test]
    fn overflow_is_truncated_before_held_and_highlight() {
        let mut config = two_barber_config();
        config.visible_count = 4;

        let mut held = entry(1, 50, Some("p1"));
        held.skipped_at = Some(ts(500));
        let mut entries = vec![held];
        entries.extend((2..=8u64).map(|i| entry(i, i as i64 * 100, None)));

        let segments = compute_display_segments(&entries, &config);

        assert_eq!(seqs(&segments.held), vec![1]);
        assert_eq!(seqs(&segments.highlight), vec![2]);
        // 4 visible minus 1 held minus 1 highlighted leaves 2 overflow slots.
        assert_eq!(seqs(&segments.overflow), vec![3, 4]);
    }

    #[test]
    fn empty_roster_falls_back_to_configured_minimum() {
        let config = ShopConfig {
            barbers: Vec::new(),
            visible_count: 10,
            fallback_barber_count: 3,
        };
        let entries: Vec<QueueEntry> = (1..=5).map(|i| entry(i, i as i64 * 100, None)).collect();

        let segments = compute_display_segments(&entries, &config);
        assert_eq!(segments.barber_count, 3);
        assert_eq!(seqs(&segments.highlight), vec![1, 2, 3]);
    }

    #[test]
    fn called_and_terminal_entries_are_excluded() {
        let mut called = entry(1, 100, None);
        called.status = QueueStatus::Called;
        called.called_at = Some(ts(500));
        let mut served = entry(2, 200, None);
        served.status = QueueStatus::Served;
        let waiting = entry(3, 300, None);

        let segments = compute_display_segments(&[called, served, waiting], &two_barber_config());
        assert_eq!(seqs(&segments.highlight), vec![3]);
        assert!(segments.overflow.is_empty());
    }

    #[test]
    fn held_band_orders_by_skip_time_not_creation_time() {
        let mut late_arrival = entry(2, 900, Some("p1"));
        late_arrival.skipped_at = Some(ts(1000));
        let mut early_arrival = entry(1, 100, Some("p2"));
        early_arrival.skipped_at = Some(ts(2000));

        let segments =
            compute_display_segments(&[early_arrival, late_arrival], &two_barber_config());
        assert_eq!(seqs(&segments.held), vec![2, 1], "oldest skip first");
    }
}
