//! Session-Block Segmenter
//!
//! Splits a chronologically sorted event stream into fixed-duration billing
//! windows. A block opens at the timestamp of its first event and closes once
//! an event arrives more than `duration_hours` after the block start, or more
//! than `duration_hours` after the previous event. An idle stretch longer than
//! the duration is represented by an event-less gap block.
//!
//! Both comparisons are strict: an event exactly `duration_hours` after the
//! block start stays in the block.

use crate::models::{PricedEvent, SessionBlock, SortOrder, TokenCounts};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;

pub const DEFAULT_SESSION_DURATION_HOURS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOptions {
    pub duration_hours: u32,
}

impl Default for BlockOptions {
    fn default() -> Self {
        Self {
            duration_hours: DEFAULT_SESSION_DURATION_HOURS,
        }
    }
}

impl BlockOptions {
    pub fn duration(&self) -> Duration {
        Duration::hours(i64::from(self.duration_hours))
    }
}

/// Segment events into blocks as of `now`.
///
/// Input order does not matter; events are sorted by timestamp first.
pub fn identify_session_blocks(
    events: &[PricedEvent],
    options: BlockOptions,
    now: DateTime<Utc>,
) -> Vec<SessionBlock> {
    if events.is_empty() {
        return Vec::new();
    }

    let duration = options.duration();
    let mut sorted: Vec<&PricedEvent> = events.iter().collect();
    sorted.sort_by_key(|p| p.event.timestamp);

    let mut blocks = Vec::new();
    let mut block_start = sorted[0].event.timestamp;
    let mut current: Vec<&PricedEvent> = Vec::new();

    for priced in sorted {
        let at = priced.event.timestamp;
        if let Some(last) = current.last() {
            let last_at = last.event.timestamp;
            let since_start = at - block_start;
            let since_last = at - last_at;

            if since_start > duration || since_last > duration {
                blocks.push(create_block(block_start, &current, now, duration));
                if since_last > duration {
                    blocks.push(create_gap_block(last_at, at, duration));
                }
                block_start = at;
                current.clear();
            }
        }
        current.push(priced);
    }

    if !current.is_empty() {
        blocks.push(create_block(block_start, &current, now, duration));
    }

    blocks
}

fn create_block(
    start_time: DateTime<Utc>,
    entries: &[&PricedEvent],
    now: DateTime<Utc>,
    duration: Duration,
) -> SessionBlock {
    let end_time = start_time + duration;
    let last_event = entries
        .last()
        .map(|p| p.event.timestamp)
        .unwrap_or(start_time);
    let is_active = now < end_time && now - last_event < duration;

    let mut token_counts = TokenCounts::default();
    let mut cost_usd = 0.0;
    let mut models = BTreeSet::new();
    for priced in entries {
        token_counts += priced.event.tokens;
        cost_usd += priced.cost;
        if let Some(model) = &priced.event.model {
            models.insert(model.clone());
        }
    }

    SessionBlock {
        id: start_time.to_rfc3339(),
        start_time,
        end_time,
        actual_end_time: Some(last_event),
        is_active,
        is_gap: false,
        entries: entries.iter().map(|p| (*p).clone()).collect(),
        token_counts,
        cost_usd,
        models,
    }
}

/// Idle period `[last + duration, next)`.
fn create_gap_block(
    last_activity: DateTime<Utc>,
    next_activity: DateTime<Utc>,
    duration: Duration,
) -> SessionBlock {
    let gap_start = last_activity + duration;
    SessionBlock {
        id: format!("gap-{}", gap_start.to_rfc3339()),
        start_time: gap_start,
        end_time: next_activity,
        actual_end_time: None,
        is_active: false,
        is_gap: true,
        entries: Vec::new(),
        token_counts: TokenCounts::default(),
        cost_usd: 0.0,
        models: BTreeSet::new(),
    }
}

/// Keep blocks started within the last `days` days, plus any active block.
pub fn filter_recent_blocks(
    blocks: &[SessionBlock],
    days: u32,
    now: DateTime<Utc>,
) -> Vec<SessionBlock> {
    let cutoff = now - Duration::days(i64::from(days));
    blocks
        .iter()
        .filter(|block| block.start_time >= cutoff || block.is_active)
        .cloned()
        .collect()
}

/// Largest token total of any real block.
pub fn max_block_tokens(blocks: &[SessionBlock]) -> u64 {
    blocks
        .iter()
        .filter(|block| !block.is_gap)
        .map(|block| block.token_counts.total())
        .max()
        .unwrap_or(0)
}

pub fn sort_blocks(blocks: &mut [SessionBlock], order: SortOrder) {
    match order {
        SortOrder::Asc => blocks.sort_by_key(|b| b.start_time),
        SortOrder::Desc => blocks.sort_by(|a, b| b.start_time.cmp(&a.start_time)),
    }
}

/// First active block in `order`, if any.
pub fn find_active_block(mut blocks: Vec<SessionBlock>, order: SortOrder) -> Option<SessionBlock> {
    sort_blocks(&mut blocks, order);
    blocks.into_iter().find(|block| block.is_active)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SessionIdentity, UsageEvent};
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, minute, 0).unwrap()
    }

    fn priced(ts: DateTime<Utc>, model: &str) -> PricedEvent {
        PricedEvent {
            event: UsageEvent {
                timestamp: ts,
                model: Some(model.to_string()),
                tokens: TokenCounts::new(100, 50, 10, 5),
                cost_usd: Some(0.01),
                message_id: None,
                request_id: None,
                version: None,
                session: SessionIdentity {
                    project_path: "p".to_string(),
                    session_id: "s".to_string(),
                },
            },
            cost: 0.01,
        }
    }

    fn long_ago() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_empty_events() {
        assert!(identify_session_blocks(&[], BlockOptions::default(), long_ago()).is_empty());
    }

    #[test]
    fn test_block_starts_at_first_event_not_hour() {
        let blocks = identify_session_blocks(
            &[priced(at(1, 37), "a"), priced(at(2, 0), "b")],
            BlockOptions::default(),
            long_ago(),
        );
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].start_time, at(1, 37));
        assert_eq!(blocks[0].end_time, at(6, 37));
        assert_eq!(blocks[0].actual_end_time, Some(at(2, 0)));
        assert_eq!(blocks[0].token_counts, TokenCounts::new(200, 100, 20, 10));
        assert_eq!(blocks[0].models.len(), 2);
        assert!(!blocks[0].is_active);
    }

    #[test]
    fn test_span_exceeding_duration_without_gap() {
        // Each step is 3h, so no gap, but the third event is 6h from the start
        let blocks = identify_session_blocks(
            &[priced(at(0, 0), "a"), priced(at(3, 0), "a"), priced(at(6, 0), "a")],
            BlockOptions::default(),
            long_ago(),
        );
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|b| !b.is_gap));
        assert_eq!(blocks[0].entry_count(), 2);
        assert_eq!(blocks[1].start_time, at(6, 0));
    }

    #[test]
    fn test_gap_block_bounds() {
        let blocks = identify_session_blocks(
            &[priced(at(0, 0), "a"), priced(at(8, 0), "a")],
            BlockOptions { duration_hours: 2 },
            long_ago(),
        );
        assert_eq!(blocks.len(), 3);
        let gap = &blocks[1];
        assert!(gap.is_gap);
        assert_eq!(gap.start_time, at(2, 0));
        assert_eq!(gap.end_time, at(8, 0));
        assert_eq!(gap.entry_count(), 0);
        assert_eq!(gap.cost_usd, 0.0);
    }

    #[test]
    fn test_active_flag() {
        let events = [priced(at(0, 0), "a"), priced(at(1, 0), "a")];

        let blocks = identify_session_blocks(&events, BlockOptions::default(), at(3, 0));
        assert!(blocks[0].is_active);

        // Past the block end
        let blocks = identify_session_blocks(&events, BlockOptions::default(), at(5, 0));
        assert!(!blocks[0].is_active);
    }

    #[test]
    fn test_filters_and_max_tokens() {
        let events = [priced(at(0, 0), "a"), priced(at(0, 30), "a"), priced(at(10, 0), "a")];
        let now = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap();
        let blocks = identify_session_blocks(&events, BlockOptions::default(), now);

        assert_eq!(max_block_tokens(&blocks), 330);
        assert_eq!(filter_recent_blocks(&blocks, 1, now).len(), 0);
        assert_eq!(filter_recent_blocks(&blocks, 3, now).len(), 3);
        assert!(find_active_block(blocks, SortOrder::Desc).is_none());
    }
}
