//! Deduplication Engine
//!
//! The assistant rewrites the same API response into more than one log file
//! (resumed and branched conversations copy earlier turns). This module keeps
//! those copies from being counted twice.
//!
//! ## Strategy
//!
//! - **Dedup key**: `messageId:requestId`, only when both ids are present.
//!   Events missing either id are always kept.
//! - **File order**: files are ingested in order of their earliest contained
//!   timestamp; files with no timestamp go last. Combined with first-seen-wins
//!   this means the chronologically earliest copy of a duplicate is the one
//!   that survives, whatever the files are called.
//! - **Lifetime**: the seen set lives as long as the [`DeduplicationEngine`]
//!   and only grows. A one-shot report builds a fresh engine; the live monitor
//!   keeps one for the whole monitoring session.

use crate::models::{LogFile, UsageEvent};
use crate::parser::FileParser;
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use tracing::{debug, warn};

/// Counters from one ingestion pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub files_read: usize,
    pub unreadable_files: usize,
    pub events_kept: usize,
    pub duplicates_skipped: usize,
}

/// Composite duplicate key for an event, if it has both ids.
pub fn dedup_key(event: &UsageEvent) -> Option<String> {
    let message_id = event.message_id.as_deref()?;
    let request_id = event.request_id.as_deref()?;
    Some(format!("{}:{}", message_id, request_id))
}

/// Find each file's earliest timestamp. A file that cannot be read is logged
/// and reported as having none.
pub async fn scan_earliest_timestamps(
    parser: &FileParser,
    files: Vec<LogFile>,
) -> Vec<(LogFile, Option<DateTime<Utc>>)> {
    let mut scanned = Vec::with_capacity(files.len());

    for file in files {
        let earliest = match parser.get_earliest_timestamp(&file.path).await {
            Ok(ts) => ts,
            Err(e) => {
                warn!(file = %file.path.display(), error = %e, "Could not scan file for timestamps");
                None
            }
        };
        scanned.push((file, earliest));
    }

    scanned
}

/// Order scanned files earliest-first, files without a timestamp last.
/// Ties fall back to the path so the order is stable across runs.
pub fn order_by_timestamp(scanned: &mut [(LogFile, Option<DateTime<Utc>>)]) {
    scanned.sort_by(|(a_file, a_ts), (b_file, b_ts)| {
        let by_time = match (a_ts, b_ts) {
            (Some(a), Some(b)) => a.cmp(b),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        };
        by_time.then_with(|| a_file.path.cmp(&b_file.path))
    });
}

pub async fn sort_files_by_timestamp(parser: &FileParser, files: Vec<LogFile>) -> Vec<LogFile> {
    let mut scanned = scan_earliest_timestamps(parser, files).await;
    order_by_timestamp(&mut scanned);
    scanned.into_iter().map(|(file, _)| file).collect()
}

#[derive(Debug, Default)]
pub struct DeduplicationEngine {
    global_hashes: DashSet<String>,
}

impl DeduplicationEngine {
    pub fn new() -> Self {
        Self {
            global_hashes: DashSet::new(),
        }
    }

    /// Record the event and report whether it should be kept.
    /// Returns `false` only for a key that has been seen before.
    pub fn check_and_mark(&self, event: &UsageEvent) -> bool {
        match dedup_key(event) {
            Some(hash) => {
                let is_new = self.global_hashes.insert(hash);
                if !is_new {
                    debug!(
                        message_id = ?event.message_id,
                        request_id = ?event.request_id,
                        "Skipping duplicate entry"
                    );
                }
                is_new
            }
            None => true,
        }
    }

    /// Whether the event's key has already been marked. Never marks.
    pub fn is_seen(&self, event: &UsageEvent) -> bool {
        dedup_key(event).map_or(false, |hash| self.global_hashes.contains(&hash))
    }

    /// Drop already-seen events from `events`, marking the rest as seen.
    pub fn retain_new(&self, events: Vec<UsageEvent>, stats: &mut IngestStats) -> Vec<UsageEvent> {
        let before = events.len();
        let kept: Vec<UsageEvent> = events
            .into_iter()
            .filter(|event| self.check_and_mark(event))
            .collect();
        stats.duplicates_skipped += before - kept.len();
        stats.events_kept += kept.len();
        kept
    }

    /// Ingest files in earliest-timestamp order with global deduplication.
    ///
    /// Files are read one after another; a file that fails to read is logged
    /// and skipped.
    pub async fn process_files_with_global_dedup(
        &self,
        parser: &FileParser,
        files: Vec<LogFile>,
    ) -> (Vec<UsageEvent>, IngestStats) {
        let sorted = sort_files_by_timestamp(parser, files).await;
        let mut stats = IngestStats::default();
        let mut events = Vec::new();

        for file in &sorted {
            match parser.read_events(file).await {
                Ok(file_events) => {
                    stats.files_read += 1;
                    events.extend(self.retain_new(file_events, &mut stats));
                }
                Err(e) => {
                    stats.unreadable_files += 1;
                    warn!(file = %file.path.display(), error = %e, "Skipping unreadable log file");
                }
            }
        }

        debug!(
            files = stats.files_read,
            kept = stats.events_kept,
            duplicates = stats.duplicates_skipped,
            "Processed log files with global dedup"
        );

        (events, stats)
    }

    pub fn seen_count(&self) -> usize {
        self.global_hashes.len()
    }

    /// Forget every key seen so far.
    pub fn clear(&self) {
        self.global_hashes.clear();
    }
}
