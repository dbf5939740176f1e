//! Live Refresh Monitor
//!
//! Polls the log files on a fixed interval and reports the currently active
//! session block. Everything the monitor has seen is kept in a
//! [`LiveMonitorState`]; each tick adds to it and re-segments the whole
//! accumulated event list.
//!
//! ## Tick
//!
//! 1. Ask the [`FileSource`] for candidate files
//! 2. Scan each file's earliest timestamp and visit files earliest-first
//! 3. Read a file only if that timestamp is new or later than last recorded
//! 4. Price events the monitor's [`DeduplicationEngine`] has not seen, then
//!    mark them seen. A pricing failure leaves both the file and its events
//!    unrecorded, so the next tick retries them
//! 5. Segment all accumulated events and return the active block, if any
//!
//! ## Known limitation
//!
//! Change detection looks only at a file's *earliest* timestamp. Lines
//! appended to a file already read are not picked up unless that earliest
//! timestamp changes. Session logs are append-mostly and new conversation
//! turns usually start new files, so in practice the monitor keeps up, but
//! a long-running single file will appear frozen after its first read.
//!
//! ## Cancellation
//!
//! [`LiveMonitor::run`] checks its [`CancelSignal`] before every tick and
//! while sleeping between ticks. Cancelling ends the loop with `Ok(())`;
//! terminal cleanup is up to the caller.

use crate::blocks::{find_active_block, identify_session_blocks, BlockOptions};
use crate::cost::price_events;
use crate::dedup::{order_by_timestamp, scan_earliest_timestamps, DeduplicationEngine, IngestStats};
use crate::file_discovery::FileSource;
use crate::models::{CostMode, PricedEvent, SessionBlock, SortOrder};
use crate::parser::FileParser;
use crate::pricing::PricingResolver;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Cooperative stop flag shared between the monitor and whoever drives it.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called on any clone.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                // Every sender gone: nobody can cancel any more
                std::future::pending::<()>().await;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorOptions {
    pub blocks: BlockOptions,
    pub refresh_interval: Duration,
    pub order: SortOrder,
    pub cost_mode: CostMode,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            blocks: BlockOptions::default(),
            refresh_interval: Duration::from_secs(1),
            order: SortOrder::Desc,
            cost_mode: CostMode::Auto,
        }
    }
}

/// Everything the monitor has accumulated so far.
#[derive(Debug, Default)]
pub struct LiveMonitorState {
    /// Earliest timestamp recorded for each file when it was last read
    pub file_timestamps: HashMap<PathBuf, DateTime<Utc>>,
    pub events: Vec<PricedEvent>,
}

pub struct LiveMonitor {
    id: Uuid,
    source: Box<dyn FileSource>,
    parser: FileParser,
    dedup: DeduplicationEngine,
    resolver: PricingResolver,
    options: MonitorOptions,
    state: LiveMonitorState,
}

impl LiveMonitor {
    pub fn new(
        source: impl FileSource + 'static,
        resolver: PricingResolver,
        options: MonitorOptions,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: Box::new(source),
            parser: FileParser::new(),
            dedup: DeduplicationEngine::new(),
            resolver,
            options,
            state: LiveMonitorState::default(),
        }
    }

    pub fn monitor_id(&self) -> Uuid {
        self.id
    }

    pub fn options(&self) -> &MonitorOptions {
        &self.options
    }

    pub fn state(&self) -> &LiveMonitorState {
        &self.state
    }

    /// Run one tick as of `now` and return the active block.
    pub async fn poll_once(&mut self, now: DateTime<Utc>) -> Result<Option<SessionBlock>> {
        let files = self.source.discover()?;
        let mut scanned = scan_earliest_timestamps(&self.parser, files).await;
        order_by_timestamp(&mut scanned);

        let mut stats = IngestStats::default();
        for (file, earliest) in scanned {
            // No timestamp means no line could become an event
            let Some(earliest) = earliest else {
                continue;
            };

            let changed = self
                .state
                .file_timestamps
                .get(&file.path)
                .map_or(true, |previous| earliest > *previous);
            if !changed {
                continue;
            }

            let events = match self.parser.read_events(&file).await {
                Ok(events) => events,
                Err(e) => {
                    stats.unreadable_files += 1;
                    warn!(file = %file.path.display(), error = %e, "Skipping unreadable log file");
                    continue;
                }
            };
            stats.files_read += 1;

            // Nothing is recorded until pricing succeeds, so a failed tick
            // leaves the file to be read again on the next one
            let candidates: Vec<_> = events
                .into_iter()
                .filter(|event| !self.dedup.is_seen(event))
                .collect();
            let priced = price_events(candidates, self.options.cost_mode, &self.resolver).await?;

            let before = priced.len();
            let fresh: Vec<PricedEvent> = priced
                .into_iter()
                .filter(|p| self.dedup.check_and_mark(&p.event))
                .collect();
            stats.duplicates_skipped += before - fresh.len();
            stats.events_kept += fresh.len();

            self.state.file_timestamps.insert(file.path.clone(), earliest);
            self.state.events.extend(fresh);
        }

        if stats.files_read > 0 {
            debug!(
                files = stats.files_read,
                new_events = stats.events_kept,
                duplicates = stats.duplicates_skipped,
                total_events = self.state.events.len(),
                "Ingested changed files"
            );
        }

        let blocks = identify_session_blocks(&self.state.events, self.options.blocks, now);
        Ok(find_active_block(blocks, self.options.order))
    }

    /// Poll, hand the active block to `on_tick`, sleep, repeat until cancelled.
    pub async fn run<F>(&mut self, cancel: CancelSignal, mut on_tick: F) -> Result<()>
    where
        F: FnMut(Option<&SessionBlock>) -> Result<()>,
    {
        let span = info_span!("live_monitor", monitor_id = %self.id);

        async {
            info!(
                refresh_secs = self.options.refresh_interval.as_secs_f64(),
                duration_hours = self.options.blocks.duration_hours,
                "Live monitor started"
            );

            loop {
                if cancel.is_cancelled() {
                    break;
                }

                let active = self.poll_once(Utc::now()).await?;
                on_tick(active.as_ref())?;

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.options.refresh_interval) => {}
                }
            }

            info!(events = self.state.events.len(), "Live monitor stopped");
            Ok::<(), anyhow::Error>(())
        }
        .instrument(span)
        .await
    }

    /// Release the price table and forget all accumulated state.
    pub fn close(&mut self) {
        self.resolver.close();
        self.dedup.clear();
        self.state = LiveMonitorState::default();
    }
}
