//! Usage Analysis Engine
//!
//! The one-shot report pipeline. Given a list of log files, the
//! [`UsageAnalyzer`] runs:
//!
//! 1. **Ordering**: files sorted by earliest contained timestamp
//! 2. **Ingestion**: lines validated into events, bad lines dropped
//! 3. **Deduplication**: a fresh [`DeduplicationEngine`] per report
//! 4. **Pricing**: each event costed according to the [`CostMode`]
//! 5. **Aggregation** or **Segmentation**: daily / session / monthly views,
//!    or session blocks
//!
//! The analyzer owns its [`PricingResolver`], so several reports from one
//! analyzer share a single price fetch. Call [`UsageAnalyzer::close`] when
//! done; dropping the analyzer releases the table as well.
//!
//! ```no_run
//! use claude_ledger::analyzer::UsageAnalyzer;
//! use claude_ledger::aggregation::ReportOptions;
//! use claude_ledger::file_discovery::{ClaudeProjectsDiscovery, FileSource};
//! use claude_ledger::models::CostMode;
//! use claude_ledger::pricing::{EmbeddedPricingSource, PricingResolver};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let files = ClaudeProjectsDiscovery::new(vec!["/home/me/.claude".into()]).discover()?;
//! let mut analyzer =
//!     UsageAnalyzer::new(PricingResolver::new(EmbeddedPricingSource), CostMode::Auto);
//! let daily = analyzer.daily_report(files, &ReportOptions::default()).await?;
//! analyzer.close();
//! # Ok(())
//! # }
//! ```

use crate::aggregation::{aggregate_daily, aggregate_monthly, aggregate_sessions, ReportOptions};
use crate::blocks::{identify_session_blocks, sort_blocks, BlockOptions};
use crate::cost::price_events;
use crate::dedup::{DeduplicationEngine, IngestStats};
use crate::models::{
    CostMode, DailyAggregate, LogFile, MonthlyAggregate, PricedEvent, SessionAggregate,
    SessionBlock, SortOrder,
};
use crate::parser::FileParser;
use crate::pricing::PricingResolver;
use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::info;

pub struct UsageAnalyzer {
    parser: FileParser,
    resolver: PricingResolver,
    cost_mode: CostMode,
}

impl UsageAnalyzer {
    pub fn new(resolver: PricingResolver, cost_mode: CostMode) -> Self {
        Self {
            parser: FileParser::new(),
            resolver,
            cost_mode,
        }
    }

    pub fn cost_mode(&self) -> CostMode {
        self.cost_mode
    }

    /// Ingest, deduplicate, and price every event in `files`.
    pub async fn load_events(&self, files: Vec<LogFile>) -> Result<(Vec<PricedEvent>, IngestStats)> {
        let dedup = DeduplicationEngine::new();
        let (events, stats) = dedup
            .process_files_with_global_dedup(&self.parser, files)
            .await;
        let priced = price_events(events, self.cost_mode, &self.resolver).await?;

        info!(
            files = stats.files_read,
            events = priced.len(),
            duplicates = stats.duplicates_skipped,
            mode = %self.cost_mode,
            "Loaded usage events"
        );
        Ok((priced, stats))
    }

    pub async fn daily_report(
        &self,
        files: Vec<LogFile>,
        options: &ReportOptions,
    ) -> Result<Vec<DailyAggregate>> {
        let (events, _) = self.load_events(files).await?;
        Ok(aggregate_daily(&events, options))
    }

    pub async fn session_report(
        &self,
        files: Vec<LogFile>,
        options: &ReportOptions,
    ) -> Result<Vec<SessionAggregate>> {
        let (events, _) = self.load_events(files).await?;
        Ok(aggregate_sessions(&events, options))
    }

    /// Monthly totals, rolled up from the date-filtered daily aggregates.
    pub async fn monthly_report(
        &self,
        files: Vec<LogFile>,
        options: &ReportOptions,
    ) -> Result<Vec<MonthlyAggregate>> {
        let (events, _) = self.load_events(files).await?;
        let daily = aggregate_daily(
            &events,
            &ReportOptions {
                order: SortOrder::Asc,
                ..options.clone()
            },
        );
        Ok(aggregate_monthly(&daily, options.order))
    }

    /// All session blocks as of `now`, in `order`.
    pub async fn blocks_report(
        &self,
        files: Vec<LogFile>,
        block_options: BlockOptions,
        order: SortOrder,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionBlock>> {
        let (events, _) = self.load_events(files).await?;
        let mut blocks = identify_session_blocks(&events, block_options, now);
        sort_blocks(&mut blocks, order);
        Ok(blocks)
    }

    /// Release the pricing table.
    pub fn close(&mut self) {
        self.resolver.close();
    }
}
