//! Burn-Rate & Projection Analyzer
//!
//! Consumption rates are measured between a block's first and last event and
//! counted in input plus output tokens. Cache traffic is left out of the rate.

use crate::models::{BurnRate, ProjectedUsage, SessionBlock};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Share of the limit above which a projection is flagged.
pub const WARNING_THRESHOLD: f64 = 0.8;

/// Rates for a block, or `None` for gaps, empty blocks and blocks whose
/// events all share one instant.
pub fn calculate_burn_rate(block: &SessionBlock) -> Option<BurnRate> {
    if block.is_gap || block.entries.is_empty() {
        return None;
    }

    let first = block.entries.iter().map(|p| p.event.timestamp).min()?;
    let last = block.entries.iter().map(|p| p.event.timestamp).max()?;
    let elapsed_minutes = (last - first).num_milliseconds() as f64 / 60_000.0;
    if elapsed_minutes <= 0.0 {
        return None;
    }

    Some(BurnRate {
        tokens_per_minute: block.token_counts.billable() as f64 / elapsed_minutes,
        cost_per_hour: block.cost_usd / elapsed_minutes * 60.0,
    })
}

/// Extrapolate an active block's totals to its end time.
///
/// Tokens round to the nearest integer and cost to cents. The rounded cost
/// is never below the block's current cost rounded to cents, but it can be up
/// to half a cent below the unrounded `cost_usd`.
pub fn project_block_usage(block: &SessionBlock, now: DateTime<Utc>) -> Option<ProjectedUsage> {
    if !block.is_active || block.is_gap {
        return None;
    }
    let rate = calculate_burn_rate(block)?;

    let remaining_minutes = ((block.end_time - now).num_milliseconds() as f64 / 60_000.0).max(0.0);
    let total_tokens =
        block.token_counts.billable() as f64 + rate.tokens_per_minute * remaining_minutes;
    let total_cost = block.cost_usd + rate.cost_per_hour / 60.0 * remaining_minutes;

    Some(ProjectedUsage {
        total_tokens: total_tokens.round() as u64,
        total_cost: (total_cost * 100.0).round() / 100.0,
        remaining_minutes: remaining_minutes.round() as u64,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenLimitStatus {
    Ok,
    Warning,
    Exceeds,
}

/// Compare projected tokens against a limit. A zero limit is never exceeded.
pub fn token_limit_status(projected_tokens: u64, limit: u64) -> TokenLimitStatus {
    if limit == 0 {
        return TokenLimitStatus::Ok;
    }
    let share = projected_tokens as f64 / limit as f64;
    if share > 1.0 {
        TokenLimitStatus::Exceeds
    } else if share > WARNING_THRESHOLD {
        TokenLimitStatus::Warning
    } else {
        TokenLimitStatus::Ok
    }
}
