//! Core Data Models
//!
//! This module defines the data structures that flow through the ledger pipeline,
//! from validated log events to the aggregates and billing blocks handed to callers.
//!
//! ## Data Flow
//!
//! 1. **Raw Data**: [`UsageEvent`] - one validated line from a JSONL log
//! 2. **Pricing**: [`PricedEvent`] - the event plus the cost chosen by the [`CostMode`]
//! 3. **Aggregation**: [`DailyAggregate`], [`SessionAggregate`], [`MonthlyAggregate`]
//! 4. **Blocks**: [`SessionBlock`] - fixed-duration billing windows, plus gap blocks
//! 5. **Analytics**: [`BurnRate`], [`ProjectedUsage`] for the active block
//!
//! All aggregate and block types are plain owned values. They carry no
//! back-references and are never mutated after being returned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Add, AddAssign};
use std::path::PathBuf;

/// Model name the assistant writes for locally generated messages.
/// Never shown in breakdowns or model sets.
pub const SYNTHETIC_MODEL: &str = "<synthetic>";

/// Breakdown key for events that carry no model name.
pub const UNKNOWN_MODEL: &str = "unknown";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    #[serde(rename = "inputTokens")]
    pub input_tokens: u64,
    #[serde(rename = "outputTokens")]
    pub output_tokens: u64,
    #[serde(rename = "cacheCreationTokens")]
    pub cache_creation_tokens: u64,
    #[serde(rename = "cacheReadTokens")]
    pub cache_read_tokens: u64,
}

impl TokenCounts {
    pub fn new(input: u64, output: u64, cache_creation: u64, cache_read: u64) -> Self {
        Self {
            input_tokens: input,
            output_tokens: output,
            cache_creation_tokens: cache_creation,
            cache_read_tokens: cache_read,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cache_creation_tokens)
            .saturating_add(self.cache_read_tokens)
    }

    /// Input plus output, the figure burn rates are measured in.
    pub fn billable(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Sums saturate at `u64::MAX` instead of overflowing.
impl Add for TokenCounts {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            input_tokens: self.input_tokens.saturating_add(other.input_tokens),
            output_tokens: self.output_tokens.saturating_add(other.output_tokens),
            cache_creation_tokens: self
                .cache_creation_tokens
                .saturating_add(other.cache_creation_tokens),
            cache_read_tokens: self.cache_read_tokens.saturating_add(other.cache_read_tokens),
        }
    }
}

impl AddAssign for TokenCounts {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

/// Where an event came from: the project directory path and session id
/// derived from the log file's location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionIdentity {
    #[serde(rename = "projectPath")]
    pub project_path: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// One validated usage record. Built once by the parser, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageEvent {
    pub timestamp: DateTime<Utc>,
    pub model: Option<String>,
    pub tokens: TokenCounts,
    #[serde(rename = "costUSD")]
    pub cost_usd: Option<f64>,
    #[serde(rename = "messageId")]
    pub message_id: Option<String>,
    #[serde(rename = "requestId")]
    pub request_id: Option<String>,
    pub version: Option<String>,
    pub session: SessionIdentity,
}

impl UsageEvent {
    pub fn is_synthetic(&self) -> bool {
        self.model.as_deref() == Some(SYNTHETIC_MODEL)
    }

    /// Model key used in per-model breakdowns.
    pub fn breakdown_model(&self) -> &str {
        self.model.as_deref().unwrap_or(UNKNOWN_MODEL)
    }
}

/// A usage event with the cost selected for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricedEvent {
    #[serde(flatten)]
    pub event: UsageEvent,
    pub cost: f64,
}

/// Per-token prices for one model. A missing rate contributes nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPriceEntry {
    pub input_cost_per_token: Option<f64>,
    pub output_cost_per_token: Option<f64>,
    pub cache_creation_input_token_cost: Option<f64>,
    pub cache_read_input_token_cost: Option<f64>,
}

impl ModelPriceEntry {
    pub fn cost_for(&self, tokens: &TokenCounts) -> f64 {
        tokens.input_tokens as f64 * self.input_cost_per_token.unwrap_or(0.0)
            + tokens.output_tokens as f64 * self.output_cost_per_token.unwrap_or(0.0)
            + tokens.cache_creation_tokens as f64
                * self.cache_creation_input_token_cost.unwrap_or(0.0)
            + tokens.cache_read_tokens as f64 * self.cache_read_input_token_cost.unwrap_or(0.0)
    }
}

/// How the cost of each event is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostMode {
    /// Precomputed cost when present, otherwise calculated from tokens
    #[default]
    Auto,
    /// Always calculated from tokens, ignoring any precomputed cost
    Calculate,
    /// Always the precomputed cost; never touches pricing
    Display,
}

impl CostMode {
    /// Whether any event could need the price table under this mode.
    pub fn may_need_pricing(&self) -> bool {
        !matches!(self, Self::Display)
    }
}

impl fmt::Display for CostMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Calculate => write!(f, "calculate"),
            Self::Display => write!(f, "display"),
        }
    }
}

impl std::str::FromStr for CostMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "calculate" => Ok(Self::Calculate),
            "display" => Ok(Self::Display),
            _ => Err(format!("Invalid cost mode: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(format!("Invalid sort order: {s}")),
        }
    }
}

/// Calendar used when turning timestamps into date keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportTimezone {
    #[default]
    Local,
    Utc,
}

impl std::str::FromStr for ReportTimezone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "utc" => Ok(Self::Utc),
            _ => Err(format!("Invalid timezone: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelBreakdown {
    #[serde(rename = "modelName")]
    pub model_name: String,
    #[serde(flatten)]
    pub tokens: TokenCounts,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyAggregate {
    /// `YYYY-MM-DD`
    pub date: String,
    #[serde(flatten)]
    pub tokens: TokenCounts,
    #[serde(rename = "totalCost")]
    pub total_cost: f64,
    #[serde(rename = "modelsUsed")]
    pub models_used: Vec<String>,
    #[serde(rename = "modelBreakdowns")]
    pub model_breakdowns: Vec<ModelBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionAggregate {
    #[serde(flatten)]
    pub session: SessionIdentity,
    #[serde(flatten)]
    pub tokens: TokenCounts,
    #[serde(rename = "totalCost")]
    pub total_cost: f64,
    /// `YYYY-MM-DD` of the most recent event in the session
    #[serde(rename = "lastActivity")]
    pub last_activity: String,
    pub versions: Vec<String>,
    #[serde(rename = "modelsUsed")]
    pub models_used: Vec<String>,
    #[serde(rename = "modelBreakdowns")]
    pub model_breakdowns: Vec<ModelBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyAggregate {
    /// `YYYY-MM`
    pub month: String,
    #[serde(flatten)]
    pub tokens: TokenCounts,
    #[serde(rename = "totalCost")]
    pub total_cost: f64,
    #[serde(rename = "modelsUsed")]
    pub models_used: Vec<String>,
    #[serde(rename = "modelBreakdowns")]
    pub model_breakdowns: Vec<ModelBreakdown>,
}

/// A fixed-duration billing window, or a gap standing in for idle time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionBlock {
    pub id: String,
    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,
    #[serde(rename = "endTime")]
    pub end_time: DateTime<Utc>,
    #[serde(rename = "actualEndTime")]
    pub actual_end_time: Option<DateTime<Utc>>,
    #[serde(rename = "isActive")]
    pub is_active: bool,
    #[serde(rename = "isGap")]
    pub is_gap: bool,
    #[serde(skip)]
    pub entries: Vec<PricedEvent>,
    #[serde(rename = "tokenCounts")]
    pub token_counts: TokenCounts,
    #[serde(rename = "costUSD")]
    pub cost_usd: f64,
    pub models: BTreeSet<String>,
}

impl SessionBlock {
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BurnRate {
    #[serde(rename = "tokensPerMinute")]
    pub tokens_per_minute: f64,
    #[serde(rename = "costPerHour")]
    pub cost_per_hour: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProjectedUsage {
    #[serde(rename = "totalTokens")]
    pub total_tokens: u64,
    #[serde(rename = "totalCost")]
    pub total_cost: f64,
    #[serde(rename = "remainingMinutes")]
    pub remaining_minutes: u64,
}

/// A log file plus the identity derived from where it lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogFile {
    pub path: PathBuf,
    pub session: SessionIdentity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_counts_arithmetic() {
        let mut a = TokenCounts::new(1, 2, 3, 4);
        a += TokenCounts::new(10, 20, 30, 40);
        assert_eq!(a, TokenCounts::new(11, 22, 33, 44));
        assert_eq!(a.total(), 110);
        assert_eq!(a.billable(), 33);
    }

    #[test]
    fn test_token_counts_saturate_instead_of_overflowing() {
        let huge = TokenCounts::new(u64::MAX, u64::MAX, 0, 0);
        let sum = huge + TokenCounts::new(1, 1, 1, 1);
        assert_eq!(sum, TokenCounts::new(u64::MAX, u64::MAX, 1, 1));
        assert_eq!(sum.total(), u64::MAX);
        assert_eq!(sum.billable(), u64::MAX);

        let mut acc = TokenCounts::default();
        acc += huge;
        acc += huge;
        assert_eq!(acc.input_tokens, u64::MAX);
    }

    #[test]
    fn test_price_entry_missing_rates_contribute_zero() {
        let price = ModelPriceEntry {
            input_cost_per_token: Some(3e-6),
            output_cost_per_token: Some(1.5e-5),
            ..Default::default()
        };
        let cost = price.cost_for(&TokenCounts::new(1000, 1000, 5000, 5000));
        assert!((cost - 0.018).abs() < 1e-12);
    }

    #[test]
    fn test_cost_mode_parsing() {
        assert_eq!("AUTO".parse::<CostMode>().unwrap(), CostMode::Auto);
        assert_eq!("display".parse::<CostMode>().unwrap(), CostMode::Display);
        assert!("bogus".parse::<CostMode>().is_err());
        assert!(!CostMode::Display.may_need_pricing());
        assert_eq!(CostMode::Calculate.to_string(), "calculate");
    }
}
