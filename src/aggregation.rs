//! Aggregator
//!
//! Folds priced, deduplicated events into daily, per-session and monthly
//! summaries. Monthly figures are built from the daily aggregates rather than
//! from raw events, so the two views always agree.
//!
//! Every aggregate carries a per-model breakdown sorted by cost, highest
//! first. Events without a model are filed under `"unknown"`; the synthetic
//! model is counted in the totals but left out of breakdowns and model lists.

use crate::models::{
    DailyAggregate, ModelBreakdown, MonthlyAggregate, PricedEvent, ReportTimezone,
    SessionAggregate, SessionIdentity, SortOrder, TokenCounts, SYNTHETIC_MODEL,
};
use crate::timestamp_parser::TimestampParser;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Caller-supplied shaping for a report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportOptions {
    /// Inclusive lower bound, `YYYYMMDD`
    pub since: Option<String>,
    /// Inclusive upper bound, `YYYYMMDD`
    pub until: Option<String>,
    pub order: SortOrder,
    pub timezone: ReportTimezone,
}

impl ReportOptions {
    /// Whether a `YYYY-MM-DD` key falls inside the range.
    pub fn includes_date(&self, date_key: &str) -> bool {
        let compact = TimestampParser::compact_date(date_key);
        if let Some(since) = &self.since {
            if compact.as_str() < since.as_str() {
                return false;
            }
        }
        if let Some(until) = &self.until {
            if compact.as_str() > until.as_str() {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Default)]
struct UsageAccumulator {
    tokens: TokenCounts,
    cost: f64,
    models: HashMap<String, (TokenCounts, f64)>,
}

impl UsageAccumulator {
    fn add(&mut self, priced: &PricedEvent) {
        self.tokens += priced.event.tokens;
        self.cost += priced.cost;

        if priced.event.is_synthetic() {
            return;
        }
        let model = self
            .models
            .entry(priced.event.breakdown_model().to_string())
            .or_default();
        model.0 += priced.event.tokens;
        model.1 += priced.cost;
    }

    fn merge_breakdowns(&mut self, breakdowns: &[ModelBreakdown]) {
        for breakdown in breakdowns {
            let model = self.models.entry(breakdown.model_name.clone()).or_default();
            model.0 += breakdown.tokens;
            model.1 += breakdown.cost;
        }
    }

    fn breakdowns(&self) -> Vec<ModelBreakdown> {
        let mut breakdowns: Vec<ModelBreakdown> = self
            .models
            .iter()
            .map(|(name, (tokens, cost))| ModelBreakdown {
                model_name: name.clone(),
                tokens: *tokens,
                cost: *cost,
            })
            .collect();
        breakdowns.sort_by(|a, b| {
            b.cost
                .total_cmp(&a.cost)
                .then_with(|| a.model_name.cmp(&b.model_name))
        });
        breakdowns
    }
}

#[derive(Debug, Default)]
struct SessionAccumulator {
    usage: UsageAccumulator,
    models_used: BTreeSet<String>,
    versions: BTreeSet<String>,
    last_timestamp: Option<DateTime<Utc>>,
}

fn collect_models_used<'a>(events: impl Iterator<Item = &'a PricedEvent>) -> BTreeSet<String> {
    events
        .filter(|p| !p.event.is_synthetic())
        .filter_map(|p| p.event.model.clone())
        .collect()
}

fn order_by<T, K: Ord>(items: &mut [T], order: SortOrder, key: impl Fn(&T) -> K) {
    items.sort_by(|a, b| {
        let cmp = key(a).cmp(&key(b));
        match order {
            SortOrder::Asc => cmp,
            SortOrder::Desc => cmp.reverse(),
        }
    });
}

/// Group events by calendar date.
pub fn aggregate_daily(events: &[PricedEvent], options: &ReportOptions) -> Vec<DailyAggregate> {
    let mut by_date: BTreeMap<String, Vec<&PricedEvent>> = BTreeMap::new();
    for priced in events {
        let date = TimestampParser::date_key(&priced.event.timestamp, options.timezone);
        by_date.entry(date).or_default().push(priced);
    }

    let mut daily: Vec<DailyAggregate> = by_date
        .into_iter()
        .filter(|(date, _)| options.includes_date(date))
        .map(|(date, day_events)| {
            let mut acc = UsageAccumulator::default();
            for priced in &day_events {
                acc.add(priced);
            }
            DailyAggregate {
                date,
                tokens: acc.tokens,
                total_cost: acc.cost,
                models_used: collect_models_used(day_events.iter().copied())
                    .into_iter()
                    .collect(),
                model_breakdowns: acc.breakdowns(),
            }
        })
        .collect();

    order_by(&mut daily, options.order, |d| d.date.clone());
    daily
}

/// Group events by (project path, session id).
///
/// The date range applies to each session's last activity, and the result is
/// ordered by last activity.
pub fn aggregate_sessions(events: &[PricedEvent], options: &ReportOptions) -> Vec<SessionAggregate> {
    let mut by_session: HashMap<SessionIdentity, SessionAccumulator> = HashMap::new();

    for priced in events {
        let acc = by_session.entry(priced.event.session.clone()).or_default();
        acc.usage.add(priced);
        if !priced.event.is_synthetic() {
            if let Some(model) = &priced.event.model {
                acc.models_used.insert(model.clone());
            }
        }
        if let Some(version) = &priced.event.version {
            acc.versions.insert(version.clone());
        }
        if acc.last_timestamp.map_or(true, |last| priced.event.timestamp > last) {
            acc.last_timestamp = Some(priced.event.timestamp);
        }
    }

    let mut sessions: Vec<SessionAggregate> = by_session
        .into_iter()
        .filter_map(|(session, acc)| {
            let last = acc.last_timestamp?;
            Some(SessionAggregate {
                session,
                tokens: acc.usage.tokens,
                total_cost: acc.usage.cost,
                last_activity: TimestampParser::date_key(&last, options.timezone),
                versions: acc.versions.into_iter().collect(),
                models_used: acc.models_used.into_iter().collect(),
                model_breakdowns: acc.usage.breakdowns(),
            })
        })
        .filter(|s| options.includes_date(&s.last_activity))
        .collect();

    order_by(&mut sessions, options.order, |s| {
        (s.last_activity.clone(), s.session.clone())
    });
    sessions
}

/// Roll daily aggregates up into months.
pub fn aggregate_monthly(daily: &[DailyAggregate], order: SortOrder) -> Vec<MonthlyAggregate> {
    let mut by_month: BTreeMap<String, (UsageAccumulator, BTreeSet<String>)> = BTreeMap::new();

    for day in daily {
        let month = TimestampParser::month_key(&day.date).to_string();
        let (acc, models) = by_month.entry(month).or_default();
        acc.tokens += day.tokens;
        acc.cost += day.total_cost;
        acc.merge_breakdowns(&day.model_breakdowns);
        models.extend(day.models_used.iter().cloned());
    }

    let mut monthly: Vec<MonthlyAggregate> = by_month
        .into_iter()
        .map(|(month, (acc, models))| MonthlyAggregate {
            month,
            tokens: acc.tokens,
            total_cost: acc.cost,
            models_used: models.into_iter().collect(),
            model_breakdowns: acc.breakdowns(),
        })
        .collect();

    order_by(&mut monthly, order, |m| m.month.clone());
    monthly
}

/// Grand totals across a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    #[serde(flatten)]
    pub tokens: TokenCounts,
    #[serde(rename = "totalCost")]
    pub total_cost: f64,
}

impl Totals {
    fn sum<'a>(items: impl Iterator<Item = (&'a TokenCounts, f64)>) -> Self {
        items.fold(Self::default(), |mut totals, (tokens, cost)| {
            totals.tokens += *tokens;
            totals.total_cost += cost;
            totals
        })
    }

    pub fn from_daily(daily: &[DailyAggregate]) -> Self {
        Self::sum(daily.iter().map(|d| (&d.tokens, d.total_cost)))
    }

    pub fn from_sessions(sessions: &[SessionAggregate]) -> Self {
        Self::sum(sessions.iter().map(|s| (&s.tokens, s.total_cost)))
    }

    pub fn from_monthly(monthly: &[MonthlyAggregate]) -> Self {
        Self::sum(monthly.iter().map(|m| (&m.tokens, m.total_cost)))
    }
}
