//! Cost Mode Selector
//!
//! Chooses the cost recorded for each event. `display` never touches the
//! resolver, so it works without network access; `calculate` always prices
//! from tokens; `auto` prefers the precomputed figure and prices only events
//! that lack one.

use crate::error::PricingError;
use crate::models::{CostMode, PricedEvent, UsageEvent};
use crate::pricing::PricingResolver;
use tracing::trace;

pub async fn calculate_event_cost(
    event: &UsageEvent,
    mode: CostMode,
    resolver: &PricingResolver,
) -> Result<f64, PricingError> {
    let cost = match mode {
        CostMode::Display => event.cost_usd.unwrap_or(0.0),
        CostMode::Calculate => {
            resolver
                .calculate_cost(&event.tokens, event.model.as_deref())
                .await?
        }
        CostMode::Auto => match event.cost_usd {
            Some(cost) => cost,
            None => {
                resolver
                    .calculate_cost(&event.tokens, event.model.as_deref())
                    .await?
            }
        },
    };

    trace!(
        %mode,
        model = ?event.model,
        precomputed = ?event.cost_usd,
        cost,
        "Selected event cost"
    );
    Ok(cost)
}

/// Attach a cost to every event, preserving order.
pub async fn price_events(
    events: Vec<UsageEvent>,
    mode: CostMode,
    resolver: &PricingResolver,
) -> Result<Vec<PricedEvent>, PricingError> {
    let mut priced = Vec::with_capacity(events.len());
    for event in events {
        let cost = calculate_event_cost(&event, mode, resolver).await?;
        priced.push(PricedEvent { event, cost });
    }
    Ok(priced)
}
