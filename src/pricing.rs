//! Pricing Resolver
//!
//! Resolves a model name to per-token prices and turns token counts into a
//! dollar cost. The price table comes from a [`PricingSource`] and is loaded at
//! most once per [`PricingResolver`]; every later lookup, including across
//! live-monitor ticks, reuses it.
//!
//! Resolution order for a model name:
//! 1. exact key
//! 2. provider-prefixed variants (`anthropic/<name>`, `claude-<name>`, ...)
//! 3. first case-insensitive substring match, in either direction, walking the
//!    table in lexicographic key order
//!
//! An unresolvable model costs 0; it is not an error.

use crate::config::PricingConfig;
use crate::error::PricingError;
use crate::models::{ModelPriceEntry, TokenCounts};
use anyhow::Result;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Model name to prices, iterated in key order.
pub type PriceTable = BTreeMap<String, ModelPriceEntry>;

const PROVIDER_PREFIXES: &[&str] = &[
    "anthropic/",
    "claude-3-5-",
    "claude-3-",
    "claude-",
    "openai/",
    "azure/",
    "openrouter/openai/",
];

/// Supplies the raw price table. Implementations own any I/O.
pub trait PricingSource: Send + Sync {
    fn name(&self) -> &str;
    fn fetch(&self) -> BoxFuture<'_, Result<PriceTable>>;
}

/// Build a price table from a `model -> { *_cost_per_token ... }` JSON object.
/// Entries that are not objects or carry no rate at all are left out.
pub fn parse_price_table(raw: &Value) -> PriceTable {
    let mut table = PriceTable::new();

    let Some(models) = raw.as_object() else {
        return table;
    };

    for (model_name, pricing) in models {
        if !pricing.is_object() {
            continue;
        }
        let rate = |field: &str| pricing.get(field).and_then(Value::as_f64);
        let entry = ModelPriceEntry {
            input_cost_per_token: rate("input_cost_per_token"),
            output_cost_per_token: rate("output_cost_per_token"),
            cache_creation_input_token_cost: rate("cache_creation_input_token_cost"),
            cache_read_input_token_cost: rate("cache_read_input_token_cost"),
        };
        if entry == ModelPriceEntry::default() {
            continue;
        }
        table.insert(model_name.clone(), entry);
    }

    table
}

/// Remote LiteLLM price dataset.
#[cfg(feature = "pricing")]
pub struct LiteLlmSource {
    url: String,
    timeout: std::time::Duration,
}

#[cfg(feature = "pricing")]
impl LiteLlmSource {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            url: url.into(),
            timeout: std::time::Duration::from_secs(timeout_secs.max(1)),
        }
    }

    async fn fetch_table(&self) -> Result<PriceTable> {
        use anyhow::Context;

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .context("Failed to build pricing http client")?;

        let response = client
            .get(&self.url)
            .send()
            .await
            .context("Failed to fetch pricing data from LiteLLM")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Pricing dataset request failed with {status}");
        }

        let raw: Value = response
            .json()
            .await
            .context("Failed to parse pricing data JSON")?;

        Ok(parse_price_table(&raw))
    }
}

#[cfg(feature = "pricing")]
impl PricingSource for LiteLlmSource {
    fn name(&self) -> &str {
        &self.url
    }

    fn fetch(&self) -> BoxFuture<'_, Result<PriceTable>> {
        Box::pin(self.fetch_table())
    }
}

/// Built-in prices for current Claude models, for offline runs.
pub struct EmbeddedPricingSource;

impl EmbeddedPricingSource {
    fn table() -> PriceTable {
        let entry = |input: f64, output: f64, cache_creation: f64, cache_read: f64| ModelPriceEntry {
            input_cost_per_token: Some(input),
            output_cost_per_token: Some(output),
            cache_creation_input_token_cost: Some(cache_creation),
            cache_read_input_token_cost: Some(cache_read),
        };

        let opus = entry(1.5e-05, 7.5e-05, 1.875e-05, 1.5e-06);
        let sonnet = entry(3e-06, 1.5e-05, 3.75e-06, 3e-07);

        let mut pricing = PriceTable::new();
        pricing.insert("claude-opus-4-1-20250805".to_string(), opus.clone());
        pricing.insert("claude-opus-4-20250514".to_string(), opus.clone());
        pricing.insert("claude-3-opus-20240229".to_string(), opus);
        pricing.insert("claude-sonnet-4-5-20250929".to_string(), sonnet.clone());
        pricing.insert("claude-sonnet-4-20250514".to_string(), sonnet.clone());
        pricing.insert("claude-3-7-sonnet-20250219".to_string(), sonnet.clone());
        pricing.insert("claude-3-5-sonnet-20241022".to_string(), sonnet);
        pricing.insert(
            "claude-haiku-4-5-20251001".to_string(),
            entry(1e-06, 5e-06, 1.25e-06, 1e-07),
        );
        pricing.insert(
            "claude-3-5-haiku-20241022".to_string(),
            entry(8e-07, 4e-06, 1e-06, 8e-08),
        );
        pricing.insert(
            "claude-3-haiku-20240307".to_string(),
            entry(2.5e-07, 1.25e-06, 3e-07, 3e-08),
        );
        pricing
    }
}

impl PricingSource for EmbeddedPricingSource {
    fn name(&self) -> &str {
        "embedded"
    }

    fn fetch(&self) -> BoxFuture<'_, Result<PriceTable>> {
        Box::pin(async { Ok::<_, anyhow::Error>(Self::table()) })
    }
}

/// A table the caller already has in hand.
pub struct StaticPricingSource {
    table: PriceTable,
}

impl StaticPricingSource {
    pub fn new(table: PriceTable) -> Self {
        Self { table }
    }

    pub fn from_json(raw: &Value) -> Self {
        Self::new(parse_price_table(raw))
    }
}

impl PricingSource for StaticPricingSource {
    fn name(&self) -> &str {
        "static"
    }

    fn fetch(&self) -> BoxFuture<'_, Result<PriceTable>> {
        let table = self.table.clone();
        Box::pin(async move { Ok::<_, anyhow::Error>(table) })
    }
}

/// Owns one cached price table. Construct it, use it, then [`close`] it; the
/// table is also released when the resolver is dropped, on any exit path.
///
/// [`close`]: PricingResolver::close
pub struct PricingResolver {
    source: Box<dyn PricingSource>,
    table: OnceCell<PriceTable>,
    closed: bool,
}

impl PricingResolver {
    pub fn new(source: impl PricingSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            table: OnceCell::new(),
            closed: false,
        }
    }

    /// Pick the source the configuration asks for.
    pub fn from_config(config: &PricingConfig) -> Self {
        if config.offline {
            return Self::new(EmbeddedPricingSource);
        }

        #[cfg(feature = "pricing")]
        {
            Self::new(LiteLlmSource::new(config.url.clone(), config.timeout_secs))
        }
        #[cfg(not(feature = "pricing"))]
        {
            tracing::warn!("Built without remote pricing support, using embedded prices");
            Self::new(EmbeddedPricingSource)
        }
    }

    async fn table(&self) -> Result<&PriceTable, PricingError> {
        if self.closed {
            return Err(PricingError::Closed);
        }

        self.table
            .get_or_try_init(|| async {
                let table = self
                    .source
                    .fetch()
                    .await
                    .map_err(|e| PricingError::Fetch(format!("{e:#}")))?;
                info!(source = self.source.name(), models = table.len(), "Loaded pricing table");
                Ok::<_, PricingError>(table)
            })
            .await
    }

    /// Whether the table has been fetched.
    pub fn is_loaded(&self) -> bool {
        self.table.initialized()
    }

    /// Resolve a model name against an already-loaded table.
    pub fn resolve_in<'t>(table: &'t PriceTable, model_name: &str) -> Option<(&'t str, &'t ModelPriceEntry)> {
        if model_name.is_empty() {
            return None;
        }

        if let Some((key, entry)) = table.get_key_value(model_name) {
            return Some((key.as_str(), entry));
        }

        for prefix in PROVIDER_PREFIXES {
            let candidate = format!("{prefix}{model_name}");
            if let Some((key, entry)) = table.get_key_value(&candidate) {
                return Some((key.as_str(), entry));
            }
        }

        let lower = model_name.to_lowercase();
        table
            .iter()
            .find(|(key, _)| {
                let key_lower = key.to_lowercase();
                key_lower.contains(&lower) || lower.contains(&key_lower)
            })
            .map(|(key, entry)| (key.as_str(), entry))
    }

    pub async fn resolve(&self, model_name: &str) -> Result<Option<ModelPriceEntry>, PricingError> {
        let table = self.table().await?;
        Ok(Self::resolve_in(table, model_name).map(|(_, entry)| entry.clone()))
    }

    /// Token-based cost for one model. Unknown or missing model costs 0.
    pub async fn calculate_cost(
        &self,
        tokens: &TokenCounts,
        model_name: Option<&str>,
    ) -> Result<f64, PricingError> {
        let Some(model_name) = model_name else {
            return Ok(0.0);
        };

        let table = self.table().await?;
        match Self::resolve_in(table, model_name) {
            Some((matched, entry)) => {
                debug!(model = model_name, matched, "Resolved model pricing");
                Ok(entry.cost_for(tokens))
            }
            None => {
                debug!(model = model_name, "No pricing found for model");
                Ok(0.0)
            }
        }
    }

    /// Release the cached table. Later lookups fail with [`PricingError::Closed`].
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.table.take().is_some() {
            debug!(source = self.source.name(), "Released pricing table");
        }
    }
}

impl Drop for PricingResolver {
    fn drop(&mut self) {
        self.close();
    }
}
