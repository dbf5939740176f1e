//! Typed errors for the two seams where callers branch on the failure kind.
//! Everything else propagates as `anyhow::Error`.

use thiserror::Error;

/// Why a JSONL line was not accepted as a usage event.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("line is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("missing timestamp")]
    MissingTimestamp,
    #[error("unparseable timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("missing message.usage block")]
    MissingUsage,
    #[error("invalid usage block: {0}")]
    InvalidUsage(String),
}

#[derive(Debug, Error)]
pub enum PricingError {
    #[error("failed to load pricing table: {0}")]
    Fetch(String),
    #[error("pricing resolver has been closed")]
    Closed,
}
