//! Event Ingestion & Validation
//!
//! Turns raw JSONL text into validated [`UsageEvent`]s. Every line is checked
//! on its own: a line that is not JSON, or that lacks a usable timestamp or
//! usage block, is dropped with a [`ValidationError`] and the rest of the file
//! is still read. Nothing here ever fails a whole file because of one line.

use crate::error::ValidationError;
use crate::models::{LogFile, SessionIdentity, TokenCounts, UsageEvent};
use crate::timestamp_parser::TimestampParser;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, trace};

#[derive(Debug, Deserialize)]
struct RawUsage {
    input_tokens: u64,
    output_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: Option<u64>,
    #[serde(default)]
    cache_read_input_tokens: Option<u64>,
}

impl From<RawUsage> for TokenCounts {
    fn from(raw: RawUsage) -> Self {
        TokenCounts::new(
            raw.input_tokens,
            raw.output_tokens,
            raw.cache_creation_input_tokens.unwrap_or(0),
            raw.cache_read_input_tokens.unwrap_or(0),
        )
    }
}

/// Result of ingesting one file's text.
#[derive(Debug, Default)]
pub struct ParsedFile {
    pub events: Vec<UsageEvent>,
    pub skipped_lines: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FileParser;

impl FileParser {
    pub fn new() -> Self {
        Self
    }

    /// Validate a single JSONL line against the usage-event shape.
    pub fn validate_line(
        &self,
        line: &str,
        session: &SessionIdentity,
    ) -> Result<UsageEvent, ValidationError> {
        let value: Value = serde_json::from_str(line)
            .map_err(|e| ValidationError::InvalidJson(e.to_string()))?;

        let raw_timestamp = value
            .get("timestamp")
            .and_then(Value::as_str)
            .ok_or(ValidationError::MissingTimestamp)?;
        let timestamp = TimestampParser::parse(raw_timestamp)
            .map_err(|_| ValidationError::InvalidTimestamp(raw_timestamp.to_string()))?;

        let usage = value
            .pointer("/message/usage")
            .filter(|u| !u.is_null())
            .ok_or(ValidationError::MissingUsage)?;
        let tokens: TokenCounts = serde_json::from_value::<RawUsage>(usage.clone())
            .map_err(|e| ValidationError::InvalidUsage(e.to_string()))?
            .into();

        let string_at = |pointer: &str| {
            value
                .pointer(pointer)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Ok(UsageEvent {
            timestamp,
            model: string_at("/message/model"),
            tokens,
            cost_usd: value.get("costUSD").and_then(Value::as_f64),
            message_id: string_at("/message/id"),
            request_id: string_at("/requestId"),
            version: string_at("/version"),
            session: session.clone(),
        })
    }

    /// Ingest the full text of one file, keeping only lines that validate.
    pub fn parse_content(&self, content: &str, session: &SessionIdentity) -> ParsedFile {
        let mut parsed = ParsedFile::default();

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match self.validate_line(line, session) {
                Ok(event) => parsed.events.push(event),
                Err(reason) => {
                    trace!(line = index + 1, %reason, "Skipping line");
                    parsed.skipped_lines += 1;
                }
            }
        }

        parsed
    }

    /// Read and ingest one log file.
    pub async fn read_events(&self, file: &LogFile) -> Result<Vec<UsageEvent>> {
        let content = tokio::fs::read_to_string(&file.path)
            .await
            .with_context(|| format!("Failed to read log file: {}", file.path.display()))?;

        let parsed = self.parse_content(&content, &file.session);
        debug!(
            file = %file.path.display(),
            events = parsed.events.len(),
            skipped = parsed.skipped_lines,
            "Ingested log file"
        );

        Ok(parsed.events)
    }

    /// Earliest parseable `timestamp` among the lines of `content`.
    ///
    /// Only the timestamp field is looked at, so lines that are not usage
    /// events still count. Unparseable lines are skipped.
    pub fn earliest_timestamp_in(&self, content: &str) -> Option<DateTime<Utc>> {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|value| {
                value
                    .get("timestamp")
                    .and_then(Value::as_str)
                    .and_then(|ts| TimestampParser::parse(ts).ok())
            })
            .min()
    }

    pub async fn get_earliest_timestamp(&self, path: &Path) -> Result<Option<DateTime<Utc>>> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read log file: {}", path.display()))?;
        Ok(self.earliest_timestamp_in(&content))
    }
}
