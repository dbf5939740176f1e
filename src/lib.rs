//! Claude Ledger Library
//!
//! Turns the JSONL session logs written by the Claude Code assistant into
//! deduplicated, cost-annotated usage reports and rolling billing blocks.
//!
//! ## Core Features
//!
//! - **Validated ingestion**: every line checked on its own, bad lines dropped
//! - **Cross-file deduplication**: the chronologically earliest copy of a
//!   response wins, whatever the files are called
//! - **Cost modes**: precomputed, calculated from tokens, or a mix
//! - **Reports**: daily, per-session and monthly aggregates with per-model breakdowns
//! - **Session blocks**: fixed-duration billing windows with gap detection,
//!   burn rate and end-of-block projection
//! - **Live monitoring**: a poll loop reporting the active block
//!
//! ## Architecture Overview
//!
//! - [`parser`] - line validation and file ingestion
//! - [`dedup`] - file ordering and the seen-key set
//! - [`pricing`] - price table sources and model name resolution
//! - [`cost`] - per-event cost selection
//! - [`aggregation`] - daily, session and monthly aggregates
//! - [`blocks`] - session-block segmentation
//! - [`burn_rate`] - rates and projections for a block
//! - [`analyzer`] - the one-shot report pipeline
//! - [`monitor`] - the live refresh loop
//! - [`file_discovery`] - where log files come from
//! - [`config`], [`logging`], [`display`] - the binary's ambient pieces
//!
//! ## Main Entry Point
//!
//! One-shot reports go through [`UsageAnalyzer`]; live monitoring through
//! [`LiveMonitor`]. Both own a [`PricingResolver`] and take every setting as an
//! explicit argument.

pub mod aggregation;
pub mod analyzer;
pub mod blocks;
pub mod burn_rate;
pub mod config;
pub mod cost;
pub mod dedup;
pub mod display;
pub mod error;
pub mod file_discovery;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod parser;
pub mod pricing;
pub mod session_utils;
pub mod timestamp_parser;

pub use analyzer::UsageAnalyzer;
pub use monitor::{CancelSignal, LiveMonitor};
pub use pricing::PricingResolver;
pub use models::*;
