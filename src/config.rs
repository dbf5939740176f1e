//! Configuration
//!
//! Settings come from, in increasing precedence:
//! - Built-in defaults
//! - The first config file found (`claude-ledger.toml`, `.claude-ledger.toml`,
//!   or `<config_dir>/claude-ledger/config.toml`)
//! - Environment variables
//!
//! The result is validated before use. Library components never read this
//! directly; the binary converts it into explicit option structs.

use crate::blocks::{BlockOptions, DEFAULT_SESSION_DURATION_HOURS};
use crate::models::{CostMode, ReportTimezone, SortOrder};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

pub const DEFAULT_PRICING_URL: &str =
    "https://raw.githubusercontent.com/BerriAI/litellm/main/model_prices_and_context_window.json";

/// Longest accepted session block: one week.
pub const MAX_SESSION_DURATION_HOURS: u32 = 24 * 7;

const LOG_LEVELS: &[&str] = &["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
const LOG_FORMATS: &[&str] = &["pretty", "json"];
const LOG_OUTPUTS: &[&str] = &["console", "file", "both"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub report: ReportConfig,
    pub blocks: BlocksConfig,
    pub live: LiveConfig,
    pub pricing: PricingConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "ERROR".to_string(),
            format: "pretty".to_string(),
            output: "console".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub cost_mode: CostMode,
    pub order: SortOrder,
    pub timezone: ReportTimezone,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlocksConfig {
    pub duration_hours: u32,
    /// How far back `blocks --recent` looks
    pub recent_days: u32,
}

impl Default for BlocksConfig {
    fn default() -> Self {
        Self {
            duration_hours: DEFAULT_SESSION_DURATION_HOURS,
            recent_days: 3,
        }
    }
}

impl BlocksConfig {
    pub fn block_options(&self) -> BlockOptions {
        BlockOptions {
            duration_hours: self.duration_hours,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub refresh_interval_secs: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub url: String,
    pub timeout_secs: u64,
    /// Use the built-in price table and never touch the network
    pub offline: bool,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PRICING_URL.to_string(),
            timeout_secs: 10,
            offline: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directories containing a `projects/` tree of session logs
    pub claude_roots: Vec<PathBuf>,
    pub log_directory: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let mut claude_roots = vec![home.join(".claude")];
        if let Some(config_dir) = dirs::config_dir() {
            claude_roots.push(config_dir.join("claude"));
        }

        Self {
            claude_roots,
            log_directory: PathBuf::from("logs"),
        }
    }
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow!("Invalid {}: {}", name, e))
}

impl Config {
    /// Load configuration from file, environment, and defaults
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        let config_paths = [
            Some(PathBuf::from("claude-ledger.toml")),
            Some(PathBuf::from(".claude-ledger.toml")),
            dirs::config_dir().map(|d| d.join("claude-ledger").join("config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                info!(config_file = %path.display(), "Loading configuration from file");
                config = Self::load_from_file(path)?;
                break;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.logging.level = val.to_uppercase();
        }
        if let Ok(val) = env::var("LOG_FORMAT") {
            self.logging.format = val.to_lowercase();
        }
        if let Ok(val) = env::var("LOG_OUTPUT") {
            self.logging.output = val.to_lowercase();
        }

        if let Ok(val) = env::var("CLAUDE_LEDGER_COST_MODE") {
            self.report.cost_mode = parse_env("CLAUDE_LEDGER_COST_MODE", &val)?;
        }
        if let Ok(val) = env::var("CLAUDE_LEDGER_ORDER") {
            self.report.order = parse_env("CLAUDE_LEDGER_ORDER", &val)?;
        }
        if let Ok(val) = env::var("CLAUDE_LEDGER_TIMEZONE") {
            self.report.timezone = parse_env("CLAUDE_LEDGER_TIMEZONE", &val)?;
        }

        if let Ok(val) = env::var("CLAUDE_LEDGER_SESSION_HOURS") {
            self.blocks.duration_hours = parse_env("CLAUDE_LEDGER_SESSION_HOURS", &val)?;
        }
        if let Ok(val) = env::var("CLAUDE_LEDGER_REFRESH_SECS") {
            self.live.refresh_interval_secs = parse_env("CLAUDE_LEDGER_REFRESH_SECS", &val)?;
        }

        if let Ok(val) = env::var("CLAUDE_LEDGER_PRICING_URL") {
            self.pricing.url = val;
        }
        if let Ok(val) = env::var("CLAUDE_LEDGER_OFFLINE") {
            self.pricing.offline = parse_env("CLAUDE_LEDGER_OFFLINE", &val)?;
        }

        // Comma-separated, like the assistant's own variable
        if let Ok(val) = env::var("CLAUDE_CONFIG_DIR") {
            let roots: Vec<PathBuf> = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect();
            if !roots.is_empty() {
                self.paths.claude_roots = roots;
            }
        }
        if let Ok(val) = env::var("CLAUDE_LEDGER_LOG_DIR") {
            self.paths.log_directory = PathBuf::from(val);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let level = self.logging.level.to_uppercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(anyhow!("Unknown log level: {}", self.logging.level));
        }
        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(anyhow!("Unknown log format: {}", self.logging.format));
        }
        if !LOG_OUTPUTS.contains(&self.logging.output.as_str()) {
            return Err(anyhow!("Unknown log output: {}", self.logging.output));
        }

        if !(1..=MAX_SESSION_DURATION_HOURS).contains(&self.blocks.duration_hours) {
            return Err(anyhow!(
                "Session block duration must be between 1 and {} hours, got {}",
                MAX_SESSION_DURATION_HOURS,
                self.blocks.duration_hours
            ));
        }

        if !(1..=60).contains(&self.live.refresh_interval_secs) {
            return Err(anyhow!(
                "Refresh interval must be between 1 and 60 seconds, got {}",
                self.live.refresh_interval_secs
            ));
        }

        if self.pricing.timeout_secs == 0 {
            return Err(anyhow!("Pricing timeout must be greater than 0"));
        }

        Ok(())
    }
}
