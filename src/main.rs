use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use claude_ledger::aggregation::ReportOptions;
use claude_ledger::blocks::{filter_recent_blocks, max_block_tokens, BlockOptions};
use claude_ledger::config::Config;
use claude_ledger::display::DisplayManager;
use claude_ledger::file_discovery::{ClaudeProjectsDiscovery, FileSource};
use claude_ledger::logging::init_logging;
use claude_ledger::models::{CostMode, ReportTimezone, SortOrder};
use claude_ledger::monitor::{CancelSignal, LiveMonitor, MonitorOptions};
use claude_ledger::pricing::PricingResolver;
use claude_ledger::UsageAnalyzer;
use colored::Colorize;
use std::process;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "claude-ledger")]
#[command(about = "Usage reports and billing blocks from Claude Code session logs")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Default)]
struct GlobalArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Cost mode: auto, calculate, or display
    #[arg(long, global = true)]
    mode: Option<CostMode>,

    /// Sort order: asc or desc
    #[arg(long, global = true)]
    order: Option<SortOrder>,

    /// Start date filter, inclusive (YYYYMMDD)
    #[arg(long, global = true, value_parser = parse_compact_date)]
    since: Option<String>,

    /// End date filter, inclusive (YYYYMMDD)
    #[arg(long, global = true, value_parser = parse_compact_date)]
    until: Option<String>,

    /// Bucket dates in UTC instead of local time
    #[arg(long, global = true)]
    utc: bool,

    /// Use built-in prices instead of fetching them
    #[arg(long, global = true)]
    offline: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show usage grouped by day
    Daily,
    /// Show usage grouped by month
    Monthly,
    /// Show usage grouped by conversation session
    Session,
    /// Show session billing blocks
    Blocks {
        /// Only show the active block
        #[arg(long)]
        active: bool,
        /// Only show blocks from the last few days (plus any active block)
        #[arg(long)]
        recent: bool,
        /// Token limit for projections: a number, or "max" for the largest past block
        #[arg(long)]
        token_limit: Option<String>,
        /// Block length in hours
        #[arg(long)]
        session_length: Option<u32>,
    },
    /// Watch the active block, refreshing until Ctrl+C
    Live {
        /// Token limit for projections: a number, or "max" for the largest past block
        #[arg(long)]
        token_limit: Option<String>,
        /// Block length in hours
        #[arg(long)]
        session_length: Option<u32>,
        /// Seconds between refreshes (1-60)
        #[arg(long)]
        refresh_interval: Option<u64>,
    },
}

fn parse_compact_date(value: &str) -> Result<String, String> {
    if value.len() != 8 {
        return Err(format!("expected YYYYMMDD, got {value}"));
    }
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .map(|_| value.to_string())
        .map_err(|e| format!("invalid date {value}: {e}"))
}

enum TokenLimit {
    Fixed(u64),
    Max,
}

fn parse_token_limit(value: Option<&str>) -> Result<Option<TokenLimit>> {
    match value {
        None => Ok(None),
        Some(v) if v.eq_ignore_ascii_case("max") => Ok(Some(TokenLimit::Max)),
        Some(v) => v
            .parse()
            .map(|n| Some(TokenLimit::Fixed(n)))
            .with_context(|| format!("Invalid token limit: {v}")),
    }
}

fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    let global = &cli.global;
    if let Some(mode) = global.mode {
        config.report.cost_mode = mode;
    }
    if let Some(order) = global.order {
        config.report.order = order;
    }
    if global.utc {
        config.report.timezone = ReportTimezone::Utc;
    }
    if global.offline {
        config.pricing.offline = true;
    }

    match &cli.command {
        Some(Commands::Blocks { session_length, .. }) => {
            if let Some(hours) = session_length {
                config.blocks.duration_hours = *hours;
            }
        }
        Some(Commands::Live {
            session_length,
            refresh_interval,
            ..
        }) => {
            if let Some(hours) = session_length {
                config.blocks.duration_hours = *hours;
            }
            if let Some(secs) = refresh_interval {
                config.live.refresh_interval_secs = *secs;
            }
        }
        _ => {}
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.global.json;

    if let Err(e) = run(cli).await {
        handle_error(e, json);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    apply_cli_overrides(&mut config, &cli);
    config.validate()?;

    if config.logging.output != "console" {
        std::fs::create_dir_all(&config.paths.log_directory)
            .context("Failed to create log directory")?;
    }
    let _guard = init_logging(&config.logging, &config.paths.log_directory);

    let discovery = ClaudeProjectsDiscovery::new(config.paths.claude_roots.clone());
    if discovery.existing_roots().is_empty() {
        warn!(roots = ?config.paths.claude_roots, "No Claude data directory found");
    }

    let display = DisplayManager::new(cli.global.json);
    let report_options = ReportOptions {
        since: cli.global.since.clone(),
        until: cli.global.until.clone(),
        order: config.report.order,
        timezone: config.report.timezone,
    };
    let mut analyzer = UsageAnalyzer::new(
        PricingResolver::from_config(&config.pricing),
        config.report.cost_mode,
    );

    let result = match cli.command.unwrap_or(Commands::Daily) {
        Commands::Daily => {
            let daily = analyzer
                .daily_report(discovery.discover()?, &report_options)
                .await?;
            display.display_daily(&daily)
        }
        Commands::Monthly => {
            let monthly = analyzer
                .monthly_report(discovery.discover()?, &report_options)
                .await?;
            display.display_monthly(&monthly)
        }
        Commands::Session => {
            let sessions = analyzer
                .session_report(discovery.discover()?, &report_options)
                .await?;
            display.display_sessions(&sessions)
        }
        Commands::Blocks {
            active,
            recent,
            token_limit,
            ..
        } => {
            let now = Utc::now();
            let mut blocks = analyzer
                .blocks_report(
                    discovery.discover()?,
                    config.blocks.block_options(),
                    config.report.order,
                    now,
                )
                .await?;

            let token_limit = match parse_token_limit(token_limit.as_deref())? {
                Some(TokenLimit::Max) => Some(max_block_tokens(&blocks)),
                Some(TokenLimit::Fixed(n)) => Some(n),
                None => None,
            };

            if recent {
                blocks = filter_recent_blocks(&blocks, config.blocks.recent_days, now);
            }
            if active {
                blocks.retain(|b| b.is_active);
            }
            display.display_blocks(&blocks, now, token_limit)
        }
        Commands::Live { token_limit, .. } => {
            let token_limit = match parse_token_limit(token_limit.as_deref())? {
                Some(TokenLimit::Max) => {
                    let history = analyzer
                        .blocks_report(
                            discovery.discover()?,
                            config.blocks.block_options(),
                            SortOrder::Asc,
                            Utc::now(),
                        )
                        .await?;
                    Some(max_block_tokens(&history))
                }
                Some(TokenLimit::Fixed(n)) => Some(n),
                None => None,
            };
            run_live(&config, &display, discovery, token_limit).await
        }
    };

    analyzer.close();
    result
}

async fn run_live(
    config: &Config,
    display: &DisplayManager,
    discovery: ClaudeProjectsDiscovery,
    token_limit: Option<u64>,
) -> Result<()> {
    let options = MonitorOptions {
        blocks: BlockOptions {
            duration_hours: config.blocks.duration_hours,
        },
        refresh_interval: Duration::from_secs(config.live.refresh_interval_secs),
        order: config.report.order,
        cost_mode: config.report.cost_mode,
    };
    let mut monitor = LiveMonitor::new(
        discovery,
        PricingResolver::from_config(&config.pricing),
        options,
    );

    let cancel = CancelSignal::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    info!(monitor_id = %monitor.monitor_id(), "Starting live monitor");
    let result = monitor
        .run(cancel, |active| display.display_live(active, Utc::now(), token_limit))
        .await;
    monitor.close();

    if result.is_ok() {
        display.display_stopped();
    }
    result
}

fn handle_error(e: anyhow::Error, json: bool) -> ! {
    if json {
        println!("{}", serde_json::json!({ "error": format!("{e:#}") }));
    } else {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
    }
    process::exit(1);
}
