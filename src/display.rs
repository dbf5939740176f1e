//! Output Formatting
//!
//! Prints reports either as colored terminal text or as pretty JSON on stdout.
//! JSON output wraps each report in an object keyed by its kind
//! (`daily`, `monthly`, `sessions`, `blocks`) alongside a `totals` entry.
//!
//! ```json
//! {
//!   "daily": [
//!     {
//!       "date": "2025-01-15",
//!       "inputTokens": 300,
//!       "outputTokens": 150,
//!       "cacheCreationTokens": 0,
//!       "cacheReadTokens": 0,
//!       "totalCost": 0.03,
//!       "modelsUsed": ["claude-sonnet-4-20250514"],
//!       "modelBreakdowns": [...]
//!     }
//!   ],
//!   "totals": { "inputTokens": 300, ... }
//! }
//! ```

use crate::aggregation::Totals;
use crate::burn_rate::{calculate_burn_rate, project_block_usage, token_limit_status, TokenLimitStatus};
use crate::models::*;
use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use colored::{ColoredString, Colorize};
use serde::Serialize;

/// A block plus the analytics derived from it, as written in JSON output.
#[derive(Debug, Serialize)]
struct BlockView<'a> {
    #[serde(flatten)]
    block: &'a SessionBlock,
    #[serde(rename = "entryCount")]
    entry_count: usize,
    #[serde(rename = "burnRate")]
    burn_rate: Option<BurnRate>,
    projection: Option<ProjectedUsage>,
    #[serde(rename = "tokenLimitStatus", skip_serializing_if = "Option::is_none")]
    token_limit_status: Option<TokenLimitStatus>,
}

impl<'a> BlockView<'a> {
    fn new(block: &'a SessionBlock, now: DateTime<Utc>, token_limit: Option<u64>) -> Self {
        let projection = project_block_usage(block, now);
        let token_limit_status = match (projection, token_limit) {
            (Some(p), Some(limit)) => Some(token_limit_status(p.total_tokens, limit)),
            _ => None,
        };
        Self {
            block,
            entry_count: block.entry_count(),
            burn_rate: calculate_burn_rate(block),
            projection,
            token_limit_status,
        }
    }
}

/// Digits grouped in threes: `1234567` becomes `1,234,567`.
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn money(cost: f64) -> ColoredString {
    format!("${:.2}", cost).bright_green()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize report")?;
    println!("{}", json);
    Ok(())
}

fn print_header(title: &str) {
    println!("\n{}", "=".repeat(80).bright_cyan());
    println!("{}", title.bright_white().bold());
    println!("{}", "=".repeat(80).bright_cyan());
}

fn print_tokens(tokens: &TokenCounts) {
    println!(
        "   in {} • out {} • cache write {} • cache read {}",
        format_number(tokens.input_tokens).bright_white(),
        format_number(tokens.output_tokens).bright_white(),
        format_number(tokens.cache_creation_tokens).white(),
        format_number(tokens.cache_read_tokens).white()
    );
}

fn print_breakdowns(breakdowns: &[ModelBreakdown]) {
    for breakdown in breakdowns {
        println!(
            "   {} {}: {} ({} tokens)",
            "•".bright_black(),
            breakdown.model_name.bright_cyan(),
            money(breakdown.cost),
            format_number(breakdown.tokens.total())
        );
    }
}

fn print_totals(totals: &Totals) {
    println!("{}", "-".repeat(80).bright_black());
    println!(
        "{} Total: {} tokens • {}",
        "📊".bright_yellow(),
        format_number(totals.tokens.total()).bright_white().bold(),
        money(totals.total_cost).bold()
    );
    print_tokens(&totals.tokens);
}

fn print_empty() {
    println!("{}", "No usage data found.".yellow());
}

#[derive(Debug, Default)]
pub struct DisplayManager {
    json_output: bool,
}

impl DisplayManager {
    pub fn new(json_output: bool) -> Self {
        Self { json_output }
    }

    pub fn display_daily(&self, daily: &[DailyAggregate]) -> Result<()> {
        let totals = Totals::from_daily(daily);
        if self.json_output {
            return print_json(&serde_json::json!({ "daily": daily, "totals": totals }));
        }

        print_header("Claude Usage Report - Daily");
        if daily.is_empty() {
            print_empty();
            return Ok(());
        }
        for day in daily {
            println!(
                "\n{} {} — {}",
                "📅".bright_blue(),
                day.date.bright_white().bold(),
                money(day.total_cost).bold()
            );
            print_tokens(&day.tokens);
            print_breakdowns(&day.model_breakdowns);
        }
        print_totals(&totals);
        Ok(())
    }

    pub fn display_monthly(&self, monthly: &[MonthlyAggregate]) -> Result<()> {
        let totals = Totals::from_monthly(monthly);
        if self.json_output {
            return print_json(&serde_json::json!({ "monthly": monthly, "totals": totals }));
        }

        print_header("Claude Usage Report - Monthly");
        if monthly.is_empty() {
            print_empty();
            return Ok(());
        }
        for month in monthly {
            println!(
                "\n{} {} — {}",
                "📅".bright_blue(),
                month.month.bright_white().bold(),
                money(month.total_cost).bold()
            );
            print_tokens(&month.tokens);
            print_breakdowns(&month.model_breakdowns);
        }
        print_totals(&totals);
        Ok(())
    }

    pub fn display_sessions(&self, sessions: &[SessionAggregate]) -> Result<()> {
        let totals = Totals::from_sessions(sessions);
        if self.json_output {
            return print_json(&serde_json::json!({ "sessions": sessions, "totals": totals }));
        }

        print_header("Claude Usage Report - Sessions");
        if sessions.is_empty() {
            print_empty();
            return Ok(());
        }
        for session in sessions {
            println!(
                "\n{} {} / {} — {} (last active {})",
                "🗂".bright_blue(),
                session.session.project_path.bright_cyan(),
                session.session.session_id.bright_white().bold(),
                money(session.total_cost).bold(),
                session.last_activity
            );
            if !session.versions.is_empty() {
                println!("   versions: {}", session.versions.join(", ").bright_black());
            }
            print_tokens(&session.tokens);
            print_breakdowns(&session.model_breakdowns);
        }
        print_totals(&totals);
        Ok(())
    }

    pub fn display_blocks(
        &self,
        blocks: &[SessionBlock],
        now: DateTime<Utc>,
        token_limit: Option<u64>,
    ) -> Result<()> {
        if self.json_output {
            let views: Vec<BlockView> = blocks
                .iter()
                .map(|b| BlockView::new(b, now, token_limit))
                .collect();
            return print_json(&serde_json::json!({ "blocks": views }));
        }

        print_header("Claude Usage Report - Session Blocks");
        if blocks.is_empty() {
            print_empty();
            return Ok(());
        }
        for block in blocks {
            self.print_block(block, now, token_limit);
        }
        Ok(())
    }

    /// Redraw the live view for one monitor tick.
    pub fn display_live(
        &self,
        active: Option<&SessionBlock>,
        now: DateTime<Utc>,
        token_limit: Option<u64>,
    ) -> Result<()> {
        if self.json_output {
            let view = active.map(|b| BlockView::new(b, now, token_limit));
            return print_json(&serde_json::json!({ "activeBlock": view }));
        }

        // Clear screen, cursor home
        print!("\x1b[2J\x1b[H");
        println!("{}", "[ CLAUDE LEDGER LIVE ]".bright_cyan().bold());
        println!(
            "{}",
            now.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string().bright_black()
        );
        match active {
            Some(block) => self.print_block(block, now, token_limit),
            None => println!("\n{} No active session block", "📝".bright_white()),
        }
        Ok(())
    }

    pub fn display_stopped(&self) {
        if !self.json_output {
            println!("\n{}", "Monitoring stopped.".bright_cyan());
        }
    }

    fn print_block(&self, block: &SessionBlock, now: DateTime<Utc>, token_limit: Option<u64>) {
        let start = block.start_time.with_timezone(&Local).format("%Y-%m-%d %H:%M");
        let end = block.end_time.with_timezone(&Local).format("%H:%M");

        if block.is_gap {
            println!(
                "\n{} {} → {} {}",
                "⏸".bright_black(),
                start.to_string().bright_black(),
                end.to_string().bright_black(),
                "(idle)".bright_black()
            );
            return;
        }

        let marker = if block.is_active { "🟢 ACTIVE" } else { "⚪" };
        println!(
            "\n{} {} → {} — {} • {} tokens • {} entries",
            marker,
            start.to_string().bright_white().bold(),
            end,
            money(block.cost_usd).bold(),
            format_number(block.token_counts.total()).bright_white(),
            block.entry_count()
        );
        if !block.models.is_empty() {
            let models: Vec<&str> = block.models.iter().map(String::as_str).collect();
            println!("   models: {}", models.join(", ").bright_cyan());
        }

        if let Some(rate) = calculate_burn_rate(block) {
            println!(
                "   {} {:.1} tok/min | {} {}/hour",
                "🔥".bright_red(),
                rate.tokens_per_minute,
                "💰".bright_yellow(),
                money(rate.cost_per_hour)
            );
        }

        if let Some(projection) = project_block_usage(block, now) {
            println!(
                "   projected: {} tokens • {} • {} min left",
                format_number(projection.total_tokens).bright_white().bold(),
                money(projection.total_cost),
                projection.remaining_minutes
            );
            if let Some(limit) = token_limit {
                let status = match token_limit_status(projection.total_tokens, limit) {
                    TokenLimitStatus::Ok => "within limit".green(),
                    TokenLimitStatus::Warning => "approaching limit".yellow(),
                    TokenLimitStatus::Exceeds => "exceeds limit".red().bold(),
                };
                println!("   limit {}: {}", format_number(limit), status);
            }
        }
    }
}
