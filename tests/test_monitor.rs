use chrono::{TimeZone, Utc};
use claude_ledger::file_discovery::ClaudeProjectsDiscovery;
use claude_ledger::models::{CostMode, SortOrder};
use claude_ledger::monitor::{CancelSignal, LiveMonitor, MonitorOptions};
use claude_ledger::pricing::{PriceTable, PricingResolver, PricingSource, StaticPricingSource};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::{setup_claude_root, write_session, Line};

struct CountingSource {
    fetches: Arc<AtomicUsize>,
}

impl PricingSource for CountingSource {
    fn name(&self) -> &str {
        "counting"
    }

    fn fetch(&self) -> BoxFuture<'_, anyhow::Result<PriceTable>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let table = serde_json::json!({
            "claude-sonnet-4-20250514": {
                "input_cost_per_token": 0.000003,
                "output_cost_per_token": 0.000015
            }
        });
        let source = StaticPricingSource::from_json(&table);
        Box::pin(async move { source.fetch().await })
    }
}

/// Fails the first fetch, then serves sonnet prices.
struct FlakySource {
    fetches: AtomicUsize,
}

impl PricingSource for FlakySource {
    fn name(&self) -> &str {
        "flaky"
    }

    fn fetch(&self) -> BoxFuture<'_, anyhow::Result<PriceTable>> {
        let attempt = self.fetches.fetch_add(1, Ordering::SeqCst);
        let source = StaticPricingSource::from_json(&serde_json::json!({
            "claude-sonnet-4-20250514": { "input_cost_per_token": 0.000003 }
        }));
        Box::pin(async move {
            if attempt == 0 {
                anyhow::bail!("pricing service unavailable");
            }
            source.fetch().await
        })
    }
}

fn display_options() -> MonitorOptions {
    MonitorOptions {
        cost_mode: CostMode::Display,
        order: SortOrder::Desc,
        refresh_interval: Duration::from_millis(5),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_new_files_are_picked_up_between_ticks() -> anyhow::Result<()> {
    let root = setup_claude_root()?;
    write_session(
        root.path(),
        "proj/first.jsonl",
        &[Line::new("2024-01-01T10:00:00Z", 100, 50).ids("m1", "r1").cost(0.01)],
    )?;

    let mut monitor = LiveMonitor::new(
        ClaudeProjectsDiscovery::new(vec![root.path().to_path_buf()]),
        PricingResolver::new(CountingSource {
            fetches: Arc::new(AtomicUsize::new(0)),
        }),
        display_options(),
    );
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap();

    let active = monitor.poll_once(now).await?.expect("active block");
    assert_eq!(active.token_counts.input_tokens, 100);

    // A resumed conversation repeats m1 and adds a new turn
    write_session(
        root.path(),
        "proj/second.jsonl",
        &[
            Line::new("2024-01-01T10:00:00Z", 100, 50).ids("m1", "r1").cost(0.01),
            Line::new("2024-01-01T10:30:00Z", 20, 10).ids("m2", "r2").cost(0.002),
        ],
    )?;

    let active = monitor.poll_once(now).await?.expect("active block");
    assert_eq!(active.token_counts.input_tokens, 120);
    assert_eq!(active.entry_count(), 2);
    assert!((active.cost_usd - 0.012).abs() < 1e-12);
    assert_eq!(monitor.state().file_timestamps.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_no_active_block_when_idle() -> anyhow::Result<()> {
    let root = setup_claude_root()?;
    write_session(
        root.path(),
        "proj/old.jsonl",
        &[Line::new("2024-01-01T10:00:00Z", 1, 1)],
    )?;

    let mut monitor = LiveMonitor::new(
        ClaudeProjectsDiscovery::new(vec![root.path().to_path_buf()]),
        PricingResolver::new(CountingSource {
            fetches: Arc::new(AtomicUsize::new(0)),
        }),
        display_options(),
    );
    let much_later = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    assert!(monitor.poll_once(much_later).await?.is_none());
    assert_eq!(monitor.state().events.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_prices_fetched_once_across_ticks() -> anyhow::Result<()> {
    let root = setup_claude_root()?;
    let fetches = Arc::new(AtomicUsize::new(0));
    let mut monitor = LiveMonitor::new(
        ClaudeProjectsDiscovery::new(vec![root.path().to_path_buf()]),
        PricingResolver::new(CountingSource {
            fetches: fetches.clone(),
        }),
        MonitorOptions {
            cost_mode: CostMode::Calculate,
            ..display_options()
        },
    );

    for (i, minute) in [0u32, 10, 20].iter().enumerate() {
        write_session(
            root.path(),
            &format!("proj/s{i}.jsonl"),
            &[Line::new(&format!("2024-01-01T10:{minute:02}:00Z"), 1_000_000, 0)
                .model("claude-sonnet-4-20250514")
                .ids(&format!("m{i}"), &format!("r{i}"))],
        )?;
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 30, 0).unwrap();
        let active = monitor.poll_once(now).await?.expect("active block");
        assert!((active.cost_usd - 3.0 * (i as f64 + 1.0)).abs() < 1e-9);
    }

    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_run_stops_on_cancel() -> anyhow::Result<()> {
    let root = setup_claude_root()?;
    let mut monitor = LiveMonitor::new(
        ClaudeProjectsDiscovery::new(vec![root.path().to_path_buf()]),
        PricingResolver::new(CountingSource {
            fetches: Arc::new(AtomicUsize::new(0)),
        }),
        display_options(),
    );

    let cancel = CancelSignal::new();
    let trigger = cancel.clone();
    let mut ticks = 0;
    monitor
        .run(cancel, |_| {
            ticks += 1;
            if ticks == 3 {
                trigger.cancel();
            }
            Ok(())
        })
        .await?;

    assert_eq!(ticks, 3);
    Ok(())
}

#[tokio::test]
async fn test_pricing_failure_retries_events_next_tick() -> anyhow::Result<()> {
    let root = setup_claude_root()?;
    write_session(
        root.path(),
        "proj/s.jsonl",
        &[Line::new("2024-01-01T10:00:00Z", 1_000_000, 0)
            .model("claude-sonnet-4-20250514")
            .ids("m1", "r1")],
    )?;

    let mut monitor = LiveMonitor::new(
        ClaudeProjectsDiscovery::new(vec![root.path().to_path_buf()]),
        PricingResolver::new(FlakySource {
            fetches: AtomicUsize::new(0),
        }),
        MonitorOptions {
            cost_mode: CostMode::Calculate,
            ..display_options()
        },
    );
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap();

    assert!(monitor.poll_once(now).await.is_err());
    assert!(monitor.state().events.is_empty());
    assert!(monitor.state().file_timestamps.is_empty());

    let active = monitor.poll_once(now).await?.expect("active block");
    assert_eq!(active.token_counts.input_tokens, 1_000_000);
    assert!((active.cost_usd - 3.0).abs() < 1e-9);
    assert_eq!(monitor.state().events.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_file_with_later_earliest_timestamp_is_reread() -> anyhow::Result<()> {
    let root = setup_claude_root()?;
    let file = write_session(
        root.path(),
        "proj/s.jsonl",
        &[Line::new("2024-01-01T10:00:00Z", 100, 50).ids("m1", "r1").cost(0.01)],
    )?;

    let mut monitor = LiveMonitor::new(
        ClaudeProjectsDiscovery::new(vec![root.path().to_path_buf()]),
        PricingResolver::new(CountingSource {
            fetches: Arc::new(AtomicUsize::new(0)),
        }),
        display_options(),
    );
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap();
    monitor.poll_once(now).await?.expect("active block");

    // Rewritten so its first line is later; m1 is repeated and m2 is new
    write_session(
        root.path(),
        "proj/s.jsonl",
        &[
            Line::new("2024-01-01T10:05:00Z", 100, 50).ids("m1", "r1").cost(0.01),
            Line::new("2024-01-01T10:10:00Z", 20, 10).ids("m2", "r2").cost(0.002),
        ],
    )?;

    let active = monitor.poll_once(now).await?.expect("active block");
    assert_eq!(monitor.state().events.len(), 2);
    assert_eq!(active.entry_count(), 2);
    assert_eq!(active.token_counts.input_tokens, 120);
    assert_eq!(active.token_counts.output_tokens, 60);
    assert_eq!(
        monitor.state().file_timestamps.get(&file.path),
        Some(&Utc.with_ymd_and_hms(2024, 1, 1, 10, 5, 0).unwrap())
    );
    Ok(())
}
