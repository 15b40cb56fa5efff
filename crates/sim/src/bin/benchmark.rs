//! Synth ledger benchmark
//!
//! Drives issue, exchange, settle and burn through an in-memory system for
//! many accounts and reports per-operation latency.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin benchmark
//!
//! # Customize account count
//! BENCHMARK_ACCOUNTS=2000 cargo run --bin benchmark
//! ```

use std::time::{Duration, Instant};

use synth_common::clock::ManualClock;
use synth_common::config::EngineConfig;
use synth_common::{AccountId, AssetId, Decimal, Timestamp};
use synth_engine::{Balances, InMemorySystem, SynthSystem};

const START: Timestamp = 1_700_000_000;

/// Latencies of one operation kind.
struct OpMetrics {
    name: &'static str,
    samples: Vec<Duration>,
}

/// Aggregate statistics computed from one operation's samples.
struct AggregateStats {
    name: &'static str,
    count: usize,
    avg: Duration,
    p50: Duration,
    p95: Duration,
    p99: Duration,
    max: Duration,
}

/// Nearest-rank percentile of an ascending slice.
fn nearest_rank(sorted: &[Duration], p: u32) -> Duration {
    let n = sorted.len();
    if n == 0 {
        return Duration::ZERO;
    }
    let rank = (p as usize * n).div_ceil(100).max(1);
    sorted[rank.min(n) - 1]
}

fn compute_stats(metrics: &OpMetrics) -> AggregateStats {
    let mut sorted = metrics.samples.clone();
    sorted.sort_unstable();
    let total: Duration = sorted.iter().sum();

    AggregateStats {
        name: metrics.name,
        count: sorted.len(),
        avg: u32::try_from(sorted.len())
            .ok()
            .filter(|&n| n > 0)
            .map_or(Duration::ZERO, |n| total / n),
        p50: nearest_rank(&sorted, 50),
        p95: nearest_rank(&sorted, 95),
        p99: nearest_rank(&sorted, 99),
        max: sorted.last().copied().unwrap_or_default(),
    }
}

fn timed<T>(metrics: &mut OpMetrics, op: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = op();
    metrics.samples.push(start.elapsed());
    out
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn print_report(stats: &[AggregateStats], wall_elapsed: Duration, accounts: usize) {
    println!();
    println!("══════════════════════════════════════════════════════════════");
    println!("  Synth Ledger Benchmark Report");
    println!("══════════════════════════════════════════════════════════════");
    println!();
    println!("  Accounts:           {}", accounts);
    println!("  Wall Clock Time:    {:.2}s", wall_elapsed.as_secs_f64());
    let ops: usize = stats.iter().map(|s| s.count).sum();
    println!(
        "  Throughput:         {:.0} ops/sec",
        ops as f64 / wall_elapsed.as_secs_f64()
    );
    println!();
    println!("  ── Latency Distribution ─────────────────────────────────");
    println!(
        "  {:<10} {:>8} {:>9} {:>9} {:>9} {:>9} {:>9}",
        "op", "count", "avg", "p50", "p95", "p99", "max"
    );
    for s in stats {
        println!(
            "  {:<10} {:>8} {:>7.3}ms {:>7.3}ms {:>7.3}ms {:>7.3}ms {:>7.3}ms",
            s.name,
            s.count,
            ms(s.avg),
            ms(s.p50),
            ms(s.p95),
            ms(s.p99),
            ms(s.max)
        );
    }
    println!();
    println!("══════════════════════════════════════════════════════════════");
    println!();
}

fn push_rates(system: &mut InMemorySystem, eth_rate: &str) -> anyhow::Result<()> {
    let oracle = system.config().oracle.clone();
    let assets = ["SNX", "sBTC", "sETH", "iBTC"].map(AssetId::from);
    let rates = [
        Decimal::from_int(1),
        Decimal::from_int(10_000),
        eth_rate.parse()?,
        Decimal::from_int(10_000),
    ];
    let now = system.now();
    system.update_rates(&oracle, &assets, &rates, now)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize human-readable logging for the benchmark
    tracing_subscriber::fmt()
        .with_env_filter("benchmark=info,warn")
        .init();

    let account_count: usize = std::env::var("BENCHMARK_ACCOUNTS")
        .unwrap_or_else(|_| "500".to_string())
        .parse()?;

    println!();
    println!("Synth Ledger Benchmark");
    println!("───────────────────────────────────────");
    println!("Accounts: {}", account_count);
    println!();

    let config = EngineConfig::default();
    let waiting_period = config.waiting_period_secs;
    let collateral = config.collateral_asset.clone();
    let (usd, eth) = (config.base_asset.clone(), AssetId::from("sETH"));
    let clock = ManualClock::new(START);
    let mut system = SynthSystem::in_memory(config, clock.clone())?;
    push_rates(&mut system, "200")?;

    let accounts: Vec<AccountId> = (0..account_count)
        .map(|i| AccountId::new(format!("account-{i}")))
        .collect();
    for account in &accounts {
        system
            .balances_mut()
            .mint(&collateral, account, Decimal::from_int(10_000))?;
    }

    let mut issue = OpMetrics { name: "issue", samples: Vec::new() };
    let mut exchange = OpMetrics { name: "exchange", samples: Vec::new() };
    let mut settle = OpMetrics { name: "settle", samples: Vec::new() };
    let mut burn = OpMetrics { name: "burn", samples: Vec::new() };

    let wall_start = Instant::now();

    for account in &accounts {
        timed(&mut issue, || system.issue_synths(account, Decimal::from_int(1_000)))?;
        timed(&mut exchange, || {
            system.exchange(account, &usd, Decimal::from_int(100), &eth)
        })?;
    }
    tracing::info!(accounts = accounts.len(), "Issued and exchanged");

    clock.advance(waiting_period + 1);
    push_rates(&mut system, "210")?;

    for account in &accounts {
        timed(&mut settle, || system.settle(account, &eth))?;
        timed(&mut burn, || system.burn_synths(account, Decimal::from_int(500)))?;
    }

    let wall_elapsed = wall_start.elapsed();

    let stats: Vec<AggregateStats> = [&issue, &exchange, &settle, &burn]
        .into_iter()
        .map(compute_stats)
        .collect();
    print_report(&stats, wall_elapsed, account_count);

    Ok(())
}
