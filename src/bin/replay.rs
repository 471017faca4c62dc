//! Offline replay: feed a tick NDJSON file through the candle aggregator
//! and write the resulting final candles to the file store.
//!
//! ```sh
//! cargo run --bin replay -- --input data/ticks/2024/01/02/SPY.ndjson \
//!     --timeframes 1m,5m --data-root data
//! ```

use agenttrader::application::market_data::{AggregatorConfig, CandleAggregator};
use agenttrader::config::Config;
use agenttrader::domain::market::parse_timeframes;
use agenttrader::domain::ports::CandleStore;
use agenttrader::infrastructure::persistence::FileCandleStore;
use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "replay", about = "Replay NDJSON ticks into candle files")]
struct Args {
    /// Tick NDJSON file to replay (one trade event per line).
    #[arg(long)]
    input: PathBuf,

    /// Comma-separated timeframes to aggregate.
    #[arg(long, default_value = "1m,5m,1d")]
    timeframes: String,

    /// Root of the file data plane.
    #[arg(long, default_value = "data")]
    data_root: PathBuf,

    /// Lateness bound in seconds.
    #[arg(long, default_value_t = 5)]
    lateness: u32,

    /// Align daily buckets to the 09:30 session open.
    #[arg(long, default_value_t = false)]
    session_daily: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_target(false).init();

    let args = Args::parse();
    let config = Config::from_env()?;

    let timeframes = parse_timeframes(args.timeframes.split(','))
        .map_err(|e| anyhow::anyhow!(e))
        .context("parse --timeframes")?;

    let mut aggregator = CandleAggregator::new(
        timeframes,
        AggregatorConfig {
            lateness_seconds: args.lateness,
            market_tz: config.market_tz,
            session_daily: args.session_daily,
            // Deterministic backfill: finals only.
            emit_updates: false,
        },
    );
    let store = FileCandleStore::new(&args.data_root, None);

    let content = std::fs::read_to_string(&args.input)
        .with_context(|| format!("read {}", args.input.display()))?;

    let mut finals = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(event) => {
                finals.extend(
                    aggregator
                        .ingest_event(&event)
                        .into_iter()
                        .filter(|c| c.is_final),
                );
            }
            Err(e) => warn!("skipping line {}: {e}", lineno + 1),
        }
    }
    finals.extend(aggregator.flush(Utc::now()));

    store.write_candles(&finals).await.context("write candles")?;

    let snapshot = aggregator.ops_snapshot();
    info!(
        "replay complete: {} final candles written ({} late drops, {} parse errors)",
        finals.len(),
        snapshot.counters.late_events_dropped,
        snapshot.counters.parse_errors
    );
    Ok(())
}
