//! Strategy engine service: polls the candle store for newly finalized
//! candles, runs the strategy driver cycle (safety gate → evaluate →
//! intent → breakers → allocator → proposal) and appends proposals to the
//! file store. Execution stays with the downstream collaborator; every
//! proposal here requires human approval.

use agenttrader::application::allocation::RiskAllocator;
use agenttrader::application::intent::IntentEmitter;
use agenttrader::application::monitoring::{MarketDataActivity, SafetyMonitor};
use agenttrader::application::risk_management::{CircuitBreakerConfig, CircuitBreakerManager};
use agenttrader::application::strategy::{
    PortfolioView, SmaCrossStrategy, StrategyDriver, StrategyDriverConfig,
};
use agenttrader::config::Config;
use agenttrader::domain::ports::{CandleStore, HeartbeatStore, ProposalStore};
use agenttrader::infrastructure::HttpVixProvider;
use agenttrader::infrastructure::http::{OpsState, serve};
use agenttrader::infrastructure::observability::{AgentIdentity, IntentLogger, Metrics};
use agenttrader::infrastructure::persistence::{
    FileCandleStore, FileHeartbeatStore, FileProposalStore,
};
use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("strategy engine {} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let identity = AgentIdentity::from_env();
    let metrics = Arc::new(Metrics::new()?);
    metrics
        .agent_start_total
        .with_label_values(&["strategy-engine"])
        .inc();

    let logger = IntentLogger::new(identity.clone());
    logger.log_point_event(
        "agent_start",
        "Strategy engine starting.",
        serde_json::json!({
            "strategy_id": config.strategy_id,
            "symbols": config.symbols,
        }),
    );

    // Freshness here comes from candle arrival: the engine marks activity
    // whenever the store yields new finals.
    let activity = Arc::new(MarketDataActivity::new());
    let monitor = Arc::new(SafetyMonitor::new(
        Arc::new(config.safety.clone()),
        activity.clone(),
        metrics.clone(),
        30,
    ));

    let candle_store: Arc<dyn CandleStore> = Arc::new(FileCandleStore::new(
        &config.data_root,
        Some(metrics.clone()),
    ));
    let proposal_store: Arc<dyn ProposalStore> = Arc::new(FileProposalStore::new(
        &config.data_root,
        Some(metrics.clone()),
    ));
    let heartbeat_store: Arc<dyn HeartbeatStore> =
        Arc::new(FileHeartbeatStore::new(&config.data_root));

    let vix_provider = HttpVixProvider::from_env()?
        .map(|p| Arc::new(p) as Arc<dyn agenttrader::domain::ports::VixProvider>);
    let breakers = Arc::new(CircuitBreakerManager::new(
        CircuitBreakerConfig::default(),
        None,
        None,
        vix_provider,
    ));

    let mut driver = StrategyDriver::new(
        Box::new(SmaCrossStrategy::new(20, 60, dec!(0.001))),
        RiskAllocator::from_env(),
        breakers,
        IntentEmitter::from_env(logger),
        monitor.clone(),
        agenttrader::domain::market::SessionClock::new(config.market_tz),
        metrics.clone(),
        Some(proposal_store),
        StrategyDriverConfig {
            tenant_id: config.tenant_id.clone(),
            user_id: config.user_id.clone(),
            strategy_id: config.strategy_id.clone(),
            intent_ttl_seconds: config.intent_ttl_seconds,
            default_allocation: config.default_allocation_usd,
        },
    );

    // Ops HTTP surface for this service.
    let ops_state = OpsState {
        monitor,
        metrics: metrics.clone(),
        activity: activity.clone(),
        heartbeat_store,
        marketdata_service_id: "marketdata-ingest".into(),
        identity,
    };
    let bind = config.ops_bind();
    tokio::spawn(async move {
        if let Err(e) = serve(ops_state, &bind).await {
            error!("ops http server failed: {e}");
        }
    });

    let symbol = config.symbols[0].clone();
    let timeframe = config
        .timeframes
        .first()
        .map(|tf| tf.text())
        .unwrap_or_else(|| "1m".to_string());
    let mut last_seen: Option<DateTime<Utc>> = None;
    let mut poll = tokio::time::interval(Duration::from_secs(5));

    info!("strategy engine running on {symbol}/{timeframe}; press ctrl-c to stop");
    loop {
        tokio::select! {
            _ = poll.tick() => {
                let now = Utc::now();
                let window_start = last_seen
                    .map(|ts| ts + ChronoDuration::seconds(1))
                    .unwrap_or_else(|| now - ChronoDuration::hours(6));
                let candles = match candle_store
                    .query_candles(&symbol, &timeframe, window_start, now)
                    .await
                {
                    Ok(c) => c,
                    Err(e) => {
                        error!("candle query failed: {e}");
                        metrics.inc_error("strategy-engine");
                        continue;
                    }
                };

                for candle in candles.into_iter().filter(|c| c.is_final) {
                    last_seen = Some(last_seen.map_or(candle.ts_start_utc, |ts| ts.max(candle.ts_start_utc)));
                    activity.mark(candle.ts_end_utc);

                    // Portfolio inputs come from the execution collaborator;
                    // without one attached the breakers see a flat book.
                    let portfolio = PortfolioView::default();
                    match driver.on_candle(&candle, &portfolio, now).await {
                        Ok(Some(proposal)) => info!(
                            "proposal emitted: {} {} x{} (intent {})",
                            proposal.symbol,
                            serde_json::to_string(&proposal.side).unwrap_or_default(),
                            proposal.quantity,
                            proposal.intent_id
                        ),
                        Ok(None) => {}
                        Err(e) => {
                            error!("strategy cycle failed: {e}");
                            metrics.inc_error("strategy-engine");
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }
    info!("strategy engine stopped");
    Ok(())
}
