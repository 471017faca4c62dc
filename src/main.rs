//! agenttrader — real-time market-data and signal pipeline service.
//!
//! Topology: one stream receiver per broker connection, a bounded queue
//! into the aggregation loop, a persistent writer per store, a heartbeat
//! writer, and the readiness evaluator behind the ops HTTP server. On
//! ctrl-c the pipeline drains in order: receiver → aggregator flush →
//! writers → HTTP.

use agenttrader::application::ingest::{IngestConfig, MarketDataIngestService};
use agenttrader::application::market_data::{AggregatorConfig, CandleAggregator, TickFilterConfig};
use agenttrader::application::monitoring::{MarketDataActivity, SafetyMonitor};
use agenttrader::config::Config;
use agenttrader::domain::ports::{HeartbeatStore, TickStore};
use agenttrader::infrastructure::http::{OpsState, serve};
use agenttrader::infrastructure::observability::{AgentIdentity, IntentLogger, Metrics};
use agenttrader::infrastructure::persistence::{
    FileCandleStore, FileHeartbeatStore, FileTickStore,
};
use agenttrader::infrastructure::stream::{AlpacaStreamManager, StreamConfig};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;
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

    info!("agenttrader {} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!(
        "configuration loaded: symbols={:?} timeframes={:?} feed={}",
        config.symbols,
        config.timeframes.iter().map(|t| t.text()).collect::<Vec<_>>(),
        config.alpaca_feed
    );

    let identity = AgentIdentity::from_env();
    let metrics = Arc::new(Metrics::new()?);
    metrics
        .agent_start_total
        .with_label_values(&["marketdata-ingest"])
        .inc();

    let logger = IntentLogger::new(identity.clone());
    logger.log_point_event(
        "agent_start",
        "Market-data ingest service starting.",
        serde_json::json!({
            "service_id": config.service_id,
            "symbols": config.symbols,
        }),
    );

    let activity = Arc::new(MarketDataActivity::new());
    let safety = Arc::new(config.safety.clone());
    let monitor = Arc::new(SafetyMonitor::new(
        safety,
        activity.clone(),
        metrics.clone(),
        30,
    ));

    let candle_store = Arc::new(FileCandleStore::new(
        &config.data_root,
        Some(metrics.clone()),
    ));
    let tick_store: Option<Arc<dyn TickStore>> = if config.persist_ticks {
        Some(Arc::new(FileTickStore::new(
            &config.data_root,
            Some(metrics.clone()),
        )))
    } else {
        None
    };
    let heartbeat_store: Arc<dyn HeartbeatStore> =
        Arc::new(FileHeartbeatStore::new(&config.data_root));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Ops HTTP server.
    let ops_state = OpsState {
        monitor: monitor.clone(),
        metrics: metrics.clone(),
        activity: activity.clone(),
        heartbeat_store: heartbeat_store.clone(),
        marketdata_service_id: config.service_id.clone(),
        identity,
    };
    let bind = config.ops_bind();
    tokio::spawn(async move {
        if let Err(e) = serve(ops_state, &bind).await {
            error!("ops http server failed: {e}");
        }
    });

    // Broker stream.
    let stream = AlpacaStreamManager::new(
        StreamConfig {
            ws_url: config.alpaca_ws_url.clone(),
            api_key: config.alpaca_api_key.clone(),
            api_secret: config.alpaca_secret_key.clone(),
            symbols: config.symbols.clone(),
            read_deadline_seconds: config.ws_read_deadline_seconds,
            silence_threshold_seconds: config.stream_silence_threshold_seconds,
            backoff_base_seconds: config.reconnect_backoff_base_seconds,
            backoff_max_seconds: config.reconnect_backoff_max_seconds,
            max_retry_window_seconds: config.reconnect_max_retry_window_seconds,
        },
        metrics.clone(),
    );
    let mut fatal = stream.fatal_errors();

    // Heartbeat writer.
    tokio::spawn(MarketDataIngestService::heartbeat_task(
        heartbeat_store.clone(),
        config.service_id.clone(),
        config.heartbeat_interval_seconds,
        activity.clone(),
        metrics.clone(),
        shutdown_rx.clone(),
    ));

    // Aggregation loop behind the bounded queue.
    let aggregator = CandleAggregator::new(
        config.timeframes.clone(),
        AggregatorConfig {
            lateness_seconds: config.lateness_seconds,
            market_tz: config.market_tz,
            session_daily: config.session_daily,
            emit_updates: config.emit_updates,
        },
    );
    let ingest_config = IngestConfig {
        service_id: config.service_id.clone(),
        clamp_pct: config.clamp_pct,
        filter: Some(TickFilterConfig::default()),
        heartbeat_interval_seconds: config.heartbeat_interval_seconds,
        tick_writes_per_sec: config.tick_writes_per_sec,
        tick_write_burst: config.tick_write_burst,
        ..IngestConfig::default()
    };
    let queue = MarketDataIngestService::bridge_queue(
        ingest_config.queue_capacity,
        stream.subscribe(),
        metrics.clone(),
    );
    let ingest = MarketDataIngestService::new(
        ingest_config,
        aggregator,
        candle_store,
        tick_store,
        activity,
        metrics.clone(),
    );
    let ingest_handle = tokio::spawn(ingest.run(queue, shutdown_rx));

    info!("service running; press ctrl-c to shut down");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        _ = fatal.changed() => {
            if let Some(msg) = fatal.borrow().clone() {
                error!("stream failed fatally: {msg}");
            }
        }
    }

    // Drain: stream first, then the aggregation loop flushes and writers
    // finish, HTTP dies with the process.
    stream.shutdown().await;
    let _ = shutdown_tx.send(true);
    let _ = ingest_handle.await;
    info!("shutdown complete");
    Ok(())
}
