//! Market-data ingest pipeline:
//! stream → tick filter → clamp → freshness mark → aggregator → candle store,
//! with a bounded queue in front of aggregation and a periodic heartbeat
//! writer alongside.

use crate::application::ingest::rate_limit::TokenBucket;
use crate::application::market_data::{
    CandleAggregator, FilterDecision, PriceClamp, TickFilter, TickFilterConfig,
};
use crate::application::monitoring::MarketDataActivity;
use crate::domain::market::Tick;
use crate::domain::ports::{CandleStore, HeartbeatStore, TickStore};
use crate::domain::safety::{HeartbeatStatus, ServiceHeartbeat};
use crate::infrastructure::observability::Metrics;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub component: String,
    pub stream: String,
    pub service_id: String,
    /// Bounded queue between network receive and aggregation.
    pub queue_capacity: usize,
    pub heartbeat_interval_seconds: u64,
    pub flush_interval_seconds: u64,
    /// Optional clamp band around the last accepted price.
    pub clamp_pct: Option<Decimal>,
    pub filter: Option<TickFilterConfig>,
    /// Token-bucket budget for raw tick persistence.
    pub tick_writes_per_sec: f64,
    pub tick_write_burst: f64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            component: "marketdata-ingest".to_string(),
            stream: "trades".to_string(),
            service_id: "marketdata-ingest".to_string(),
            queue_capacity: 4096,
            heartbeat_interval_seconds: 15,
            flush_interval_seconds: 1,
            clamp_pct: None,
            filter: Some(TickFilterConfig::default()),
            tick_writes_per_sec: 20.0,
            tick_write_burst: 40.0,
        }
    }
}

pub struct MarketDataIngestService {
    config: IngestConfig,
    aggregator: CandleAggregator,
    filter: Option<TickFilter>,
    clamp: Option<PriceClamp>,
    candle_store: Arc<dyn CandleStore>,
    tick_store: Option<Arc<dyn TickStore>>,
    tick_write_budget: TokenBucket,
    activity: Arc<MarketDataActivity>,
    metrics: Arc<Metrics>,
    batch_count: u64,
    last_batch_log: std::time::Instant,
}

impl MarketDataIngestService {
    pub fn new(
        config: IngestConfig,
        aggregator: CandleAggregator,
        candle_store: Arc<dyn CandleStore>,
        tick_store: Option<Arc<dyn TickStore>>,
        activity: Arc<MarketDataActivity>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            filter: config.filter.clone().map(TickFilter::new),
            clamp: config.clamp_pct.map(PriceClamp::new),
            tick_write_budget: TokenBucket::new(
                config.tick_writes_per_sec,
                config.tick_write_burst,
            ),
            config,
            aggregator,
            candle_store,
            tick_store,
            activity,
            metrics,
            batch_count: 0,
            last_batch_log: std::time::Instant::now(),
        }
    }

    /// Bridge a broadcast stream into the bounded ingest queue. Overflow is
    /// dropped and counted rather than backpressuring the socket reader.
    pub fn bridge_queue(
        capacity: usize,
        mut source: broadcast::Receiver<Tick>,
        metrics: Arc<Metrics>,
    ) -> mpsc::Receiver<Tick> {
        let (tx, rx) = mpsc::channel(capacity);
        tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(tick) => {
                        if tx.try_send(tick).is_err() {
                            metrics.ingest_queue_dropped_total.inc();
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        metrics.ingest_queue_dropped_total.inc_by(n);
                        warn!("ingest bridge lagged, dropped {n} ticks");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        rx
    }

    /// Main loop: drain the queue, flush on a timer, and drain cleanly on
    /// shutdown. Aggregation is synchronous with respect to the stream.
    pub async fn run(
        mut self,
        mut ticks: mpsc::Receiver<Tick>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut flush_timer =
            tokio::time::interval(Duration::from_secs(self.config.flush_interval_seconds.max(1)));
        info!(
            "market-data ingest running: service={} timeframes={:?}",
            self.config.service_id,
            self.aggregator.timeframes()
        );

        loop {
            tokio::select! {
                maybe_tick = ticks.recv() => {
                    match maybe_tick {
                        Some(tick) => self.process_tick(tick).await,
                        None => break,
                    }
                }
                _ = flush_timer.tick() => {
                    let finals = self.aggregator.flush(Utc::now());
                    self.persist_candles(&finals).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        // Shutdown drain: finalize whatever the watermark allows.
        let finals = self.aggregator.flush(Utc::now());
        self.persist_candles(&finals).await;
        info!(
            "market-data ingest stopped: {:?}",
            self.aggregator.ops_snapshot()
        );
    }

    async fn process_tick(&mut self, tick: Tick) {
        self.metrics
            .inc_received(&self.config.component, &self.config.stream);

        if let Some(filter) = &mut self.filter {
            match filter.accept(tick.price) {
                FilterDecision::Drop => {
                    debug!("tick filter dropped {} @ {}", tick.symbol, tick.price);
                    return;
                }
                FilterDecision::Reanchor => {
                    info!("tick filter reanchored {} at {}", tick.symbol, tick.price);
                }
                FilterDecision::Accept => {}
            }
        }

        let tick = match &mut self.clamp {
            Some(clamp) => {
                let clamped = clamp.clamp(tick.price);
                Tick {
                    price: clamped,
                    ..tick
                }
            }
            None => tick,
        };

        self.metrics.marketdata_ticks_total.inc();
        self.activity.mark(tick.ts_utc);

        // Per-tick logging would swamp the collector; summarize every 10s.
        self.batch_count += 1;
        if self.last_batch_log.elapsed() >= Duration::from_secs(10) {
            info!(
                "received {} ticks in the last {:.0?} (latest {} @ {})",
                self.batch_count,
                self.last_batch_log.elapsed(),
                tick.symbol,
                tick.price
            );
            self.batch_count = 0;
            self.last_batch_log = std::time::Instant::now();
        }

        if let Some(store) = &self.tick_store {
            if self.tick_write_budget.try_consume(1.0) {
                if let Err(e) = store.write_ticks(std::slice::from_ref(&tick)).await {
                    error!("tick store write failed: {e}");
                    self.metrics.inc_error(&self.config.component);
                }
            }
        }

        let emitted = self.aggregator.ingest(&tick);
        let finals: Vec<_> = emitted.into_iter().filter(|c| c.is_final).collect();
        self.persist_candles(&finals).await;
    }

    async fn persist_candles(&self, finals: &[crate::domain::market::Candle]) {
        if finals.is_empty() {
            return;
        }
        match self.candle_store.write_candles(finals).await {
            Ok(()) => {
                for _ in finals {
                    self.metrics
                        .inc_published(&self.config.component, &self.config.stream);
                }
            }
            Err(e) => {
                error!("candle store write failed: {e}");
                self.metrics.inc_error(&self.config.component);
            }
        }
    }

    /// Periodic heartbeat writer. Status degrades as the gap since the last
    /// accepted tick grows; consumers compute their own staleness from the
    /// stored timestamp.
    pub async fn heartbeat_task(
        store: Arc<dyn HeartbeatStore>,
        service_id: String,
        interval_seconds: u64,
        activity: Arc<MarketDataActivity>,
        metrics: Arc<Metrics>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut timer = tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));
        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let now = Utc::now();
                    let status = match activity.age_seconds(now) {
                        Some(age) if age <= (interval_seconds * 2) as f64 => HeartbeatStatus::Healthy,
                        Some(age) if age <= (interval_seconds * 4) as f64 => HeartbeatStatus::Degraded,
                        Some(_) => HeartbeatStatus::Down,
                        None => HeartbeatStatus::Unknown,
                    };
                    let heartbeat = ServiceHeartbeat {
                        service_id: service_id.clone(),
                        last_heartbeat_ts: now,
                        status,
                    };
                    if let Err(e) = store.write_heartbeat(&heartbeat).await {
                        error!("heartbeat write failed: {e}");
                        metrics.inc_error("marketdata-ingest");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::market_data::AggregatorConfig;
    use crate::domain::market::Candle;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone};
    use rust_decimal_macros::dec;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MemCandleStore {
        written: Mutex<Vec<Candle>>,
    }

    #[async_trait]
    impl CandleStore for MemCandleStore {
        async fn write_candles(&self, candles: &[Candle]) -> Result<()> {
            self.written.lock().await.extend_from_slice(candles);
            Ok(())
        }
        async fn query_candles(
            &self,
            _symbol: &str,
            _timeframe: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<Candle>> {
            Ok(self.written.lock().await.clone())
        }
    }

    fn tick(m: u32, s: u32, price: Decimal) -> Tick {
        Tick::new(
            "SPY",
            Utc.with_ymd_and_hms(2024, 1, 2, 14, m, s).unwrap(),
            price,
            dec!(10),
        )
        .unwrap()
    }

    fn service(store: Arc<MemCandleStore>) -> MarketDataIngestService {
        let metrics = Arc::new(Metrics::new().expect("metrics"));
        let aggregator = CandleAggregator::new(
            vec!["1m".parse().unwrap()],
            AggregatorConfig {
                lateness_seconds: 2,
                emit_updates: false,
                ..AggregatorConfig::default()
            },
        );
        MarketDataIngestService::new(
            IngestConfig {
                filter: None,
                ..IngestConfig::default()
            },
            aggregator,
            store,
            None,
            Arc::new(MarketDataActivity::new()),
            metrics,
        )
    }

    #[tokio::test]
    async fn test_pipeline_persists_final_candles() {
        let store = Arc::new(MemCandleStore::default());
        let svc = service(store.clone());
        let activity = svc.activity.clone();
        let metrics = svc.metrics.clone();

        let (tx, rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(svc.run(rx, shutdown_rx));

        tx.send(tick(30, 5, dec!(100))).await.unwrap();
        tx.send(tick(30, 40, dec!(101))).await.unwrap();
        // Rollover closes the 14:30 bucket.
        tx.send(tick(31, 3, dec!(102))).await.unwrap();
        drop(tx);
        let _ = shutdown_tx.send(true);
        handle.await.unwrap();

        let written = store.written.lock().await;
        assert!(!written.is_empty());
        assert!(written[0].is_final);
        assert_eq!(written[0].close, dec!(101));
        assert_eq!(metrics.marketdata_ticks_total.get(), 3);
        assert!(activity.last().is_some());
    }

    #[tokio::test]
    async fn test_bridge_counts_dropped_ticks() {
        let metrics = Arc::new(Metrics::new().expect("metrics"));
        let (tx, rx) = broadcast::channel(64);
        // Capacity-1 queue that nobody drains.
        let _rx = MarketDataIngestService::bridge_queue(1, rx, metrics.clone());
        for i in 0..10 {
            tx.send(tick(30, i, dec!(100))).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(metrics.ingest_queue_dropped_total.get() >= 8);
    }

    #[tokio::test]
    async fn test_heartbeat_task_writes_records() {
        #[derive(Default)]
        struct MemHeartbeatStore {
            written: Mutex<Vec<ServiceHeartbeat>>,
        }

        #[async_trait]
        impl HeartbeatStore for MemHeartbeatStore {
            async fn write_heartbeat(&self, heartbeat: &ServiceHeartbeat) -> Result<()> {
                self.written.lock().await.push(heartbeat.clone());
                Ok(())
            }
            async fn read_heartbeat(
                &self,
                service_id: &str,
                _now: DateTime<Utc>,
                _stale_threshold_seconds: u32,
            ) -> Result<crate::domain::safety::HeartbeatInfo> {
                Ok(crate::domain::safety::HeartbeatInfo::missing(service_id))
            }
        }

        let store = Arc::new(MemHeartbeatStore::default());
        let activity = Arc::new(MarketDataActivity::new());
        activity.mark(Utc::now());
        let metrics = Arc::new(Metrics::new().expect("metrics"));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(MarketDataIngestService::heartbeat_task(
            store.clone(),
            "marketdata-ingest".into(),
            1,
            activity,
            metrics,
            shutdown_rx,
        ));
        // The interval fires immediately once.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = shutdown_tx.send(true);
        handle.await.unwrap();

        let written = store.written.lock().await;
        assert!(!written.is_empty());
        assert_eq!(written[0].service_id, "marketdata-ingest");
        assert_eq!(written[0].status, HeartbeatStatus::Healthy);
    }
}
