//! Prometheus metrics for the market-data and signal pipeline.
//!
//! One `Metrics` instance owns the process-wide registry; it is created at
//! startup and shared as `Arc<Metrics>`. Required series are registered and
//! zero-preseeded here so scrapes expose them before the first increment.
//! Re-registering a name with a different type or label set is an error
//! surfaced by the registry.

use prometheus::{
    Gauge, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    /// Total marketdata ticks processed.
    pub marketdata_ticks_total: IntCounter,
    /// Transitions into the marketdata-stale state (edge-triggered).
    pub marketdata_stale_total: IntCounter,
    /// Seconds since the last marketdata tick was observed.
    pub heartbeat_age_seconds: Gauge,
    /// Strategy evaluation cycles performed.
    pub strategy_cycles_total: IntCounter,
    /// Strategy cycles skipped (safety gate, time gate, errors).
    pub strategy_cycles_skipped_total: IntCounter,
    /// Order proposals emitted (not necessarily executed).
    pub order_proposals_total: IntCounter,
    /// Transitions into the safety-halted state (edge-triggered).
    pub safety_halted_total: IntCounter,
    /// Errors by component.
    pub errors_total: IntCounterVec,
    /// Messages received from upstream connections.
    pub messages_received_total: IntCounterVec,
    /// Messages/events published downstream.
    pub messages_published_total: IntCounterVec,
    /// Reconnect attempts per component/stream.
    pub reconnect_attempts_total: IntCounterVec,
    /// Process starts by component.
    pub agent_start_total: IntCounterVec,
    /// Ticks dropped by the bounded ingest queue.
    pub ingest_queue_dropped_total: IntCounter,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let marketdata_ticks_total = IntCounter::with_opts(Opts::new(
            "marketdata_ticks_total",
            "Total marketdata ticks/messages processed.",
        ))?;
        registry.register(Box::new(marketdata_ticks_total.clone()))?;

        let marketdata_stale_total = IntCounter::with_opts(Opts::new(
            "marketdata_stale_total",
            "Count of transitions into marketdata-stale state.",
        ))?;
        registry.register(Box::new(marketdata_stale_total.clone()))?;

        let heartbeat_age_seconds = Gauge::with_opts(Opts::new(
            "heartbeat_age_seconds",
            "Seconds since last marketdata tick/heartbeat was observed.",
        ))?;
        registry.register(Box::new(heartbeat_age_seconds.clone()))?;

        let strategy_cycles_total = IntCounter::with_opts(Opts::new(
            "strategy_cycles_total",
            "Total strategy evaluation cycles performed.",
        ))?;
        registry.register(Box::new(strategy_cycles_total.clone()))?;

        let strategy_cycles_skipped_total = IntCounter::with_opts(Opts::new(
            "strategy_cycles_skipped_total",
            "Total strategy cycles skipped due to gates or errors.",
        ))?;
        registry.register(Box::new(strategy_cycles_skipped_total.clone()))?;

        let order_proposals_total = IntCounter::with_opts(Opts::new(
            "order_proposals_total",
            "Total orders proposed by strategies (not necessarily executed).",
        ))?;
        registry.register(Box::new(order_proposals_total.clone()))?;

        let safety_halted_total = IntCounter::with_opts(Opts::new(
            "safety_halted_total",
            "Total safety halt transitions observed (e.g. kill switch engaged).",
        ))?;
        registry.register(Box::new(safety_halted_total.clone()))?;

        let errors_total = IntCounterVec::new(
            Opts::new("errors_total", "Total errors observed, by component."),
            &["component"],
        )?;
        registry.register(Box::new(errors_total.clone()))?;

        let messages_received_total = IntCounterVec::new(
            Opts::new(
                "messages_received_total",
                "Total messages received from upstream connections.",
            ),
            &["component", "stream"],
        )?;
        registry.register(Box::new(messages_received_total.clone()))?;

        let messages_published_total = IntCounterVec::new(
            Opts::new(
                "messages_published_total",
                "Total messages/events published to downstream destinations.",
            ),
            &["component", "stream"],
        )?;
        registry.register(Box::new(messages_published_total.clone()))?;

        let reconnect_attempts_total = IntCounterVec::new(
            Opts::new(
                "reconnect_attempts_total",
                "Total reconnect attempts, by component and stream.",
            ),
            &["component", "stream"],
        )?;
        registry.register(Box::new(reconnect_attempts_total.clone()))?;

        let agent_start_total = IntCounterVec::new(
            Opts::new("agent_start_total", "Process starts, by component."),
            &["component"],
        )?;
        registry.register(Box::new(agent_start_total.clone()))?;

        let ingest_queue_dropped_total = IntCounter::with_opts(Opts::new(
            "ingest_queue_dropped_total",
            "Ticks dropped because the bounded ingest queue was full.",
        ))?;
        registry.register(Box::new(ingest_queue_dropped_total.clone()))?;

        let metrics = Self {
            registry: Arc::new(registry),
            marketdata_ticks_total,
            marketdata_stale_total,
            heartbeat_age_seconds,
            strategy_cycles_total,
            strategy_cycles_skipped_total,
            order_proposals_total,
            safety_halted_total,
            errors_total,
            messages_received_total,
            messages_published_total,
            reconnect_attempts_total,
            agent_start_total,
            ingest_queue_dropped_total,
        };
        metrics.preseed();
        Ok(metrics)
    }

    /// Export zero-valued series for the known label sets so dashboards see
    /// them before the first event.
    fn preseed(&self) {
        self.heartbeat_age_seconds.set(0.0);
        for component in ["marketdata-ingest", "strategy-engine"] {
            self.errors_total.with_label_values(&[component]).inc_by(0);
            self.agent_start_total
                .with_label_values(&[component])
                .inc_by(0);
            for stream in ["trades"] {
                self.messages_received_total
                    .with_label_values(&[component, stream])
                    .inc_by(0);
                self.messages_published_total
                    .with_label_values(&[component, stream])
                    .inc_by(0);
                self.reconnect_attempts_total
                    .with_label_values(&[component, stream])
                    .inc_by(0);
            }
        }
    }

    /// Render all metrics in Prometheus 0.0.4 text format. Label tuples are
    /// emitted in sorted order for stable scrapes.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        encoder
            .encode_to_string(&self.registry.gather())
            .unwrap_or_default()
    }

    pub fn inc_error(&self, component: &str) {
        self.errors_total.with_label_values(&[component]).inc();
    }

    pub fn inc_received(&self, component: &str, stream: &str) {
        self.messages_received_total
            .with_label_values(&[component, stream])
            .inc();
    }

    pub fn inc_published(&self, component: &str, stream: &str) {
        self.messages_published_total
            .with_label_values(&[component, stream])
            .inc();
    }

    pub fn inc_reconnect(&self, component: &str, stream: &str) {
        self.reconnect_attempts_total
            .with_label_values(&[component, stream])
            .inc();
    }
}
