use crate::application::monitoring::activity::MarketDataActivity;
use crate::domain::safety::{SafetyState, evaluate_safety_state, is_safe_to_run};
use crate::infrastructure::observability::Metrics;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Live source of the safety configuration keys. Implementations read the
/// mounted config volume (file wins over env) on every evaluation so a flip
/// of the kill switch takes effect within one cycle.
pub trait SafetyConfigSource: Send + Sync {
    fn trading_enabled(&self) -> bool;
    fn kill_switch(&self) -> bool;
    fn stale_threshold_seconds(&self) -> u32;
}

/// Readiness evaluator backing `/readyz` and `/heartbeat`.
///
/// Stale and halted transitions are edge-triggered: the counters increment
/// once per transition into the bad state, not per poll.
pub struct SafetyMonitor {
    config: Arc<dyn SafetyConfigSource>,
    activity: Arc<MarketDataActivity>,
    metrics: Arc<Metrics>,
    ttl_seconds: u32,
    was_stale: AtomicBool,
    was_halted: AtomicBool,
}

impl SafetyMonitor {
    pub fn new(
        config: Arc<dyn SafetyConfigSource>,
        activity: Arc<MarketDataActivity>,
        metrics: Arc<Metrics>,
        ttl_seconds: u32,
    ) -> Self {
        Self {
            config,
            activity,
            metrics,
            ttl_seconds,
            was_stale: AtomicBool::new(false),
            was_halted: AtomicBool::new(false),
        }
    }

    pub fn stale_threshold_seconds(&self) -> u32 {
        self.config.stale_threshold_seconds()
    }

    pub fn evaluate(&self, now: DateTime<Utc>) -> SafetyState {
        let state = evaluate_safety_state(
            self.config.trading_enabled(),
            self.config.kill_switch(),
            self.activity.last(),
            self.config.stale_threshold_seconds(),
            now,
            self.ttl_seconds,
        );

        match self.activity.age_seconds(now) {
            Some(age) => self.metrics.heartbeat_age_seconds.set(age),
            None => self.metrics.heartbeat_age_seconds.set(f64::INFINITY),
        }

        let is_stale = !state.marketdata_fresh;
        if is_stale && !self.was_stale.swap(true, Ordering::SeqCst) {
            self.metrics.marketdata_stale_total.inc();
            warn!(
                "marketdata went stale: reasons={:?}",
                state.reason_codes
            );
        } else if !is_stale {
            self.was_stale.store(false, Ordering::SeqCst);
        }

        let halted = !is_safe_to_run(&state);
        if halted && !self.was_halted.swap(true, Ordering::SeqCst) {
            self.metrics.safety_halted_total.inc();
            warn!("safety halt engaged: reasons={:?}", state.reason_codes);
        } else if !halted {
            self.was_halted.store(false, Ordering::SeqCst);
        }

        state
    }
}
