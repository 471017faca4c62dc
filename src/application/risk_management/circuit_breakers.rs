//! Capital-protection circuit breakers for the strategy execution loop.
//!
//! Three breakers run in order on every outgoing signal:
//! 1. Daily loss limit: flip the user's strategies to SHADOW_MODE when
//!    today's realized P&L drops below -2% of starting equity.
//! 2. VIX guard: halve the allocation when VIX > 30.
//! 3. Concentration check: downgrade BUY to HOLD when the ticker already
//!    exceeds 20% of portfolio value.
//!
//! Event persistence and notifications are best-effort; a failing sink
//! never blocks the breaker decision.

use crate::domain::ledger::{LedgerTrade, StrategyKey, aggregate_by_strategy, compute_fifo_pnl};
use crate::domain::ports::{BreakerEventSink, StrategyModeStore, VixProvider};
use crate::domain::risk::{
    BreakerType, CircuitBreakerEvent, Severity, SignalAction, StrategySignal,
};
use crate::domain::time::utc_midnight;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub daily_loss_threshold: Decimal,
    pub vix_threshold: f64,
    pub concentration_threshold: Decimal,
    pub allocation_reduction_factor: Decimal,
    pub vix_cache_ttl_seconds: i64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            daily_loss_threshold: dec!(-0.02),
            vix_threshold: 30.0,
            concentration_threshold: dec!(0.20),
            allocation_reduction_factor: dec!(0.5),
            vix_cache_ttl_seconds: 300,
        }
    }
}

/// Current holding used by the concentration check.
#[derive(Debug, Clone)]
pub struct PositionSnapshot {
    pub qty: Decimal,
    pub current_price: Decimal,
}

/// Per-evaluation inputs gathered by the strategy driver.
pub struct BreakerContext<'a> {
    pub tenant_id: &'a str,
    pub user_id: &'a str,
    pub strategy_id: &'a str,
    /// Fill ledger for the user; the daily-loss breaker filters to today.
    pub trades: &'a [LedgerTrade],
    pub starting_equity: Decimal,
    pub positions: &'a HashMap<String, PositionSnapshot>,
    pub total_portfolio_value: Decimal,
    pub now: DateTime<Utc>,
}

pub struct CircuitBreakerManager {
    config: CircuitBreakerConfig,
    event_sink: Option<Arc<dyn BreakerEventSink>>,
    mode_store: Option<Arc<dyn StrategyModeStore>>,
    vix_provider: Option<Arc<dyn VixProvider>>,
    vix_cache: Mutex<Option<(f64, DateTime<Utc>)>>,
}

impl CircuitBreakerManager {
    pub fn new(
        config: CircuitBreakerConfig,
        event_sink: Option<Arc<dyn BreakerEventSink>>,
        mode_store: Option<Arc<dyn StrategyModeStore>>,
        vix_provider: Option<Arc<dyn VixProvider>>,
    ) -> Self {
        Self {
            config,
            event_sink,
            mode_store,
            vix_provider,
            vix_cache: Mutex::new(None),
        }
    }

    /// Run all breakers against `signal`, in order, mutating it in place.
    /// Returns the events produced. A daily-loss trigger short-circuits the
    /// remaining breakers.
    pub async fn apply(
        &self,
        signal: &mut StrategySignal,
        ctx: &BreakerContext<'_>,
    ) -> Vec<CircuitBreakerEvent> {
        let mut events = Vec::new();

        if let Some(event) = self.check_daily_loss_limit(ctx) {
            signal.force_hold(event.message.clone());
            self.switch_strategies_to_shadow_mode(ctx).await;
            self.handle_event(&event).await;
            events.push(event);
            return events;
        }

        if let Some(event) = self.check_vix_guard(signal, ctx).await {
            signal.circuit_breaker_messages.push(event.message.clone());
            self.handle_event(&event).await;
            events.push(event);
        }

        if let Some(event) = self.check_concentration(signal, ctx) {
            signal.force_hold(event.message.clone());
            self.handle_event(&event).await;
            events.push(event);
        }

        events
    }

    fn check_daily_loss_limit(&self, ctx: &BreakerContext<'_>) -> Option<CircuitBreakerEvent> {
        if ctx.trades.is_empty() || ctx.starting_equity <= Decimal::ZERO {
            return None;
        }

        let today_start = utc_midnight(ctx.now);
        let today_trades: Vec<LedgerTrade> = ctx
            .trades
            .iter()
            .filter(|t| t.ts >= today_start)
            .cloned()
            .collect();
        if today_trades.is_empty() {
            return None;
        }

        // Realized only; no marks needed for this check.
        let report = match compute_fifo_pnl(&today_trades, &HashMap::new(), None) {
            Ok(r) => r,
            Err(e) => {
                error!("daily loss check failed: {e}");
                return None;
            }
        };
        let rollup = aggregate_by_strategy(&report.groups);
        let key = StrategyKey {
            tenant_id: ctx.tenant_id.to_string(),
            uid: ctx.user_id.to_string(),
            strategy_id: ctx.strategy_id.to_string(),
        };
        let realized = rollup.get(&key)?.realized_net;
        let pnl_pct = realized / ctx.starting_equity;

        info!(
            "daily loss check: user={} strategy={} pnl=${realized} pct={pnl_pct}",
            ctx.user_id, ctx.strategy_id
        );

        if pnl_pct > self.config.daily_loss_threshold {
            return None;
        }

        let event = CircuitBreakerEvent {
            breaker_type: BreakerType::DailyLoss,
            ts: ctx.now,
            user_id: ctx.user_id.to_string(),
            tenant_id: ctx.tenant_id.to_string(),
            strategy_id: Some(ctx.strategy_id.to_string()),
            severity: Severity::Critical,
            message: format!(
                "Daily loss limit breached: {:.2}% (${realized}). Switching to SHADOW_MODE.",
                (pnl_pct * dec!(100)).to_f64().unwrap_or(0.0)
            ),
            metadata: json!({
                "realized_pnl": realized.to_string(),
                "pnl_percentage": pnl_pct.to_string(),
                "starting_equity": ctx.starting_equity.to_string(),
                "threshold": self.config.daily_loss_threshold.to_string(),
            }),
        };
        warn!("circuit breaker triggered: {}", event.message);
        Some(event)
    }

    async fn check_vix_guard(
        &self,
        signal: &mut StrategySignal,
        ctx: &BreakerContext<'_>,
    ) -> Option<CircuitBreakerEvent> {
        let vix = match self.current_vix(ctx.now).await {
            Some(v) => v,
            None => {
                warn!("VIX data not available, skipping VIX guard");
                return None;
            }
        };
        if vix <= self.config.vix_threshold {
            return None;
        }

        let original = signal.allocation;
        signal.allocation = original * self.config.allocation_reduction_factor;

        let event = CircuitBreakerEvent {
            breaker_type: BreakerType::VixGuard,
            ts: ctx.now,
            user_id: ctx.user_id.to_string(),
            tenant_id: ctx.tenant_id.to_string(),
            strategy_id: None,
            severity: Severity::Warning,
            message: format!(
                "VIX elevated at {vix:.2} (threshold: {}). Reducing allocation from ${original} to ${}.",
                self.config.vix_threshold, signal.allocation
            ),
            metadata: json!({
                "vix_value": vix,
                "threshold": self.config.vix_threshold,
                "original_allocation": original.to_string(),
                "adjusted_allocation": signal.allocation.to_string(),
            }),
        };
        warn!("VIX guard activated: {}", event.message);
        Some(event)
    }

    fn check_concentration(
        &self,
        signal: &StrategySignal,
        ctx: &BreakerContext<'_>,
    ) -> Option<CircuitBreakerEvent> {
        if signal.action != SignalAction::Buy {
            return None;
        }
        if ctx.total_portfolio_value <= Decimal::ZERO {
            warn!("total portfolio value is not positive, skipping concentration check");
            return None;
        }

        let ticker_value = ctx
            .positions
            .get(&signal.symbol)
            .map(|p| p.qty * p.current_price)
            .unwrap_or(Decimal::ZERO);
        let concentration = ticker_value / ctx.total_portfolio_value;
        if concentration <= self.config.concentration_threshold {
            return None;
        }

        let event = CircuitBreakerEvent {
            breaker_type: BreakerType::Concentration,
            ts: ctx.now,
            user_id: ctx.user_id.to_string(),
            tenant_id: ctx.tenant_id.to_string(),
            strategy_id: None,
            severity: Severity::Warning,
            message: format!(
                "Concentration limit exceeded for {}: {:.2}% (threshold: {:.0}%). Downgrading BUY to HOLD.",
                signal.symbol,
                (concentration * dec!(100)).to_f64().unwrap_or(0.0),
                (self.config.concentration_threshold * dec!(100))
                    .to_f64()
                    .unwrap_or(0.0)
            ),
            metadata: json!({
                "ticker": signal.symbol,
                "ticker_value": ticker_value.to_string(),
                "portfolio_value": ctx.total_portfolio_value.to_string(),
                "concentration": concentration.to_string(),
            }),
        };
        warn!("concentration guard activated: {}", event.message);
        Some(event)
    }

    /// VIX reading with a short cache so every signal doesn't hit the
    /// provider. Provider failures degrade to "unavailable".
    async fn current_vix(&self, now: DateTime<Utc>) -> Option<f64> {
        {
            let cache = self.vix_cache.lock().await;
            if let Some((value, cached_at)) = *cache {
                let age = now.signed_duration_since(cached_at).num_seconds();
                if age < self.config.vix_cache_ttl_seconds {
                    return Some(value);
                }
            }
        }

        let provider = self.vix_provider.as_ref()?;
        match provider.current_vix().await {
            Ok(Some(value)) => {
                *self.vix_cache.lock().await = Some((value, now));
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                error!("error fetching VIX: {e}");
                None
            }
        }
    }

    async fn switch_strategies_to_shadow_mode(&self, ctx: &BreakerContext<'_>) {
        let Some(store) = &self.mode_store else {
            error!("cannot switch to shadow mode: no strategy mode store");
            return;
        };
        match store
            .set_shadow_mode(ctx.tenant_id, ctx.user_id, "daily_loss_limit_breached")
            .await
        {
            Ok(count) => warn!(
                "switched {count} strategies to SHADOW_MODE for user {}",
                ctx.user_id
            ),
            Err(e) => error!("error switching strategies to shadow mode: {e}"),
        }
    }

    async fn handle_event(&self, event: &CircuitBreakerEvent) {
        warn!(
            "circuit breaker event: type={} severity={:?} user={} message={}",
            event.breaker_type, event.severity, event.user_id, event.message
        );
        if let Some(sink) = &self.event_sink {
            if let Err(e) = sink.record(event).await {
                error!("error storing circuit breaker event: {e}");
            }
        }
    }
}
