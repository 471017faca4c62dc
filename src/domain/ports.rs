//! Port interfaces between the core and its collaborators (stores, broker
//! adapters, notification fan-out). Infrastructure provides the
//! implementations; application services depend only on these traits.

use crate::domain::market::{Candle, Tick};
use crate::domain::risk::CircuitBreakerEvent;
use crate::domain::safety::{HeartbeatInfo, ServiceHeartbeat};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

#[async_trait]
pub trait CandleStore: Send + Sync {
    async fn write_candles(&self, candles: &[Candle]) -> Result<()>;
    async fn query_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        start_utc: DateTime<Utc>,
        end_utc: DateTime<Utc>,
    ) -> Result<Vec<Candle>>;
}

#[async_trait]
pub trait TickStore: Send + Sync {
    async fn write_ticks(&self, ticks: &[Tick]) -> Result<()>;
    async fn query_ticks(
        &self,
        symbol: &str,
        start_utc: DateTime<Utc>,
        end_utc: DateTime<Utc>,
    ) -> Result<Vec<Tick>>;
}

#[async_trait]
pub trait ProposalStore: Send + Sync {
    async fn write_proposal(&self, proposal: &crate::domain::intent::OrderProposal) -> Result<()>;
}

#[async_trait]
pub trait HeartbeatStore: Send + Sync {
    async fn write_heartbeat(&self, heartbeat: &ServiceHeartbeat) -> Result<()>;
    async fn read_heartbeat(
        &self,
        service_id: &str,
        now: DateTime<Utc>,
        stale_threshold_seconds: u32,
    ) -> Result<HeartbeatInfo>;
}

/// Best-effort audit sink for breaker activations.
#[async_trait]
pub trait BreakerEventSink: Send + Sync {
    async fn record(&self, event: &CircuitBreakerEvent) -> Result<()>;
}

/// Flips strategies between ACTIVE and SHADOW_MODE for a user. Returns the
/// number of strategies switched.
#[async_trait]
pub trait StrategyModeStore: Send + Sync {
    async fn set_shadow_mode(&self, tenant_id: &str, user_id: &str, reason: &str) -> Result<usize>;
}

/// Source of the cached volatility index used by the VIX guard.
#[async_trait]
pub trait VixProvider: Send + Sync {
    /// `None` when no reading is available; the guard then skips.
    async fn current_vix(&self) -> Result<Option<f64>>;
}

/// Per-strategy notional limits gate consulted by the allocator.
#[async_trait]
pub trait StrategyLimitGate: Send + Sync {
    async fn can_place_trade(
        &self,
        strategy_id: &str,
        trading_date: NaiveDate,
        notional: Decimal,
    ) -> Result<bool>;
}
