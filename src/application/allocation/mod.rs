//! The allocator: the only place that converts a capital-free intent into
//! capital-bearing quantities, and the only producer of order proposals.

use crate::domain::errors::IntentError;
use crate::domain::intent::{AgentIntent, IntentKind, IntentSide, OrderProposal};
use crate::domain::ports::StrategyLimitGate;
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

/// Output of the allocator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
    pub allowed: bool,
    pub reason: String,
    pub qty: u32,
    pub notional_usd: Decimal,
}

impl Allocation {
    fn blocked(reason: &str) -> Self {
        Self {
            allowed: false,
            reason: reason.to_string(),
            qty: 0,
            notional_usd: Decimal::ZERO,
        }
    }
}

pub struct RiskAllocator {
    default_qty: u32,
}

impl RiskAllocator {
    pub fn new(default_qty: u32) -> Self {
        Self { default_qty }
    }

    /// Conservative default of one unit, overridable via
    /// `ALLOCATOR_DEFAULT_QTY`.
    pub fn from_env() -> Self {
        let default_qty = std::env::var("ALLOCATOR_DEFAULT_QTY")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(1);
        Self::new(default_qty)
    }

    /// Convert intent → quantity without touching strategy logic.
    /// DIRECTIONAL/EXIT default to the configured unit size; DELTA_HEDGE
    /// derives the quantity from the observed net delta, rounded to a whole
    /// share.
    fn size_intent(&self, intent: &AgentIntent) -> u32 {
        if intent.kind == IntentKind::DeltaHedge {
            let delta = intent.constraints.delta_to_hedge.unwrap_or(0.0);
            return delta.abs().round() as u32;
        }
        self.default_qty
    }

    /// Allocation without external stateful gates, for proposal flows where
    /// execution is human-approved downstream.
    pub fn allocate(&self, intent: &AgentIntent, last_price: Decimal) -> Allocation {
        if intent.side == IntentSide::Flat {
            return Allocation::blocked("flat_intent");
        }
        let qty = self.size_intent(intent);
        let notional = (last_price * Decimal::from(qty)).max(Decimal::ZERO);
        Allocation {
            allowed: true,
            reason: "ok".to_string(),
            qty,
            notional_usd: notional,
        }
    }

    /// Allocation plus the per-strategy notional limit gate.
    pub async fn allocate_with_gate(
        &self,
        intent: &AgentIntent,
        strategy_id: &str,
        trading_date: NaiveDate,
        last_price: Decimal,
        gate: &dyn StrategyLimitGate,
    ) -> Result<Allocation> {
        if intent.side == IntentSide::Flat {
            return Ok(Allocation::blocked("flat_intent"));
        }
        let qty = self.size_intent(intent);
        let notional = (last_price * Decimal::from(qty)).max(Decimal::ZERO);

        let allowed = gate
            .can_place_trade(strategy_id, trading_date, notional)
            .await?;
        if !allowed {
            debug!(
                "strategy limits blocked intent {} (notional ${notional})",
                intent.intent_id
            );
            return Ok(Allocation::blocked("strategy_limits_blocked"));
        }

        Ok(Allocation {
            allowed: true,
            reason: "ok".to_string(),
            qty,
            notional_usd: notional,
        })
    }

    /// Convert an allowed allocation into a sized proposal. FLAT intents and
    /// blocked allocations produce nothing.
    pub fn to_proposal(
        &self,
        intent: &AgentIntent,
        allocation: &Allocation,
        now: DateTime<Utc>,
    ) -> Result<Option<OrderProposal>, IntentError> {
        if !allocation.allowed {
            return Ok(None);
        }
        OrderProposal::from_intent(intent, allocation.qty, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::intent::{
        IntentAssetType, IntentConstraints, IntentOrderType, IntentRationale, TimeInForce,
    };
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use serde_json::Map;
    use uuid::Uuid;

    fn intent(side: IntentSide, kind: IntentKind, delta: Option<f64>) -> AgentIntent {
        AgentIntent {
            intent_id: Uuid::nil(),
            created_at_utc: Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap(),
            repo_id: "agent-trader".into(),
            agent_name: "strategy-engine".into(),
            strategy_name: "pairs_trader".into(),
            strategy_version: None,
            correlation_id: "corr-3".into(),
            symbol: "SPY".into(),
            asset_type: IntentAssetType::Equity,
            option: None,
            kind,
            side,
            confidence: None,
            rationale: IntentRationale {
                short_reason: "test".into(),
                indicators: Map::new(),
            },
            constraints: IntentConstraints {
                valid_until_utc: Utc.with_ymd_and_hms(2024, 1, 2, 15, 5, 0).unwrap(),
                requires_human_approval: true,
                order_type: IntentOrderType::Market,
                time_in_force: TimeInForce::Day,
                limit_price: None,
                delta_to_hedge: delta,
            },
        }
    }

    struct FixedGate {
        allow: bool,
    }

    #[async_trait]
    impl StrategyLimitGate for FixedGate {
        async fn can_place_trade(
            &self,
            _strategy_id: &str,
            _trading_date: NaiveDate,
            _notional: Decimal,
        ) -> Result<bool> {
            Ok(self.allow)
        }
    }

    #[test]
    fn test_directional_defaults_to_unit_qty() {
        let allocator = RiskAllocator::new(1);
        let alloc = allocator.allocate(
            &intent(IntentSide::Buy, IntentKind::Directional, None),
            dec!(475),
        );
        assert!(alloc.allowed);
        assert_eq!(alloc.qty, 1);
        assert_eq!(alloc.notional_usd, dec!(475));
    }

    #[test]
    fn test_delta_hedge_derives_qty_from_delta() {
        let allocator = RiskAllocator::new(1);
        let alloc = allocator.allocate(
            &intent(IntentSide::Sell, IntentKind::DeltaHedge, Some(-37.4)),
            dec!(100),
        );
        assert_eq!(alloc.qty, 37);

        let zero = allocator.allocate(
            &intent(IntentSide::Sell, IntentKind::DeltaHedge, Some(0.0)),
            dec!(100),
        );
        assert_eq!(zero.qty, 0);
    }

    #[test]
    fn test_flat_intent_is_blocked() {
        let allocator = RiskAllocator::new(1);
        let alloc = allocator.allocate(
            &intent(IntentSide::Flat, IntentKind::Directional, None),
            dec!(100),
        );
        assert!(!alloc.allowed);
        assert_eq!(alloc.reason, "flat_intent");
    }

    #[tokio::test]
    async fn test_gate_blocks_allocation() {
        let allocator = RiskAllocator::new(2);
        let gate = FixedGate { allow: false };
        let alloc = allocator
            .allocate_with_gate(
                &intent(IntentSide::Buy, IntentKind::Directional, None),
                "s1",
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                dec!(475),
                &gate,
            )
            .await
            .unwrap();
        assert!(!alloc.allowed);
        assert_eq!(alloc.reason, "strategy_limits_blocked");
        assert_eq!(alloc.qty, 0);
    }

    #[tokio::test]
    async fn test_gate_allows_allocation() {
        let allocator = RiskAllocator::new(2);
        let gate = FixedGate { allow: true };
        let alloc = allocator
            .allocate_with_gate(
                &intent(IntentSide::Buy, IntentKind::Directional, None),
                "s1",
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                dec!(475),
                &gate,
            )
            .await
            .unwrap();
        assert!(alloc.allowed);
        assert_eq!(alloc.notional_usd, dec!(950));
    }

    #[test]
    fn test_proposal_produced_only_when_allowed() {
        let allocator = RiskAllocator::new(1);
        let i = intent(IntentSide::Buy, IntentKind::Directional, None);
        let now = Utc::now();

        let allowed = allocator.allocate(&i, dec!(475));
        let proposal = allocator.to_proposal(&i, &allowed, now).unwrap();
        assert_eq!(proposal.unwrap().quantity, 1);

        let blocked = Allocation::blocked("strategy_limits_blocked");
        assert!(allocator.to_proposal(&i, &blocked, now).unwrap().is_none());
    }
}
