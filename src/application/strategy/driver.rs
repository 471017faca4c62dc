//! The strategy execution loop: safety gate → time gate → evaluate →
//! emit intent → circuit breakers → allocate → proposal.

use super::{IntentDraft, Strategy};
use crate::application::allocation::RiskAllocator;
use crate::application::intent::IntentEmitter;
use crate::application::monitoring::SafetyMonitor;
use crate::application::risk_management::{
    BreakerContext, CircuitBreakerManager, PositionSnapshot,
};
use crate::domain::intent::{
    AgentIntent, IntentAssetType, IntentConstraints, IntentKind, IntentRationale, IntentSide,
    OrderProposal, TimeInForce,
};
use crate::domain::ledger::LedgerTrade;
use crate::domain::market::{Candle, SessionClock};
use crate::domain::ports::ProposalStore;
use crate::domain::risk::{SignalAction, StrategySignal};
use crate::domain::safety::is_safe_to_run;
use crate::infrastructure::observability::Metrics;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct StrategyDriverConfig {
    pub tenant_id: String,
    pub user_id: String,
    pub strategy_id: String,
    pub intent_ttl_seconds: i64,
    /// Dollar allocation attached to outgoing signals for the breakers.
    pub default_allocation: Decimal,
}

/// Portfolio inputs the breakers need, gathered per cycle by the caller.
#[derive(Debug, Clone, Default)]
pub struct PortfolioView {
    pub trades: Vec<LedgerTrade>,
    pub positions: HashMap<String, PositionSnapshot>,
    pub total_value: Decimal,
    pub starting_equity: Decimal,
}

pub struct StrategyDriver {
    strategy: Box<dyn Strategy>,
    allocator: RiskAllocator,
    breakers: Arc<CircuitBreakerManager>,
    emitter: IntentEmitter,
    monitor: Arc<SafetyMonitor>,
    session: SessionClock,
    metrics: Arc<Metrics>,
    proposal_store: Option<Arc<dyn ProposalStore>>,
    config: StrategyDriverConfig,
}

impl StrategyDriver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        strategy: Box<dyn Strategy>,
        allocator: RiskAllocator,
        breakers: Arc<CircuitBreakerManager>,
        emitter: IntentEmitter,
        monitor: Arc<SafetyMonitor>,
        session: SessionClock,
        metrics: Arc<Metrics>,
        proposal_store: Option<Arc<dyn ProposalStore>>,
        config: StrategyDriverConfig,
    ) -> Self {
        Self {
            strategy,
            allocator,
            breakers,
            emitter,
            monitor,
            session,
            metrics,
            proposal_store,
            config,
        }
    }

    /// Run one strategy cycle over a final candle. Returns the proposal
    /// emitted this cycle, if any.
    pub async fn on_candle(
        &mut self,
        candle: &Candle,
        portfolio: &PortfolioView,
        now: DateTime<Utc>,
    ) -> Result<Option<OrderProposal>> {
        self.metrics.strategy_cycles_total.inc();

        let state = self.monitor.evaluate(now);
        if !is_safe_to_run(&state) {
            debug!(
                "strategy cycle skipped, unsafe: {:?}",
                state.reason_codes
            );
            self.metrics.strategy_cycles_skipped_total.inc();
            return Ok(None);
        }

        let Some(draft) = self.strategy.on_candle(candle) else {
            return Ok(None);
        };

        if !self.gate_allows(&draft, now) {
            debug!(
                "strategy cycle skipped, outside session window: kind={:?}",
                draft.kind
            );
            self.metrics.strategy_cycles_skipped_total.inc();
            return Ok(None);
        }

        let intent = self.build_intent(draft, now)?;
        self.emitter.emit(&intent)?;

        let mut signal = StrategySignal::new(
            &intent.symbol,
            match intent.side {
                IntentSide::Buy => SignalAction::Buy,
                IntentSide::Sell => SignalAction::Sell,
                IntentSide::Flat => SignalAction::Hold,
            },
            self.config.default_allocation,
        );
        signal.confidence = intent.confidence;

        let ctx = BreakerContext {
            tenant_id: &self.config.tenant_id,
            user_id: &self.config.user_id,
            strategy_id: &self.config.strategy_id,
            trades: &portfolio.trades,
            starting_equity: portfolio.starting_equity,
            positions: &portfolio.positions,
            total_portfolio_value: portfolio.total_value,
            now,
        };
        self.breakers.apply(&mut signal, &ctx).await;

        if signal.action == SignalAction::Hold {
            info!(
                "signal held by circuit breakers: {:?}",
                signal.circuit_breaker_messages
            );
            return Ok(None);
        }

        let allocation = self.allocator.allocate(&intent, candle.close);
        let Some(proposal) = self.allocator.to_proposal(&intent, &allocation, now)? else {
            return Ok(None);
        };

        self.metrics.order_proposals_total.inc();
        if let Some(store) = &self.proposal_store {
            if let Err(e) = store.write_proposal(&proposal).await {
                warn!("proposal store write failed: {e}");
                self.metrics.inc_error("strategy-engine");
            }
        }
        Ok(Some(proposal))
    }

    /// Entry windows are half-open and close at 16:00; exit intents remain
    /// allowed through the EOD flatten window.
    fn gate_allows(&self, draft: &IntentDraft, now: DateTime<Utc>) -> bool {
        match draft.kind {
            IntentKind::Exit => {
                self.session.in_entry_window(now) || self.session.in_eod_flatten_window(now)
            }
            _ => self.session.in_entry_window(now),
        }
    }

    fn build_intent(&self, draft: IntentDraft, now: DateTime<Utc>) -> Result<AgentIntent> {
        let identity = self.emitter.logger_identity();
        let intent = AgentIntent {
            intent_id: Uuid::new_v4(),
            created_at_utc: now,
            repo_id: identity.repo_id.clone(),
            agent_name: identity.agent_name.clone(),
            strategy_name: self.strategy.name().to_string(),
            strategy_version: self.strategy.version().map(str::to_string),
            correlation_id: Uuid::new_v4().to_string(),
            symbol: draft.symbol,
            asset_type: IntentAssetType::Equity,
            option: None,
            kind: draft.kind,
            side: draft.side,
            confidence: draft.confidence,
            rationale: IntentRationale {
                short_reason: draft.short_reason,
                indicators: draft.indicators,
            },
            constraints: IntentConstraints {
                valid_until_utc: now + Duration::seconds(self.config.intent_ttl_seconds),
                requires_human_approval: true,
                order_type: draft.order_type,
                time_in_force: TimeInForce::Day,
                limit_price: draft.limit_price,
                delta_to_hedge: draft.delta_to_hedge,
            },
        };
        intent.validate()?;
        Ok(intent)
    }
}
