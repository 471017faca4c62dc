use crate::domain::errors::IntentError;
use crate::domain::intent::models::{
    AgentIntent, IntentAssetType, IntentOption, IntentOrderType, IntentRationale, IntentSide,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalSide {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProposalConstraints {
    pub valid_until_utc: DateTime<Utc>,
    pub requires_human_approval: bool,
}

/// Sized sibling of `AgentIntent`: the only record in the system that
/// carries a quantity. Produced exclusively by the allocator; proposals with
/// `requires_human_approval = true` (the default) are emitted but not
/// executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderProposal {
    pub created_at_utc: DateTime<Utc>,

    pub repo_id: String,
    pub agent_name: String,
    pub strategy_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_version: Option<String>,
    pub correlation_id: String,
    pub intent_id: Uuid,

    pub symbol: String,
    pub asset_type: IntentAssetType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option: Option<IntentOption>,

    pub side: ProposalSide,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,

    pub rationale: IntentRationale,
    pub constraints: ProposalConstraints,
}

impl OrderProposal {
    /// Centralized conversion: AgentIntent (no capital) → OrderProposal
    /// (sized). The allocator decides `quantity`; callers must not pass
    /// agent-derived sizing. FLAT intents and zero quantities yield `None`.
    pub fn from_intent(
        intent: &AgentIntent,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, IntentError> {
        intent.validate()?;
        let side = match intent.side {
            IntentSide::Flat => return Ok(None),
            IntentSide::Buy => ProposalSide::Buy,
            IntentSide::Sell => ProposalSide::Sell,
        };
        if quantity == 0 {
            return Ok(None);
        }

        let limit_price = match intent.constraints.order_type {
            IntentOrderType::Limit => intent.constraints.limit_price,
            IntentOrderType::Market => None,
        };

        Ok(Some(Self {
            created_at_utc: now,
            repo_id: intent.repo_id.clone(),
            agent_name: intent.agent_name.clone(),
            strategy_name: intent.strategy_name.clone(),
            strategy_version: intent.strategy_version.clone(),
            correlation_id: intent.correlation_id.clone(),
            intent_id: intent.intent_id,
            symbol: intent.symbol.clone(),
            asset_type: intent.asset_type,
            option: intent.option.clone(),
            side,
            quantity,
            limit_price,
            rationale: intent.rationale.clone(),
            constraints: ProposalConstraints {
                valid_until_utc: intent.constraints.valid_until_utc,
                requires_human_approval: intent.constraints.requires_human_approval,
            },
        }))
    }

    pub fn validate(&self) -> Result<(), IntentError> {
        if self.quantity == 0 {
            return Err(IntentError::NonPositiveQuantity);
        }
        if self.symbol.trim().is_empty() {
            return Err(IntentError::EmptySymbol);
        }
        Ok(())
    }
}
