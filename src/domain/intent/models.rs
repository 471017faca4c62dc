//! Agent → allocator contract.
//!
//! Safety property: an `AgentIntent` contains NO capital quantities (no
//! notional, no qty), so it is always safe for strategies to emit. The wire
//! form rejects unknown fields, which makes a payload smuggling a `quantity`
//! fail at the deserialization boundary.

use crate::domain::errors::IntentError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentSide {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
    #[serde(rename = "FLAT")]
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentAssetType {
    #[serde(rename = "EQUITY")]
    Equity,
    #[serde(rename = "OPTION")]
    Option,
    #[serde(rename = "FUTURE")]
    Future,
}

/// High-level intent semantics. Explicitly NOT an execution instruction; it
/// is a request for the allocator to determine if and how to size and route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentKind {
    /// Open or close directional exposure.
    #[serde(rename = "DIRECTIONAL")]
    Directional,
    /// Reduce net delta toward a target.
    #[serde(rename = "DELTA_HEDGE")]
    DeltaHedge,
    /// Reduce or close exposure; the allocator chooses mechanics.
    #[serde(rename = "EXIT")]
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionRight {
    #[serde(rename = "CALL")]
    Call,
    #[serde(rename = "PUT")]
    Put,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntentOption {
    pub expiration: NaiveDate,
    pub right: OptionRight,
    pub strike: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_symbol: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntentRationale {
    pub short_reason: String,
    #[serde(default)]
    pub indicators: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentOrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    Day,
    Gtc,
}

fn default_true() -> bool {
    true
}

fn default_order_type() -> IntentOrderType {
    IntentOrderType::Market
}

fn default_tif() -> TimeInForce {
    TimeInForce::Day
}

/// Non-capital knobs: time, price and safety flags. Capital and sizing are
/// intentionally excluded; the allocator may use these when shaping an
/// executable order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntentConstraints {
    pub valid_until_utc: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub requires_human_approval: bool,
    #[serde(default = "default_order_type")]
    pub order_type: IntentOrderType,
    #[serde(default = "default_tif")]
    pub time_in_force: TimeInForce,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
    /// Signed net delta to offset; the allocator derives the hedge quantity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_to_hedge: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentIntent {
    pub intent_id: Uuid,
    pub created_at_utc: DateTime<Utc>,

    pub repo_id: String,
    pub agent_name: String,
    pub strategy_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_version: Option<String>,
    pub correlation_id: String,

    pub symbol: String,
    #[serde(default = "default_asset_type")]
    pub asset_type: IntentAssetType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option: Option<IntentOption>,

    #[serde(default = "default_kind")]
    pub kind: IntentKind,
    pub side: IntentSide,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    pub rationale: IntentRationale,
    pub constraints: IntentConstraints,
}

fn default_asset_type() -> IntentAssetType {
    IntentAssetType::Equity
}

fn default_kind() -> IntentKind {
    IntentKind::Directional
}

impl AgentIntent {
    /// Validate the capital-free contract. Called by emitters and the
    /// allocator before anything leaves the process.
    pub fn validate(&self) -> Result<(), IntentError> {
        if self.symbol.trim().is_empty() {
            return Err(IntentError::EmptySymbol);
        }
        if let Some(c) = self.confidence {
            if !(0.0..=1.0).contains(&c) {
                return Err(IntentError::ConfidenceOutOfRange { value: c });
            }
        }
        if let Some(p) = self.constraints.limit_price {
            if p <= Decimal::ZERO {
                return Err(IntentError::NonPositiveLimitPrice);
            }
        }
        Ok(())
    }

    /// Parse a wire payload, enforcing the no-capital contract: any unknown
    /// field (including `quantity`/`notional`) is rejected.
    pub fn from_wire(raw: &str) -> Result<Self, IntentError> {
        let intent: AgentIntent =
            serde_json::from_str(raw).map_err(|e| IntentError::MalformedPayload {
                reason: e.to_string(),
            })?;
        intent.validate()?;
        Ok(intent)
    }
}
