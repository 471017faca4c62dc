use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Action a strategy wants to take on the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalAction {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
    #[serde(rename = "HOLD")]
    Hold,
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalAction::Buy => write!(f, "BUY"),
            SignalAction::Sell => write!(f, "SELL"),
            SignalAction::Hold => write!(f, "HOLD"),
        }
    }
}

/// A strategy signal on its way through the risk gates. Breakers mutate the
/// action/allocation in place and append an explanation per trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySignal {
    pub symbol: String,
    pub action: SignalAction,
    /// Dollar allocation the caller intends to deploy; breakers may reduce it.
    pub allocation: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub circuit_breaker_messages: Vec<String>,
}

impl StrategySignal {
    pub fn new(symbol: &str, action: SignalAction, allocation: Decimal) -> Self {
        Self {
            symbol: symbol.trim().to_uppercase(),
            action,
            allocation,
            confidence: None,
            circuit_breaker_messages: Vec::new(),
        }
    }

    /// Downgrade to HOLD, recording why.
    pub fn force_hold(&mut self, message: String) {
        self.action = SignalAction::Hold;
        self.circuit_breaker_messages.push(message);
    }
}

/// Execution posture of a strategy. SHADOW_MODE keeps computing signals but
/// produces no proposals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "SHADOW_MODE")]
    ShadowMode,
}
