use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The three capital-protection breakers, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerType {
    DailyLoss,
    VixGuard,
    Concentration,
}

impl fmt::Display for BreakerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerType::DailyLoss => write!(f, "daily_loss"),
            BreakerType::VixGuard => write!(f, "vix_guard"),
            BreakerType::Concentration => write!(f, "concentration"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Audit record produced when a breaker activates. Persisted best-effort to
/// the per-user events store; a persistence failure never blocks the breaker
/// decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerEvent {
    pub breaker_type: BreakerType,
    pub ts: DateTime<Utc>,
    pub user_id: String,
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_id: Option<String>,
    pub severity: Severity,
    pub message: String,
    pub metadata: Value,
}
