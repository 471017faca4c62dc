use crate::domain::errors::SafetyError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Global trading safety snapshot: the single source of truth for whether
/// strategies may run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyState {
    pub trading_enabled: bool,
    pub kill_switch: bool,
    pub marketdata_fresh: bool,
    pub marketdata_last_ts: Option<DateTime<Utc>>,
    pub reason_codes: Vec<String>,
    pub updated_at: DateTime<Utc>,
    pub ttl_seconds: u32,
}

/// Evaluate the global safety state.
///
/// Strict, fail-closed rules:
/// - `kill_switch == true` => NOT safe
/// - missing `marketdata_last_ts` => NOT safe
/// - `now - marketdata_last_ts > stale_threshold_seconds` => NOT safe
/// Missing or unknown inputs bias to NOT safe; callers pass safe defaults.
pub fn evaluate_safety_state(
    trading_enabled: bool,
    kill_switch: bool,
    marketdata_last_ts: Option<DateTime<Utc>>,
    stale_threshold_seconds: u32,
    now: DateTime<Utc>,
    ttl_seconds: u32,
) -> SafetyState {
    let mut reasons: Vec<String> = Vec::new();

    if !trading_enabled {
        reasons.push("trading_disabled".to_string());
    }
    if kill_switch {
        reasons.push("kill_switch_enabled".to_string());
    }

    let mut fresh = false;
    match marketdata_last_ts {
        None => reasons.push("marketdata_last_ts_missing".to_string()),
        Some(ts) => {
            let age = now.signed_duration_since(ts);
            if age.num_milliseconds() as f64 / 1000.0 > stale_threshold_seconds as f64 {
                reasons.push("marketdata_stale".to_string());
            } else {
                fresh = true;
            }
        }
    }

    SafetyState {
        trading_enabled,
        kill_switch,
        marketdata_fresh: fresh,
        marketdata_last_ts,
        reason_codes: reasons,
        updated_at: now,
        ttl_seconds,
    }
}

/// Safe-to-run iff trading is enabled, the kill switch is off, and market
/// data exists and is fresh.
pub fn is_safe_to_run(state: &SafetyState) -> bool {
    state.trading_enabled
        && !state.kill_switch
        && state.marketdata_last_ts.is_some()
        && state.marketdata_fresh
}

pub fn assert_safe_to_run(state: &SafetyState) -> Result<(), SafetyError> {
    if is_safe_to_run(state) {
        return Ok(());
    }
    Err(SafetyError::UnsafeToRun {
        reason_codes: state.reason_codes.clone(),
    })
}

/// Merge reason code lists, deduplicating while preserving order.
pub fn merge_reason_codes<'a, I>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a [String]>,
{
    let mut out: Vec<String> = Vec::new();
    for part in parts {
        for code in part {
            let c = code.trim();
            if c.is_empty() {
                continue;
            }
            if !out.iter().any(|existing| existing == c) {
                out.push(c.to_string());
            }
        }
    }
    out
}
