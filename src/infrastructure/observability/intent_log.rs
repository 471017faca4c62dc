//! Structured intent logging: one JSON object per line on stdout.
//!
//! These lines ride a separate channel from the human-oriented `tracing`
//! output so log-based collectors can parse them without a format filter.

use crate::infrastructure::observability::redaction::redact_value;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::time::Instant;
use uuid::Uuid;

/// Identity of the running agent, resolved once from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub repo_id: String,
    pub agent_name: String,
    pub agent_role: String,
    pub agent_mode: String,
    pub git_sha: String,
}

impl AgentIdentity {
    pub fn from_env() -> Self {
        let get = |keys: &[&str], fallback: &str| -> String {
            for k in keys {
                if let Ok(v) = std::env::var(k) {
                    let v = v.trim().to_string();
                    if !v.is_empty() {
                        return v;
                    }
                }
            }
            fallback.to_string()
        };
        Self {
            repo_id: get(&["REPO_ID"], "agent-trader"),
            agent_name: get(&["AGENT_NAME", "SERVICE_NAME", "K_SERVICE"], "unknown"),
            agent_role: get(&["AGENT_ROLE"], "unknown"),
            agent_mode: get(&["AGENT_MODE"], "live"),
            git_sha: get(&["GIT_SHA", "K_REVISION"], "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentOutcome {
    Started,
    Success,
    Failure,
}

/// Wire schema of one intent log line. Every key is always present except
/// `duration_ms`, which only appears on terminal outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentLogRecord {
    pub timestamp: String,
    pub level: String,
    pub repo_id: String,
    pub agent_name: String,
    pub agent_role: String,
    pub agent_mode: String,
    pub git_sha: String,
    pub intent_id: String,
    pub correlation_id: String,
    pub trace_id: String,
    pub intent_type: String,
    pub intent_summary: String,
    pub intent_payload: Value,
    pub outcome: IntentOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Handle returned by `intent_start`, closed by `intent_end`.
pub struct IntentContext {
    intent_id: String,
    correlation_id: String,
    intent_type: String,
    intent_summary: String,
    intent_payload: Value,
    started: Instant,
}

#[derive(Clone)]
pub struct IntentLogger {
    identity: AgentIdentity,
}

impl IntentLogger {
    pub fn new(identity: AgentIdentity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    fn base_record(
        &self,
        level: &str,
        intent_id: &str,
        correlation_id: &str,
        intent_type: &str,
        intent_summary: &str,
        payload: Value,
        outcome: IntentOutcome,
        duration_ms: Option<u64>,
    ) -> IntentLogRecord {
        IntentLogRecord {
            timestamp: Utc::now().to_rfc3339(),
            level: level.to_string(),
            repo_id: self.identity.repo_id.clone(),
            agent_name: self.identity.agent_name.clone(),
            agent_role: self.identity.agent_role.clone(),
            agent_mode: self.identity.agent_mode.clone(),
            git_sha: self.identity.git_sha.clone(),
            intent_id: intent_id.to_string(),
            // No separate trace context yet; mirror the correlation id so
            // the key is always populated for replay tooling.
            correlation_id: correlation_id.to_string(),
            trace_id: correlation_id.to_string(),
            intent_type: intent_type.to_string(),
            intent_summary: intent_summary.to_string(),
            intent_payload: payload,
            outcome,
            duration_ms,
        }
    }

    fn write(record: &IntentLogRecord) {
        // A logging failure must never propagate into the caller.
        if let Ok(line) = serde_json::to_string(record) {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            let _ = writeln!(lock, "{line}");
            let _ = lock.flush();
        }
    }

    /// Emit `outcome=started` and return a context for the closing record.
    pub fn intent_start(
        &self,
        intent_type: &str,
        summary: &str,
        correlation_id: &str,
        payload: Value,
    ) -> IntentContext {
        let intent_id = Uuid::new_v4().to_string();
        let safe_payload = redact_value(&payload);
        let record = self.base_record(
            "INFO",
            &intent_id,
            correlation_id,
            intent_type,
            summary,
            safe_payload.clone(),
            IntentOutcome::Started,
            None,
        );
        Self::write(&record);
        IntentContext {
            intent_id,
            correlation_id: correlation_id.to_string(),
            intent_type: intent_type.to_string(),
            intent_summary: summary.to_string(),
            intent_payload: safe_payload,
            started: Instant::now(),
        }
    }

    /// Close an intent with `success` or `failure` plus `duration_ms`.
    pub fn intent_end(&self, ctx: IntentContext, outcome: IntentOutcome) {
        let duration_ms = ctx.started.elapsed().as_millis() as u64;
        let level = if outcome == IntentOutcome::Failure {
            "ERROR"
        } else {
            "INFO"
        };
        let record = self.base_record(
            level,
            &ctx.intent_id,
            &ctx.correlation_id,
            &ctx.intent_type,
            &ctx.intent_summary,
            ctx.intent_payload,
            outcome,
            Some(duration_ms),
        );
        Self::write(&record);
    }

    /// One-shot intent (start + immediate success), used for the startup
    /// identity banner and other point events.
    pub fn log_point_event(&self, intent_type: &str, summary: &str, payload: Value) {
        let ctx = self.intent_start(intent_type, summary, &Uuid::new_v4().to_string(), payload);
        self.intent_end(ctx, IntentOutcome::Success);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity() -> AgentIdentity {
        AgentIdentity {
            repo_id: "agent-trader".into(),
            agent_name: "strategy-engine".into(),
            agent_role: "strategy".into(),
            agent_mode: "paper".into(),
            git_sha: "abc123".into(),
        }
    }

    #[test]
    fn test_record_schema_has_required_keys() {
        let logger = IntentLogger::new(identity());
        let record = logger.base_record(
            "INFO",
            "i-1",
            "c-1",
            "agent_intent",
            "emitted",
            json!({}),
            IntentOutcome::Started,
            None,
        );
        let v: Value = serde_json::to_value(&record).unwrap();
        for key in [
            "timestamp",
            "level",
            "repo_id",
            "agent_name",
            "agent_role",
            "agent_mode",
            "git_sha",
            "intent_id",
            "correlation_id",
            "trace_id",
            "intent_type",
            "intent_summary",
            "intent_payload",
            "outcome",
        ] {
            assert!(v.get(key).is_some(), "missing key {key}");
        }
        // duration_ms only appears on terminal outcomes.
        assert!(v.get("duration_ms").is_none());
    }

    #[test]
    fn test_trace_id_mirrors_correlation_id() {
        let logger = IntentLogger::new(identity());
        let record = logger.base_record(
            "INFO",
            "i-1",
            "c-9",
            "t",
            "s",
            json!({}),
            IntentOutcome::Success,
            Some(5),
        );
        assert_eq!(record.trace_id, record.correlation_id);
        assert_eq!(record.duration_ms, Some(5));
    }

    #[test]
    fn test_start_payload_is_redacted() {
        let logger = IntentLogger::new(identity());
        let ctx = logger.intent_start(
            "marketdata_emit",
            "persist quote",
            "c-1",
            json!({"api_key": "sk-1", "symbol": "SPY"}),
        );
        assert_eq!(ctx.intent_payload["api_key"], "***REDACTED***");
        assert_eq!(ctx.intent_payload["symbol"], "SPY");
        logger.intent_end(ctx, IntentOutcome::Success);
    }

    #[test]
    fn test_outcome_tokens() {
        assert_eq!(
            serde_json::to_string(&IntentOutcome::Failure).unwrap(),
            "\"failure\""
        );
    }
}
