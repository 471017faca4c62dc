//! Intent emission: a stdout summary line plus an append-only NDJSON audit
//! record partitioned by UTC date. This function never sizes or executes.

use crate::domain::errors::IntentError;
use crate::domain::intent::AgentIntent;
use crate::infrastructure::observability::{IntentLogger, redact_value};
use serde_json::{Value, json};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

pub struct IntentEmitter {
    audit_root: PathBuf,
    logger: IntentLogger,
}

impl IntentEmitter {
    pub fn new(audit_root: &Path, logger: IntentLogger) -> Self {
        Self {
            audit_root: audit_root.to_path_buf(),
            logger,
        }
    }

    /// Root from `AUDIT_ARTIFACTS_DIR`, defaulting to `audit_artifacts/`.
    pub fn from_env(logger: IntentLogger) -> Self {
        let root = std::env::var("AUDIT_ARTIFACTS_DIR")
            .unwrap_or_else(|_| "audit_artifacts".to_string());
        Self::new(Path::new(&root), logger)
    }

    pub fn logger_identity(&self) -> &crate::infrastructure::observability::AgentIdentity {
        self.logger.identity()
    }

    fn audit_path(&self, intent: &AgentIntent) -> PathBuf {
        let day = intent.created_at_utc.format("%Y-%m-%d").to_string();
        self.audit_root
            .join("agent_intents")
            .join(day)
            .join("intents.ndjson")
    }

    /// Render the audit line for an intent: the full wire payload with the
    /// indicator map redacted. Stable for a stable `intent_id`, so repeated
    /// emissions append content-identical lines.
    pub fn audit_line(intent: &AgentIntent) -> Result<String, IntentError> {
        intent.validate()?;
        let mut raw: Value =
            serde_json::to_value(intent).map_err(|e| IntentError::MalformedPayload {
                reason: e.to_string(),
            })?;
        if let Some(indicators) = raw
            .get_mut("rationale")
            .and_then(|r| r.get_mut("indicators"))
        {
            *indicators = redact_value(indicators);
        }
        serde_json::to_string(&raw).map_err(|e| IntentError::MalformedPayload {
            reason: e.to_string(),
        })
    }

    /// Emit one intent: stdout summary plus the audit append. The audit
    /// write is best-effort; its failure is logged and never propagated.
    pub fn emit(&self, intent: &AgentIntent) -> Result<(), IntentError> {
        intent.validate()?;

        self.logger.log_point_event(
            "agent_intent",
            "Agent intent emitted.",
            json!({
                "event": "emitted",
                "intent_id": intent.intent_id.to_string(),
                "strategy_name": intent.strategy_name,
                "symbol": intent.symbol,
                "side": intent.side,
                "kind": intent.kind,
                "confidence": intent.confidence,
                "valid_until_utc": intent.constraints.valid_until_utc.to_rfc3339(),
                "requires_human_approval": intent.constraints.requires_human_approval,
            }),
        );

        let line = Self::audit_line(intent)?;
        if let Err(e) = self.append_line(&self.audit_path(intent), &line) {
            warn!(
                "intent audit write failed for {}: {e}",
                intent.intent_id
            );
        }
        Ok(())
    }

    fn append_line(&self, path: &Path, line: &str) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{line}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::intent::{
        IntentAssetType, IntentConstraints, IntentKind, IntentOrderType, IntentRationale,
        IntentSide, TimeInForce,
    };
    use crate::infrastructure::observability::AgentIdentity;
    use chrono::{TimeZone, Utc};
    use serde_json::Map;
    use uuid::Uuid;

    fn logger() -> IntentLogger {
        IntentLogger::new(AgentIdentity {
            repo_id: "agent-trader".into(),
            agent_name: "strategy-engine".into(),
            agent_role: "strategy".into(),
            agent_mode: "paper".into(),
            git_sha: "abc123".into(),
        })
    }

    fn intent() -> AgentIntent {
        let mut indicators = Map::new();
        indicators.insert("rsi".into(), 61.0.into());
        indicators.insert("api_key".into(), "sk-leak".into());
        AgentIntent {
            intent_id: Uuid::parse_str("8b1c8f7e-1111-2222-3333-444455556666").unwrap(),
            created_at_utc: Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap(),
            repo_id: "agent-trader".into(),
            agent_name: "strategy-engine".into(),
            strategy_name: "llm_sentiment_alpha".into(),
            strategy_version: None,
            correlation_id: "corr-7".into(),
            symbol: "SPY".into(),
            asset_type: IntentAssetType::Equity,
            option: None,
            kind: IntentKind::Directional,
            side: IntentSide::Buy,
            confidence: Some(0.7),
            rationale: IntentRationale {
                short_reason: "sentiment positive".into(),
                indicators,
            },
            constraints: IntentConstraints {
                valid_until_utc: Utc.with_ymd_and_hms(2024, 1, 2, 15, 5, 0).unwrap(),
                requires_human_approval: true,
                order_type: IntentOrderType::Market,
                time_in_force: TimeInForce::Day,
                limit_price: None,
                delta_to_hedge: None,
            },
        }
    }

    #[test]
    fn test_emit_appends_dated_audit_line() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = IntentEmitter::new(dir.path(), logger());
        emitter.emit(&intent()).unwrap();

        let path = dir
            .path()
            .join("agent_intents")
            .join("2024-01-02")
            .join("intents.ndjson");
        let content = fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("8b1c8f7e-1111-2222-3333-444455556666"));
    }

    #[test]
    fn test_indicators_redacted_in_audit() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = IntentEmitter::new(dir.path(), logger());
        emitter.emit(&intent()).unwrap();

        let path = dir
            .path()
            .join("agent_intents")
            .join("2024-01-02")
            .join("intents.ndjson");
        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("***REDACTED***"));
        assert!(!content.contains("sk-leak"));
        assert!(content.contains("rsi"));
    }

    #[test]
    fn test_repeated_emission_is_content_identical() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = IntentEmitter::new(dir.path(), logger());
        let i = intent();
        emitter.emit(&i).unwrap();
        emitter.emit(&i).unwrap();

        let path = dir
            .path()
            .join("agent_intents")
            .join("2024-01-02")
            .join("intents.ndjson");
        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], lines[1]);
    }

    #[test]
    fn test_audit_line_round_trips_redacted_intent() {
        let line = IntentEmitter::audit_line(&intent()).unwrap();
        let back = AgentIntent::from_wire(&line).unwrap();
        assert_eq!(back.intent_id, intent().intent_id);
        assert_eq!(back.symbol, "SPY");
    }
}
