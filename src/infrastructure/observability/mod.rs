pub mod intent_log;
pub mod metrics;
pub mod redaction;

pub use intent_log::{AgentIdentity, IntentLogger, IntentOutcome};
pub use metrics::Metrics;
pub use redaction::redact_value;
