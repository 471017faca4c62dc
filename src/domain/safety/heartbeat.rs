use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Liveness classification for a service heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatStatus {
    Healthy,
    Degraded,
    Down,
    Unknown,
}

/// Heartbeat record a service writes to the shared store on an interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHeartbeat {
    pub service_id: String,
    pub last_heartbeat_ts: DateTime<Utc>,
    pub status: HeartbeatStatus,
}

/// Consumer-side view of a heartbeat, with staleness computed against `now`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatInfo {
    pub service_id: String,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub status: HeartbeatStatus,
    pub seconds_since: Option<f64>,
    pub is_stale: bool,
}

impl HeartbeatInfo {
    /// A heartbeat that was never observed: unknown and stale.
    pub fn missing(service_id: &str) -> Self {
        Self {
            service_id: service_id.to_string(),
            last_heartbeat: None,
            status: HeartbeatStatus::Unknown,
            seconds_since: None,
            is_stale: true,
        }
    }

    /// Classify a stored heartbeat against `now`. Within the threshold the
    /// writer's own status is kept; past it the record degrades to `Down`.
    pub fn from_record(
        record: &ServiceHeartbeat,
        now: DateTime<Utc>,
        stale_threshold_seconds: u32,
    ) -> Self {
        let age = now
            .signed_duration_since(record.last_heartbeat_ts)
            .num_milliseconds() as f64
            / 1000.0;
        let age = age.max(0.0);
        let is_stale = age > stale_threshold_seconds as f64;
        Self {
            service_id: record.service_id.clone(),
            last_heartbeat: Some(record.last_heartbeat_ts),
            status: if is_stale {
                HeartbeatStatus::Down
            } else {
                record.status
            },
            seconds_since: Some(age),
            is_stale,
        }
    }
}
