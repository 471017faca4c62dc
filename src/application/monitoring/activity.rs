use chrono::{DateTime, Utc};
use std::sync::RwLock;

/// Process-wide marketdata freshness marker.
///
/// The ingest pipeline marks every accepted tick; the readiness evaluator
/// reads the timestamp to decide whether the process is safe to run. Single
/// writer, many readers.
#[derive(Debug, Default)]
pub struct MarketDataActivity {
    last_ts: RwLock<Option<DateTime<Utc>>>,
}

impl MarketDataActivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, ts: DateTime<Utc>) {
        let mut guard = self.last_ts.write().expect("activity lock poisoned");
        // Keep the marker monotonic even if a late tick is marked.
        if guard.map(|prev| ts > prev).unwrap_or(true) {
            *guard = Some(ts);
        }
    }

    pub fn last(&self) -> Option<DateTime<Utc>> {
        *self.last_ts.read().expect("activity lock poisoned")
    }

    pub fn age_seconds(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last().map(|ts| {
            (now.signed_duration_since(ts).num_milliseconds() as f64 / 1000.0).max(0.0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_starts_empty() {
        let activity = MarketDataActivity::new();
        assert!(activity.last().is_none());
        assert!(activity.age_seconds(Utc::now()).is_none());
    }

    #[test]
    fn test_mark_is_monotonic() {
        let activity = MarketDataActivity::new();
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap();
        activity.mark(now);
        activity.mark(now - Duration::seconds(10));
        assert_eq!(activity.last(), Some(now));
    }

    #[test]
    fn test_age_computed_from_now() {
        let activity = MarketDataActivity::new();
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap();
        activity.mark(now - Duration::seconds(7));
        assert_eq!(activity.age_seconds(now), Some(7.0));
    }
}
