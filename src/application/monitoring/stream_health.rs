use std::time::{Duration, Instant};
use tracing::debug;

/// Monitor for detecting silent (zombie) data streams.
///
/// A websocket can stay connected while the upstream stops sending; the
/// ingest supervisor uses this to force a reconnect.
pub struct StreamHealthMonitor {
    last_event_received_at: Instant,
    silence_threshold: Duration,
    name: String,
}

impl StreamHealthMonitor {
    pub fn new(name: &str, silence_threshold: Duration) -> Self {
        Self {
            last_event_received_at: Instant::now(),
            silence_threshold,
            name: name.to_string(),
        }
    }

    pub fn record_event(&mut self) {
        self.last_event_received_at = Instant::now();
    }

    /// True while events keep arriving within the silence threshold.
    pub fn is_healthy(&self) -> bool {
        let elapsed = self.last_event_received_at.elapsed();
        if elapsed > self.silence_threshold {
            debug!(
                "StreamHealthMonitor[{}]: silent for {:?} (threshold {:?})",
                self.name, elapsed, self.silence_threshold
            );
            return false;
        }
        true
    }

    pub fn last_event_elapsed(&self) -> Duration {
        self.last_event_received_at.elapsed()
    }
}
