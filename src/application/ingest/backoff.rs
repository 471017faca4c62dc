use rand::Rng;
use std::time::Duration;

/// Exponential backoff with full jitter.
///
/// The sleep for attempt `n` is drawn uniformly from
/// `[0, min(max, base * factor^(n-1))]`, which spreads reconnect storms
/// across the fleet.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_seconds: f64,
    max_seconds: f64,
    factor: f64,
    attempt: u32,
}

impl Backoff {
    pub fn new(base_seconds: f64, max_seconds: f64) -> Self {
        Self {
            base_seconds,
            max_seconds,
            factor: 2.0,
            attempt: 0,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Reset after the connection proves healthy (first event received).
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Cap for the next sleep, without consuming an attempt.
    pub fn next_cap(&self) -> f64 {
        self.max_seconds
            .min(self.base_seconds * self.factor.powi(self.attempt as i32))
    }

    pub fn next_sleep(&mut self) -> Duration {
        let cap = self.next_cap();
        self.attempt += 1;
        let jittered = rand::rng().random_range(0.0..=cap.max(f64::EPSILON));
        Duration::from_secs_f64(jittered)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(1.0, 60.0)
    }
}
