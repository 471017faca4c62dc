//! Sliding-window anomaly rejection and price clamping for raw tick streams.
//!
//! Bad prints (fat fingers, crossed feeds) are rejected against a rolling
//! median; a sustained run of "outliers" means the market actually moved,
//! so the filter reanchors instead of dropping forever.

use rust_decimal::Decimal;
use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Accept,
    Drop,
    /// The window was reset onto the new price level after `confirm`
    /// consecutive out-of-band ticks.
    Reanchor,
}

#[derive(Debug, Clone)]
pub struct TickFilterConfig {
    pub window: usize,
    /// Maximum |price - median| / median before a tick is suspect.
    pub max_deviation_pct: Decimal,
    /// Consecutive suspect ticks required before reanchoring.
    pub confirm: usize,
}

impl Default for TickFilterConfig {
    fn default() -> Self {
        Self {
            window: 50,
            max_deviation_pct: Decimal::new(5, 2), // 5%
            confirm: 3,
        }
    }
}

pub struct TickFilter {
    config: TickFilterConfig,
    window: VecDeque<Decimal>,
    outlier_run: usize,
}

impl TickFilter {
    pub fn new(config: TickFilterConfig) -> Self {
        Self {
            window: VecDeque::with_capacity(config.window),
            config,
            outlier_run: 0,
        }
    }

    fn rolling_median(&self) -> Option<Decimal> {
        if self.window.is_empty() {
            return None;
        }
        let mut sorted: Vec<Decimal> = self.window.iter().copied().collect();
        sorted.sort();
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 1 {
            Some(sorted[mid])
        } else {
            Some((sorted[mid - 1] + sorted[mid]) / Decimal::TWO)
        }
    }

    fn push(&mut self, price: Decimal) {
        if self.window.len() == self.config.window {
            self.window.pop_front();
        }
        self.window.push_back(price);
    }

    /// Judge one price against the rolling median.
    pub fn accept(&mut self, price: Decimal) -> FilterDecision {
        let Some(median) = self.rolling_median() else {
            self.push(price);
            return FilterDecision::Accept;
        };
        if median <= Decimal::ZERO {
            self.push(price);
            return FilterDecision::Accept;
        }

        let deviation = (price - median).abs() / median;
        if deviation <= self.config.max_deviation_pct {
            self.outlier_run = 0;
            self.push(price);
            return FilterDecision::Accept;
        }

        self.outlier_run += 1;
        if self.outlier_run > self.config.confirm {
            debug!(
                "tick filter reanchoring after {} out-of-band ticks (median={median}, price={price})",
                self.outlier_run
            );
            self.window.clear();
            self.push(price);
            self.outlier_run = 0;
            return FilterDecision::Reanchor;
        }
        FilterDecision::Drop
    }
}

/// Clamp a price into `[last * (1 - pct), last * (1 + pct)]` around the last
/// accepted tick, applied before feeding the candle builders.
pub struct PriceClamp {
    pct: Decimal,
    last: Option<Decimal>,
}

impl PriceClamp {
    pub fn new(pct: Decimal) -> Self {
        Self { pct, last: None }
    }

    pub fn clamp(&mut self, price: Decimal) -> Decimal {
        let clamped = match self.last {
            Some(last) if last > Decimal::ZERO => {
                let lo = last * (Decimal::ONE - self.pct);
                let hi = last * (Decimal::ONE + self.pct);
                price.clamp(lo, hi)
            }
            _ => price,
        };
        self.last = Some(clamped);
        clamped
    }
}
