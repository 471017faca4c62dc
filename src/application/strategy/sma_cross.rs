use super::{IntentDraft, Strategy};
use crate::domain::intent::IntentSide;
use crate::domain::market::Candle;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::VecDeque;
use tracing::debug;

/// Dual simple-moving-average crossover evaluator.
///
/// Emits a BUY draft when the fast SMA crosses above the slow SMA beyond
/// the threshold, and an EXIT draft on the cross back down while holding.
pub struct SmaCrossStrategy {
    fast_period: usize,
    slow_period: usize,
    threshold: Decimal,
    closes: VecDeque<Decimal>,
    holding: bool,
}

impl SmaCrossStrategy {
    pub fn new(fast_period: usize, slow_period: usize, threshold: Decimal) -> Self {
        Self {
            fast_period,
            slow_period,
            threshold,
            closes: VecDeque::with_capacity(slow_period + 1),
            holding: false,
        }
    }

    fn sma(&self, period: usize) -> Option<Decimal> {
        if self.closes.len() < period {
            return None;
        }
        let sum: Decimal = self.closes.iter().rev().take(period).copied().sum();
        Some(sum / Decimal::from(period as u64))
    }
}

impl Strategy for SmaCrossStrategy {
    fn name(&self) -> &str {
        "sma_cross"
    }

    fn version(&self) -> Option<&str> {
        Some("1.0.0")
    }

    fn on_candle(&mut self, candle: &Candle) -> Option<IntentDraft> {
        if !candle.is_final {
            return None;
        }
        if self.closes.len() == self.slow_period {
            self.closes.pop_front();
        }
        self.closes.push_back(candle.close);

        let fast = self.sma(self.fast_period)?;
        let slow = self.sma(self.slow_period)?;

        let mut indicators = serde_json::Map::new();
        indicators.insert("sma_fast".into(), fast.to_f64().unwrap_or(0.0).into());
        indicators.insert("sma_slow".into(), slow.to_f64().unwrap_or(0.0).into());

        if !self.holding && fast > slow * (Decimal::ONE + self.threshold) {
            debug!(
                "SmaCross [{}]: golden cross (fast={fast}, slow={slow})",
                candle.symbol
            );
            self.holding = true;
            let mut draft = IntentDraft::directional(
                &candle.symbol,
                IntentSide::Buy,
                &format!("Golden cross (fast={fast:.2} > slow={slow:.2})"),
            );
            draft.indicators = indicators;
            return Some(draft);
        }

        if self.holding && fast < slow * (Decimal::ONE - self.threshold) {
            debug!(
                "SmaCross [{}]: death cross (fast={fast}, slow={slow})",
                candle.symbol
            );
            self.holding = false;
            let mut draft = IntentDraft::exit(
                &candle.symbol,
                IntentSide::Sell,
                &format!("Death cross (fast={fast:.2} < slow={slow:.2})"),
            );
            draft.indicators = indicators;
            return Some(draft);
        }

        None
    }
}
