pub mod driver;
pub mod sma_cross;

pub use driver::{PortfolioView, StrategyDriver, StrategyDriverConfig};
pub use sma_cross::SmaCrossStrategy;

use crate::domain::intent::{IntentKind, IntentOrderType, IntentSide};
use crate::domain::market::Candle;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

/// Capital-free strategy output. The driver turns this into an
/// `AgentIntent`; nothing here can carry a quantity.
#[derive(Debug, Clone)]
pub struct IntentDraft {
    pub symbol: String,
    pub side: IntentSide,
    pub kind: IntentKind,
    pub confidence: Option<f64>,
    pub short_reason: String,
    pub indicators: Map<String, Value>,
    pub order_type: IntentOrderType,
    pub limit_price: Option<Decimal>,
    pub delta_to_hedge: Option<f64>,
}

impl IntentDraft {
    pub fn directional(symbol: &str, side: IntentSide, short_reason: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            kind: IntentKind::Directional,
            confidence: None,
            short_reason: short_reason.to_string(),
            indicators: Map::new(),
            order_type: IntentOrderType::Market,
            limit_price: None,
            delta_to_hedge: None,
        }
    }

    pub fn exit(symbol: &str, side: IntentSide, short_reason: &str) -> Self {
        Self {
            kind: IntentKind::Exit,
            ..Self::directional(symbol, side, short_reason)
        }
    }
}

/// A strategy evaluator fed final candles by the driver.
pub trait Strategy: Send {
    fn name(&self) -> &str;

    fn version(&self) -> Option<&str> {
        None
    }

    /// Evaluate one final candle; `None` means no trade this cycle.
    fn on_candle(&mut self, candle: &Candle) -> Option<IntentDraft>;
}
