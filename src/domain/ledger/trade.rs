use crate::domain::errors::LedgerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Immutable, append-only ledger entry representing a fill.
///
/// `fees` and `slippage` are positive USD costs. `qty` is positive;
/// direction is expressed via `side`. The execution collaborator owns these
/// records; the core only reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTrade {
    pub tenant_id: String,
    pub uid: String,
    pub strategy_id: String,
    pub run_id: String,
    pub symbol: String,

    pub side: Side,
    pub qty: Decimal,
    pub price: Decimal,
    pub ts: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker_fill_id: Option<String>,

    #[serde(default)]
    pub fees: Decimal,
    #[serde(default)]
    pub slippage: Decimal,

    /// Explicit contract multiplier. When absent, OCC option symbols infer
    /// 100 and everything else uses 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<Decimal>,
}

impl LedgerTrade {
    pub fn validate(&self) -> Result<(), LedgerError> {
        for (field, value) in [
            ("tenant_id", &self.tenant_id),
            ("uid", &self.uid),
            ("strategy_id", &self.strategy_id),
            ("run_id", &self.run_id),
            ("symbol", &self.symbol),
        ] {
            if value.trim().is_empty() {
                return Err(LedgerError::MissingField { field });
            }
        }
        if self.qty <= Decimal::ZERO {
            return Err(LedgerError::NonPositive {
                field: "qty",
                value: self.qty.to_string(),
            });
        }
        if self.price <= Decimal::ZERO {
            return Err(LedgerError::NonPositive {
                field: "price",
                value: self.price.to_string(),
            });
        }
        if self.fees < Decimal::ZERO {
            return Err(LedgerError::Negative {
                field: "fees",
                value: self.fees.to_string(),
            });
        }
        if self.slippage < Decimal::ZERO {
            return Err(LedgerError::Negative {
                field: "slippage",
                value: self.slippage.to_string(),
            });
        }
        if let Some(m) = self.multiplier {
            if m <= Decimal::ZERO {
                return Err(LedgerError::NonPositive {
                    field: "multiplier",
                    value: m.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Uppercased symbol as used for grouping and store paths.
    pub fn normalized_symbol(&self) -> String {
        self.symbol.trim().to_uppercase()
    }
}
