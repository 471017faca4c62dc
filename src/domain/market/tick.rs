use crate::domain::errors::MarketDataError;
use crate::domain::time::parse_timestamp_value;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// A single trade print from the broker stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub ts_utc: DateTime<Utc>,
    pub price: Decimal,
    pub size: Decimal,
}

impl Tick {
    pub fn new(
        symbol: &str,
        ts_utc: DateTime<Utc>,
        price: Decimal,
        size: Decimal,
    ) -> Result<Self, MarketDataError> {
        let sym = symbol.trim().to_uppercase();
        if sym.is_empty() {
            return Err(MarketDataError::MissingField {
                field: "symbol".to_string(),
            });
        }
        if price <= Decimal::ZERO {
            return Err(MarketDataError::InvalidPrice {
                symbol: sym,
                price: price.to_string(),
            });
        }
        if size < Decimal::ZERO {
            return Err(MarketDataError::NegativeSize {
                symbol: sym,
                size: size.to_string(),
            });
        }
        Ok(Self {
            symbol: sym,
            ts_utc,
            price,
            size,
        })
    }

    /// Parse a trade-like JSON event, accepting the field aliases seen on
    /// broker feeds: `symbol`/`sym`/`S`, `timestamp`/`t`/`ts`/`time`,
    /// `price`/`p`, `size`/`s`/`qty`/`q`.
    pub fn from_event(event: &Value) -> Result<Self, MarketDataError> {
        let obj = event
            .as_object()
            .ok_or_else(|| MarketDataError::MissingField {
                field: "object".to_string(),
            })?;

        let symbol = field(obj, &["symbol", "sym", "S"])
            .and_then(Value::as_str)
            .ok_or_else(|| MarketDataError::MissingField {
                field: "symbol".to_string(),
            })?;

        let ts_raw = field(obj, &["timestamp", "t", "ts", "time"]).ok_or_else(|| {
            MarketDataError::MissingField {
                field: "timestamp".to_string(),
            }
        })?;
        let ts_utc = parse_timestamp_value(ts_raw)?;

        let price = decimal_field(obj, &["price", "p"], symbol)?;
        let size = decimal_field(obj, &["size", "s", "qty", "q"], symbol)?;

        Tick::new(symbol, ts_utc, price, size)
    }
}

fn field<'a>(
    obj: &'a serde_json::Map<String, Value>,
    names: &[&str],
) -> Option<&'a Value> {
    for n in names {
        if let Some(v) = obj.get(*n) {
            return Some(v);
        }
    }
    // Case-insensitive fallback for common keys.
    for n in names {
        if let Some((_, v)) = obj.iter().find(|(k, _)| k.eq_ignore_ascii_case(n)) {
            return Some(v);
        }
    }
    None
}

fn decimal_field(
    obj: &serde_json::Map<String, Value>,
    names: &[&str],
    symbol: &str,
) -> Result<Decimal, MarketDataError> {
    let v = field(obj, names).ok_or_else(|| MarketDataError::MissingField {
        field: names[0].to_string(),
    })?;
    // Decimal is constructed from the textual form, never through a float.
    let text = match v {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => String::new(),
    };
    Decimal::from_str(&text).map_err(|_| MarketDataError::InvalidPrice {
        symbol: symbol.to_string(),
        price: v.to_string(),
    })
}
