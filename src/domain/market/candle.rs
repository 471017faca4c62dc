use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An aggregated OHLCV candle for one `(symbol, timeframe)` bucket.
///
/// `is_final` marks the authoritative emission for the bucket; a late tick
/// inside the lateness window can cause one more final emission, and the
/// latest final always wins downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub timeframe: String,
    pub ts_start_utc: DateTime<Utc>,
    pub ts_end_utc: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vwap: Option<Decimal>,
    pub trade_count: u64,
    pub is_final: bool,
}

impl Candle {
    /// Serialize as one NDJSON line (no trailing newline).
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn sample() -> Candle {
        Candle {
            symbol: "SPY".to_string(),
            timeframe: "1m".to_string(),
            ts_start_utc: Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap(),
            ts_end_utc: Utc.with_ymd_and_hms(2024, 1, 2, 14, 31, 0).unwrap(),
            open: dec!(475.00),
            high: dec!(475.45),
            low: dec!(474.90),
            close: dec!(475.30),
            volume: dec!(1250),
            vwap: Some(dec!(475.18)),
            trade_count: 37,
            is_final: true,
        }
    }

    #[test]
    fn test_ndjson_round_trip_is_lossless() {
        let candle = sample();
        let line = candle.to_json_line().unwrap();
        let back = Candle::from_json_line(&line).unwrap();
        assert_eq!(back, candle);
    }

    #[test]
    fn test_missing_vwap_omitted_from_wire() {
        let mut candle = sample();
        candle.vwap = None;
        let line = candle.to_json_line().unwrap();
        assert!(!line.contains("vwap"));
        let back = Candle::from_json_line(&line).unwrap();
        assert_eq!(back, candle);
    }
}
