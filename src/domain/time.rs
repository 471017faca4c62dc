//! Canonical UTC timestamp handling.
//!
//! Every timestamp that enters the system is normalized to `DateTime<Utc>`
//! here, regardless of whether the upstream sent RFC 3339 text or a raw
//! epoch number.

use crate::domain::errors::MarketDataError;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Parse an RFC 3339 timestamp string into UTC.
///
/// Accepts both `Z` and explicit offsets. Naive strings are rejected; broker
/// feeds always carry an offset.
pub fn parse_rfc3339_utc(s: &str) -> Result<DateTime<Utc>, MarketDataError> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| MarketDataError::InvalidTimestamp {
            value: s.to_string(),
        })
}

/// Parse an epoch number into UTC, inferring the resolution from magnitude.
///
/// Ranges: seconds < 1e11, milliseconds < 1e14, microseconds < 1e17,
/// nanoseconds otherwise. Broker feeds mix all four.
pub fn parse_epoch_utc(raw: i64) -> Result<DateTime<Utc>, MarketDataError> {
    let dt = if raw.abs() < 100_000_000_000 {
        Utc.timestamp_opt(raw, 0).single()
    } else if raw.abs() < 100_000_000_000_000 {
        Utc.timestamp_millis_opt(raw).single()
    } else if raw.abs() < 100_000_000_000_000_000 {
        Utc.timestamp_micros(raw).single()
    } else {
        Some(Utc.timestamp_nanos(raw))
    };
    dt.ok_or(MarketDataError::InvalidTimestamp {
        value: raw.to_string(),
    })
}

/// Parse a JSON timestamp field (string or number) into UTC.
pub fn parse_timestamp_value(v: &Value) -> Result<DateTime<Utc>, MarketDataError> {
    match v {
        Value::String(s) => parse_rfc3339_utc(s),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                parse_epoch_utc(i)
            } else if let Some(f) = n.as_f64() {
                // Fractional epoch seconds (e.g. 1704067200.5).
                Utc.timestamp_millis_opt((f * 1000.0) as i64)
                    .single()
                    .ok_or(MarketDataError::InvalidTimestamp {
                        value: n.to_string(),
                    })
            } else {
                Err(MarketDataError::InvalidTimestamp {
                    value: n.to_string(),
                })
            }
        }
        other => Err(MarketDataError::InvalidTimestamp {
            value: other.to_string(),
        }),
    }
}

/// UTC midnight of the day containing `ts`.
pub fn utc_midnight(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time")
        .and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_rfc3339_variants() {
        let a = parse_rfc3339_utc("2024-01-01T00:00:00Z").unwrap();
        let b = parse_rfc3339_utc("2024-01-01T01:00:00+01:00").unwrap();
        assert_eq!(a, b);
        assert!(parse_rfc3339_utc("not-a-time").is_err());
    }

    #[test]
    fn test_parse_epoch_resolutions() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_epoch_utc(1_704_067_200).unwrap(), expected);
        assert_eq!(parse_epoch_utc(1_704_067_200_000).unwrap(), expected);
        assert_eq!(parse_epoch_utc(1_704_067_200_000_000).unwrap(), expected);
        assert_eq!(parse_epoch_utc(1_704_067_200_000_000_000).unwrap(), expected);
    }

    #[test]
    fn test_parse_timestamp_value() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            parse_timestamp_value(&json!("2024-01-01T00:00:00Z")).unwrap(),
            expected
        );
        assert_eq!(
            parse_timestamp_value(&json!(1_704_067_200_000i64)).unwrap(),
            expected
        );
        assert!(parse_timestamp_value(&json!(null)).is_err());
        assert!(parse_timestamp_value(&json!({"ts": 1})).is_err());
    }

    #[test]
    fn test_utc_midnight() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 59).unwrap();
        let midnight = utc_midnight(ts);
        assert_eq!(midnight, Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap());
    }
}
