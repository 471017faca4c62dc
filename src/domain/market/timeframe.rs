use crate::domain::errors::MarketDataError;
use chrono::{DateTime, Datelike, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Unit of a candle timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeframeUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl TimeframeUnit {
    fn token(&self) -> &'static str {
        match self {
            TimeframeUnit::Second => "s",
            TimeframeUnit::Minute => "m",
            TimeframeUnit::Hour => "h",
            TimeframeUnit::Day => "d",
            TimeframeUnit::Week => "w",
            TimeframeUnit::Month => "mo",
        }
    }

    fn allowed_steps(&self) -> &'static [u32] {
        match self {
            TimeframeUnit::Second => &[1, 5, 10, 15, 30],
            TimeframeUnit::Minute => &[1, 2, 3, 4, 5, 10, 15, 20, 30, 45],
            TimeframeUnit::Hour => &[1, 2, 3, 4],
            TimeframeUnit::Day | TimeframeUnit::Week | TimeframeUnit::Month => &[1],
        }
    }
}

/// Normalized candle timeframe: a `(unit, step)` pair with a restricted step set.
///
/// Canonical text values: `1s`..`30s`, `1m`..`45m`, `1h`..`4h`, `1d`, `1w`, `1mo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timeframe {
    unit: TimeframeUnit,
    step: u32,
}

impl Timeframe {
    pub fn new(unit: TimeframeUnit, step: u32) -> Result<Self, MarketDataError> {
        if !unit.allowed_steps().contains(&step) {
            return Err(MarketDataError::InvalidTimeframe {
                value: format!("{}{}", step, unit.token()),
            });
        }
        Ok(Self { unit, step })
    }

    pub fn unit(&self) -> TimeframeUnit {
        self.unit
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    /// Canonical text form, matching the persisted representation.
    pub fn text(&self) -> String {
        format!("{}{}", self.step, self.unit.token())
    }

    pub fn is_intraday(&self) -> bool {
        matches!(
            self.unit,
            TimeframeUnit::Second | TimeframeUnit::Minute | TimeframeUnit::Hour
        )
    }

    /// Fixed duration in seconds. Only defined for intraday timeframes;
    /// day/week/month have variable duration across DST and month ends.
    pub fn seconds(&self) -> Option<i64> {
        let step = self.step as i64;
        match self.unit {
            TimeframeUnit::Second => Some(step),
            TimeframeUnit::Minute => Some(step * 60),
            TimeframeUnit::Hour => Some(step * 3600),
            _ => None,
        }
    }

    /// Compute the half-open bucket `[start, end)` containing `ts`.
    ///
    /// Intraday buckets floor on the UTC epoch. Day/week/month buckets align
    /// in `market_tz` and are converted back to UTC. `session_daily` shifts
    /// daily boundaries to the 09:30 local session open; timestamps before
    /// 09:30 belong to the previous session day.
    pub fn bucket_range_utc(
        &self,
        ts: DateTime<Utc>,
        market_tz: Tz,
        session_daily: bool,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), MarketDataError> {
        if let Some(sec) = self.seconds() {
            let epoch = ts.timestamp();
            let start_epoch = epoch - epoch.rem_euclid(sec);
            let start = Utc
                .timestamp_opt(start_epoch, 0)
                .single()
                .ok_or_else(|| bad_ts(ts))?;
            return Ok((start, start + Duration::seconds(sec)));
        }

        let local = ts.with_timezone(&market_tz).naive_local();
        let date = local.date();

        let (start_naive, end_naive) = match self.unit {
            TimeframeUnit::Day => {
                if session_daily {
                    let session_open = hms(date, 9, 30)?;
                    let start_date = if local < session_open {
                        date.pred_opt().ok_or_else(|| bad_ts(ts))?
                    } else {
                        date
                    };
                    let end_date = start_date.succ_opt().ok_or_else(|| bad_ts(ts))?;
                    (hms(start_date, 9, 30)?, hms(end_date, 9, 30)?)
                } else {
                    let end_date = date.succ_opt().ok_or_else(|| bad_ts(ts))?;
                    (hms(date, 0, 0)?, hms(end_date, 0, 0)?)
                }
            }
            TimeframeUnit::Week => {
                let monday = date
                    .checked_sub_days(chrono::Days::new(
                        date.weekday().num_days_from_monday() as u64
                    ))
                    .ok_or_else(|| bad_ts(ts))?;
                let next = monday
                    .checked_add_days(chrono::Days::new(7))
                    .ok_or_else(|| bad_ts(ts))?;
                (hms(monday, 0, 0)?, hms(next, 0, 0)?)
            }
            TimeframeUnit::Month => {
                let first = date.with_day(1).ok_or_else(|| bad_ts(ts))?;
                let next = if first.month() == 12 {
                    first
                        .with_year(first.year() + 1)
                        .and_then(|d| d.with_month(1))
                } else {
                    first.with_month(first.month() + 1)
                }
                .ok_or_else(|| bad_ts(ts))?;
                (hms(first, 0, 0)?, hms(next, 0, 0)?)
            }
            _ => unreachable!("intraday handled above"),
        };

        Ok((
            local_to_utc(market_tz, start_naive)?,
            local_to_utc(market_tz, end_naive)?,
        ))
    }
}

fn bad_ts(ts: DateTime<Utc>) -> MarketDataError {
    MarketDataError::InvalidTimestamp {
        value: ts.to_rfc3339(),
    }
}

fn hms(date: chrono::NaiveDate, h: u32, m: u32) -> Result<NaiveDateTime, MarketDataError> {
    date.and_hms_opt(h, m, 0)
        .ok_or(MarketDataError::InvalidTimestamp {
            value: format!("{date} {h:02}:{m:02}"),
        })
}

fn local_to_utc(tz: Tz, naive: NaiveDateTime) -> Result<DateTime<Utc>, MarketDataError> {
    // `earliest` resolves DST folds and gaps deterministically.
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or(MarketDataError::InvalidTimestamp {
            value: naive.to_string(),
        })
}

impl FromStr for Timeframe {
    type Err = MarketDataError;

    /// Parse timeframe strings like `15s`, `1m`, `2h`, `1d`, `1w`, `1mo`.
    /// Also accepts TradingView-style shorthands `D`, `W`, `M` and unit
    /// longhands (`5 minutes`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let err = || MarketDataError::InvalidTimeframe {
            value: s.to_string(),
        };
        if raw.is_empty() {
            return Err(err());
        }

        match raw {
            "D" => return Timeframe::new(TimeframeUnit::Day, 1),
            "W" => return Timeframe::new(TimeframeUnit::Week, 1),
            "M" => return Timeframe::new(TimeframeUnit::Month, 1),
            _ => {}
        }

        let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
        let rest = raw[digits.len()..].trim().to_ascii_lowercase();
        let step: u32 = if digits.is_empty() {
            1
        } else {
            digits.parse().map_err(|_| err())?
        };

        let unit = match rest.as_str() {
            "s" | "sec" | "secs" | "second" | "seconds" => TimeframeUnit::Second,
            "m" | "min" | "mins" | "minute" | "minutes" => TimeframeUnit::Minute,
            "h" | "hr" | "hrs" | "hour" | "hours" => TimeframeUnit::Hour,
            "d" | "day" | "days" => TimeframeUnit::Day,
            "w" | "wk" | "wks" | "week" | "weeks" => TimeframeUnit::Week,
            "mo" | "mon" | "mons" | "month" | "months" | "mth" | "mths" => TimeframeUnit::Month,
            _ => return Err(err()),
        };

        Timeframe::new(unit, step)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text())
    }
}

impl Serialize for Timeframe {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.text())
    }
}

impl<'de> Deserialize<'de> for Timeframe {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse a list of timeframe strings into validated timeframes.
pub fn parse_timeframes<I, S>(values: I) -> Result<Vec<Timeframe>, MarketDataError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values.into_iter().map(|v| v.as_ref().parse()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_parse_canonical_and_shorthand() {
        assert_eq!("1m".parse::<Timeframe>().unwrap().text(), "1m");
        assert_eq!("15s".parse::<Timeframe>().unwrap().text(), "15s");
        assert_eq!("4h".parse::<Timeframe>().unwrap().text(), "4h");
        assert_eq!("D".parse::<Timeframe>().unwrap().text(), "1d");
        assert_eq!("W".parse::<Timeframe>().unwrap().text(), "1w");
        assert_eq!("M".parse::<Timeframe>().unwrap().text(), "1mo");
        assert_eq!("5 minutes".parse::<Timeframe>().unwrap().text(), "5m");
    }

    #[test]
    fn test_parse_rejects_unsupported_steps() {
        assert!("7m".parse::<Timeframe>().is_err());
        assert!("2d".parse::<Timeframe>().is_err());
        assert!("0m".parse::<Timeframe>().is_err());
        assert!("".parse::<Timeframe>().is_err());
        assert!("xyz".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_intraday_buckets_floor_in_utc() {
        let tf: Timeframe = "5m".parse().unwrap();
        let ts = utc(2024, 1, 1, 0, 7, 13);
        let (start, end) = tf.bucket_range_utc(ts, New_York, false).unwrap();
        assert_eq!(start, utc(2024, 1, 1, 0, 5, 0));
        assert_eq!(end, utc(2024, 1, 1, 0, 10, 0));
    }

    #[test]
    fn test_daily_bucket_aligns_to_market_tz() {
        let tf: Timeframe = "1d".parse().unwrap();
        // 2024-01-02 01:00 UTC is 2024-01-01 20:00 in New York.
        let ts = utc(2024, 1, 2, 1, 0, 0);
        let (start, end) = tf.bucket_range_utc(ts, New_York, false).unwrap();
        // NY midnight 2024-01-01 == 05:00 UTC (EST).
        assert_eq!(start, utc(2024, 1, 1, 5, 0, 0));
        assert_eq!(end, utc(2024, 1, 2, 5, 0, 0));
    }

    #[test]
    fn test_session_daily_shifts_to_rth_open() {
        let tf: Timeframe = "1d".parse().unwrap();
        // 15:00 UTC == 10:00 NY (EST): inside the 2024-01-02 session.
        let (start, _) = tf
            .bucket_range_utc(utc(2024, 1, 2, 15, 0, 0), New_York, true)
            .unwrap();
        assert_eq!(start, utc(2024, 1, 2, 14, 30, 0)); // 09:30 NY

        // 13:00 UTC == 08:00 NY: before the open, belongs to the previous session.
        let (start, _) = tf
            .bucket_range_utc(utc(2024, 1, 2, 13, 0, 0), New_York, true)
            .unwrap();
        assert_eq!(start, utc(2024, 1, 1, 14, 30, 0));
    }

    #[test]
    fn test_weekly_bucket_starts_monday_local() {
        let tf: Timeframe = "1w".parse().unwrap();
        // Wednesday 2024-01-03.
        let (start, end) = tf
            .bucket_range_utc(utc(2024, 1, 3, 18, 0, 0), New_York, false)
            .unwrap();
        assert_eq!(start, utc(2024, 1, 1, 5, 0, 0)); // Monday 00:00 NY
        assert_eq!(end, utc(2024, 1, 8, 5, 0, 0));
    }

    #[test]
    fn test_monthly_bucket_year_rollover() {
        let tf: Timeframe = "1mo".parse().unwrap();
        let (start, end) = tf
            .bucket_range_utc(utc(2024, 12, 15, 12, 0, 0), New_York, false)
            .unwrap();
        assert_eq!(start, utc(2024, 12, 1, 5, 0, 0));
        assert_eq!(end, utc(2025, 1, 1, 5, 0, 0));
    }

    #[test]
    fn test_serde_round_trip() {
        let tf: Timeframe = "15m".parse().unwrap();
        let json = serde_json::to_string(&tf).unwrap();
        assert_eq!(json, "\"15m\"");
        let back: Timeframe = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tf);
    }
}
