//! End-to-end candle aggregation scenarios: rollover finalization, bounded
//! lateness, and the OHLCV invariants.

use agenttrader::application::market_data::{AggregatorConfig, CandleAggregator};
use agenttrader::domain::market::{Candle, Tick};
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn tick(h: u32, m: u32, s: u32, price: Decimal, size: Decimal) -> Tick {
    Tick::new(
        "SPY",
        Utc.with_ymd_and_hms(2024, 1, 2, h, m, s).unwrap(),
        price,
        size,
    )
    .unwrap()
}

fn one_minute(lateness: u32) -> CandleAggregator {
    CandleAggregator::new(
        vec!["1m".parse().unwrap()],
        AggregatorConfig {
            lateness_seconds: lateness,
            emit_updates: false,
            ..AggregatorConfig::default()
        },
    )
}

/// Ticks at 09:30:05, 09:30:59, then 09:31:03 close the 09:30 bucket.
#[test]
fn candle_rollover_finalizes_previous_bucket() {
    let mut agg = one_minute(2);

    assert!(agg.ingest(&tick(9, 30, 5, dec!(100), dec!(10))).is_empty());
    assert!(agg.ingest(&tick(9, 30, 59, dec!(101), dec!(5))).is_empty());
    let emitted = agg.ingest(&tick(9, 31, 3, dec!(102), dec!(1)));

    assert_eq!(emitted.len(), 1);
    let candle = &emitted[0];
    assert!(candle.is_final);
    assert_eq!(
        candle.ts_start_utc,
        Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap()
    );
    assert_eq!(
        candle.ts_end_utc,
        Utc.with_ymd_and_hms(2024, 1, 2, 9, 31, 0).unwrap()
    );
    assert_eq!(candle.open, dec!(100));
    assert_eq!(candle.high, dec!(101));
    assert_eq!(candle.low, dec!(100));
    assert_eq!(candle.close, dec!(101));
    assert_eq!(candle.volume, dec!(15));

    // The 09:31 bucket stays open: flushing at 09:31:30 with lateness 2
    // does not close it.
    let flushed = agg.flush(Utc.with_ymd_and_hms(2024, 1, 2, 9, 31, 30).unwrap());
    assert!(flushed.is_empty());
}

/// A late tick within the lateness window corrects the closed candle;
/// beyond the window it is dropped and counted.
#[test]
fn late_tick_within_tolerance_corrects_final() {
    let mut agg = one_minute(5);
    agg.ingest(&tick(9, 30, 5, dec!(100), dec!(10)));
    agg.ingest(&tick(9, 30, 59, dec!(101), dec!(5)));
    agg.ingest(&tick(9, 31, 3, dec!(102), dec!(1)));

    // Watermark 09:31:03, lateness 5s: 09:30:58 is tolerated.
    let emitted = agg.ingest(&tick(9, 30, 58, dec!(99), dec!(2)));
    assert_eq!(emitted.len(), 1);
    let corrected = &emitted[0];
    assert!(corrected.is_final);
    assert_eq!(corrected.low, dec!(99));
    assert_eq!(corrected.volume, dec!(17));
}

#[test]
fn late_tick_beyond_tolerance_is_dropped() {
    let mut agg = one_minute(2);
    agg.ingest(&tick(9, 30, 5, dec!(100), dec!(10)));
    agg.ingest(&tick(9, 30, 59, dec!(101), dec!(5)));
    agg.ingest(&tick(9, 31, 3, dec!(102), dec!(1)));

    let snapshot_before = agg.ops_snapshot();
    let emitted = agg.ingest(&tick(9, 30, 58, dec!(99), dec!(2)));

    assert!(emitted.is_empty());
    let snapshot = agg.ops_snapshot();
    assert_eq!(snapshot.counters.late_events_dropped, 1);
    assert_eq!(
        snapshot.active_candle_states,
        snapshot_before.active_candle_states
    );

    // The dropped tick never reappears: closing the 09:31 bucket shows no
    // trace of it.
    let finals = agg.flush(Utc.with_ymd_and_hms(2024, 1, 2, 9, 35, 0).unwrap());
    assert!(finals.iter().all(|c| c.low >= dec!(100)));
}

/// For in-order ticks within one bucket the final candle is
/// exactly first/max/min/last/sum, and vwap is the size-weighted mean.
#[test]
fn final_candle_satisfies_ohlcv_invariants() {
    let mut agg = one_minute(2);
    let prices_sizes: Vec<(Decimal, Decimal)> = vec![
        (dec!(100.10), dec!(5)),
        (dec!(100.60), dec!(3)),
        (dec!(99.80), dec!(7)),
        (dec!(100.20), dec!(2)),
    ];
    for (i, (p, s)) in prices_sizes.iter().enumerate() {
        agg.ingest(&tick(9, 30, 1 + i as u32, *p, *s));
    }
    let finals = agg.flush(Utc.with_ymd_and_hms(2024, 1, 2, 9, 35, 0).unwrap());
    assert_eq!(finals.len(), 1);
    let c = &finals[0];

    let pv: Decimal = prices_sizes.iter().map(|(p, s)| p * s).sum();
    let v: Decimal = prices_sizes.iter().map(|(_, s)| *s).sum();
    assert_eq!(c.open, dec!(100.10));
    assert_eq!(c.high, dec!(100.60));
    assert_eq!(c.low, dec!(99.80));
    assert_eq!(c.close, dec!(100.20));
    assert_eq!(c.volume, v);
    assert_eq!(c.vwap, Some(pv / v));
    assert_eq!(c.trade_count, 4);
    assert!(c.low <= c.open && c.open <= c.high);
    assert!(c.low <= c.close && c.close <= c.high);
}

/// Candles round-trip bit-exactly through the NDJSON form.
#[test]
fn emitted_candles_round_trip_through_ndjson() {
    let mut agg = one_minute(2);
    agg.ingest(&tick(9, 30, 5, dec!(100.25), dec!(10)));
    agg.ingest(&tick(9, 30, 30, dec!(101.75), dec!(3)));
    let finals = agg.flush(Utc.with_ymd_and_hms(2024, 1, 2, 9, 35, 0).unwrap());

    for candle in finals {
        let line = candle.to_json_line().unwrap();
        let back = Candle::from_json_line(&line).unwrap();
        assert_eq!(back, candle);
    }
}

/// Emission-mode check: update mode streams one non-final per tick, final
/// mode stays quiet until closure.
#[test]
fn emission_modes_differ_only_in_updates() {
    let mut updates = CandleAggregator::new(
        vec!["1m".parse().unwrap()],
        AggregatorConfig {
            lateness_seconds: 2,
            emit_updates: true,
            ..AggregatorConfig::default()
        },
    );
    let mut finals_only = one_minute(2);

    for agg in [&mut updates, &mut finals_only] {
        agg.ingest(&tick(9, 30, 5, dec!(100), dec!(10)));
        agg.ingest(&tick(9, 30, 30, dec!(101), dec!(5)));
    }

    assert_eq!(updates.ops_snapshot().counters.candles_emitted_update, 2);
    assert_eq!(finals_only.ops_snapshot().counters.candles_emitted_update, 0);

    // Both agree on the final.
    let now = Utc.with_ymd_and_hms(2024, 1, 2, 9, 35, 0).unwrap();
    let a = updates.flush(now);
    let b = finals_only.flush(now);
    assert_eq!(a.last().map(|c| c.close), b.last().map(|c| c.close));
}
