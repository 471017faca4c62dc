//! Real-time candle aggregation with bounded lateness.
//!
//! Maintains rolling state per `(symbol, timeframe, bucket_start)`, emits
//! per-tick updates (optional) and watermark-based finals. A bucket whose
//! successor receives a tick is closed immediately, matching the stream
//! behavior charting frontends expect.

use crate::domain::market::timeframe::Timeframe;
use crate::domain::market::{Candle, Tick};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Tuning knobs for one aggregator instance.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub lateness_seconds: u32,
    pub market_tz: Tz,
    pub session_daily: bool,
    /// Emit one non-final update per ingested tick (realtime UI mode).
    /// When false, only finals are emitted (deterministic backfill mode).
    pub emit_updates: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            lateness_seconds: 5,
            market_tz: chrono_tz::America::New_York,
            session_daily: false,
            emit_updates: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AggregatorCounters {
    pub candles_emitted_final: u64,
    pub candles_emitted_update: u64,
    pub late_events_dropped: u64,
    pub parse_errors: u64,
}

/// Lightweight snapshot for ops markers and logs.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatorSnapshot {
    pub timeframes: Vec<String>,
    pub counters: AggregatorCounters,
    pub active_candle_states: usize,
    pub last_bucket_start_by_timeframe: BTreeMap<String, DateTime<Utc>>,
}

#[derive(Debug)]
struct CandleState {
    symbol: String,
    timeframe: String,
    ts_start_utc: DateTime<Utc>,
    ts_end_utc: DateTime<Utc>,

    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,

    trade_count: u64,
    pv_sum: Decimal,
    v_sum: Decimal,

    last_event_ts: DateTime<Utc>,
    final_emitted: bool,
    dirty_since_final: bool,
}

impl CandleState {
    fn new(
        symbol: &str,
        timeframe: &str,
        ts_start_utc: DateTime<Utc>,
        ts_end_utc: DateTime<Utc>,
        tick: &Tick,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            ts_start_utc,
            ts_end_utc,
            open: tick.price,
            high: tick.price,
            low: tick.price,
            close: tick.price,
            volume: tick.size,
            trade_count: 1,
            pv_sum: tick.price * tick.size,
            v_sum: tick.size,
            last_event_ts: tick.ts_utc,
            final_emitted: false,
            dirty_since_final: false,
        }
    }

    fn apply(&mut self, tick: &Tick) {
        self.high = self.high.max(tick.price);
        self.low = self.low.min(tick.price);
        // Close follows the latest event time seen, not arrival order.
        if tick.ts_utc >= self.last_event_ts {
            self.close = tick.price;
            self.last_event_ts = tick.ts_utc;
        }
        self.volume += tick.size;
        self.trade_count += 1;
        self.pv_sum += tick.price * tick.size;
        self.v_sum += tick.size;
        if self.final_emitted {
            self.dirty_since_final = true;
        }
    }

    fn vwap(&self) -> Option<Decimal> {
        if self.v_sum <= Decimal::ZERO {
            return None;
        }
        Some(self.pv_sum / self.v_sum)
    }

    fn to_candle(&self, is_final: bool) -> Candle {
        Candle {
            symbol: self.symbol.clone(),
            timeframe: self.timeframe.clone(),
            ts_start_utc: self.ts_start_utc,
            ts_end_utc: self.ts_end_utc,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            vwap: self.vwap(),
            trade_count: self.trade_count,
            is_final,
        }
    }
}

type TfKey = (String, String);
type StateKey = (String, String, DateTime<Utc>);

pub struct CandleAggregator {
    timeframes: Vec<Timeframe>,
    lateness: Duration,
    config: AggregatorConfig,

    states: HashMap<StateKey, CandleState>,
    watermarks: HashMap<TfKey, DateTime<Utc>>,
    latest_bucket_start: HashMap<TfKey, DateTime<Utc>>,

    pub counters: AggregatorCounters,
}

impl CandleAggregator {
    pub fn new(timeframes: Vec<Timeframe>, config: AggregatorConfig) -> Self {
        Self {
            lateness: Duration::seconds(config.lateness_seconds as i64),
            timeframes,
            config,
            states: HashMap::new(),
            watermarks: HashMap::new(),
            latest_bucket_start: HashMap::new(),
            counters: AggregatorCounters::default(),
        }
    }

    pub fn timeframes(&self) -> Vec<String> {
        self.timeframes.iter().map(|tf| tf.text()).collect()
    }

    /// Ingest a raw broker event. Parse failures are counted and skipped;
    /// the pipeline never crashes on one bad message.
    pub fn ingest_event(&mut self, event: &serde_json::Value) -> Vec<Candle> {
        match Tick::from_event(event) {
            Ok(tick) => self.ingest(&tick),
            Err(e) => {
                self.counters.parse_errors += 1;
                debug!("trade parse error: {e} | event={event}");
                Vec::new()
            }
        }
    }

    /// Ingest one validated tick across all configured timeframes, returning
    /// the candles emitted in event-time order.
    pub fn ingest(&mut self, tick: &Tick) -> Vec<Candle> {
        let mut emitted = Vec::new();
        for tf in self.timeframes.clone() {
            emitted.extend(self.ingest_one(tick, tf));
        }
        emitted
    }

    fn ingest_one(&mut self, tick: &Tick, tf: Timeframe) -> Vec<Candle> {
        let (bucket_start, bucket_end) = match tf.bucket_range_utc(
            tick.ts_utc,
            self.config.market_tz,
            self.config.session_daily,
        ) {
            Ok(range) => range,
            Err(e) => {
                self.counters.parse_errors += 1;
                debug!("bucket alignment error: {e}");
                return Vec::new();
            }
        };

        let tf_text = tf.text();
        let tf_key: TfKey = (tick.symbol.clone(), tf_text.clone());

        let watermark = match self.watermarks.get(&tf_key) {
            Some(prev) => (*prev).max(tick.ts_utc),
            None => tick.ts_utc,
        };
        if tick.ts_utc < watermark - self.lateness {
            self.counters.late_events_dropped += 1;
            return Vec::new();
        }
        self.watermarks.insert(tf_key.clone(), watermark);

        let mut emitted = Vec::new();

        // Bucket rollover closes the previous bucket immediately.
        let prev_latest = self.latest_bucket_start.get(&tf_key).copied();
        match prev_latest {
            Some(prev) if bucket_start > prev => {
                let prev_key: StateKey = (tick.symbol.clone(), tf_text.clone(), prev);
                if let Some(state) = self.states.get_mut(&prev_key) {
                    state.final_emitted = true;
                    state.dirty_since_final = false;
                    self.counters.candles_emitted_final += 1;
                    emitted.push(state.to_candle(true));
                }
                self.latest_bucket_start.insert(tf_key.clone(), bucket_start);
            }
            None => {
                self.latest_bucket_start.insert(tf_key.clone(), bucket_start);
            }
            _ => {}
        }

        let key: StateKey = (tick.symbol.clone(), tf_text.clone(), bucket_start);
        let mut refinalize = false;
        match self.states.get_mut(&key) {
            Some(state) => {
                let was_final = state.final_emitted;
                state.apply(tick);
                // A tolerated late tick after the final: re-emit once more,
                // is_final, with the corrected payload. The latest final
                // emission is authoritative downstream.
                if was_final {
                    state.final_emitted = true;
                    state.dirty_since_final = false;
                    refinalize = true;
                }
            }
            None => {
                self.states.insert(
                    key.clone(),
                    CandleState::new(&tick.symbol, &tf_text, bucket_start, bucket_end, tick),
                );
            }
        }
        if refinalize {
            self.counters.candles_emitted_final += 1;
            if let Some(state) = self.states.get(&key) {
                emitted.push(state.to_candle(true));
            }
        }

        if self.config.emit_updates && !refinalize {
            if let Some(state) = self.states.get(&key) {
                self.counters.candles_emitted_update += 1;
                emitted.push(state.to_candle(false));
            }
        }

        emitted.extend(self.finalize_ready(&tf_key, watermark));
        self.evict_old(&tf_key, watermark);
        emitted
    }

    /// Finalize candles whose `ts_end` is behind the watermark by the
    /// lateness bound, and re-finalize any that went dirty after a prior
    /// final emission.
    fn finalize_ready(&mut self, tf_key: &TfKey, watermark: DateTime<Utc>) -> Vec<Candle> {
        let finalize_before = watermark - self.lateness;
        let mut out = Vec::new();
        for ((sym, tft, _), state) in self.states.iter_mut() {
            if sym != &tf_key.0 || tft != &tf_key.1 {
                continue;
            }
            if state.ts_end_utc <= finalize_before
                && (!state.final_emitted || state.dirty_since_final)
            {
                state.final_emitted = true;
                state.dirty_since_final = false;
                self.counters.candles_emitted_final += 1;
                out.push(state.to_candle(true));
            }
        }
        out
    }

    /// Remove states safely behind the watermark to keep memory bounded.
    /// A buffer beyond the lateness window lets tolerated late updates
    /// still find their bucket.
    fn evict_old(&mut self, tf_key: &TfKey, now: DateTime<Utc>) {
        let keep_after =
            now - Duration::seconds(self.lateness.num_seconds() * 3) - Duration::seconds(60);
        self.states.retain(|(sym, tft, _), state| {
            if sym != &tf_key.0 || tft != &tf_key.1 {
                return true;
            }
            !(state.final_emitted && !state.dirty_since_final && state.ts_end_utc <= keep_after)
        });
    }

    /// Finalize all candles older than `now - lateness`, across every symbol
    /// and timeframe. Intended for periodic timers and shutdown drain.
    pub fn flush(&mut self, now: DateTime<Utc>) -> Vec<Candle> {
        let finalize_before = now - self.lateness;
        let mut out = Vec::new();
        for state in self.states.values_mut() {
            if state.ts_end_utc <= finalize_before
                && (!state.final_emitted || state.dirty_since_final)
            {
                state.final_emitted = true;
                state.dirty_since_final = false;
                self.counters.candles_emitted_final += 1;
                out.push(state.to_candle(true));
            }
        }

        let keys: Vec<TfKey> = self.watermarks.keys().cloned().collect();
        for key in keys {
            self.evict_old(&key, now);
        }
        out
    }

    pub fn ops_snapshot(&self) -> AggregatorSnapshot {
        let mut last_by_tf: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
        for ((_, tf_text), start) in &self.latest_bucket_start {
            last_by_tf
                .entry(tf_text.clone())
                .and_modify(|cur| {
                    if *start > *cur {
                        *cur = *start;
                    }
                })
                .or_insert(*start);
        }
        AggregatorSnapshot {
            timeframes: self.timeframes(),
            counters: self.counters,
            active_candle_states: self.states.len(),
            last_bucket_start_by_timeframe: last_by_tf,
        }
    }
}
