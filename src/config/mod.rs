//! Configuration loading from environment variables, organized by concern:
//! ingest stream, candle aggregation, safety, and the ops HTTP surface.

mod safety_config;

pub use safety_config::{DEFAULT_SAFETY_DIR, DEFAULT_STALE_THRESHOLD_SECONDS, SafetyEnvConfig};

use crate::domain::errors::MarketDataError;
use crate::domain::market::{Timeframe, parse_timeframes};
use anyhow::{Context, Result, bail};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Main service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    // Identity
    pub service_id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub strategy_id: String,

    // Broker stream
    pub alpaca_ws_url: String,
    pub alpaca_api_key: String,
    pub alpaca_secret_key: String,
    /// Data feed tier; passed through to the stream URL, no precedence
    /// logic beyond this single variable.
    pub alpaca_feed: String,
    pub symbols: Vec<String>,
    pub ws_read_deadline_seconds: u64,
    pub stream_silence_threshold_seconds: u64,
    pub reconnect_backoff_base_seconds: f64,
    pub reconnect_backoff_max_seconds: f64,
    pub reconnect_max_retry_window_seconds: u64,

    // Candle aggregation
    pub timeframes: Vec<Timeframe>,
    pub lateness_seconds: u32,
    pub market_tz: Tz,
    pub session_daily: bool,
    pub emit_updates: bool,
    pub clamp_pct: Option<Decimal>,

    // Stores
    pub data_root: PathBuf,
    pub persist_ticks: bool,
    pub tick_writes_per_sec: f64,
    pub tick_write_burst: f64,

    // Heartbeat / safety
    pub heartbeat_interval_seconds: u64,
    pub safety: SafetyEnvConfig,

    // Ops HTTP
    pub ops_bind_address: String,
    pub ops_port: u16,

    // Intent flow
    pub intent_ttl_seconds: i64,
    pub default_allocation_usd: Decimal,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let symbols: Vec<String> = env_or("ALPACA_SYMBOLS", "SPY,IWM,QQQ")
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if symbols.is_empty() {
            bail!("ALPACA_SYMBOLS resolved to an empty list");
        }
        // Deduplicate while preserving order.
        let mut seen = std::collections::HashSet::new();
        let symbols: Vec<String> = symbols
            .into_iter()
            .filter(|s| seen.insert(s.clone()))
            .collect();

        let timeframes_raw = env_or("CANDLE_TIMEFRAMES", "1m,5m,1d");
        let timeframes: Vec<Timeframe> = parse_timeframes(timeframes_raw.split(','))
            .map_err(|e: MarketDataError| anyhow::anyhow!(e))
            .with_context(|| format!("CANDLE_TIMEFRAMES={timeframes_raw}"))?;

        let tz_name = env_or("MARKET_TZ", "America/New_York");
        let market_tz: Tz = tz_name
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid MARKET_TZ: {tz_name}"))?;

        let feed = env_or("ALPACA_FEED", "iex");
        let default_ws = format!("wss://stream.data.alpaca.markets/v2/{feed}");
        let ws_url = env_or("ALPACA_WS_URL", &default_ws);
        url::Url::parse(&ws_url).with_context(|| format!("invalid ALPACA_WS_URL: {ws_url}"))?;

        let clamp_pct = env::var("TICK_CLAMP_PCT")
            .ok()
            .and_then(|v| Decimal::from_str(v.trim()).ok())
            .filter(|p| *p > Decimal::ZERO);

        Ok(Self {
            service_id: env_or("SERVICE_NAME", "marketdata-ingest"),
            tenant_id: env_or("TENANT_ID", "default"),
            user_id: env_or("USER_ID", "local"),
            strategy_id: env_or("STRATEGY_ID", "sma_cross"),

            alpaca_ws_url: ws_url,
            alpaca_api_key: env_or("ALPACA_API_KEY_ID", ""),
            alpaca_secret_key: env_or("ALPACA_API_SECRET_KEY", ""),
            alpaca_feed: feed,
            symbols,
            ws_read_deadline_seconds: env_parse("WS_READ_DEADLINE_S", 30),
            stream_silence_threshold_seconds: env_parse("STREAM_SILENCE_THRESHOLD_S", 120),
            reconnect_backoff_base_seconds: env_parse("RECONNECT_BACKOFF_BASE_S", 1.0),
            reconnect_backoff_max_seconds: env_parse("RECONNECT_BACKOFF_MAX_S", 60.0),
            reconnect_max_retry_window_seconds: env_parse("RECONNECT_MAX_RETRY_WINDOW_S", 900),

            timeframes,
            lateness_seconds: env_parse("CANDLE_LATENESS_S", 5),
            market_tz,
            session_daily: env_bool("CANDLE_SESSION_DAILY", false),
            emit_updates: env_bool("CANDLE_EMIT_UPDATES", true),
            clamp_pct,

            data_root: PathBuf::from(env_or("DATA_PLANE_ROOT", "data")),
            persist_ticks: env_bool("PERSIST_TICKS", true),
            tick_writes_per_sec: env_parse("GLOBAL_WRITES_PER_SEC", 20.0),
            tick_write_burst: env_parse("GLOBAL_BURST", 40.0),

            heartbeat_interval_seconds: env_parse("HEARTBEAT_INTERVAL_S", 15),
            safety: SafetyEnvConfig::from_env(),

            ops_bind_address: env_or("OPS_BIND_ADDRESS", "0.0.0.0"),
            ops_port: env_parse("OPS_PORT", 8080),

            intent_ttl_seconds: env_parse("INTENT_TTL_S", 300),
            default_allocation_usd: env::var("DEFAULT_ALLOCATION_USD")
                .ok()
                .and_then(|v| Decimal::from_str(v.trim()).ok())
                .unwrap_or_else(|| Decimal::from(1000)),
        })
    }

    pub fn ops_bind(&self) -> String {
        format!("{}:{}", self.ops_bind_address, self.ops_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_bool_tokens() {
        // Env-free behavior only: defaults flow through.
        assert!(env_bool("NOT_SET_ANYWHERE_XYZ", true));
        assert!(!env_bool("NOT_SET_ANYWHERE_XYZ", false));
    }

    #[test]
    fn test_env_parse_default() {
        assert_eq!(env_parse("NOT_SET_ANYWHERE_XYZ", 42u32), 42);
    }
}
