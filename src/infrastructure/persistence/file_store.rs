//! File-partitioned NDJSON data plane.
//!
//! Layouts:
//!   `<root>/candles/<tf>/YYYY/MM/DD/<symbol>.ndjson`
//!   `<root>/ticks/YYYY/MM/DD/<symbol>.ndjson`
//!   `<root>/proposals/YYYY/MM/DD/proposals.ndjson`
//!
//! The file store lets the pipeline run without a database while keeping
//! replay determinism: every record is one JSON line with UTC timestamps,
//! and queries skip (and count) corrupt lines instead of crashing.

use crate::domain::intent::OrderProposal;
use crate::domain::market::{Candle, Tick};
use crate::domain::ports::{CandleStore, ProposalStore, TickStore};
use crate::infrastructure::observability::Metrics;
use crate::infrastructure::persistence::retry::with_retries;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Root directory for the file-based data plane: `DATA_PLANE_ROOT`,
/// defaulting to `data/`.
pub fn default_data_root() -> PathBuf {
    PathBuf::from(std::env::var("DATA_PLANE_ROOT").unwrap_or_else(|_| "data".to_string()))
}

/// Convert a symbol into a filename-safe token:
/// `BTC/USD` → `BTC_USD`, `BRK.B` → `BRK.B`, `ES=F` → `ES_F`.
pub fn sanitize_symbol(symbol: &str) -> String {
    let upper = symbol.trim().to_uppercase();
    let mut out = String::with_capacity(upper.len());
    let mut last_was_sep = false;
    for c in upper.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            out.push(c);
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    let trimmed = out.trim_matches(|c| matches!(c, '.' | '_' | '-'));
    if trimmed.is_empty() {
        "UNKNOWN".to_string()
    } else {
        trimmed.to_string()
    }
}

fn dates_between(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut cur = start.date_naive();
    let last = end.date_naive();
    while cur <= last {
        out.push(cur);
        cur += Duration::days(1);
    }
    out
}

fn day_dir(root: &Path, prefix: &Path, d: NaiveDate) -> PathBuf {
    root.join(prefix)
        .join(format!("{:04}", d.year()))
        .join(format!("{:02}", d.month()))
        .join(format!("{:02}", d.day()))
}

async fn append_lines(path: &Path, lines: &[String]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    let mut buf = String::new();
    for line in lines {
        buf.push_str(line);
        buf.push('\n');
    }
    file.write_all(buf.as_bytes()).await?;
    file.flush().await
}

struct FileStoreBase {
    root: PathBuf,
    metrics: Option<Arc<Metrics>>,
}

impl FileStoreBase {
    fn record_corrupt_line(&self, path: &Path) {
        debug!("skipping corrupt record in {}", path.display());
        if let Some(metrics) = &self.metrics {
            metrics.inc_error("file-store");
        }
    }

    async fn read_lines(&self, path: &Path) -> Option<Vec<String>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Some(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            Err(_) => None,
        }
    }
}

/// Partitioned NDJSON candle store.
pub struct FileCandleStore {
    base: FileStoreBase,
}

impl FileCandleStore {
    pub fn new(root: &Path, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            base: FileStoreBase {
                root: root.to_path_buf(),
                metrics,
            },
        }
    }

    fn candle_path(&self, d: NaiveDate, timeframe: &str, symbol: &str) -> PathBuf {
        day_dir(&self.base.root, &PathBuf::from("candles").join(timeframe), d)
            .join(format!("{}.ndjson", sanitize_symbol(symbol)))
    }
}

#[async_trait]
impl CandleStore for FileCandleStore {
    async fn write_candles(&self, candles: &[Candle]) -> Result<()> {
        if candles.is_empty() {
            return Ok(());
        }
        // Partition by (timeframe, symbol, start date).
        let mut by_file: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
        for c in candles {
            let path = self.candle_path(c.ts_start_utc.date_naive(), &c.timeframe, &c.symbol);
            by_file
                .entry(path)
                .or_default()
                .push(c.to_json_line().context("serialize candle")?);
        }
        for (path, lines) in by_file {
            with_retries("candle-store", || append_lines(&path, &lines))
                .await
                .with_context(|| format!("append candles to {}", path.display()))?;
        }
        Ok(())
    }

    async fn query_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        start_utc: DateTime<Utc>,
        end_utc: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let mut out: Vec<Candle> = Vec::new();
        for d in dates_between(start_utc, end_utc) {
            let path = self.candle_path(d, timeframe, symbol);
            let Some(lines) = self.base.read_lines(&path).await else {
                continue;
            };
            for line in lines {
                match Candle::from_json_line(&line) {
                    Ok(candle) => {
                        if candle.ts_start_utc >= start_utc && candle.ts_start_utc <= end_utc {
                            out.push(candle);
                        }
                    }
                    Err(_) => self.base.record_corrupt_line(&path),
                }
            }
        }
        out.sort_by_key(|c| c.ts_start_utc);
        Ok(out)
    }
}

/// Partitioned NDJSON tick store.
pub struct FileTickStore {
    base: FileStoreBase,
}

impl FileTickStore {
    pub fn new(root: &Path, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            base: FileStoreBase {
                root: root.to_path_buf(),
                metrics,
            },
        }
    }

    fn tick_path(&self, d: NaiveDate, symbol: &str) -> PathBuf {
        day_dir(&self.base.root, Path::new("ticks"), d)
            .join(format!("{}.ndjson", sanitize_symbol(symbol)))
    }
}

#[async_trait]
impl TickStore for FileTickStore {
    async fn write_ticks(&self, ticks: &[Tick]) -> Result<()> {
        if ticks.is_empty() {
            return Ok(());
        }
        let mut by_file: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
        for t in ticks {
            let path = self.tick_path(t.ts_utc.date_naive(), &t.symbol);
            by_file
                .entry(path)
                .or_default()
                .push(serde_json::to_string(t).context("serialize tick")?);
        }
        for (path, lines) in by_file {
            with_retries("tick-store", || append_lines(&path, &lines))
                .await
                .with_context(|| format!("append ticks to {}", path.display()))?;
        }
        Ok(())
    }

    async fn query_ticks(
        &self,
        symbol: &str,
        start_utc: DateTime<Utc>,
        end_utc: DateTime<Utc>,
    ) -> Result<Vec<Tick>> {
        let mut out: Vec<Tick> = Vec::new();
        for d in dates_between(start_utc, end_utc) {
            let path = self.tick_path(d, symbol);
            let Some(lines) = self.base.read_lines(&path).await else {
                continue;
            };
            for line in lines {
                match serde_json::from_str::<Tick>(&line) {
                    Ok(tick) => {
                        if tick.ts_utc >= start_utc && tick.ts_utc <= end_utc {
                            out.push(tick);
                        }
                    }
                    Err(_) => self.base.record_corrupt_line(&path),
                }
            }
        }
        out.sort_by_key(|t| t.ts_utc);
        Ok(out)
    }
}

/// Partitioned NDJSON proposal store; one shared file per day.
pub struct FileProposalStore {
    base: FileStoreBase,
}

impl FileProposalStore {
    pub fn new(root: &Path, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            base: FileStoreBase {
                root: root.to_path_buf(),
                metrics,
            },
        }
    }

    fn proposal_path(&self, d: NaiveDate) -> PathBuf {
        day_dir(&self.base.root, Path::new("proposals"), d).join("proposals.ndjson")
    }

    pub async fn query_proposals(
        &self,
        start_utc: DateTime<Utc>,
        end_utc: DateTime<Utc>,
    ) -> Result<Vec<OrderProposal>> {
        let mut out: Vec<OrderProposal> = Vec::new();
        for d in dates_between(start_utc, end_utc) {
            let path = self.proposal_path(d);
            let Some(lines) = self.base.read_lines(&path).await else {
                continue;
            };
            for line in lines {
                match serde_json::from_str::<OrderProposal>(&line) {
                    Ok(p) => {
                        if p.created_at_utc >= start_utc && p.created_at_utc <= end_utc {
                            out.push(p);
                        }
                    }
                    Err(_) => self.base.record_corrupt_line(&path),
                }
            }
        }
        out.sort_by_key(|p| p.created_at_utc);
        Ok(out)
    }
}

#[async_trait]
impl ProposalStore for FileProposalStore {
    async fn write_proposal(&self, proposal: &OrderProposal) -> Result<()> {
        let path = self.proposal_path(proposal.created_at_utc.date_naive());
        let line = serde_json::to_string(proposal).context("serialize proposal")?;
        with_retries("proposal-store", || {
            append_lines(&path, std::slice::from_ref(&line))
        })
        .await
        .with_context(|| format!("append proposal to {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_sanitize_symbol() {
        assert_eq!(sanitize_symbol("BTC/USD"), "BTC_USD");
        assert_eq!(sanitize_symbol("BRK.B"), "BRK.B");
        assert_eq!(sanitize_symbol("ES=F"), "ES_F");
        assert_eq!(sanitize_symbol("a b//c"), "A_B_C");
        assert_eq!(sanitize_symbol("///"), "UNKNOWN");
    }

    fn candle(minute: u32) -> Candle {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 14, minute, 0).unwrap();
        Candle {
            symbol: "BTC/USD".into(),
            timeframe: "1m".into(),
            ts_start_utc: start,
            ts_end_utc: start + Duration::minutes(1),
            open: dec!(100),
            high: dec!(101),
            low: dec!(99),
            close: dec!(100.5),
            volume: dec!(12),
            vwap: Some(dec!(100.2)),
            trade_count: 9,
            is_final: true,
        }
    }

    #[tokio::test]
    async fn test_candle_round_trip_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCandleStore::new(dir.path(), None);
        let candles = vec![candle(30), candle(31)];
        store.write_candles(&candles).await.unwrap();

        // Layout: candles/1m/2024/01/02/BTC_USD.ndjson
        let path = dir
            .path()
            .join("candles/1m/2024/01/02/BTC_USD.ndjson");
        assert!(path.exists());

        let got = store
            .query_candles(
                "BTC/USD",
                "1m",
                Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(got, candles);
    }

    #[tokio::test]
    async fn test_corrupt_lines_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCandleStore::new(dir.path(), None);
        store.write_candles(&[candle(30)]).await.unwrap();

        let path = dir
            .path()
            .join("candles/1m/2024/01/02/BTC_USD.ndjson");
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{not json}\n");
        std::fs::write(&path, content).unwrap();

        let got = store
            .query_candles(
                "BTC/USD",
                "1m",
                Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
    }

    #[tokio::test]
    async fn test_tick_store_partitions_by_day() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTickStore::new(dir.path(), None);
        let t1 = Tick::new(
            "SPY",
            Utc.with_ymd_and_hms(2024, 1, 2, 23, 59, 0).unwrap(),
            dec!(475),
            dec!(10),
        )
        .unwrap();
        let t2 = Tick::new(
            "SPY",
            Utc.with_ymd_and_hms(2024, 1, 3, 0, 1, 0).unwrap(),
            dec!(476),
            dec!(5),
        )
        .unwrap();
        store.write_ticks(&[t1.clone(), t2.clone()]).await.unwrap();

        assert!(dir.path().join("ticks/2024/01/02/SPY.ndjson").exists());
        assert!(dir.path().join("ticks/2024/01/03/SPY.ndjson").exists());

        let got = store
            .query_ticks(
                "SPY",
                Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(got, vec![t1, t2]);
    }
}
