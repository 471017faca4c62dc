use crate::domain::ports::HeartbeatStore;
use crate::domain::safety::{HeartbeatInfo, ServiceHeartbeat};
use crate::infrastructure::persistence::file_store::sanitize_symbol;
use crate::infrastructure::persistence::retry::with_retries;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Shared heartbeat store: one JSON document per service under
/// `<root>/heartbeats/<service_id>.json`. Writers replace the document on
/// every beat; readers classify staleness against their own clock.
pub struct FileHeartbeatStore {
    root: PathBuf,
}

impl FileHeartbeatStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn path(&self, service_id: &str) -> PathBuf {
        self.root
            .join("heartbeats")
            .join(format!("{}.json", sanitize_symbol(service_id).to_lowercase()))
    }
}

async fn write_atomic(tmp: &Path, path: &Path, body: &str) -> std::io::Result<()> {
    tokio::fs::write(tmp, body.as_bytes()).await?;
    tokio::fs::rename(tmp, path).await
}

#[async_trait]
impl HeartbeatStore for FileHeartbeatStore {
    async fn write_heartbeat(&self, heartbeat: &ServiceHeartbeat) -> Result<()> {
        let path = self.path(&heartbeat.service_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("create heartbeat dir")?;
        }
        let body = serde_json::to_string(heartbeat).context("serialize heartbeat")?;
        // Write-then-rename so readers never observe a torn document.
        let tmp = path.with_extension("json.tmp");
        with_retries("heartbeat-store", || write_atomic(&tmp, &path, &body))
            .await
            .with_context(|| format!("write heartbeat {}", path.display()))?;
        Ok(())
    }

    async fn read_heartbeat(
        &self,
        service_id: &str,
        now: DateTime<Utc>,
        stale_threshold_seconds: u32,
    ) -> Result<HeartbeatInfo> {
        let path = self.path(service_id);
        let Ok(content) = tokio::fs::read_to_string(&path).await else {
            return Ok(HeartbeatInfo::missing(service_id));
        };
        match serde_json::from_str::<ServiceHeartbeat>(&content) {
            Ok(record) => Ok(HeartbeatInfo::from_record(
                &record,
                now,
                stale_threshold_seconds,
            )),
            Err(_) => Ok(HeartbeatInfo::missing(service_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::safety::HeartbeatStatus;
    use chrono::Duration;

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHeartbeatStore::new(dir.path());
        let now = Utc::now();
        store
            .write_heartbeat(&ServiceHeartbeat {
                service_id: "marketdata-ingest".into(),
                last_heartbeat_ts: now,
                status: HeartbeatStatus::Healthy,
            })
            .await
            .unwrap();

        let info = store
            .read_heartbeat("marketdata-ingest", now + Duration::seconds(5), 45)
            .await
            .unwrap();
        assert!(!info.is_stale);
        assert_eq!(info.status, HeartbeatStatus::Healthy);
        assert_eq!(info.seconds_since, Some(5.0));
    }

    #[tokio::test]
    async fn test_missing_heartbeat_reads_as_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHeartbeatStore::new(dir.path());
        let info = store
            .read_heartbeat("strategy-engine", Utc::now(), 45)
            .await
            .unwrap();
        assert!(info.is_stale);
        assert_eq!(info.status, HeartbeatStatus::Unknown);
    }

    #[tokio::test]
    async fn test_corrupt_document_degrades_to_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHeartbeatStore::new(dir.path());
        let path = dir.path().join("heartbeats");
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("broken.json"), "{oops").unwrap();
        let info = store.read_heartbeat("broken", Utc::now(), 45).await.unwrap();
        assert_eq!(info.status, HeartbeatStatus::Unknown);
    }
}
