use crate::domain::ports::VixProvider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

/// VIX reading fetched from the shared system-status endpoint.
///
/// The endpoint returns `{"current_value": <f64>, "updated_at": ...}`;
/// anything else (or an unreachable endpoint) reads as "unavailable" so
/// the VIX guard degrades to a no-op instead of blocking signals.
pub struct HttpVixProvider {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct VixDocument {
    current_value: Option<f64>,
}

impl HttpVixProvider {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build vix http client")?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    /// `VIX_STATUS_URL`, with the health-ping default timeout of 2s.
    pub fn from_env() -> Result<Option<Self>> {
        match std::env::var("VIX_STATUS_URL") {
            Ok(url) if !url.trim().is_empty() => {
                Ok(Some(Self::new(url.trim(), Duration::from_secs(2))?))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl VixProvider for HttpVixProvider {
    async fn current_vix(&self) -> Result<Option<f64>> {
        let response = match self.client.get(&self.url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("vix endpoint unreachable: {e}");
                return Ok(None);
            }
        };
        if !response.status().is_success() {
            warn!("vix endpoint returned {}", response.status());
            return Ok(None);
        }
        let doc: VixDocument = match response.json().await {
            Ok(d) => d,
            Err(e) => {
                warn!("vix endpoint returned invalid payload: {e}");
                return Ok(None);
            }
        };
        Ok(doc.current_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_parses_value() {
        let doc: VixDocument =
            serde_json::from_str(r#"{"current_value": 31.4, "updated_at": "x"}"#).unwrap();
        assert_eq!(doc.current_value, Some(31.4));
    }

    #[test]
    fn test_document_tolerates_missing_value() {
        let doc: VixDocument = serde_json::from_str(r#"{"updated_at": "x"}"#).unwrap();
        assert_eq!(doc.current_value, None);
    }
}
