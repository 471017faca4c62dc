//! Ops HTTP surface: liveness, readiness, heartbeat and metrics.
//!
//! `/livez` answers while the process is alive and never consults market
//! hours or safety state; `/readyz` (and its `/healthz` alias) is gated on
//! the fail-closed safety evaluation.

use crate::application::monitoring::{MarketDataActivity, SafetyMonitor};
use crate::domain::ports::HeartbeatStore;
use crate::domain::safety::{HeartbeatInfo, SafetyState, is_safe_to_run};
use crate::infrastructure::observability::{AgentIdentity, Metrics};
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct OpsState {
    pub monitor: Arc<SafetyMonitor>,
    pub metrics: Arc<Metrics>,
    pub activity: Arc<MarketDataActivity>,
    pub heartbeat_store: Arc<dyn HeartbeatStore>,
    pub marketdata_service_id: String,
    pub identity: AgentIdentity,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LivezResponse {
    pub status: String,
    pub identity: AgentIdentity,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadyzResponse {
    pub safety_state: SafetyState,
    pub marketdata_heartbeat: HeartbeatInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreshnessStatus {
    Fresh,
    Stale,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub last_marketdata_ts: Option<DateTime<Utc>>,
    pub status: FreshnessStatus,
    pub age_seconds: Option<f64>,
    pub stale_threshold_seconds: u32,
    pub kill_switch: bool,
}

pub fn router(state: OpsState) -> Router {
    Router::new()
        .route("/livez", get(livez))
        .route("/readyz", get(readyz))
        .route("/healthz", get(readyz))
        .route("/heartbeat", get(heartbeat))
        .route("/metrics", get(metrics))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: OpsState, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("ops http server listening on {bind}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Never gated: answers as long as the process is alive.
async fn livez(State(state): State<OpsState>) -> Response {
    (
        StatusCode::OK,
        axum::Json(LivezResponse {
            status: "alive".to_string(),
            identity: state.identity.clone(),
        }),
    )
        .into_response()
}

/// 200 only when the safety state allows strategies to run; 503 otherwise,
/// with the full state attached for operators.
async fn readyz(State(state): State<OpsState>) -> Response {
    let now = Utc::now();
    let safety_state = state.monitor.evaluate(now);
    let heartbeat = state
        .heartbeat_store
        .read_heartbeat(
            &state.marketdata_service_id,
            now,
            state.monitor.stale_threshold_seconds(),
        )
        .await
        .unwrap_or_else(|_| HeartbeatInfo::missing(&state.marketdata_service_id));

    let code = if is_safe_to_run(&safety_state) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        axum::Json(ReadyzResponse {
            safety_state,
            marketdata_heartbeat: heartbeat,
        }),
    )
        .into_response()
}

/// Always 200: freshness details without gating, for dashboards.
async fn heartbeat(State(state): State<OpsState>) -> Response {
    let now = Utc::now();
    let safety_state = state.monitor.evaluate(now);
    let age = state.activity.age_seconds(now);
    (
        StatusCode::OK,
        axum::Json(HeartbeatResponse {
            last_marketdata_ts: state.activity.last(),
            status: if safety_state.marketdata_fresh {
                FreshnessStatus::Fresh
            } else {
                FreshnessStatus::Stale
            },
            age_seconds: age,
            stale_threshold_seconds: state.monitor.stale_threshold_seconds(),
            kill_switch: safety_state.kill_switch,
        }),
    )
        .into_response()
}

async fn metrics(State(state): State<OpsState>) -> Response {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.metrics.render(),
    )
        .into_response()
}
