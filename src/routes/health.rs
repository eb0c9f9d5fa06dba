use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

const PROBE_KEY: &[u8] = b"__health_check__";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
        .route("/database", get(database_health))
}

pub async fn health_check(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "uptimeSecs": state.uptime_secs(),
        "liveSessions": state.registry().len().await,
    }))
}

pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Ready once the store answers reads.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store().study_sets.get(PROBE_KEY) {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness probe failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

pub async fn database_health(
    State(state): State<AppState>,
) -> impl axum::response::IntoResponse {
    let start = Instant::now();
    let healthy = state.store().study_sets.get(PROBE_KEY).is_ok();
    let latency_us = start.elapsed().as_micros() as u64;

    Json(serde_json::json!({
        "healthy": healthy,
        "latencyUs": latency_us,
        "sizeOnDisk": state.store().raw_db().size_on_disk().ok(),
    }))
}
