//! Liveness check

use crate::AppState;
use axum::{extract::State, Json};
use dbadmin_types::HealthStatus;

pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cache_mode: state.config.snapshot().redis.mode.to_string(),
    })
}
