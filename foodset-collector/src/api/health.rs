//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    /// Short git hash captured at build time
    pub build: String,
    pub uptime_seconds: u64,
    /// Set while a reconciliation pass is running
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_pass: Option<uuid::Uuid>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let active_pass = state.active_pass.read().await.as_ref().map(|p| p.pass_id);

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "foodset-collector".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build: env!("GIT_HASH").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        active_pass,
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
