//! Reconciliation pass control
//!
//! POST /reconcile, POST /reconcile/cancel, GET /passes, GET /passes/:pass_id

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{Partition, PassMode, PassSummary};
use crate::{ActivePass, AppState};

const DEFAULT_PASS_LIMIT: u32 = 20;
const MAX_PASS_LIMIT: u32 = 200;

/// POST /reconcile request
#[derive(Debug, Default, Deserialize)]
pub struct StartPassRequest {
    #[serde(default)]
    pub partition: Option<Partition>,
    #[serde(default)]
    pub mode: Option<PassMode>,
}

/// POST /reconcile response
#[derive(Debug, Serialize)]
pub struct StartPassResponse {
    pub pass_id: Uuid,
    pub partition: Partition,
    pub mode: PassMode,
    pub started_at: DateTime<Utc>,
}

/// POST /reconcile/cancel response
#[derive(Debug, Serialize)]
pub struct CancelPassResponse {
    pub pass_id: Uuid,
    pub cancelled: bool,
}

/// GET /passes query
#[derive(Debug, Deserialize)]
pub struct PassesQuery {
    #[serde(default)]
    pub limit: Option<u32>,
}

/// POST /reconcile
///
/// Starts a pass in the background. Returns 202 with the pass id, or 409
/// when a pass is already running.
pub async fn start_pass(
    State(state): State<AppState>,
    Json(request): Json<StartPassRequest>,
) -> ApiResult<(StatusCode, Json<StartPassResponse>)> {
    let partition = request.partition.unwrap_or(Partition::Train);
    let mode = request.mode.unwrap_or(PassMode::Reconcile);

    let summary = PassSummary::new(partition, mode);
    let pass_id = summary.pass_id;
    let started_at = summary.started_at;
    let cancel = CancellationToken::new();

    {
        let mut active = state.active_pass.write().await;
        if let Some(running) = active.as_ref() {
            return Err(ApiError::Conflict(format!(
                "Pass {} is already running",
                running.pass_id
            )));
        }
        *active = Some(ActivePass {
            pass_id,
            partition,
            mode,
            cancel: cancel.clone(),
        });
    }

    tracing::info!(pass_id = %pass_id, partition = %partition, mode = %mode, "Pass requested");

    let task_state = state.clone();
    let task = tokio::spawn(async move {
        match task_state.reconciler.execute(summary, &cancel).await {
            Ok(summary) => tracing::info!(
                pass_id = %pass_id,
                records_added = summary.records_added,
                "Background pass finished"
            ),
            Err(e) => tracing::error!(pass_id = %pass_id, error = %e, "Background pass failed"),
        }

        let mut active = task_state.active_pass.write().await;
        if active.as_ref().map(|p| p.pass_id) == Some(pass_id) {
            *active = None;
        }
    });
    *state.pass_task.lock().await = Some(task);

    Ok((
        StatusCode::ACCEPTED,
        Json(StartPassResponse {
            pass_id,
            partition,
            mode,
            started_at,
        }),
    ))
}

/// POST /reconcile/cancel
///
/// Jobs not yet started are skipped; in-flight provider calls finish or
/// time out.
pub async fn cancel_pass(State(state): State<AppState>) -> ApiResult<Json<CancelPassResponse>> {
    let active = state.active_pass.read().await;
    let running = active
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("No pass is running".to_string()))?;

    running.cancel.cancel();
    tracing::info!(pass_id = %running.pass_id, "Pass cancellation requested");

    Ok(Json(CancelPassResponse {
        pass_id: running.pass_id,
        cancelled: true,
    }))
}

/// GET /passes
pub async fn list_passes(
    State(state): State<AppState>,
    Query(query): Query<PassesQuery>,
) -> ApiResult<Json<Vec<PassSummary>>> {
    let limit = query.limit.unwrap_or(DEFAULT_PASS_LIMIT).clamp(1, MAX_PASS_LIMIT);
    let passes = crate::db::passes::load_recent_passes(&state.db, limit).await?;
    Ok(Json(passes))
}

/// GET /passes/:pass_id
pub async fn get_pass(
    State(state): State<AppState>,
    Path(pass_id): Path<Uuid>,
) -> ApiResult<Json<PassSummary>> {
    crate::db::passes::load_pass(&state.db, pass_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Pass not found: {}", pass_id)))
}

pub fn reconcile_routes() -> Router<AppState> {
    Router::new()
        .route("/reconcile", post(start_pass))
        .route("/reconcile/cancel", post(cancel_pass))
        .route("/passes", get(list_passes))
        .route("/passes/:pass_id", get(get_pass))
}
