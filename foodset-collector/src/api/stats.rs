//! Dataset statistics and sample export

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::models::{DatasetStatistics, LabeledSample, Partition};
use crate::AppState;

/// `?partition=` query (defaults to train)
#[derive(Debug, Deserialize)]
pub struct PartitionQuery {
    #[serde(default)]
    pub partition: Option<String>,
}

impl PartitionQuery {
    fn partition(&self) -> ApiResult<Partition> {
        match &self.partition {
            None => Ok(Partition::Train),
            Some(raw) => raw.parse().map_err(ApiError::BadRequest),
        }
    }
}

/// GET /samples response
#[derive(Debug, Serialize)]
pub struct SamplesResponse {
    pub partition: Partition,
    pub count: usize,
    pub samples: Vec<LabeledSample>,
}

/// GET /stats
pub async fn get_stats(
    State(state): State<AppState>,
    Query(query): Query<PartitionQuery>,
) -> ApiResult<Json<DatasetStatistics>> {
    let partition = query.partition()?;
    let stats = state.reconciler.recorder().get_statistics(partition).await?;
    Ok(Json(stats))
}

/// GET /samples
pub async fn get_samples(
    State(state): State<AppState>,
    Query(query): Query<PartitionQuery>,
) -> ApiResult<Json<SamplesResponse>> {
    let partition = query.partition()?;
    let samples = state.reconciler.recorder().labeled_samples(partition).await?;
    Ok(Json(SamplesResponse {
        partition,
        count: samples.len(),
        samples,
    }))
}

pub fn stats_routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/samples", get(get_samples))
}
