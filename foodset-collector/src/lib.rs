//! foodset-collector library interface
//!
//! Collects per-category food images: computes how many images each
//! category still needs, fetches them through a bounded worker pool,
//! validates the files and records accepted samples with readiness
//! statistics.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::models::{Partition, PassMode};
use crate::services::Reconciler;

/// The pass currently owned by the API
#[derive(Debug, Clone)]
pub struct ActivePass {
    pub pass_id: Uuid,
    pub partition: Partition,
    pub mode: PassMode,
    pub cancel: CancellationToken,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub reconciler: Arc<Reconciler>,
    /// At most one pass runs at a time
    pub active_pass: Arc<RwLock<Option<ActivePass>>>,
    /// Background task of the most recent API pass
    pub pass_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, reconciler: Arc<Reconciler>) -> Self {
        Self {
            db,
            reconciler,
            active_pass: Arc::new(RwLock::new(None)),
            pass_task: Arc::new(Mutex::new(None)),
            startup_time: Utc::now(),
        }
    }

    /// Cancel the running pass, if any, and wait until it has recorded what
    /// it fetched and saved its summary
    pub async fn shutdown_pass(&self) {
        if let Some(pass) = self.active_pass.read().await.as_ref() {
            tracing::info!(pass_id = %pass.pass_id, "Cancelling running pass");
            pass.cancel.cancel();
        }

        let task = self.pass_task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Pass task ended abnormally");
            }
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::stats_routes())
        .merge(api::reconcile_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
