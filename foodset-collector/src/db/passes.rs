//! Reconciliation pass history

use foodset_common::{Error, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use crate::models::PassSummary;

/// Insert or update a pass summary
pub async fn save_pass(pool: &SqlitePool, summary: &PassSummary) -> Result<()> {
    let pass_id = summary.pass_id.to_string();
    let started_at = summary.started_at.to_rfc3339();
    let ended_at = summary.ended_at.map(|dt| dt.to_rfc3339());
    let images_requested = i64::try_from(summary.images_requested).unwrap_or(i64::MAX);
    let records_added = i64::try_from(summary.records_added).unwrap_or(i64::MAX);
    let body = serde_json::to_string(summary)
        .map_err(|e| Error::Internal(format!("Failed to serialize pass summary: {}", e)))?;

    retry_on_lock("save_pass", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO reconcile_passes (
                pass_id, partition, mode, started_at, ended_at,
                images_requested, records_added, summary
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(pass_id) DO UPDATE SET
                ended_at = excluded.ended_at,
                images_requested = excluded.images_requested,
                records_added = excluded.records_added,
                summary = excluded.summary
            "#,
        )
        .bind(&pass_id)
        .bind(summary.partition.as_str())
        .bind(summary.mode.as_str())
        .bind(&started_at)
        .bind(&ended_at)
        .bind(images_requested)
        .bind(records_added)
        .bind(&body)
        .execute(pool)
        .await?;

        Ok(())
    })
    .await
}

/// Load one pass summary
pub async fn load_pass(pool: &SqlitePool, pass_id: Uuid) -> Result<Option<PassSummary>> {
    let body: Option<String> =
        sqlx::query_scalar("SELECT summary FROM reconcile_passes WHERE pass_id = ?")
            .bind(pass_id.to_string())
            .fetch_optional(pool)
            .await?;

    body.map(|b| parse_summary(&b)).transpose()
}

/// Most recent passes first
pub async fn load_recent_passes(pool: &SqlitePool, limit: u32) -> Result<Vec<PassSummary>> {
    let bodies: Vec<String> = sqlx::query_scalar(
        "SELECT summary FROM reconcile_passes ORDER BY started_at DESC LIMIT ?",
    )
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    bodies.iter().map(|b| parse_summary(b)).collect()
}

fn parse_summary(body: &str) -> Result<PassSummary> {
    serde_json::from_str(body)
        .map_err(|e| Error::Internal(format!("Failed to deserialize pass summary: {}", e)))
}
