//! Image record persistence
//!
//! Append-only. `image_path` is UNIQUE and inserts use
//! `ON CONFLICT DO NOTHING`, so the first write for a path wins even when
//! two recorders race on it.

use chrono::{DateTime, Utc};
use foodset_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use crate::models::{ImageRecord, LabeledSample, Partition};

const TRAINABLE_PREDICATE: &str = "(verified = 1 OR (confidence IS NOT NULL AND confidence >= ?))";

/// Insert a record; returns false when the path is already recorded
pub async fn insert_record(pool: &SqlitePool, record: &ImageRecord) -> Result<bool> {
    let guid = record.id.to_string();
    let created_at = record.created_at.to_rfc3339();

    retry_on_lock("insert_record", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(
            r#"
            INSERT INTO image_records (
                guid, partition, image_path, description, label,
                confidence, verified, owner_id, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(image_path) DO NOTHING
            "#,
        )
        .bind(&guid)
        .bind(record.partition.as_str())
        .bind(&record.image_path)
        .bind(&record.description)
        .bind(&record.label)
        .bind(record.confidence)
        .bind(record.verified)
        .bind(record.owner_id)
        .bind(&created_at)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    })
    .await
}

/// Label already stored for a path
pub async fn label_for_path(pool: &SqlitePool, image_path: &str) -> Result<Option<String>> {
    let label = sqlx::query_scalar("SELECT label FROM image_records WHERE image_path = ?")
        .bind(image_path)
        .fetch_optional(pool)
        .await?;
    Ok(label)
}

/// Full record for a path
pub async fn load_record(pool: &SqlitePool, image_path: &str) -> Result<Option<ImageRecord>> {
    let row = sqlx::query(
        r#"
        SELECT guid, partition, image_path, description, label,
               confidence, verified, owner_id, created_at
        FROM image_records
        WHERE image_path = ?
        "#,
    )
    .bind(image_path)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let guid: String = row.get("guid");
    let id = Uuid::parse_str(&guid)
        .map_err(|e| Error::Internal(format!("Invalid record guid '{}': {}", guid, e)))?;

    let partition: String = row.get("partition");
    let partition: Partition = partition.parse().map_err(Error::Internal)?;

    let created_at: String = row.get("created_at");
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| Error::Internal(format!("Failed to parse created_at: {}", e)))?
        .with_timezone(&Utc);

    Ok(Some(ImageRecord {
        id,
        partition,
        image_path: row.get("image_path"),
        description: row.get("description"),
        label: row.get("label"),
        confidence: row.get("confidence"),
        verified: row.get("verified"),
        owner_id: row.get("owner_id"),
        created_at,
    }))
}

/// Total records in a partition
pub async fn count_records(pool: &SqlitePool, partition: Partition) -> Result<u64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM image_records WHERE partition = ?")
        .bind(partition.as_str())
        .fetch_one(pool)
        .await?;
    Ok(count.max(0) as u64)
}

/// Record count per label in a partition
pub async fn count_by_label(pool: &SqlitePool, partition: Partition) -> Result<BTreeMap<String, u64>> {
    let rows = sqlx::query(
        "SELECT label, COUNT(*) AS n FROM image_records WHERE partition = ? GROUP BY label",
    )
    .bind(partition.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let n: i64 = row.get("n");
            (row.get::<String, _>("label"), n.max(0) as u64)
        })
        .collect())
}

/// Records that are verified or predicted with at least `min_confidence`
pub async fn count_trainable(
    pool: &SqlitePool,
    partition: Partition,
    min_confidence: f64,
) -> Result<u64> {
    let sql = format!(
        "SELECT COUNT(*) FROM image_records WHERE partition = ? AND {}",
        TRAINABLE_PREDICATE
    );
    let count: i64 = sqlx::query_scalar(&sql)
        .bind(partition.as_str())
        .bind(min_confidence)
        .fetch_one(pool)
        .await?;
    Ok(count.max(0) as u64)
}

/// `(path, label)` pairs of trainable records, oldest first
pub async fn trainable_samples(
    pool: &SqlitePool,
    partition: Partition,
    min_confidence: f64,
) -> Result<Vec<LabeledSample>> {
    let sql = format!(
        "SELECT image_path, label FROM image_records WHERE partition = ? AND {} \
         ORDER BY created_at, image_path",
        TRAINABLE_PREDICATE
    );
    let rows = sqlx::query(&sql)
        .bind(partition.as_str())
        .bind(min_confidence)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| LabeledSample {
            path: row.get("image_path"),
            label: row.get("label"),
        })
        .collect())
}
