//! Database access for foodset-collector
//!
//! Single SQLite file (`<root>/foodset.db`) holding the image records of both
//! partitions and the history of reconciliation passes.

pub mod passes;
pub mod records;
pub mod retry;

pub use retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

use foodset_common::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;

/// Connection pool size; recorder writes are short and serialized by SQLite
const MAX_CONNECTIONS: u32 = 8;

/// Per-connection busy timeout
const BUSY_TIMEOUT_MS: u64 = 5000;

/// Open (or create) the database and make sure all tables exist
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::debug!("Connecting to database: {}", db_path.display());

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(Duration::from_millis(BUSY_TIMEOUT_MS * 2))
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create collector tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS image_records (
            guid TEXT PRIMARY KEY,
            partition TEXT NOT NULL CHECK (partition IN ('train', 'eval')),
            image_path TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            label TEXT NOT NULL,
            confidence REAL,
            verified INTEGER NOT NULL DEFAULT 0,
            owner_id INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_image_records_partition_label \
         ON image_records (partition, label)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reconcile_passes (
            pass_id TEXT PRIMARY KEY,
            partition TEXT NOT NULL,
            mode TEXT NOT NULL,
            started_at TEXT NOT NULL,
            ended_at TEXT,
            images_requested INTEGER NOT NULL DEFAULT 0,
            records_added INTEGER NOT NULL DEFAULT 0,
            summary TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (image_records, reconcile_passes)");

    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    /// File-backed pool in a temp dir (in-memory pools give each
    /// connection its own database)
    pub async fn temp_pool() -> (TempDir, SqlitePool) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database_pool(&temp_dir.path().join("test.db"))
            .await
            .unwrap();
        (temp_dir, pool)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::temp_pool;

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let (_dir, pool) = temp_pool().await;
        super::init_tables(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        assert_eq!(tables, vec!["image_records", "reconcile_passes"]);
    }
}
