//! Dataset recorder
//!
//! Stores accepted images as append-only records and answers the
//! readiness questions the training trigger asks: how many samples per
//! category, how many are trainable, and whether that is enough.

use chrono::Utc;
use foodset_common::{CategoryRegistry, Error, Result, UNKNOWN_LABEL};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::records;
use crate::models::{DatasetStatistics, ImageRecord, LabeledSample, Partition, RecordOutcome};

/// SQLite-backed record store
#[derive(Clone)]
pub struct DatasetRecorder {
    pool: SqlitePool,
    registry: Arc<CategoryRegistry>,
    min_confidence: f64,
    trainable_threshold: u32,
}

impl DatasetRecorder {
    pub fn new(
        pool: SqlitePool,
        registry: Arc<CategoryRegistry>,
        min_confidence: f64,
        trainable_threshold: u32,
    ) -> Self {
        Self {
            pool,
            registry,
            min_confidence,
            trainable_threshold,
        }
    }

    /// Record an image with an assigned (or inferred) label
    ///
    /// An explicit label naming a registry category (key or alias) wins;
    /// otherwise the label is inferred from the description. Records with a
    /// resolved category are verified. A path that is already recorded is
    /// not accepted and reports the stored label.
    pub async fn record(
        &self,
        partition: Partition,
        path: &Path,
        description: &str,
        label: Option<&str>,
        owner_id: i64,
    ) -> Result<RecordOutcome> {
        let label = self.resolve_label(label, description);
        let verified = label != UNKNOWN_LABEL;
        self.insert(partition, path, description, label, None, verified, owner_id)
            .await
    }

    /// Record an unverified, model-predicted label with its confidence
    pub async fn record_prediction(
        &self,
        partition: Partition,
        path: &Path,
        description: &str,
        predicted_label: &str,
        confidence: f64,
        owner_id: i64,
    ) -> Result<RecordOutcome> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(Error::InvalidInput(format!(
                "confidence must be within 0.0..=1.0 (got {})",
                confidence
            )));
        }

        let label = self
            .registry
            .resolve(predicted_label)
            .map(|c| c.key.clone())
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string());

        self.insert(partition, path, description, label, Some(confidence), false, owner_id)
            .await
    }

    /// Whether a record already exists for the path
    pub async fn is_recorded(&self, path: &Path) -> Result<bool> {
        let label = records::label_for_path(&self.pool, &path.to_string_lossy()).await?;
        Ok(label.is_some())
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert(
        &self,
        partition: Partition,
        path: &Path,
        description: &str,
        label: String,
        confidence: Option<f64>,
        verified: bool,
        owner_id: i64,
    ) -> Result<RecordOutcome> {
        let image_path = path.to_string_lossy().to_string();
        let record = ImageRecord {
            id: Uuid::new_v4(),
            partition,
            image_path: image_path.clone(),
            description: description.to_string(),
            label,
            confidence,
            verified,
            owner_id,
            created_at: Utc::now(),
        };

        if records::insert_record(&self.pool, &record).await? {
            tracing::debug!(
                partition = %partition,
                path = %image_path,
                label = %record.label,
                verified,
                "Recorded image"
            );
            return Ok(RecordOutcome {
                accepted: true,
                assigned_label: record.label,
            });
        }

        let existing = records::label_for_path(&self.pool, &image_path)
            .await?
            .unwrap_or(record.label);
        tracing::debug!(path = %image_path, label = %existing, "Path already recorded");

        Ok(RecordOutcome {
            accepted: false,
            assigned_label: existing,
        })
    }

    fn resolve_label(&self, explicit: Option<&str>, description: &str) -> String {
        if let Some(category) = explicit.and_then(|l| self.registry.resolve(l)) {
            return category.key.clone();
        }
        self.registry.infer_label(description).to_string()
    }

    /// Live statistics for one partition
    pub async fn get_statistics(&self, partition: Partition) -> Result<DatasetStatistics> {
        let total = records::count_records(&self.pool, partition).await?;
        let by_category = records::count_by_label(&self.pool, partition).await?;
        let trainable = records::count_trainable(&self.pool, partition, self.min_confidence).await?;

        Ok(DatasetStatistics::new(
            total,
            by_category,
            trainable,
            self.trainable_threshold,
        ))
    }

    /// Trainable `(path, label)` pairs for the model trainer
    pub async fn labeled_samples(&self, partition: Partition) -> Result<Vec<LabeledSample>> {
        records::trainable_samples(&self.pool, partition, self.min_confidence).await
    }

    /// Human-readable readiness report
    pub async fn training_status(&self, partition: Partition) -> Result<String> {
        let stats = self.get_statistics(partition).await?;
        let mut status = format!("Partition: {}\n{}", partition, stats);
        if !stats.can_train {
            status.push_str(&format!(
                "  need {} more trainable samples\n",
                u64::from(self.trainable_threshold).saturating_sub(stats.trainable_samples)
            ));
        }
        Ok(status)
    }

    pub fn trainable_threshold(&self) -> u32 {
        self.trainable_threshold
    }
}
