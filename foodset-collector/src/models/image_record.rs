//! Image records and dataset statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::Partition;

/// Owner id used for images seeded by the collector itself
pub const SYSTEM_OWNER_ID: i64 = 0;

/// Description stored for collector-seeded images
pub const SYSTEM_DESCRIPTION: &str = "system_image_adding";

/// One accepted image (append-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: Uuid,
    pub partition: Partition,
    pub image_path: String,
    pub description: String,
    /// Category key or `unknown`
    pub label: String,
    /// Model confidence for predicted labels; None for assigned labels
    pub confidence: Option<f64>,
    pub verified: bool,
    /// 0 for system-seeded images
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Result of a recorder call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutcome {
    /// False when the path was already recorded
    pub accepted: bool,
    /// Label stored for the path
    pub assigned_label: String,
}

/// Live aggregate over one partition's records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetStatistics {
    pub total_images: u64,
    pub by_category: BTreeMap<String, u64>,
    pub trainable_samples: u64,
    pub can_train: bool,
}

impl DatasetStatistics {
    /// Build statistics, deriving the readiness flag from the threshold
    pub fn new(
        total_images: u64,
        by_category: BTreeMap<String, u64>,
        trainable_samples: u64,
        threshold: u32,
    ) -> Self {
        Self {
            total_images,
            by_category,
            trainable_samples,
            can_train: trainable_samples >= u64::from(threshold),
        }
    }
}

impl fmt::Display for DatasetStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dataset statistics:")?;
        writeln!(f, "  total images:      {}", self.total_images)?;
        writeln!(f, "  trainable samples: {}", self.trainable_samples)?;
        writeln!(
            f,
            "  can train:         {}",
            if self.can_train { "yes" } else { "no" }
        )?;
        if !self.by_category.is_empty() {
            writeln!(f, "  by category:")?;
            for (category, count) in &self.by_category {
                writeln!(f, "    {}: {}", category, count)?;
            }
        }
        Ok(())
    }
}

/// Training example exported to the model trainer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledSample {
    pub path: String,
    pub label: String,
}
