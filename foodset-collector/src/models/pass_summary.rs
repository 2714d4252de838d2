//! Reconciliation pass summary
//!
//! One summary per pass, persisted to `reconcile_passes`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::Partition;

/// How the pass chose its work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassMode {
    /// Request only the per-category shortfall
    Reconcile,
    /// Request the full quota for every category
    Seed,
}

impl PassMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassMode::Reconcile => "reconcile",
            PassMode::Seed => "seed",
        }
    }
}

impl fmt::Display for PassMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PassMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reconcile" => Ok(PassMode::Reconcile),
            "seed" => Ok(PassMode::Seed),
            other => Err(format!("Unknown pass mode '{}'", other)),
        }
    }
}

/// Counters and failures for one pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassSummary {
    pub pass_id: Uuid,
    pub partition: Partition,
    pub mode: PassMode,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Categories with a positive deficit
    pub categories_requested: usize,
    /// Sum of requested images
    pub images_requested: u64,
    /// Files reported written by the provider
    pub files_fetched: u64,
    /// Corrupt files removed by validation
    pub files_deleted: u64,
    /// Corrupt files that could not be removed (still on disk)
    #[serde(default)]
    pub delete_failures: u64,
    pub records_added: u64,
    /// Valid files whose path was already recorded
    pub records_skipped: u64,
    /// Files left unrecorded by an earlier pass, recorded at the start of this one
    #[serde(default)]
    pub records_recovered: u64,
    /// Valid files the recorder failed to store; recovered by the next pass
    #[serde(default)]
    pub record_errors: u64,
    pub failed_categories: Vec<String>,
    pub timed_out_categories: Vec<String>,
    /// Categories whose job never started because the pass was cancelled
    pub cancelled_categories: Vec<String>,
    /// Categories skipped because their inventory could not be read
    pub scan_errors: Vec<String>,
}

impl PassSummary {
    pub fn new(partition: Partition, mode: PassMode) -> Self {
        Self {
            pass_id: Uuid::new_v4(),
            partition,
            mode,
            started_at: Utc::now(),
            ended_at: None,
            categories_requested: 0,
            images_requested: 0,
            files_fetched: 0,
            files_deleted: 0,
            delete_failures: 0,
            records_added: 0,
            records_skipped: 0,
            records_recovered: 0,
            record_errors: 0,
            failed_categories: Vec::new(),
            timed_out_categories: Vec::new(),
            cancelled_categories: Vec::new(),
            scan_errors: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    pub fn is_cancelled(&self) -> bool {
        !self.cancelled_categories.is_empty()
    }

    /// Fetched images that survived validation and are on record
    pub fn files_accepted(&self) -> u64 {
        self.records_added + self.records_skipped
    }
}

impl fmt::Display for PassSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pass {} [{}]: {} categories, {} requested, {} fetched, {} deleted, {} recorded",
            self.mode,
            self.pass_id,
            self.partition,
            self.categories_requested,
            self.images_requested,
            self.files_fetched,
            self.files_deleted,
            self.records_added
        )?;
        if self.records_recovered > 0 {
            write!(f, ", {} recovered", self.records_recovered)?;
        }
        if self.delete_failures > 0 {
            write!(f, ", {} corrupt files could not be deleted", self.delete_failures)?;
        }
        if self.record_errors > 0 {
            write!(f, ", {} record errors", self.record_errors)?;
        }
        if !self.failed_categories.is_empty() {
            write!(f, ", failed: {}", self.failed_categories.join(", "))?;
        }
        if !self.timed_out_categories.is_empty() {
            write!(f, ", timed out: {}", self.timed_out_categories.join(", "))?;
        }
        if self.is_cancelled() {
            write!(f, ", cancelled before: {}", self.cancelled_categories.join(", "))?;
        }
        Ok(())
    }
}
