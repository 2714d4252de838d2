//! Reconciliation pass orchestration
//!
//! One pass: record files an earlier pass left unrecorded → deficit (or
//! seed) → fetch workers → per job validate then record → persist the
//! summary. Per-job and per-file failures are folded
//! into the summary; only database failures on the summary itself abort a
//! pass.

use foodset_common::{CategoryRegistry, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::dataset_recorder::DatasetRecorder;
use super::fetch_coordinator::{FetchCoordinator, JobOutcome, JobStatus};
use super::image_provider::ImageProvider;
use super::image_validator::{ImageValidator, ValidationReport};
use super::inventory_scanner::InventoryScanner;
use super::quota_calculator::QuotaCalculator;
use crate::config::CollectorConfig;
use crate::db;
use crate::models::{Partition, PassMode, PassSummary, SYSTEM_DESCRIPTION, SYSTEM_OWNER_ID};

/// Result of registering files already on disk
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub files_checked: usize,
    pub files_deleted: usize,
    pub delete_failures: usize,
    pub records_added: u64,
    pub records_skipped: u64,
    pub record_errors: u64,
    pub scan_errors: Vec<String>,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "checked {} files, deleted {}, recorded {}, already recorded {}",
            self.files_checked, self.files_deleted, self.records_added, self.records_skipped
        )?;
        if self.delete_failures > 0 {
            write!(f, ", could not delete {}", self.delete_failures)?;
        }
        if self.record_errors > 0 {
            write!(f, ", record errors {}", self.record_errors)?;
        }
        if !self.scan_errors.is_empty() {
            write!(f, ", scan errors: {}", self.scan_errors.join("; "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct RecordTally {
    added: u64,
    skipped: u64,
    errors: u64,
}

/// Corrupt files removed vs. corrupt files still on disk
fn count_rejections(summary: &mut PassSummary, report: &ValidationReport) {
    summary.files_deleted += report.deleted.len() as u64;
    summary.delete_failures += report.delete_errors.len() as u64;
}

/// Runs passes for one collector instance
pub struct Reconciler {
    config: Arc<CollectorConfig>,
    registry: Arc<CategoryRegistry>,
    pool: SqlitePool,
    coordinator: FetchCoordinator,
    calculator: QuotaCalculator,
    scanner: InventoryScanner,
    validator: ImageValidator,
    recorder: DatasetRecorder,
}

impl Reconciler {
    pub fn new(
        config: Arc<CollectorConfig>,
        registry: Arc<CategoryRegistry>,
        pool: SqlitePool,
        provider: Arc<dyn ImageProvider>,
    ) -> Self {
        let recorder = DatasetRecorder::new(
            pool.clone(),
            Arc::clone(&registry),
            config.min_confidence,
            config.trainable_threshold,
        );
        let coordinator = FetchCoordinator::new(provider, config.workers, config.fetch_timeout);

        Self {
            config,
            registry,
            pool,
            coordinator,
            calculator: QuotaCalculator::default(),
            scanner: InventoryScanner::new(),
            validator: ImageValidator::new(),
            recorder,
        }
    }

    pub fn recorder(&self) -> &DatasetRecorder {
        &self.recorder
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Run a full pass for one partition
    pub async fn run_pass(
        &self,
        partition: Partition,
        mode: PassMode,
        cancel: &CancellationToken,
    ) -> Result<PassSummary> {
        self.execute(PassSummary::new(partition, mode), cancel).await
    }

    /// Run a pass whose summary (and id) was created by the caller
    pub async fn execute(
        &self,
        mut summary: PassSummary,
        cancel: &CancellationToken,
    ) -> Result<PassSummary> {
        let partition = summary.partition;
        let partition_root = self.config.partition_dir(partition);
        let quota = self.config.quota(partition);

        db::passes::save_pass(&self.pool, &summary).await?;
        tokio::fs::create_dir_all(&partition_root).await?;

        tracing::info!(
            pass_id = %summary.pass_id,
            partition = %partition,
            mode = %summary.mode,
            quota,
            "Reconciliation pass started"
        );

        self.recover_unrecorded(&mut summary).await;

        let deficits = match summary.mode {
            PassMode::Reconcile => {
                let report = self.calculator.compute(&self.registry, quota, &partition_root);
                summary.scan_errors = report
                    .errors
                    .iter()
                    .map(|f| format!("{}: {}", f.category, f.error))
                    .collect();
                report.deficits
            }
            PassMode::Seed => QuotaCalculator::seed(&self.registry, quota),
        };

        summary.categories_requested = deficits.len();
        summary.images_requested = deficits.values().map(|&n| u64::from(n)).sum();

        if deficits.is_empty() {
            tracing::info!(pass_id = %summary.pass_id, "Every category meets its quota");
        }

        let jobs = FetchCoordinator::plan_jobs(&self.registry, &deficits, &partition_root);
        let outcomes = self.coordinator.run(jobs, cancel).await;

        for outcome in outcomes {
            self.absorb(&mut summary, outcome).await;
        }

        summary.failed_categories.sort();
        summary.timed_out_categories.sort();
        summary.cancelled_categories.sort();
        summary.finish();
        db::passes::save_pass(&self.pool, &summary).await?;

        tracing::info!(pass_id = %summary.pass_id, "{}", summary);

        Ok(summary)
    }

    /// Validate and record one job's files, then fold the job into the summary
    async fn absorb(&self, summary: &mut PassSummary, outcome: JobOutcome) {
        match &outcome.status {
            JobStatus::Completed => {}
            JobStatus::Failed(_) => summary.failed_categories.push(outcome.category.clone()),
            JobStatus::TimedOut => summary.timed_out_categories.push(outcome.category.clone()),
            JobStatus::Cancelled => {
                summary.cancelled_categories.push(outcome.category.clone());
                return;
            }
        }

        summary.files_fetched += outcome.files.len() as u64;
        if outcome.files.is_empty() {
            return;
        }

        let report = self.validator.validate_files(&outcome.files).await;
        count_rejections(summary, &report);

        let tally = self
            .record_files(summary.partition, &outcome.category, &report.valid)
            .await;
        summary.records_added += tally.added;
        summary.records_skipped += tally.skipped;
        summary.record_errors += tally.errors;
    }

    /// Validate and record files already on disk that have no record
    ///
    /// Covers files an interrupted or failed pass fetched but never
    /// recorded. Records stay in step with the inventory the deficit is
    /// computed from.
    async fn recover_unrecorded(&self, summary: &mut PassSummary) {
        let partition = summary.partition;
        let partition_root = self.config.partition_dir(partition);

        for category in self.registry.iter() {
            // unreadable directories are reported by the quota calculator
            let Ok(files) = self.scanner.list_files(&partition_root.join(&category.key)) else {
                continue;
            };

            let mut unrecorded = Vec::new();
            for path in files {
                match self.recorder.is_recorded(&path).await {
                    Ok(true) => {}
                    Ok(false) => unrecorded.push(path),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Record lookup failed");
                        summary.record_errors += 1;
                    }
                }
            }
            if unrecorded.is_empty() {
                continue;
            }

            tracing::info!(
                category = %category.key,
                files = unrecorded.len(),
                "Recording files left unrecorded by an earlier pass"
            );

            let report = self.validator.validate_files(&unrecorded).await;
            count_rejections(summary, &report);

            let tally = self.record_files(partition, &category.key, &report.valid).await;
            summary.records_recovered += tally.added;
            summary.record_errors += tally.errors;
        }
    }

    /// Record valid files under a category
    async fn record_files(&self, partition: Partition, category: &str, files: &[PathBuf]) -> RecordTally {
        let mut tally = RecordTally::default();

        for path in files {
            match self
                .recorder
                .record(partition, path, SYSTEM_DESCRIPTION, Some(category), SYSTEM_OWNER_ID)
                .await
            {
                Ok(outcome) if outcome.accepted => tally.added += 1,
                Ok(_) => tally.skipped += 1,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        category,
                        error = %e,
                        "Failed to record image"
                    );
                    tally.errors += 1;
                }
            }
        }

        tally
    }

    /// Validate and record every image already on disk in a partition
    ///
    /// Safe to repeat: recorded paths are skipped.
    pub async fn sync_partition(&self, partition: Partition) -> Result<SyncReport> {
        let partition_root = self.config.partition_dir(partition);
        let mut report = SyncReport::default();

        for category in self.registry.iter() {
            let dir = partition_root.join(&category.key);
            let validation = match self.validator.validate_directory(&dir).await {
                Ok(validation) => validation,
                Err(e) => {
                    tracing::warn!(category = %category.key, error = %e, "Skipping category in sync");
                    report.scan_errors.push(format!("{}: {}", category.key, e));
                    continue;
                }
            };

            report.files_checked += validation.checked();
            report.files_deleted += validation.deleted.len();
            report.delete_failures += validation.delete_errors.len();

            let tally = self
                .record_files(partition, &category.key, &validation.valid)
                .await;
            report.records_added += tally.added;
            report.records_skipped += tally.skipped;
            report.record_errors += tally.errors;
        }

        tracing::info!(partition = %partition, "Sync finished: {}", report);
        Ok(report)
    }

    /// Validate every category directory, deleting corrupt files
    pub async fn sweep(&self, partition: Partition) -> Result<ValidationReport> {
        let partition_root = self.config.partition_dir(partition);
        let mut report = ValidationReport::default();

        for category in self.registry.iter() {
            let dir = partition_root.join(&category.key);
            match self.validator.validate_directory(&dir).await {
                Ok(validation) => report.merge(validation),
                Err(e) => tracing::warn!(category = %category.key, error = %e, "Skipping category in sweep"),
            }
        }

        tracing::info!(
            partition = %partition,
            checked = report.checked(),
            deleted = report.deleted.len(),
            "Sweep finished"
        );
        Ok(report)
    }

    /// Current image count per category on disk
    pub fn inventory(&self, partition: Partition) -> Vec<(String, usize)> {
        let partition_root = self.config.partition_dir(partition);
        self.registry
            .keys()
            .map(|key| {
                let count = self.scanner.count(&partition_root.join(key)).unwrap_or(0);
                (key.to_string(), count)
            })
            .collect()
    }
}
