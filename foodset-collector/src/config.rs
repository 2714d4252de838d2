//! Runtime configuration for foodset-collector
//!
//! Built once at startup from the TOML bootstrap config. Every value is
//! validated here; an ill-defined worker count, quota or threshold stops the
//! process before any pass begins.

use foodset_common::config::TomlConfig;
use foodset_common::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::Partition;

/// Upper bound for the fetch worker pool
pub const MAX_WORKERS: usize = 64;

/// Validated collector settings
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Root folder holding the database and the images tree
    pub root_folder: PathBuf,
    pub train_quota: u32,
    pub eval_quota: u32,
    /// Fetch worker pool size
    pub workers: usize,
    /// Timeout applied to each provider call
    pub fetch_timeout: Duration,
    /// Trainable samples required before `can_train` turns true
    pub trainable_threshold: u32,
    /// Confidence at which an unverified prediction counts as trainable
    pub min_confidence: f64,
}

impl CollectorConfig {
    /// Validate the `[collector]` section and bind it to a root folder
    pub fn from_toml(root_folder: PathBuf, toml_config: &TomlConfig) -> Result<Self> {
        let section = &toml_config.collector;

        if section.train_quota == 0 {
            return Err(Error::Config("collector.train_quota must be positive".to_string()));
        }
        if section.eval_quota == 0 {
            return Err(Error::Config("collector.eval_quota must be positive".to_string()));
        }

        let workers = match section.workers {
            None => {
                let auto = default_worker_count();
                tracing::info!(
                    workers = auto,
                    cpu_count = num_cpus::get(),
                    "collector.workers not set, auto-detected"
                );
                auto
            }
            Some(0) => {
                return Err(Error::Config("collector.workers must be at least 1".to_string()))
            }
            Some(n) if n > MAX_WORKERS => {
                return Err(Error::Config(format!(
                    "collector.workers must be at most {} (got {})",
                    MAX_WORKERS, n
                )))
            }
            Some(n) => n,
        };

        if section.fetch_timeout_secs == 0 {
            return Err(Error::Config(
                "collector.fetch_timeout_secs must be positive".to_string(),
            ));
        }
        if section.trainable_threshold == 0 {
            return Err(Error::Config(
                "collector.trainable_threshold must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&section.min_confidence) {
            return Err(Error::Config(format!(
                "collector.min_confidence must be within 0.0..=1.0 (got {})",
                section.min_confidence
            )));
        }

        Ok(Self {
            root_folder,
            train_quota: section.train_quota,
            eval_quota: section.eval_quota,
            workers,
            fetch_timeout: Duration::from_secs(section.fetch_timeout_secs),
            trainable_threshold: section.trainable_threshold,
            min_confidence: section.min_confidence,
        })
    }

    /// Target image count per category for a partition
    pub fn quota(&self, partition: Partition) -> u32 {
        match partition {
            Partition::Train => self.train_quota,
            Partition::Eval => self.eval_quota,
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(foodset_common::config::DATABASE_FILE_NAME)
    }

    pub fn images_root(&self) -> PathBuf {
        self.root_folder.join("images")
    }

    /// Storage root of one partition (`<root>/images/<partition>`)
    pub fn partition_dir(&self, partition: Partition) -> PathBuf {
        partition.images_dir(&self.images_root())
    }

    /// Create the root folder and both partition directories
    pub fn ensure_directories(&self) -> Result<()> {
        for partition in Partition::ALL {
            std::fs::create_dir_all(self.partition_dir(partition))?;
        }
        Ok(())
    }

    /// Settings for tests and embedding: explicit values, no TOML
    pub fn for_root(root_folder: &Path, quota: u32, workers: usize) -> Self {
        Self {
            root_folder: root_folder.to_path_buf(),
            train_quota: quota,
            eval_quota: quota,
            workers: workers.max(1),
            fetch_timeout: Duration::from_secs(30),
            trainable_threshold: 20,
            min_confidence: 0.6,
        }
    }
}

/// Half the logical CPUs, at least one
pub fn default_worker_count() -> usize {
    (num_cpus::get() / 2).max(1)
}
