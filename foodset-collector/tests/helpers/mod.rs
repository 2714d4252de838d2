//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use foodset_collector::config::CollectorConfig;
use foodset_collector::models::Partition;
use foodset_collector::services::{FetchRequest, ImageProvider, ProviderError, Reconciler};
use foodset_common::CategoryRegistry;
use image::{ImageBuffer, Rgb};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Write a small valid PNG
pub fn write_png(path: &Path) {
    let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(8, 8, Rgb([30, 160, 60]));
    img.save_with_format(path, image::ImageFormat::Png).unwrap();
}

/// Write bytes that no decoder accepts
pub fn write_corrupt(path: &Path) {
    std::fs::write(path, b"<html>403 Forbidden</html>").unwrap();
}

/// Fill a category directory with `n` valid images named 000001.png..
pub fn fill_category(partition_dir: &Path, category: &str, n: u32) -> Vec<PathBuf> {
    let dir = partition_dir.join(category);
    std::fs::create_dir_all(&dir).unwrap();
    (1..=n)
        .map(|i| {
            let path = dir.join(format!("{:06}.png", i));
            write_png(&path);
            path
        })
        .collect()
}

/// Scriptable in-process image provider
#[derive(Default)]
pub struct FakeProvider {
    /// Cap on files written per call (None = up to max_count)
    deliver: Option<u32>,
    /// Zero-based offsets within a call that are written corrupt
    corrupt_offsets: HashSet<u32>,
    /// Terms that fail with NoResults
    failing: HashSet<String>,
    /// Per-term delay before writing
    delays: HashMap<String, Duration>,
    /// Delay for terms without an explicit one
    default_delay: Option<Duration>,
    /// Term → number of calls
    calls: Mutex<HashMap<String, u32>>,
    /// Every request seen
    requests: Mutex<Vec<FetchRequest>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivering(mut self, n: u32) -> Self {
        self.deliver = Some(n);
        self
    }

    pub fn corrupt_at(mut self, offset: u32) -> Self {
        self.corrupt_offsets.insert(offset);
        self
    }

    pub fn failing_for(mut self, term: &str) -> Self {
        self.failing.insert(term.to_string());
        self
    }

    pub fn delay_for(mut self, term: &str, delay: Duration) -> Self {
        self.delays.insert(term.to_string(), delay);
        self
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> HashMap<String, u32> {
        self.calls.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageProvider for FakeProvider {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<PathBuf>, ProviderError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(request.term.clone())
            .or_insert(0) += 1;
        self.requests.lock().unwrap().push(request.clone());

        let delay = self.delays.get(&request.term).copied().or(self.default_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.contains(&request.term) {
            return Err(ProviderError::NoResults(request.term.clone()));
        }

        let count = self.deliver.map_or(request.max_count, |d| d.min(request.max_count));
        let mut files = Vec::new();
        for offset in 0..count {
            let path = request
                .output_dir
                .join(format!("{:06}.png", request.start_index + offset));
            if path.exists() {
                return Err(ProviderError::Io(std::io::Error::other(format!(
                    "would overwrite {}",
                    path.display()
                ))));
            }
            if self.corrupt_offsets.contains(&offset) {
                write_corrupt(&path);
            } else {
                write_png(&path);
            }
            files.push(path);
        }
        Ok(files)
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Isolated root folder, database and registry
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub config: Arc<CollectorConfig>,
    pub registry: Arc<CategoryRegistry>,
    pub pool: SqlitePool,
}

impl TestEnv {
    pub async fn new(categories: &[&str], quota: u32, workers: usize) -> Self {
        Self::with_config(categories, |root| CollectorConfig::for_root(root, quota, workers)).await
    }

    pub async fn with_config<F>(categories: &[&str], build: F) -> Self
    where
        F: FnOnce(&Path) -> CollectorConfig,
    {
        let temp_dir = TempDir::new().unwrap();
        let config = build(temp_dir.path());
        config.ensure_directories().unwrap();
        let pool = foodset_collector::db::init_database_pool(&config.database_path())
            .await
            .unwrap();
        let registry = CategoryRegistry::from_keys(categories.iter().copied()).unwrap();

        Self {
            temp_dir,
            config: Arc::new(config),
            registry: Arc::new(registry),
            pool,
        }
    }

    pub fn partition_dir(&self, partition: Partition) -> PathBuf {
        self.config.partition_dir(partition)
    }

    pub fn reconciler(&self, provider: Arc<dyn ImageProvider>) -> Reconciler {
        Reconciler::new(
            Arc::clone(&self.config),
            Arc::clone(&self.registry),
            self.pool.clone(),
            provider,
        )
    }
}
