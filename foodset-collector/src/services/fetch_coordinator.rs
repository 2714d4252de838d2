//! Bounded worker pool for provider calls
//!
//! Jobs are seeded once into a bounded `flume` channel sized to the job
//! count, then the sender is dropped. Each worker loops `recv → run` until
//! the channel is drained, so every job is taken by exactly one worker and
//! no lock is held while a provider call is in flight.
//!
//! Each provider call runs in its own task under `fetch_timeout`. A call
//! that overruns is aborted and reported as `TimedOut`; other workers keep
//! draining the queue meanwhile.

use foodset_common::CategoryRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::image_provider::{FetchRequest, ImageProvider};
use super::inventory_scanner::InventoryScanner;
use super::quota_calculator::DeficitMap;

/// One category's share of a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchJob {
    pub category: String,
    pub term: String,
    pub requested: u32,
    pub output_dir: PathBuf,
}

/// How a job ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Completed,
    /// Provider error, provider panic or storage error
    Failed(String),
    TimedOut,
    /// Never started because the pass was cancelled
    Cancelled,
}

/// Result of one job; exactly one per seeded job
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub category: String,
    pub requested: u32,
    pub status: JobStatus,
    /// Files written for this job (may be partial for failed or timed-out jobs)
    pub files: Vec<PathBuf>,
    pub elapsed: Duration,
    pub worker_id: usize,
}

/// Drives provider calls for a deficit map
pub struct FetchCoordinator {
    provider: Arc<dyn ImageProvider>,
    workers: usize,
    fetch_timeout: Duration,
    scanner: InventoryScanner,
}

impl FetchCoordinator {
    pub fn new(provider: Arc<dyn ImageProvider>, workers: usize, fetch_timeout: Duration) -> Self {
        Self {
            provider,
            workers: workers.max(1),
            fetch_timeout,
            scanner: InventoryScanner::new(),
        }
    }

    /// Build jobs for every positive deficit under `partition_root`
    pub fn plan_jobs(
        registry: &CategoryRegistry,
        deficits: &DeficitMap,
        partition_root: &Path,
    ) -> Vec<FetchJob> {
        deficits
            .iter()
            .filter(|(_, &requested)| requested > 0)
            .map(|(key, &requested)| FetchJob {
                category: key.clone(),
                term: registry
                    .get(key)
                    .map(|c| c.search_term().to_string())
                    .unwrap_or_else(|| key.clone()),
                requested,
                output_dir: partition_root.join(key),
            })
            .collect()
    }

    /// Run all jobs and return one outcome per job
    ///
    /// Cancellation is checked before each job starts; jobs still queued are
    /// reported as `Cancelled`. Calls already in flight finish or time out.
    pub async fn run(&self, jobs: Vec<FetchJob>, cancel: &CancellationToken) -> Vec<JobOutcome> {
        if jobs.is_empty() {
            return Vec::new();
        }

        let job_count = jobs.len();
        let worker_count = self.workers.min(job_count);
        let pass_start = Instant::now();

        tracing::info!(
            jobs = job_count,
            workers = worker_count,
            timeout_secs = self.fetch_timeout.as_secs(),
            provider = self.provider.name(),
            "Starting fetch workers"
        );

        let (tx, rx) = flume::bounded::<FetchJob>(job_count);
        let mut outcomes = Vec::with_capacity(job_count);
        for job in jobs {
            if let Err(err) = tx.try_send(job) {
                // capacity equals job count, so this only fires if a receiver vanished
                let job = err.into_inner();
                tracing::error!(category = %job.category, "Could not queue fetch job");
                outcomes.push(JobOutcome {
                    category: job.category,
                    requested: job.requested,
                    status: JobStatus::Failed("queue unavailable".to_string()),
                    files: Vec::new(),
                    elapsed: Duration::ZERO,
                    worker_id: 0,
                });
            }
        }
        drop(tx);

        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            let context = WorkerContext {
                worker_id,
                provider: Arc::clone(&self.provider),
                fetch_timeout: self.fetch_timeout,
                scanner: self.scanner.clone(),
                cancel: cancel.clone(),
            };
            let rx = rx.clone();
            workers.spawn(async move { context.drain(rx).await });
        }
        drop(rx);

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(worker_outcomes) => outcomes.extend(worker_outcomes),
                Err(e) => tracing::error!(error = %e, "Fetch worker task failed"),
            }
        }

        tracing::info!(
            jobs = outcomes.len(),
            completed = outcomes.iter().filter(|o| o.status == JobStatus::Completed).count(),
            elapsed_ms = pass_start.elapsed().as_millis() as u64,
            "Fetch workers finished"
        );

        outcomes
    }
}

struct WorkerContext {
    worker_id: usize,
    provider: Arc<dyn ImageProvider>,
    fetch_timeout: Duration,
    scanner: InventoryScanner,
    cancel: CancellationToken,
}

impl WorkerContext {
    async fn drain(self, rx: flume::Receiver<FetchJob>) -> Vec<JobOutcome> {
        let mut outcomes = Vec::new();

        while let Ok(job) = rx.recv_async().await {
            if self.cancel.is_cancelled() {
                tracing::debug!(
                    worker_id = self.worker_id,
                    category = %job.category,
                    "Pass cancelled, job not started"
                );
                outcomes.push(self.outcome(job, JobStatus::Cancelled, Vec::new(), Duration::ZERO));
                continue;
            }
            outcomes.push(self.run_job(job).await);
        }

        outcomes
    }

    async fn run_job(&self, job: FetchJob) -> JobOutcome {
        let started = Instant::now();

        if let Err(e) = tokio::fs::create_dir_all(&job.output_dir).await {
            tracing::error!(
                category = %job.category,
                dir = %job.output_dir.display(),
                error = %e,
                "Cannot create category directory"
            );
            let status = JobStatus::Failed(format!("storage error: {}", e));
            return self.outcome(job, status, Vec::new(), started.elapsed());
        }

        let scanner = self.scanner.clone();
        let dir = job.output_dir.clone();
        let next_index = tokio::task::spawn_blocking(move || {
            scanner.next_index(&dir).map_err(|e| e.to_string())
        })
        .await
        .unwrap_or_else(|join_err| Err(format!("scan task failed: {}", join_err)));

        let start_index = match next_index {
            Ok(index) => index,
            Err(e) => {
                let status = JobStatus::Failed(format!("storage error: {}", e));
                return self.outcome(job, status, Vec::new(), started.elapsed());
            }
        };

        let request = FetchRequest {
            term: job.term.clone(),
            max_count: job.requested,
            output_dir: job.output_dir.clone(),
            start_index,
        };

        tracing::info!(
            worker_id = self.worker_id,
            category = %job.category,
            requested = job.requested,
            start_index,
            "Fetching images"
        );

        let provider = Arc::clone(&self.provider);
        let mut call = tokio::spawn(async move { provider.fetch(&request).await });

        let (status, files) = match tokio::time::timeout(self.fetch_timeout, &mut call).await {
            Ok(Ok(Ok(files))) => (JobStatus::Completed, files),
            Ok(Ok(Err(e))) => {
                tracing::warn!(category = %job.category, error = %e, "Provider call failed");
                let partial = self.partial_files(&job.output_dir, start_index).await;
                (JobStatus::Failed(e.to_string()), partial)
            }
            Ok(Err(join_err)) => {
                tracing::error!(category = %job.category, error = %join_err, "Provider task panicked");
                let partial = self.partial_files(&job.output_dir, start_index).await;
                (JobStatus::Failed(format!("provider task failed: {}", join_err)), partial)
            }
            Err(_) => {
                call.abort();
                tracing::warn!(
                    category = %job.category,
                    timeout_secs = self.fetch_timeout.as_secs_f64(),
                    "Provider call timed out"
                );
                (JobStatus::TimedOut, self.partial_files(&job.output_dir, start_index).await)
            }
        };

        let elapsed = started.elapsed();
        tracing::info!(
            worker_id = self.worker_id,
            category = %job.category,
            requested = job.requested,
            delivered = files.len(),
            status = ?status,
            elapsed_ms = elapsed.as_millis() as u64,
            "Fetch job finished"
        );

        self.outcome(job, status, files, elapsed)
    }

    /// Files a provider wrote at or above `start_index` before it stopped
    async fn partial_files(&self, dir: &Path, start_index: u32) -> Vec<PathBuf> {
        let scanner = self.scanner.clone();
        let dir = dir.to_path_buf();
        tokio::task::spawn_blocking(move || written_since(&scanner, &dir, start_index))
            .await
            .unwrap_or_default()
    }

    fn outcome(
        &self,
        job: FetchJob,
        status: JobStatus,
        files: Vec<PathBuf>,
        elapsed: Duration,
    ) -> JobOutcome {
        JobOutcome {
            category: job.category,
            requested: job.requested,
            status,
            files,
            elapsed,
            worker_id: self.worker_id,
        }
    }
}

/// Image files in `dir` whose numeric stem is at or above `start_index`
fn written_since(scanner: &InventoryScanner, dir: &Path, start_index: u32) -> Vec<PathBuf> {
    scanner
        .list_files(dir)
        .unwrap_or_default()
        .into_iter()
        .filter(|path| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u32>().ok())
                .map(|n| n >= start_index)
                .unwrap_or(false)
        })
        .collect()
}
