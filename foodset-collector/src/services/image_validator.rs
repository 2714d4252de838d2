//! Downloaded image validation
//!
//! Every file is fully decoded (format guessed from content, not from the
//! extension). Files that fail to decode are deleted so they can never be
//! recorded or counted as inventory.

use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};

use super::inventory_scanner::{InventoryScanner, ScanError};

/// Validation result for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileVerdict {
    Valid,
    /// Corrupt file removed
    Deleted { reason: String },
    /// Corrupt file that could not be removed
    DeleteFailed { reason: String, error: String },
    /// Nothing at the path; never counted as deleted
    Missing,
}

/// Outcome of validating a batch of files
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub valid: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
    pub delete_errors: Vec<(PathBuf, String)>,
    pub missing: Vec<PathBuf>,
}

impl ValidationReport {
    pub fn merge(&mut self, other: ValidationReport) {
        self.valid.extend(other.valid);
        self.deleted.extend(other.deleted);
        self.delete_errors.extend(other.delete_errors);
        self.missing.extend(other.missing);
    }

    pub fn checked(&self) -> usize {
        self.valid.len() + self.deleted.len() + self.delete_errors.len() + self.missing.len()
    }
}

/// Decodes images on the blocking pool and removes corrupt ones
#[derive(Debug, Clone)]
pub struct ImageValidator {
    concurrency: usize,
    scanner: InventoryScanner,
}

impl Default for ImageValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageValidator {
    pub fn new() -> Self {
        Self {
            concurrency: num_cpus::get().max(1),
            scanner: InventoryScanner::new(),
        }
    }

    /// Decode one file; delete it if decoding fails
    pub async fn validate_file(&self, path: &Path) -> FileVerdict {
        if !tokio::fs::try_exists(path).await.unwrap_or(true) {
            tracing::debug!(path = %path.display(), "Image path does not exist");
            return FileVerdict::Missing;
        }

        let owned = path.to_path_buf();
        let decoded = tokio::task::spawn_blocking(move || decode(&owned)).await;

        let reason = match decoded {
            Ok(Ok(())) => return FileVerdict::Valid,
            Ok(Err(reason)) => reason,
            Err(join_err) => format!("decoder task failed: {}", join_err),
        };

        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                tracing::warn!(path = %path.display(), reason = %reason, "Deleted corrupt image");
                FileVerdict::Deleted { reason }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Image vanished during validation");
                FileVerdict::Missing
            }
            Err(e) => {
                tracing::error!(
                    path = %path.display(),
                    reason = %reason,
                    error = %e,
                    "Could not delete corrupt image"
                );
                FileVerdict::DeleteFailed {
                    reason,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Validate a batch; never fails as a whole
    pub async fn validate_files(&self, paths: &[PathBuf]) -> ValidationReport {
        let verdicts: Vec<(PathBuf, FileVerdict)> = stream::iter(paths.iter().cloned())
            .map(|path| async move {
                let verdict = self.validate_file(&path).await;
                (path, verdict)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = ValidationReport::default();
        for (path, verdict) in verdicts {
            match verdict {
                FileVerdict::Valid => report.valid.push(path),
                FileVerdict::Deleted { .. } => report.deleted.push(path),
                FileVerdict::DeleteFailed { error, .. } => report.delete_errors.push((path, error)),
                FileVerdict::Missing => report.missing.push(path),
            }
        }
        report.valid.sort();
        report.deleted.sort();

        tracing::debug!(
            checked = report.checked(),
            valid = report.valid.len(),
            deleted = report.deleted.len(),
            "Validated image batch"
        );

        report
    }

    /// Validate every image-extension file in a directory
    pub async fn validate_directory(&self, dir: &Path) -> Result<ValidationReport, ScanError> {
        let files = self.scanner.list_files(dir)?;
        Ok(self.validate_files(&files).await)
    }
}

fn decode(path: &Path) -> Result<(), String> {
    image::ImageReader::open(path)
        .map_err(|e| e.to_string())?
        .with_guessed_format()
        .map_err(|e| e.to_string())?
        .decode()
        .map(|_| ())
        .map_err(|e| e.to_string())
}
