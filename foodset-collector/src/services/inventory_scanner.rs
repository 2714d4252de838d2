//! Per-category image inventory
//!
//! Counts the image files sitting directly in a category directory. The
//! scanner is read-only; it never creates, renames or deletes anything.

use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Extensions counted as images (compared case-insensitively)
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "webp"];

/// Inventory scan errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Directory could not be read
    #[error("Cannot read {0}: {1}")]
    Unreadable(PathBuf, String),
}

/// Image file counter for category directories
#[derive(Debug, Clone)]
pub struct InventoryScanner {
    ignore_patterns: Vec<String>,
}

impl Default for InventoryScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl InventoryScanner {
    /// Scanner with default ignore patterns (.DS_Store, Thumbs.db)
    ///
    /// Dotfiles are always ignored.
    pub fn new() -> Self {
        Self {
            ignore_patterns: vec![".DS_Store".to_string(), "Thumbs.db".to_string()],
        }
    }

    /// Number of image files in `category_dir`
    ///
    /// A missing directory holds zero images.
    pub fn count(&self, category_dir: &Path) -> Result<usize, ScanError> {
        Ok(self.list_files(category_dir)?.len())
    }

    /// Image files in `category_dir`, sorted by path
    pub fn list_files(&self, category_dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
        if !category_dir.exists() {
            return Ok(Vec::new());
        }
        if !category_dir.is_dir() {
            return Err(ScanError::NotADirectory(category_dir.to_path_buf()));
        }

        let walker = WalkDir::new(category_dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name();

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| {
                ScanError::Unreadable(category_dir.to_path_buf(), e.to_string())
            })?;

            if entry.file_type().is_file() && !self.is_ignored(&entry) && is_image_path(entry.path())
            {
                files.push(entry.into_path());
            }
        }

        Ok(files)
    }

    /// First free numeric file index in `category_dir`
    ///
    /// `max(count, highest numeric stem) + 1`, so files named by a previous
    /// pass (or dropped in by hand) are never overwritten.
    pub fn next_index(&self, category_dir: &Path) -> Result<u32, ScanError> {
        let files = self.list_files(category_dir)?;

        let highest_stem = files
            .iter()
            .filter_map(|path| path.file_stem()?.to_str()?.parse::<u32>().ok())
            .max()
            .unwrap_or(0);

        let count = u32::try_from(files.len()).unwrap_or(u32::MAX);
        Ok(count.max(highest_stem).saturating_add(1))
    }

    fn is_ignored(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        name.starts_with('.') || self.ignore_patterns.iter().any(|p| name == p.as_str())
    }
}

/// True when the path has an image extension
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
