//! Image provider interface
//!
//! The provider is the only component that talks to the outside world. It
//! searches for a term and writes up to `max_count` image files into the
//! output directory, naming them from `start_index` upward.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// One provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Search term (category search term)
    pub term: String,
    /// Upper bound on files to write
    pub max_count: u32,
    /// Category directory; must already exist
    pub output_dir: PathBuf,
    /// First numeric file index the provider may use
    pub start_index: u32,
}

/// Provider errors
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Search returned nothing usable
    #[error("No results for '{0}'")]
    NoResults(String),

    /// Search or download request failed
    #[error("HTTP error: {0}")]
    Http(String),

    /// Remote response could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Provider needs credentials that are not configured
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    /// Writing a downloaded file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Http(err.to_string())
    }
}

/// External image source
///
/// Returns the paths of the files actually written. Fewer than `max_count`
/// files is a partial delivery, not an error.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<PathBuf>, ProviderError>;

    /// Provider name for logs
    fn name(&self) -> &'static str {
        "provider"
    }
}
