//! HTTP image search provider
//!
//! Talks to a Bing-Image-Search-style API: one search request per job, then
//! one download per hit. Both share a token bucket limiter so a whole worker
//! pool stays within `requests_per_second`.

use async_trait::async_trait;
use foodset_common::config::ProviderSection;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use super::image_provider::{FetchRequest, ImageProvider, ProviderError};

/// Per-download timeout
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Search request timeout
const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Header carrying the API key
const API_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// The search API caps `count` at 150
const MAX_SEARCH_COUNT: u32 = 150;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    value: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchHit {
    content_url: String,
    #[serde(default)]
    encoding_format: Option<String>,
}

/// Image search + download client
pub struct HttpImageProvider {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    min_width: u32,
    min_height: u32,
    rate_limiter: DefaultDirectRateLimiter,
}

impl HttpImageProvider {
    /// Build from the `[provider]` section and a resolved API key
    pub fn new(section: &ProviderSection, api_key: Option<String>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("foodset-collector/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let per_second = NonZeroU32::new(section.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            endpoint: section.endpoint.clone(),
            api_key,
            min_width: section.min_width,
            min_height: section.min_height,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    async fn search(&self, term: &str, count: u32) -> Result<Vec<SearchHit>, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ProviderError::NotConfigured("image search API key is not set".to_string())
        })?;

        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(&self.endpoint)
            .header(API_KEY_HEADER, api_key)
            .query(&[
                ("q", term.to_string()),
                ("count", count.min(MAX_SEARCH_COUNT).to_string()),
                ("minWidth", self.min_width.to_string()),
                ("minHeight", self.min_height.to_string()),
            ])
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Http(format!("search returned {}", status)));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(body.value)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        self.rate_limiter.until_ready().await;

        let response = self.client.get(url).timeout(DOWNLOAD_TIMEOUT).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Http(format!("download returned {}", status)));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ProviderError::InvalidResponse("empty body".to_string()));
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ImageProvider for HttpImageProvider {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<PathBuf>, ProviderError> {
        if request.max_count == 0 {
            return Ok(Vec::new());
        }

        // ask for extra hits, some downloads always fail
        let hits = self
            .search(&request.term, request.max_count.saturating_mul(2))
            .await?;
        if hits.is_empty() {
            return Err(ProviderError::NoResults(request.term.clone()));
        }

        let mut written = Vec::new();
        let mut next_index = request.start_index;
        let mut failures = 0usize;

        for hit in &hits {
            if written.len() >= request.max_count as usize {
                break;
            }

            let bytes = match self.download(&hit.content_url).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    failures += 1;
                    tracing::debug!(url = %hit.content_url, error = %e, "Download failed");
                    continue;
                }
            };

            let extension = extension_for(hit.encoding_format.as_deref(), &hit.content_url);
            let (path, used_index) =
                write_new_file(&request.output_dir, next_index, extension, &bytes).await?;
            next_index = used_index + 1;
            written.push(path);
        }

        tracing::debug!(
            term = %request.term,
            hits = hits.len(),
            written = written.len(),
            failures,
            "Provider fetch finished"
        );

        if written.is_empty() {
            return Err(ProviderError::Http(format!(
                "all {} downloads for '{}' failed",
                failures, request.term
            )));
        }

        Ok(written)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// File extension for a hit, from its encoding format or URL
fn extension_for(encoding_format: Option<&str>, url: &str) -> &'static str {
    let from_url = url
        .split(['?', '#'])
        .next()
        .and_then(|u| u.rsplit('.').next())
        .map(|ext| ext.to_ascii_lowercase());

    let candidate = encoding_format
        .map(|f| f.to_ascii_lowercase())
        .or(from_url)
        .unwrap_or_default();

    match candidate.as_str() {
        "png" => "png",
        "bmp" => "bmp",
        "gif" | "animatedgif" => "gif",
        "webp" => "webp",
        _ => "jpg",
    }
}

/// Write bytes to the first free `NNNNNN.<ext>` name at or above `index`
///
/// Existing files are never overwritten.
async fn write_new_file(
    dir: &Path,
    mut index: u32,
    extension: &str,
    bytes: &[u8],
) -> Result<(PathBuf, u32), ProviderError> {
    loop {
        let path = dir.join(format!("{:06}.{}", index, extension));
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(mut file) => {
                file.write_all(bytes).await?;
                file.flush().await?;
                return Ok((path, index));
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                index = index.checked_add(1).ok_or_else(|| {
                    ProviderError::Io(std::io::Error::other("file index space exhausted"))
                })?;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extension_from_encoding_format() {
        assert_eq!(extension_for(Some("png"), "http://x/a"), "png");
        assert_eq!(extension_for(Some("jpeg"), "http://x/a.png"), "jpg");
        assert_eq!(extension_for(Some("animatedgif"), "http://x/a"), "gif");
    }

    #[test]
    fn test_extension_from_url() {
        assert_eq!(extension_for(None, "http://x/img.WEBP?size=large"), "webp");
        assert_eq!(extension_for(None, "http://x/img"), "jpg");
    }

    #[tokio::test]
    async fn test_write_new_file_skips_existing_names() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("000003.jpg"), b"old").unwrap();

        let (path, index) = write_new_file(temp_dir.path(), 3, "jpg", b"new").await.unwrap();
        assert_eq!(index, 4);
        assert_eq!(path, temp_dir.path().join("000004.jpg"));
        assert_eq!(std::fs::read(temp_dir.path().join("000003.jpg")).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_missing_api_key_is_not_configured() {
        let temp_dir = TempDir::new().unwrap();
        let provider = HttpImageProvider::new(&ProviderSection::default(), None).unwrap();
        let err = provider
            .fetch(&FetchRequest {
                term: "лимон".to_string(),
                max_count: 2,
                output_dir: temp_dir.path().to_path_buf(),
                start_index: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
