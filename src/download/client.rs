//! HTTP client wrapper for page fetches and streaming document downloads.
//!
//! One [`HttpClient`] is created per run and reused for every request,
//! taking advantage of connection pooling. Document downloads stream the
//! response body to a `.part` temp file while updating a SHA-256 hasher,
//! then atomically rename to the final name - a failed download never
//! leaves a file under its final name.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument, warn};
use url::Url;

use super::constants::CONNECT_TIMEOUT_SECS;
use super::error::DownloadError;
use super::filename::{derive_filename, resolve_unique_path};
use crate::config::CrawlerConfig;
use crate::document::CandidateLink;
use crate::storage::TEMP_SUFFIX;

/// Content-type prefixes that can never be a document payload.
///
/// Servers that have lost a PDF (or sit behind a misconfigured proxy)
/// commonly answer 200 with an HTML error or landing page.
const REJECTED_CONTENT_TYPES: [&str; 2] = ["text/html", "application/xhtml"];

/// HTTP client for crawling pages and downloading documents.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

/// Result of one successful streaming download.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    /// Final path of the stored file.
    pub path: PathBuf,
    /// Lowercase hex SHA-256 of the stored bytes.
    pub sha256: String,
    /// Stored size in bytes.
    pub size: u64,
}

impl HttpClient {
    /// Creates a client configured from the crawler config (per-request
    /// timeout, User-Agent, gzip decompression).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn from_config(config: &CrawlerConfig) -> Self {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(config.request_timeout())
            .user_agent(config.user_agent().to_string())
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Fetches a page body as text.
    ///
    /// Used by the discovery engine; enforces the same timeout and
    /// User-Agent as document downloads.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] for network errors, timeouts, and non-2xx
    /// statuses.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_page(&self, url: &str) -> Result<String, DownloadError> {
        let response = self.send_get(url).await?;
        response
            .text()
            .await
            .map_err(|e| DownloadError::network(url, e))
    }

    /// Downloads a candidate document into `dest_dir`.
    ///
    /// The body is streamed in chunks; each chunk is written to a
    /// `<final>.part` temp file and fed to the SHA-256 hasher in the same
    /// pass, so large files are never held in memory and never read twice.
    /// On success the temp file is renamed to its final name; on any
    /// failure the temp file is removed.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] for invalid URLs, network failures,
    /// timeouts, error statuses, HTML responses, and IO failures.
    #[instrument(skip(self, link), fields(url = %link.url))]
    pub async fn download_document(
        &self,
        link: &CandidateLink,
        dest_dir: &Path,
    ) -> Result<DownloadedFile, DownloadError> {
        if Url::parse(&link.url).is_err() {
            return Err(DownloadError::invalid_url(&link.url));
        }

        let response = self.send_get(&link.url).await?;

        if let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            let normalized = content_type.trim().to_ascii_lowercase();
            if REJECTED_CONTENT_TYPES
                .iter()
                .any(|rejected| normalized.starts_with(rejected))
            {
                return Err(DownloadError::unsupported_content_type(
                    &link.url,
                    content_type,
                ));
            }
        }

        let final_path = resolve_unique_path(dest_dir, &derive_filename(link));
        let temp_path = temp_path_for(&final_path);

        let result = stream_to_temp(response, &link.url, &temp_path).await;

        match result {
            Ok((sha256, size)) => {
                tokio::fs::rename(&temp_path, &final_path)
                    .await
                    .map_err(|e| {
                        remove_temp(&temp_path);
                        DownloadError::io(final_path.clone(), e)
                    })?;
                debug!(path = %final_path.display(), size, "download stored");
                Ok(DownloadedFile {
                    path: final_path,
                    sha256,
                    size,
                })
            }
            Err(e) => {
                remove_temp(&temp_path);
                Err(e)
            }
        }
    }

    async fn send_get(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            return Err(DownloadError::http_status_with_retry_after(
                url,
                status,
                retry_after,
            ));
        }

        Ok(response)
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

/// Streams the response body to the temp file, hashing in the same pass.
///
/// Extracted so the caller can clean up the temp file on error.
async fn stream_to_temp(
    response: reqwest::Response,
    url: &str,
    temp_path: &Path,
) -> Result<(String, u64), DownloadError> {
    let file = File::create(temp_path)
        .await
        .map_err(|e| DownloadError::io(temp_path.to_path_buf(), e))?;
    let mut writer = BufWriter::new(file);
    let mut hasher = Sha256::new();
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(temp_path.to_path_buf(), e))?;
        hasher.update(&chunk);
        bytes_written += chunk.len() as u64;
    }

    // Ensure all data is flushed to disk before the rename
    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(temp_path.to_path_buf(), e))?;

    Ok((hex::encode(hasher.finalize()), bytes_written))
}

fn temp_path_for(final_path: &Path) -> PathBuf {
    let mut os = final_path.as_os_str().to_os_string();
    os.push(TEMP_SUFFIX);
    PathBuf::from(os)
}

/// Best-effort temp-file removal; failure only logged, the download error
/// already describes the real problem.
fn remove_temp(temp_path: &Path) {
    if let Err(e) = std::fs::remove_file(temp_path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %temp_path.display(), error = %e, "failed to remove temp file");
    }
}
