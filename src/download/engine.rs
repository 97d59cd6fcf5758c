//! Download engine for concurrent document downloads with retry support.
//!
//! The engine downloads a batch of discovered candidate links using a
//! semaphore-based worker pool, retrying transient failures with
//! exponential backoff. Completion order is unordered internally; the
//! returned outcomes are re-sorted into input order so downstream stages
//! see a deterministic sequence.
//!
//! # Concurrency Model
//!
//! - Each download runs in its own Tokio task
//! - A semaphore permit is acquired before starting each download
//! - Permits are released automatically when downloads complete (RAII)
//! - Cancellation stops new downloads from being issued; in-flight tasks
//!   finish and their outcomes are kept

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::client::HttpClient;
use super::rate_limiter::{RateLimiter, parse_retry_after};
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
use super::DownloadError;
use crate::cancel::CancelToken;
use crate::document::{CandidateLink, DocumentRecord};

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Error type for download engine construction and batch processing.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Result of one download attempt chain: either an enriched record or the
/// final error with the number of attempts made.
#[derive(Debug)]
pub enum DownloadOutcome {
    /// The document was stored; the record carries path, hash, size, date.
    Success(DocumentRecord),
    /// All attempts failed (or the failure was permanent).
    Failure {
        /// URL that failed.
        url: String,
        /// The final error.
        error: DownloadError,
        /// Total attempts made, including the first.
        attempts: u32,
    },
}

impl DownloadOutcome {
    /// Returns the contained record for successful outcomes.
    #[must_use]
    pub fn success(self) -> Option<DocumentRecord> {
        match self {
            Self::Success(record) => Some(record),
            Self::Failure { .. } => None,
        }
    }
}

/// Statistics from one download batch.
///
/// Atomic counters so concurrent download tasks can update them without
/// coordination.
#[derive(Debug, Default)]
pub struct DownloadStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
    retried: AtomicUsize,
    skipped: AtomicUsize,
}

impl DownloadStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successfully stored downloads.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Number of downloads that exhausted their attempts.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Number of retry attempts made across the batch.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    /// Number of links never issued because the run was cancelled.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    fn increment_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_retried(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }

    fn add_skipped(&self, count: usize) {
        self.skipped.fetch_add(count, Ordering::SeqCst);
    }
}

/// Download engine with bounded concurrency and retry.
#[derive(Debug)]
pub struct DownloadEngine {
    /// Semaphore for concurrency control.
    semaphore: Arc<Semaphore>,
    /// Configured concurrency limit.
    concurrency: usize,
    /// Retry policy for failed downloads.
    retry_policy: RetryPolicy,
    /// Per-domain rate limiter.
    rate_limiter: Arc<RateLimiter>,
}

impl DownloadEngine {
    /// Creates an engine with the given worker pool size, retry policy, and
    /// rate limiter.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the pool size is
    /// outside 1-100.
    #[instrument(level = "debug", skip(retry_policy, rate_limiter))]
    pub fn new(
        concurrency: usize,
        retry_policy: RetryPolicy,
        rate_limiter: Arc<RateLimiter>,
    ) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        debug!(
            concurrency,
            max_attempts = retry_policy.max_attempts(),
            rate_limit_ms = rate_limiter.default_delay().as_millis(),
            "creating download engine"
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            retry_policy,
            rate_limiter,
        })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Downloads a batch of candidate links concurrently.
    ///
    /// Returns one [`DownloadOutcome`] per issued link, sorted back into
    /// input order, plus batch statistics. Individual failures never abort
    /// the batch. When `cancel` fires, links not yet issued are skipped
    /// (counted in [`DownloadStats::skipped`]) while in-flight downloads
    /// run to completion.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SemaphoreClosed`] only if the internal
    /// semaphore is closed, which would be a bug.
    #[instrument(skip_all, fields(links = links.len(), dest_dir = %dest_dir.display()))]
    pub async fn download_all(
        &self,
        links: &[CandidateLink],
        client: &HttpClient,
        dest_dir: &Path,
        cancel: &CancelToken,
    ) -> Result<(Vec<DownloadOutcome>, DownloadStats), EngineError> {
        let stats = Arc::new(DownloadStats::new());
        let mut handles = Vec::with_capacity(links.len());

        info!("starting download batch");

        for (position, link) in links.iter().enumerate() {
            if cancel.is_cancelled() {
                let remaining = links.len() - position;
                warn!(remaining, "cancellation requested, not issuing further downloads");
                stats.add_skipped(remaining);
                break;
            }

            // Acquire semaphore permit (blocks while at the concurrency limit)
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SemaphoreClosed)?;

            let link = link.clone();
            let client = client.clone();
            let stats = Arc::clone(&stats);
            let dest_dir = dest_dir.to_path_buf();
            let retry_policy = self.retry_policy.clone();
            let rate_limiter = Arc::clone(&self.rate_limiter);

            handles.push(tokio::spawn(async move {
                // Permit is dropped when this block exits (RAII)
                let _permit = permit;

                let outcome = match download_with_retry(
                    &client,
                    &link,
                    &dest_dir,
                    &retry_policy,
                    &stats,
                    &rate_limiter,
                )
                .await
                {
                    Ok(record) => {
                        info!(url = %link.url, "download completed");
                        stats.increment_completed();
                        DownloadOutcome::Success(record)
                    }
                    Err((error, attempts)) => {
                        warn!(
                            url = %link.url,
                            error = %error,
                            attempts,
                            "download failed after all attempts"
                        );
                        stats.increment_failed();
                        DownloadOutcome::Failure {
                            url: link.url.clone(),
                            error,
                            attempts,
                        }
                    }
                };

                (position, outcome)
            }));
        }

        debug!(task_count = handles.len(), "waiting for downloads to complete");

        let mut indexed: Vec<(usize, DownloadOutcome)> = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(entry) => indexed.push(entry),
                // Task panics are logged but don't fail the batch
                Err(e) => warn!(error = %e, "download task panicked"),
            }
        }

        // Completion order is unordered; restore input order so the dedup
        // stage and final index are reproducible for identical discovery
        // output.
        indexed.sort_by_key(|(position, _)| *position);
        let outcomes: Vec<DownloadOutcome> =
            indexed.into_iter().map(|(_, outcome)| outcome).collect();

        info!(
            completed = stats.completed(),
            failed = stats.failed(),
            retried = stats.retried(),
            skipped = stats.skipped(),
            "download batch complete"
        );

        let stats = match Arc::try_unwrap(stats) {
            Ok(stats) => stats,
            Err(arc_stats) => {
                // All tasks are joined, so sole ownership is expected; fall
                // back to copying the atomic values.
                let fresh = DownloadStats::new();
                fresh.completed.store(arc_stats.completed(), Ordering::SeqCst);
                fresh.failed.store(arc_stats.failed(), Ordering::SeqCst);
                fresh.retried.store(arc_stats.retried(), Ordering::SeqCst);
                fresh.skipped.store(arc_stats.skipped(), Ordering::SeqCst);
                fresh
            }
        };

        Ok((outcomes, stats))
    }
}

/// Extracts and records the Retry-After delay from a rate-limited error.
///
/// Returns `None` when the error carries no parseable Retry-After header.
fn extract_retry_after_delay(
    error: &DownloadError,
    url: &str,
    rate_limiter: &RateLimiter,
) -> Option<Duration> {
    let retry_after_header = match error {
        DownloadError::HttpStatus { retry_after, .. } => retry_after.as_ref()?,
        _ => return None,
    };

    let delay = parse_retry_after(retry_after_header)?;
    rate_limiter.record_rate_limit(url, delay);

    debug!(
        url = %url,
        retry_after = %retry_after_header,
        delay_ms = delay.as_millis(),
        "using Retry-After header delay"
    );

    Some(delay)
}

/// Downloads one candidate with retry for transient errors.
///
/// Returns the enriched record on success, or the final error plus the
/// total attempt count once retries are exhausted or the failure is
/// permanent.
#[instrument(skip_all, fields(url = %link.url))]
async fn download_with_retry(
    client: &HttpClient,
    link: &CandidateLink,
    dest_dir: &Path,
    policy: &RetryPolicy,
    stats: &DownloadStats,
    rate_limiter: &RateLimiter,
) -> Result<DocumentRecord, (DownloadError, u32)> {
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        debug!(attempt, "attempting download");

        rate_limiter.acquire(&link.url).await;

        match client.download_document(link, dest_dir).await {
            Ok(downloaded) => {
                let mut record = DocumentRecord::from_candidate(link);
                record.mark_downloaded(downloaded.path, downloaded.sha256, downloaded.size);
                return Ok(record);
            }
            Err(e) => {
                let failure_type = classify_error(&e);

                let retry_after_delay = if failure_type == FailureType::RateLimited {
                    extract_retry_after_delay(&e, &link.url, rate_limiter)
                } else {
                    None
                };

                match policy.should_retry(failure_type, attempt) {
                    RetryDecision::Retry {
                        delay: backoff_delay,
                        attempt: next_attempt,
                    } => {
                        // Server-mandated delay wins over exponential backoff
                        let delay = retry_after_delay.unwrap_or(backoff_delay);

                        info!(
                            url = %link.url,
                            attempt = next_attempt,
                            max_attempts = policy.max_attempts(),
                            delay_ms = delay.as_millis(),
                            error = %e,
                            "retrying download"
                        );
                        stats.increment_retried();
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        debug!(url = %link.url, %reason, "not retrying download");
                        return Err((e, attempt));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use std::time::Duration;

    fn test_rate_limiter() -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(Duration::from_millis(100)))
    }

    fn test_policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(10))
    }

    #[test]
    fn test_engine_new_valid_concurrency() {
        for value in [1, 5, 100] {
            let engine = DownloadEngine::new(value, test_policy(), test_rate_limiter()).unwrap();
            assert_eq!(engine.concurrency(), value);
        }
    }

    #[test]
    fn test_engine_new_invalid_concurrency() {
        assert!(matches!(
            DownloadEngine::new(0, test_policy(), test_rate_limiter()),
            Err(EngineError::InvalidConcurrency { value: 0 })
        ));
        assert!(matches!(
            DownloadEngine::new(101, test_policy(), test_rate_limiter()),
            Err(EngineError::InvalidConcurrency { value: 101 })
        ));
    }

    #[test]
    fn test_engine_stores_retry_policy() {
        let engine = DownloadEngine::new(10, test_policy(), test_rate_limiter()).unwrap();
        assert_eq!(engine.retry_policy().max_attempts(), 3);
    }

    #[test]
    fn test_download_stats_increment() {
        let stats = DownloadStats::new();

        stats.increment_completed();
        stats.increment_completed();
        stats.increment_failed();
        stats.increment_retried();
        stats.add_skipped(4);

        assert_eq!(stats.completed(), 2);
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.retried(), 1);
        assert_eq!(stats.skipped(), 4);
    }

    #[test]
    fn test_download_stats_thread_safe() {
        use std::thread;

        let stats = Arc::new(DownloadStats::new());
        let mut handles = Vec::new();

        for _ in 0..10 {
            let stats = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    stats.increment_completed();
                    stats.increment_failed();
                    stats.increment_retried();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stats.completed(), 1000);
        assert_eq!(stats.failed(), 1000);
        assert_eq!(stats.retried(), 1000);
    }

    #[test]
    fn test_engine_error_display() {
        let error = EngineError::InvalidConcurrency { value: 0 };
        let msg = error.to_string();
        assert!(msg.contains("invalid concurrency"));
        assert!(msg.contains('0'));
    }
}
