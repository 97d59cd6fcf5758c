//! Retry logic with exponential backoff for transient download failures.
//!
//! When a download fails, the error is classified into a [`FailureType`]:
//! transient failures and server rate limiting are retried with exponential
//! backoff; permanent failures fail immediately. The [`RetryPolicy`] holds
//! the attempt bound and backoff curve, both taken from the crawler
//! configuration.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use cebcrawl_core::download::{
//!     DownloadError, RetryPolicy, RetryDecision, classify_error,
//! };
//!
//! let policy = RetryPolicy::new(3, Duration::from_secs(1));
//! let error = DownloadError::http_status("https://example.com/doc.pdf", 503);
//!
//! match policy.should_retry(classify_error(&error), 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("retrying in {delay:?} (attempt {attempt})");
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("not retrying: {reason}");
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::DownloadError;
use super::constants::{MAX_BACKOFF_DELAY, MAX_JITTER};

/// Backoff multiplier (delay doubles each attempt).
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Classification of download failure types.
///
/// Used to determine whether a failed download should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: network timeout, 5xx server errors, connection refused.
    Transient,

    /// Permanent failure that won't succeed regardless of retries.
    ///
    /// Examples: 404 Not Found, unsupported content type, invalid URL,
    /// local IO failure.
    Permanent,

    /// Server rate limiting (HTTP 429); retried with backoff, honoring a
    /// Retry-After header when the server sends one.
    RateLimited,
}

/// Decision on whether to retry a failed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the download after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry the download.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Configuration for retry behavior with exponential backoff.
///
/// # Delay Calculation
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), 60s) + jitter
/// ```
///
/// `max_attempts` counts the initial attempt: a policy of 3 makes at most
/// two retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Creates a retry policy.
    ///
    /// `max_attempts` is clamped to at least 1 (the initial attempt always
    /// happens).
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Determines whether to retry a failed download.
    ///
    /// `attempt` is the attempt number that just failed (1-indexed).
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        match failure_type {
            FailureType::Permanent => {
                return RetryDecision::DoNotRetry {
                    reason: "permanent failure - retry would not help".to_string(),
                };
            }
            FailureType::Transient | FailureType::RateLimited => {}
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.calculate_delay(attempt);

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Calculates the delay for a retry attempt with exponential backoff and jitter.
    ///
    /// Formula: `min(base_delay * 2^(attempt-1), MAX_BACKOFF_DELAY) + jitter`
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        // attempt is 0-indexed for the exponent (attempt 1 = 2^0 = 1x base)
        let exponent = f64::from(attempt - 1);
        let delay_ms = base_ms * BACKOFF_MULTIPLIER.powf(exponent);
        let capped_ms = delay_ms.min(MAX_BACKOFF_DELAY.as_millis() as f64);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let capped = Duration::from_millis(capped_ms as u64);
        capped + calculate_jitter()
    }
}

/// Generates random jitter between 0 and [`MAX_JITTER`].
///
/// Jitter spreads out retries so parallel downloads that failed together do
/// not hammer the server again in lockstep.
fn calculate_jitter() -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_ms = rng.gen_range(0..=MAX_JITTER.as_millis() as u64);
    Duration::from_millis(jitter_ms)
}

/// Classifies a download error into a failure type for retry decisions.
///
/// # HTTP Status Code Classification
///
/// | Status | Type | Rationale |
/// |--------|------|-----------|
/// | 400 | Permanent | Bad request - won't succeed on retry |
/// | 401 | Permanent | Unauthorized - no auth flow to invoke |
/// | 403 | Permanent | Forbidden - no auth flow to invoke |
/// | 404 | Permanent | Not found - resource doesn't exist |
/// | 408 | Transient | Request timeout - may succeed |
/// | 410 | Permanent | Gone - permanently removed |
/// | 429 | RateLimited | Rate limited - retry with backoff |
/// | 5xx | Transient | Server-side, may be temporary |
///
/// # Non-HTTP Errors
///
/// Timeouts and most network errors are transient; TLS/certificate errors,
/// local IO errors, invalid URLs, and unsupported content types are
/// permanent.
#[instrument]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status, .. } => classify_http_status(*status),

        DownloadError::Timeout { .. } => FailureType::Transient,

        DownloadError::Network { source, .. } => {
            if is_tls_error(source) {
                FailureType::Permanent
            } else {
                FailureType::Transient
            }
        }

        DownloadError::UnsupportedContentType { .. } => FailureType::Permanent,

        DownloadError::Io { .. } => FailureType::Permanent,

        DownloadError::InvalidUrl { .. } => FailureType::Permanent,
    }
}

/// Classifies an HTTP status code into a failure type.
fn classify_http_status(status: u16) -> FailureType {
    match status {
        408 => FailureType::Transient,   // Request Timeout
        429 => FailureType::RateLimited, // Too Many Requests

        // Other 4xx are permanent (including 401/403: no auth flow exists)
        status if (400..500).contains(&status) => FailureType::Permanent,

        // 5xx are transient
        status if (500..600).contains(&status) => FailureType::Transient,

        // Anything else is unexpected, treat as permanent
        _ => FailureType::Permanent,
    }
}

/// Checks if a reqwest error is a TLS/certificate error.
fn is_tls_error(error: &reqwest::Error) -> bool {
    let error_string = error.to_string().to_lowercase();
    error_string.contains("certificate")
        || error_string.contains("tls")
        || error_string.contains("ssl")
        || error_string.contains("handshake")
}
