//! Per-domain rate limiting for crawler requests.
//!
//! Enforces a minimum delay between requests to the same domain so the
//! target site is never hammered, while requests to different domains
//! proceed in parallel without waiting for each other.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use cebcrawl_core::download::RateLimiter;
//!
//! # async fn example() {
//! let limiter = Arc::new(RateLimiter::new(Duration::from_secs(1)));
//!
//! // First request proceeds immediately
//! limiter.acquire("https://example.com/a.pdf").await;
//!
//! // Second request to the same domain waits for the delay
//! limiter.acquire("https://example.com/b.pdf").await;
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::constants::{CUMULATIVE_DELAY_WARNING_THRESHOLD, MAX_RETRY_AFTER};

/// Per-domain rate limiter.
///
/// Designed to be wrapped in `Arc` and shared across download tasks. Uses
/// `DashMap` for concurrent access to per-domain state and a
/// `tokio::sync::Mutex` for atomic read-update of each domain's timing.
#[derive(Debug)]
pub struct RateLimiter {
    /// Default minimum delay between requests to the same domain.
    default_delay: Duration,

    /// Whether rate limiting is disabled (configured delay of zero).
    disabled: bool,

    /// Per-domain state. Arc values let the DashMap shard lock be released
    /// before awaiting on the inner Mutex.
    domains: DashMap<String, Arc<DomainState>>,
}

/// State tracked for each domain.
#[derive(Debug)]
struct DomainState {
    /// Time of the last request to this domain. `None` means the domain has
    /// not been requested yet (first request is immediate).
    last_request: Mutex<Option<Instant>>,

    /// Cumulative delay applied to this domain, in milliseconds. Used to
    /// warn when excessive rate limiting occurs.
    cumulative_delay_ms: AtomicU64,
}

impl DomainState {
    fn new() -> Self {
        Self {
            last_request: Mutex::new(None),
            cumulative_delay_ms: AtomicU64::new(0),
        }
    }

    /// Adds to the cumulative delay and returns the new total.
    #[allow(clippy::cast_possible_truncation)]
    fn add_cumulative_delay(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let new_total = self
            .cumulative_delay_ms
            .fetch_add(delay_ms, Ordering::SeqCst)
            + delay_ms;
        Duration::from_millis(new_total)
    }
}

impl RateLimiter {
    /// Creates a rate limiter with the given minimum delay.
    ///
    /// A zero delay produces a disabled limiter that applies no waits.
    #[must_use]
    #[instrument(skip_all, fields(delay_ms = default_delay.as_millis()))]
    pub fn new(default_delay: Duration) -> Self {
        debug!("creating rate limiter");
        Self {
            disabled: default_delay.is_zero(),
            default_delay,
            domains: DashMap::new(),
        }
    }

    /// Creates a disabled rate limiter that applies no delays.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Returns whether rate limiting is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns the default delay between requests.
    #[must_use]
    pub fn default_delay(&self) -> Duration {
        self.default_delay
    }

    /// Acquires permission to make a request to the given URL's domain,
    /// sleeping if the previous request to that domain was too recent.
    ///
    /// The first request to any domain proceeds immediately.
    #[instrument(skip(self), fields(domain))]
    pub async fn acquire(&self, url: &str) {
        if self.disabled {
            return;
        }

        let domain = extract_domain(url);
        tracing::Span::current().record("domain", &domain);

        // Clone the Arc so the DashMap shard lock is released before awaiting
        let state = self
            .domains
            .entry(domain.clone())
            .or_insert_with(|| Arc::new(DomainState::new()))
            .clone();

        let mut last_request_guard = state.last_request.lock().await;

        if let Some(last_request) = *last_request_guard {
            let elapsed = last_request.elapsed();

            if elapsed < self.default_delay {
                let delay = self.default_delay.saturating_sub(elapsed);
                let cumulative = state.add_cumulative_delay(delay);

                debug!(
                    domain = %domain,
                    delay_ms = delay.as_millis(),
                    cumulative_ms = cumulative.as_millis(),
                    "applying rate limit delay"
                );

                if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
                    warn!(
                        domain = %domain,
                        cumulative_delay_secs = cumulative.as_secs(),
                        "excessive rate limiting - consider reducing request volume to this domain"
                    );
                }

                tokio::time::sleep(delay).await;
            }
        } else {
            debug!(domain = %domain, "first request to domain - no delay");
        }

        *last_request_guard = Some(Instant::now());
    }

    /// Records a server-mandated rate limit delay (from a Retry-After
    /// header), so the warning accounting reflects the server's pushback.
    #[instrument(skip(self), fields(domain))]
    pub fn record_rate_limit(&self, url: &str, delay: Duration) {
        let domain = extract_domain(url);
        tracing::Span::current().record("domain", &domain);

        let state = self
            .domains
            .entry(domain.clone())
            .or_insert_with(|| Arc::new(DomainState::new()));
        let cumulative = state.add_cumulative_delay(delay);

        debug!(
            domain = %domain,
            delay_ms = delay.as_millis(),
            cumulative_ms = cumulative.as_millis(),
            "recorded server rate limit"
        );

        if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
            warn!(
                domain = %domain,
                cumulative_delay_secs = cumulative.as_secs(),
                "excessive server rate limiting - site may be under heavy load"
            );
        }
    }
}

/// Extracts the domain from a URL.
///
/// Returns "unknown" for malformed URLs, ensuring all requests are still
/// rate limited even if the URL cannot be parsed.
///
/// # Examples
///
/// ```
/// use cebcrawl_core::download::extract_domain;
///
/// assert_eq!(extract_domain("https://example.com/path"), "example.com");
/// assert_eq!(extract_domain("http://Example.COM/Path"), "example.com");
/// assert_eq!(extract_domain("not a url"), "unknown");
/// ```
#[must_use]
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports both RFC 7231 formats: integer seconds (`Retry-After: 120`) and
/// HTTP-date (`Retry-After: Wed, 21 Oct 2026 07:28:00 GMT`). Returns `None`
/// if the value cannot be parsed; caps excessive values at 1 hour.
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    // Integer seconds first (most common)
    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }

        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);

        if duration > MAX_RETRY_AFTER {
            warn!(
                seconds,
                max_seconds = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds maximum, capping at 1 hour"
            );
            return Some(MAX_RETRY_AFTER);
        }

        return Some(duration);
    }

    // HTTP-date
    if let Ok(datetime) = httpdate::parse_http_date(header_value) {
        let now = std::time::SystemTime::now();

        if let Ok(duration) = datetime.duration_since(now) {
            if duration > MAX_RETRY_AFTER {
                warn!(
                    delay_secs = duration.as_secs(),
                    max_secs = MAX_RETRY_AFTER.as_secs(),
                    "Retry-After date exceeds maximum, capping at 1 hour"
                );
                return Some(MAX_RETRY_AFTER);
            }
            Some(duration)
        } else {
            debug!(header_value, "Retry-After date is in the past, returning zero");
            Some(Duration::ZERO)
        }
    } else {
        debug!(header_value, "unparseable Retry-After value");
        None
    }
}
