//! Constants for the download module (timeouts, rate limiting).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Warning threshold for cumulative rate limit delay per domain (30 seconds).
pub const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Maximum Retry-After header value (1 hour) to prevent excessive delays.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Maximum retry backoff delay (60 seconds).
pub const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(60);

/// Maximum jitter added to retry delays (500 ms).
pub const MAX_JITTER: Duration = Duration::from_millis(500);
