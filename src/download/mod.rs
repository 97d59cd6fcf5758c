//! HTTP download engine for streaming documents to disk.
//!
//! This module fetches crawl pages and downloads candidate documents with
//! bounded concurrency, retry on transient failures, per-domain rate
//! limiting, and single-pass content hashing.
//!
//! # Features
//!
//! - Streaming downloads (memory-efficient for large files)
//! - SHA-256 computed over the same chunk stream that is written to disk
//! - Temp-file writes with atomic rename; failed downloads leave nothing
//!   under a final name
//! - Deterministic filenames from title + URL, numeric suffix on collision
//! - Exponential backoff with jitter; Retry-After support on 429

mod client;
mod engine;
mod error;
mod filename;
pub mod rate_limiter;
mod retry;

pub(crate) mod constants;

pub use client::{DownloadedFile, HttpClient};
pub use engine::{DownloadEngine, DownloadOutcome, DownloadStats, EngineError};
pub use error::DownloadError;
pub use rate_limiter::{RateLimiter, extract_domain, parse_retry_after};
pub use retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
