//! Crawler configuration.
//!
//! [`CrawlerConfig`] is an immutable snapshot constructed once at startup
//! (via [`CrawlerConfigBuilder`] or a TOML file) and passed by reference to
//! every component. There is no process-wide mutable settings object.
//!
//! # Example
//!
//! ```
//! use cebcrawl_core::config::CrawlerConfig;
//!
//! let config = CrawlerConfig::builder("https://www.cebraspe.org.br")
//!     .max_concurrent_downloads(8)
//!     .retry_attempts(2)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.max_concurrent_downloads(), 8);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::user_agent::default_crawler_user_agent;

/// Minimum allowed download concurrency.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed download concurrency.
const MAX_CONCURRENCY: usize = 100;

/// Default maximum concurrent downloads.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default per-request timeout (30 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default total download attempts per URL.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default base delay between retry attempts (5 seconds).
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Default minimum delay between requests to the same domain (1 second).
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(1);

/// Default crawl depth bound.
pub const DEFAULT_MAX_DEPTH: u32 = 5;

/// Default bound on pages fetched during one discovery run.
pub const DEFAULT_MAX_PAGES: usize = 200;

/// Errors raised while building or loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The base URL could not be parsed or has no host.
    #[error("invalid base URL: {url}")]
    InvalidBaseUrl {
        /// The offending URL string.
        url: String,
    },

    /// Concurrency outside the supported range.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The config file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Io {
        /// Path to the config file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML.
    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Immutable configuration snapshot for one crawler run.
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    base_url: Url,
    allowed_domains: Vec<String>,
    start_paths: Vec<String>,
    max_depth: u32,
    max_pages: usize,
    max_concurrent_downloads: usize,
    request_timeout: Duration,
    retry_attempts: u32,
    retry_delay: Duration,
    rate_limit_delay: Duration,
    output_dir: PathBuf,
    pdfs_dir: PathBuf,
    index_file: PathBuf,
    user_agent: String,
}

impl CrawlerConfig {
    /// Starts a builder for the given base URL.
    #[must_use]
    pub fn builder(base_url: impl Into<String>) -> CrawlerConfigBuilder {
        CrawlerConfigBuilder::new(base_url)
    }

    /// Loads a configuration from a TOML file.
    ///
    /// Absent keys fall back to the builder defaults, so a minimal file may
    /// contain only `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or
    /// validated.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on parse or validation failure.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text)?;
        file.into_builder().build()
    }

    /// Root of the site being crawled.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Domains whose links the crawler may follow and download.
    #[must_use]
    pub fn allowed_domains(&self) -> &[String] {
        &self.allowed_domains
    }

    /// Returns whether the given host belongs to an allowed domain.
    ///
    /// A host matches when it equals an allowed domain or is a subdomain of
    /// one (`concursos.cebraspe.org.br` matches `cebraspe.org.br`).
    #[must_use]
    pub fn is_allowed_host(&self, host: &str) -> bool {
        self.allowed_domains.iter().any(|domain| {
            host.eq_ignore_ascii_case(domain)
                || host
                    .to_ascii_lowercase()
                    .ends_with(&format!(".{}", domain.to_ascii_lowercase()))
        })
    }

    /// Site-relative paths where discovery starts.
    #[must_use]
    pub fn start_paths(&self) -> &[String] {
        &self.start_paths
    }

    /// Maximum crawl depth from a start path.
    #[must_use]
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Maximum pages fetched during one discovery run.
    #[must_use]
    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// Size of the download worker pool.
    #[must_use]
    pub fn max_concurrent_downloads(&self) -> usize {
        self.max_concurrent_downloads
    }

    /// Per-request timeout, enforced independently per download attempt.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Total attempts per URL (initial attempt included).
    #[must_use]
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// Base delay for retry backoff.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Minimum delay between requests to the same domain; zero disables.
    #[must_use]
    pub fn rate_limit_delay(&self) -> Duration {
        self.rate_limit_delay
    }

    /// Root data directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Directory where downloaded PDFs are stored.
    #[must_use]
    pub fn pdfs_dir(&self) -> &Path {
        &self.pdfs_dir
    }

    /// Path of the persisted document index.
    #[must_use]
    pub fn index_file(&self) -> &Path {
        &self.index_file
    }

    /// User-Agent header sent with every request.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

/// Builder producing a fully-populated [`CrawlerConfig`].
///
/// Unset storage paths are derived from `output_dir` at build time
/// (`<output_dir>/pdfs`, `<output_dir>/index.json`); unset allowed domains
/// default to the base URL host plus its bare-domain variant.
#[derive(Debug, Clone)]
pub struct CrawlerConfigBuilder {
    base_url: String,
    allowed_domains: Option<Vec<String>>,
    start_paths: Vec<String>,
    max_depth: u32,
    max_pages: usize,
    max_concurrent_downloads: usize,
    request_timeout: Duration,
    retry_attempts: u32,
    retry_delay: Duration,
    rate_limit_delay: Duration,
    output_dir: PathBuf,
    pdfs_dir: Option<PathBuf>,
    index_file: Option<PathBuf>,
    user_agent: Option<String>,
}

impl CrawlerConfigBuilder {
    /// Creates a builder with defaults for everything but the base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            allowed_domains: None,
            start_paths: vec!["/".to_string()],
            max_depth: DEFAULT_MAX_DEPTH,
            max_pages: DEFAULT_MAX_PAGES,
            max_concurrent_downloads: DEFAULT_CONCURRENCY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY,
            output_dir: PathBuf::from("./data"),
            pdfs_dir: None,
            index_file: None,
            user_agent: None,
        }
    }

    /// Overrides the allowed domain list.
    #[must_use]
    pub fn allowed_domains(mut self, domains: Vec<String>) -> Self {
        self.allowed_domains = Some(domains);
        self
    }

    /// Overrides the discovery start paths.
    #[must_use]
    pub fn start_paths(mut self, paths: Vec<String>) -> Self {
        self.start_paths = paths;
        self
    }

    /// Overrides the crawl depth bound.
    #[must_use]
    pub fn max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    /// Overrides the discovery page bound.
    #[must_use]
    pub fn max_pages(mut self, pages: usize) -> Self {
        self.max_pages = pages;
        self
    }

    /// Overrides the download worker pool size (validated at build).
    #[must_use]
    pub fn max_concurrent_downloads(mut self, concurrency: usize) -> Self {
        self.max_concurrent_downloads = concurrency;
        self
    }

    /// Overrides the per-request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Overrides the total attempts per URL (minimum 1).
    #[must_use]
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Overrides the retry backoff base delay.
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Overrides the per-domain rate limit delay (zero disables).
    #[must_use]
    pub fn rate_limit_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_delay = delay;
        self
    }

    /// Overrides the root data directory.
    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Overrides the PDF storage directory.
    #[must_use]
    pub fn pdfs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.pdfs_dir = Some(dir.into());
        self
    }

    /// Overrides the index file path.
    #[must_use]
    pub fn index_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.index_file = Some(path.into());
        self
    }

    /// Overrides the User-Agent header.
    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Validates and produces the immutable configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] for an unparseable or
    /// host-less base URL, and [`ConfigError::InvalidConcurrency`] for a
    /// pool size outside 1-100.
    pub fn build(self) -> Result<CrawlerConfig, ConfigError> {
        let base_url = Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
        })?;
        let host = base_url
            .host_str()
            .ok_or_else(|| ConfigError::InvalidBaseUrl {
                url: self.base_url.clone(),
            })?
            .to_string();

        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.max_concurrent_downloads) {
            return Err(ConfigError::InvalidConcurrency {
                value: self.max_concurrent_downloads,
            });
        }

        let allowed_domains = self
            .allowed_domains
            .unwrap_or_else(|| default_allowed_domains(&host));
        let pdfs_dir = self.pdfs_dir.unwrap_or_else(|| self.output_dir.join("pdfs"));
        let index_file = self
            .index_file
            .unwrap_or_else(|| self.output_dir.join("index.json"));
        let user_agent = self.user_agent.unwrap_or_else(default_crawler_user_agent);

        Ok(CrawlerConfig {
            base_url,
            allowed_domains,
            start_paths: self.start_paths,
            max_depth: self.max_depth,
            max_pages: self.max_pages,
            max_concurrent_downloads: self.max_concurrent_downloads,
            request_timeout: self.request_timeout,
            retry_attempts: self.retry_attempts.max(1),
            retry_delay: self.retry_delay,
            rate_limit_delay: self.rate_limit_delay,
            output_dir: self.output_dir,
            pdfs_dir,
            index_file,
            user_agent,
        })
    }
}

/// Both the `www.`-qualified and bare forms of the host, so links that hop
/// between them stay in scope.
fn default_allowed_domains(host: &str) -> Vec<String> {
    let bare = host.strip_prefix("www.").unwrap_or(host).to_string();
    if bare == host {
        vec![bare]
    } else {
        vec![bare, host.to_string()]
    }
}

/// Serde shadow of the TOML config file; every key optional.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    base_url: String,
    allowed_domains: Option<Vec<String>>,
    start_paths: Option<Vec<String>>,
    max_depth: Option<u32>,
    max_pages: Option<usize>,
    max_concurrent_downloads: Option<usize>,
    request_timeout_secs: Option<u64>,
    retry_attempts: Option<u32>,
    retry_delay_secs: Option<u64>,
    rate_limit_ms: Option<u64>,
    output_dir: Option<PathBuf>,
    pdfs_dir: Option<PathBuf>,
    index_file: Option<PathBuf>,
    user_agent: Option<String>,
}

impl ConfigFile {
    fn into_builder(self) -> CrawlerConfigBuilder {
        let mut builder = CrawlerConfigBuilder::new(self.base_url);
        if let Some(domains) = self.allowed_domains {
            builder = builder.allowed_domains(domains);
        }
        if let Some(paths) = self.start_paths {
            builder = builder.start_paths(paths);
        }
        if let Some(depth) = self.max_depth {
            builder = builder.max_depth(depth);
        }
        if let Some(pages) = self.max_pages {
            builder = builder.max_pages(pages);
        }
        if let Some(concurrency) = self.max_concurrent_downloads {
            builder = builder.max_concurrent_downloads(concurrency);
        }
        if let Some(secs) = self.request_timeout_secs {
            builder = builder.request_timeout(Duration::from_secs(secs));
        }
        if let Some(attempts) = self.retry_attempts {
            builder = builder.retry_attempts(attempts);
        }
        if let Some(secs) = self.retry_delay_secs {
            builder = builder.retry_delay(Duration::from_secs(secs));
        }
        if let Some(ms) = self.rate_limit_ms {
            builder = builder.rate_limit_delay(Duration::from_millis(ms));
        }
        if let Some(dir) = self.output_dir {
            builder = builder.output_dir(dir);
        }
        if let Some(dir) = self.pdfs_dir {
            builder = builder.pdfs_dir(dir);
        }
        if let Some(path) = self.index_file {
            builder = builder.index_file(path);
        }
        if let Some(ua) = self.user_agent {
            builder = builder.user_agent(ua);
        }
        builder
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = CrawlerConfig::builder("https://www.cebraspe.org.br")
            .build()
            .unwrap();

        assert_eq!(config.max_concurrent_downloads(), DEFAULT_CONCURRENCY);
        assert_eq!(config.request_timeout(), DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.retry_attempts(), DEFAULT_RETRY_ATTEMPTS);
        assert_eq!(config.retry_delay(), DEFAULT_RETRY_DELAY);
        assert_eq!(config.output_dir(), Path::new("./data"));
        assert_eq!(config.pdfs_dir(), Path::new("./data/pdfs"));
        assert_eq!(config.index_file(), Path::new("./data/index.json"));
        assert_eq!(config.start_paths(), ["/".to_string()]);
        assert!(config.user_agent().starts_with("cebcrawl/"));
    }

    #[test]
    fn test_builder_derives_allowed_domains_from_host() {
        let config = CrawlerConfig::builder("https://www.cebraspe.org.br")
            .build()
            .unwrap();
        assert_eq!(
            config.allowed_domains(),
            ["cebraspe.org.br".to_string(), "www.cebraspe.org.br".to_string()]
        );
    }

    #[test]
    fn test_is_allowed_host_matches_subdomains() {
        let config = CrawlerConfig::builder("https://www.cebraspe.org.br")
            .build()
            .unwrap();

        assert!(config.is_allowed_host("cebraspe.org.br"));
        assert!(config.is_allowed_host("www.cebraspe.org.br"));
        assert!(config.is_allowed_host("concursos.cebraspe.org.br"));
        assert!(config.is_allowed_host("CEBRASPE.ORG.BR"));
        assert!(!config.is_allowed_host("example.com"));
        assert!(!config.is_allowed_host("notcebraspe.org.br"));
    }

    #[test]
    fn test_builder_rejects_invalid_base_url() {
        let result = CrawlerConfig::builder("not a url").build();
        assert!(matches!(result, Err(ConfigError::InvalidBaseUrl { .. })));
    }

    #[test]
    fn test_builder_rejects_zero_concurrency() {
        let result = CrawlerConfig::builder("https://example.com")
            .max_concurrent_downloads(0)
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidConcurrency { value: 0 })
        ));
    }

    #[test]
    fn test_builder_rejects_excessive_concurrency() {
        let result = CrawlerConfig::builder("https://example.com")
            .max_concurrent_downloads(101)
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidConcurrency { value: 101 })
        ));
    }

    #[test]
    fn test_retry_attempts_minimum_is_one() {
        let config = CrawlerConfig::builder("https://example.com")
            .retry_attempts(0)
            .build()
            .unwrap();
        assert_eq!(config.retry_attempts(), 1);
    }

    #[test]
    fn test_paths_derived_from_output_dir() {
        let config = CrawlerConfig::builder("https://example.com")
            .output_dir("/var/crawl")
            .build()
            .unwrap();
        assert_eq!(config.pdfs_dir(), Path::new("/var/crawl/pdfs"));
        assert_eq!(config.index_file(), Path::new("/var/crawl/index.json"));
    }

    #[test]
    fn test_from_toml_minimal() {
        let config = CrawlerConfig::from_toml_str(r#"base_url = "https://example.com""#).unwrap();
        assert_eq!(config.base_url().as_str(), "https://example.com/");
        assert_eq!(config.max_concurrent_downloads(), DEFAULT_CONCURRENCY);
    }

    #[test]
    fn test_from_toml_full_override() {
        let text = r#"
            base_url = "https://www.cebraspe.org.br"
            allowed_domains = ["cebraspe.org.br"]
            start_paths = ["/concursos", "/vestibulares"]
            max_depth = 3
            max_pages = 50
            max_concurrent_downloads = 10
            request_timeout_secs = 15
            retry_attempts = 5
            retry_delay_secs = 2
            rate_limit_ms = 250
            output_dir = "/tmp/ceb"
            user_agent = "custom-agent/1.0"
        "#;
        let config = CrawlerConfig::from_toml_str(text).unwrap();

        assert_eq!(config.allowed_domains(), ["cebraspe.org.br".to_string()]);
        assert_eq!(config.start_paths().len(), 2);
        assert_eq!(config.max_depth(), 3);
        assert_eq!(config.max_pages(), 50);
        assert_eq!(config.max_concurrent_downloads(), 10);
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.retry_attempts(), 5);
        assert_eq!(config.retry_delay(), Duration::from_secs(2));
        assert_eq!(config.rate_limit_delay(), Duration::from_millis(250));
        assert_eq!(config.pdfs_dir(), Path::new("/tmp/ceb/pdfs"));
        assert_eq!(config.user_agent(), "custom-agent/1.0");
    }

    #[test]
    fn test_from_toml_rejects_unknown_keys() {
        let result =
            CrawlerConfig::from_toml_str("base_url = \"https://example.com\"\nbogus = 1\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_from_toml_file_missing_is_io_error() {
        let result = CrawlerConfig::from_toml_file(Path::new("/nonexistent/crawler.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
