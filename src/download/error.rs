//! Error types for the download module.
//!
//! Structured errors for every download operation, carrying enough context
//! (URL, path, status) for the final report and for retry classification.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching pages or downloading documents.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present (for 429 responses).
        retry_after: Option<String>,
    },

    /// The server returned a content type that cannot be a document
    /// (typically an HTML page where a PDF was expected).
    #[error("unsupported content type {content_type:?} downloading {url}")]
    UnsupportedContentType {
        /// The URL whose response was rejected.
        url: String,
        /// The offending Content-Type header value.
        content_type: String,
    },

    /// File system error during download (create file, write, rename, etc.)
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates an unsupported content-type error.
    pub fn unsupported_content_type(
        url: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self::UnsupportedContentType {
            url: url.into(),
            content_type: content_type.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>` impls on purpose: the
// variants require context (url, path) the source errors don't carry, so the
// helper constructors are the conversion points.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display_includes_url() {
        let error = DownloadError::timeout("https://example.com/file.pdf");
        assert!(error.to_string().contains("timeout"));
        assert!(error.to_string().contains("https://example.com/file.pdf"));
    }

    #[test]
    fn test_http_status_display() {
        let error = DownloadError::http_status("https://example.com/file.pdf", 404);
        let msg = error.to_string();
        assert!(msg.contains("404"), "Expected '404' in: {msg}");
        assert!(
            msg.contains("https://example.com/file.pdf"),
            "Expected URL in: {msg}"
        );
    }

    #[test]
    fn test_unsupported_content_type_display() {
        let error =
            DownloadError::unsupported_content_type("https://example.com/doc.pdf", "text/html");
        let msg = error.to_string();
        assert!(msg.contains("text/html"), "Expected content type in: {msg}");
        assert!(msg.contains("doc.pdf"), "Expected URL in: {msg}");
    }

    #[test]
    fn test_io_display_includes_path() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = DownloadError::io(PathBuf::from("/tmp/test.pdf"), io_error);
        assert!(error.to_string().contains("/tmp/test.pdf"));
    }

    #[test]
    fn test_invalid_url_display() {
        let error = DownloadError::invalid_url("not-a-url");
        let msg = error.to_string();
        assert!(msg.contains("invalid URL"), "Expected 'invalid URL' in: {msg}");
        assert!(msg.contains("not-a-url"), "Expected URL in: {msg}");
    }

    #[test]
    fn test_retry_after_is_preserved() {
        let error = DownloadError::http_status_with_retry_after(
            "https://example.com",
            429,
            Some("120".to_string()),
        );
        match error {
            DownloadError::HttpStatus {
                status, retry_after, ..
            } => {
                assert_eq!(status, 429);
                assert_eq!(retry_after.as_deref(), Some("120"));
            }
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }
}
