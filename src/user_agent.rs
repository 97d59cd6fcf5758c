//! Shared User-Agent string for crawler HTTP traffic.
//!
//! Single source for project URL and UA format so discovery and download
//! traffic stay consistent and easy to update (good citizenship; RFC 9308).

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/cebcrawl";

/// Default User-Agent for crawler requests (identifies the tool).
#[must_use]
pub(crate) fn default_crawler_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("cebcrawl/{version} (document-archival-tool; +{PROJECT_UA_URL})")
}
