//! URL discovery: crawl the configured site and collect PDF candidates.
//!
//! The [`DiscoveryEngine`] runs a breadth-first crawl from the configured
//! start paths, bounded by `max_depth` and `max_pages`. A per-run visited
//! set guarantees no URL is fetched or yielded twice, so cyclic links
//! cannot loop the crawl. Candidate links (URL path ending in `.pdf`) are
//! classified by keyword and annotated with an inferred year.
//!
//! Individual page failures are logged and skipped; the run only fails if
//! no page can be fetched at all.

mod classify;

use std::collections::{HashSet, VecDeque};
use std::sync::LazyLock;

use scraper::{Html, Selector};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::cancel::CancelToken;
use crate::config::CrawlerConfig;
use crate::document::CandidateLink;
use crate::download::HttpClient;

use classify::{classify_document_type, infer_year, is_pdf_url};

#[allow(clippy::expect_used)]
static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector is valid"));

/// Errors that abort a discovery run.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// No start URL could be fetched; the site is unreachable.
    #[error("base URL unreachable: no page could be fetched from {base_url}")]
    BaseUnreachable {
        /// The configured base URL.
        base_url: String,
    },
}

/// Crawls the configured site and yields candidate document links.
#[derive(Debug)]
pub struct DiscoveryEngine<'a> {
    config: &'a CrawlerConfig,
    client: &'a HttpClient,
}

impl<'a> DiscoveryEngine<'a> {
    /// Creates an engine borrowing the run's config and HTTP client.
    #[must_use]
    pub fn new(config: &'a CrawlerConfig, client: &'a HttpClient) -> Self {
        Self { config, client }
    }

    /// Runs the crawl and returns every discovered candidate, in discovery
    /// order.
    ///
    /// Honors `cancel` between page fetches, returning the candidates
    /// collected so far.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::BaseUnreachable`] if not a single page
    /// could be fetched (and the run was not cancelled first). Individual
    /// page failures are logged and skipped.
    #[instrument(skip_all, fields(base_url = %self.config.base_url()))]
    pub async fn discover(
        &self,
        cancel: &CancelToken,
    ) -> Result<Vec<CandidateLink>, DiscoveryError> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier: VecDeque<(Url, u32)> = VecDeque::new();
        let mut candidates: Vec<CandidateLink> = Vec::new();
        let mut pages_fetched = 0usize;
        let mut cancelled = false;

        for path in self.config.start_paths() {
            match self.config.base_url().join(path) {
                Ok(start_url) => {
                    if visited.insert(start_url.to_string()) {
                        frontier.push_back((start_url, 0));
                    }
                }
                Err(e) => warn!(path = %path, error = %e, "invalid start path, skipping"),
            }
        }

        while let Some((page_url, depth)) = frontier.pop_front() {
            if cancel.is_cancelled() {
                info!(candidates = candidates.len(), "discovery cancelled");
                cancelled = true;
                break;
            }
            if pages_fetched >= self.config.max_pages() {
                info!(
                    max_pages = self.config.max_pages(),
                    "page budget exhausted, stopping crawl"
                );
                break;
            }

            let html = match self.client.fetch_page(page_url.as_str()).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(url = %page_url, error = %e, "page fetch failed, skipping");
                    continue;
                }
            };
            pages_fetched += 1;

            let links = extract_links(&html, &page_url);
            debug!(url = %page_url, depth, links = links.len(), "page crawled");

            for (link_url, link_text) in links {
                if !self.in_scope(&link_url) {
                    continue;
                }

                if is_pdf_url(&link_url) {
                    if visited.insert(link_url.to_string()) {
                        candidates.push(candidate_from_link(&link_url, &link_text));
                    }
                } else if depth < self.config.max_depth()
                    && visited.insert(link_url.to_string())
                {
                    frontier.push_back((link_url, depth + 1));
                }
            }
        }

        if pages_fetched == 0 && !cancelled {
            return Err(DiscoveryError::BaseUnreachable {
                base_url: self.config.base_url().to_string(),
            });
        }

        info!(
            pages = pages_fetched,
            candidates = candidates.len(),
            "discovery complete"
        );
        Ok(candidates)
    }

    /// Only http(s) links on allowed domains are followed or yielded.
    fn in_scope(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        url.host_str()
            .is_some_and(|host| self.config.is_allowed_host(host))
    }
}

/// Extracts `(absolute_url, anchor_text)` pairs from a page.
///
/// Synchronous on purpose: `scraper::Html` is not `Send`, so it must never
/// live across an await point in the crawl loop. Fragments are stripped so
/// `#section` anchors do not defeat the visited set.
fn extract_links(html: &str, page_url: &Url) -> Vec<(Url, String)> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();

    for element in document.select(&ANCHOR_SELECTOR) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(mut resolved) = page_url.join(href) else {
            debug!(href, "unresolvable href, skipping");
            continue;
        };
        resolved.set_fragment(None);

        let text = element.text().collect::<String>();
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        links.push((resolved, text));
    }

    links
}

/// Builds a candidate from a PDF link, inferring type and year.
fn candidate_from_link(url: &Url, link_text: &str) -> CandidateLink {
    let title = if link_text.trim().is_empty() {
        title_from_url(url)
    } else {
        link_text.trim().to_string()
    };

    CandidateLink {
        document_type: classify_document_type(url.as_str(), &title),
        year: infer_year(url.as_str(), &title),
        url: url.to_string(),
        title,
    }
}

/// Fallback title: the percent-decoded last path segment without extension.
fn title_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(|segment| {
            let decoded = urlencoding::decode(segment)
                .map(std::borrow::Cow::into_owned)
                .unwrap_or_else(|_| segment.to_string());
            match decoded.rfind('.') {
                Some(pos) if pos > 0 => decoded[..pos].to_string(),
                _ => decoded,
            }
        })
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| url.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use crate::document::DocumentType;

    fn page_url() -> Url {
        Url::parse("https://www.cebraspe.org.br/concursos/").unwrap()
    }

    #[test]
    fn test_extract_links_resolves_relative_hrefs() {
        let html = r#"<html><body>
            <a href="edital_2024.pdf">Edital 2024</a>
            <a href="/provas/manha.pdf">Prova</a>
            <a href="https://other.test/doc.pdf">External</a>
        </body></html>"#;

        let links = extract_links(html, &page_url());
        assert_eq!(links.len(), 3);
        assert_eq!(
            links[0].0.as_str(),
            "https://www.cebraspe.org.br/concursos/edital_2024.pdf"
        );
        assert_eq!(links[0].1, "Edital 2024");
        assert_eq!(
            links[1].0.as_str(),
            "https://www.cebraspe.org.br/provas/manha.pdf"
        );
    }

    #[test]
    fn test_extract_links_strips_fragments() {
        let html = r##"<a href="page.html#section">Link</a>"##;
        let links = extract_links(html, &page_url());
        assert_eq!(
            links[0].0.as_str(),
            "https://www.cebraspe.org.br/concursos/page.html"
        );
    }

    #[test]
    fn test_extract_links_collapses_anchor_whitespace() {
        let html = "<a href=\"doc.pdf\">  Edital\n   de   Abertura </a>";
        let links = extract_links(html, &page_url());
        assert_eq!(links[0].1, "Edital de Abertura");
    }

    #[test]
    fn test_candidate_from_link_infers_metadata() {
        let url = Url::parse("https://www.cebraspe.org.br/gabarito_2023.pdf").unwrap();
        let candidate = candidate_from_link(&url, "Gabarito Definitivo 2023");

        assert_eq!(candidate.document_type, DocumentType::Gabarito);
        assert_eq!(candidate.year, Some(2023));
        assert_eq!(candidate.title, "Gabarito Definitivo 2023");
    }

    #[test]
    fn test_candidate_title_falls_back_to_path_segment() {
        let url = Url::parse("https://www.cebraspe.org.br/docs/edital%20abertura.pdf").unwrap();
        let candidate = candidate_from_link(&url, "   ");
        assert_eq!(candidate.title, "edital abertura");
        assert_eq!(candidate.document_type, DocumentType::Edital);
    }

    #[test]
    fn test_in_scope_filters_domains_and_schemes() {
        let config = CrawlerConfig::builder("https://www.cebraspe.org.br")
            .build()
            .unwrap();
        let client = HttpClient::from_config(&config);
        let engine = DiscoveryEngine::new(&config, &client);

        let allowed = Url::parse("https://cebraspe.org.br/doc.pdf").unwrap();
        let subdomain = Url::parse("https://concursos.cebraspe.org.br/doc.pdf").unwrap();
        let external = Url::parse("https://example.com/doc.pdf").unwrap();
        let mailto = Url::parse("mailto:contato@cebraspe.org.br").unwrap();

        assert!(engine.in_scope(&allowed));
        assert!(engine.in_scope(&subdomain));
        assert!(!engine.in_scope(&external));
        assert!(!engine.in_scope(&mailto));
    }
}
