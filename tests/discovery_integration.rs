//! Integration tests for the discovery engine.
//!
//! Pages are served from a mock HTTP server; each test builds a small site
//! graph and asserts on the candidate links the crawl yields.

use std::collections::HashSet;
use std::time::Duration;

use cebcrawl_core::{
    CancelToken, CrawlerConfig, DiscoveryEngine, DiscoveryError, DocumentType, HttpClient,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> CrawlerConfig {
    CrawlerConfig::builder(server.uri())
        .request_timeout(Duration::from_secs(5))
        .build()
        .expect("test config is valid")
}

async fn mount_page(server: &MockServer, page_path: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "text/html")
                .set_body_string(body.to_string()),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_discover_collects_and_classifies_pdf_links() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        r#"<html><body>
            <a href="/docs/edital_abertura_2024.pdf">Edital de Abertura 2024</a>
            <a href="/docs/gabarito.pdf">Gabarito Preliminar</a>
            <a href="/concursos">Concursos</a>
        </body></html>"#,
    )
    .await;
    mount_page(
        &server,
        "/concursos",
        r#"<a href="/docs/resultado_final.pdf">Resultado Final</a>"#,
    )
    .await;

    let config = config_for(&server);
    let client = HttpClient::from_config(&config);
    let engine = DiscoveryEngine::new(&config, &client);

    let candidates = engine
        .discover(&CancelToken::new())
        .await
        .expect("discovery should succeed");

    assert_eq!(candidates.len(), 3);
    assert_eq!(candidates[0].document_type, DocumentType::Edital);
    assert_eq!(candidates[0].year, Some(2024));
    assert_eq!(candidates[0].title, "Edital de Abertura 2024");
    assert_eq!(candidates[1].document_type, DocumentType::Gabarito);
    assert_eq!(candidates[2].document_type, DocumentType::Resultado);
}

#[tokio::test]
async fn test_discover_never_yields_a_url_twice() {
    let server = MockServer::start().await;
    // Two pages link to each other (cycle) and both link the same PDF
    mount_page(
        &server,
        "/",
        r#"<a href="/b">B</a> <a href="/docs/shared.pdf">Prova</a>"#,
    )
    .await;
    mount_page(
        &server,
        "/b",
        r#"<a href="/">Home</a> <a href="/docs/shared.pdf">Prova</a>"#,
    )
    .await;

    let config = config_for(&server);
    let client = HttpClient::from_config(&config);
    let engine = DiscoveryEngine::new(&config, &client);

    let candidates = engine
        .discover(&CancelToken::new())
        .await
        .expect("discovery should terminate on cyclic links");

    let urls: Vec<_> = candidates.iter().map(|c| c.url.clone()).collect();
    let unique: HashSet<_> = urls.iter().cloned().collect();
    assert_eq!(urls.len(), unique.len(), "no URL may be yielded twice");
    assert_eq!(candidates.len(), 1);
}

#[tokio::test]
async fn test_discover_skips_failed_pages() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        r#"<a href="/broken">Broken</a> <a href="/docs/prova.pdf">Prova</a>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let client = HttpClient::from_config(&config);
    let engine = DiscoveryEngine::new(&config, &client);

    let candidates = engine
        .discover(&CancelToken::new())
        .await
        .expect("one broken page must not abort discovery");

    assert_eq!(candidates.len(), 1);
    assert!(candidates[0].url.ends_with("/docs/prova.pdf"));
}

#[tokio::test]
async fn test_discover_unreachable_base_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let client = HttpClient::from_config(&config);
    let engine = DiscoveryEngine::new(&config, &client);

    let result = engine.discover(&CancelToken::new()).await;
    assert!(matches!(
        result,
        Err(DiscoveryError::BaseUnreachable { .. })
    ));
}

#[tokio::test]
async fn test_discover_respects_max_depth() {
    let server = MockServer::start().await;
    mount_page(&server, "/", r#"<a href="/level1">L1</a>"#).await;
    mount_page(&server, "/level1", r#"<a href="/level2">L2</a>"#).await;
    // Would only be reached at depth 2
    mount_page(&server, "/level2", r#"<a href="/docs/deep.pdf">Deep</a>"#).await;

    let config = CrawlerConfig::builder(server.uri())
        .max_depth(1)
        .build()
        .expect("test config is valid");
    let client = HttpClient::from_config(&config);
    let engine = DiscoveryEngine::new(&config, &client);

    let candidates = engine
        .discover(&CancelToken::new())
        .await
        .expect("discovery should succeed");

    assert!(candidates.is_empty(), "depth-2 PDF must not be reached");
}

#[tokio::test]
async fn test_discover_respects_max_pages() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        r#"<a href="/p1">1</a> <a href="/p2">2</a> <a href="/p3">3</a>"#,
    )
    .await;
    for p in ["/p1", "/p2", "/p3"] {
        mount_page(
            &server,
            p,
            &format!(r#"<a href="{p}/doc.pdf">Prova</a>"#),
        )
        .await;
    }

    let config = CrawlerConfig::builder(server.uri())
        .max_pages(2)
        .build()
        .expect("test config is valid");
    let client = HttpClient::from_config(&config);
    let engine = DiscoveryEngine::new(&config, &client);

    let candidates = engine
        .discover(&CancelToken::new())
        .await
        .expect("discovery should succeed");

    // Root plus one subpage fetched: only one PDF can be known
    assert_eq!(candidates.len(), 1);
}

#[tokio::test]
async fn test_discover_filters_external_domains() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        r#"<a href="https://elsewhere.example/doc.pdf">External</a>
           <a href="/docs/local.pdf">Local</a>"#,
    )
    .await;

    let config = config_for(&server);
    let client = HttpClient::from_config(&config);
    let engine = DiscoveryEngine::new(&config, &client);

    let candidates = engine
        .discover(&CancelToken::new())
        .await
        .expect("discovery should succeed");

    assert_eq!(candidates.len(), 1);
    assert!(candidates[0].url.ends_with("/docs/local.pdf"));
}

#[tokio::test]
async fn test_discover_cancelled_returns_partial() {
    let server = MockServer::start().await;
    mount_page(&server, "/", r#"<a href="/docs/doc.pdf">Doc</a>"#).await;

    let config = config_for(&server);
    let client = HttpClient::from_config(&config);
    let engine = DiscoveryEngine::new(&config, &client);

    let cancel = CancelToken::new();
    cancel.cancel();
    let candidates = engine
        .discover(&cancel)
        .await
        .expect("cancelled discovery is not an error");

    assert!(candidates.is_empty());
}
