//! Fetcher behavior against a local mock server: retry budget, redirect
//! chains, bounded body reads.

use std::time::Duration;

use board_resolver::{Fetcher, ResolverConfig, RetryPolicy};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_fetcher(max_redirects: usize) -> Fetcher {
    let config = ResolverConfig {
        per_domain_rps: 0.0,
        request_timeout_secs: 5,
        max_redirects,
        ..ResolverConfig::default()
    };
    Fetcher::new(&config).unwrap().with_retry_policy(RetryPolicy {
        attempts: 3,
        base_delay: Duration::from_millis(5),
    })
}

fn redirect_to(location: &str) -> ResponseTemplate {
    ResponseTemplate::new(302).insert_header("Location", location)
}

#[tokio::test]
async fn test_always_503_is_attempted_exactly_three_times() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = fast_fetcher(8)
        .resolve_redirects(&format!("{}/busy", server.uri()))
        .await;

    // A retryable status that never clears is still a response, not a failure.
    assert!(result.ok());
    assert_eq!(result.status_code, 503);
    assert_eq!(result.method, "HEAD");
}

#[tokio::test]
async fn test_records_every_hop_of_a_redirect_chain() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/old-jobs"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/moved"))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/moved"))
        .respond_with(redirect_to(&format!("{}/careers/", server.uri())))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/careers/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let base = server.uri();
    let result = fast_fetcher(8)
        .resolve_redirects(&format!("{base}/old-jobs?utm_source=newsletter"))
        .await;

    assert!(result.ok());
    assert_eq!(result.status_code, 200);
    assert_eq!(result.requested_url, format!("{base}/old-jobs"));
    assert_eq!(
        result.chain,
        vec![
            format!("{base}/old-jobs"),
            format!("{base}/moved"),
            format!("{base}/careers/"),
        ]
    );
    assert_eq!(result.final_url, format!("{base}/careers/"));
}

#[tokio::test]
async fn test_falls_back_to_get_when_head_exceeds_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/loop"))
        .respond_with(redirect_to("/loop"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(redirect_to("/loop"))
        .mount(&server)
        .await;

    let result = fast_fetcher(3)
        .resolve_redirects(&format!("{}/loop", server.uri()))
        .await;

    assert!(!result.ok());
    assert_eq!(result.status_code, 0);
    assert_eq!(result.method, "GET");
    assert!(result.error.contains("exceeded 3 redirects"), "{}", result.error);
    assert_eq!(result.chain, vec![format!("{}/loop", server.uri())]);
}

#[tokio::test]
async fn test_http_error_status_is_still_ok() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let result = fast_fetcher(8)
        .resolve_redirects(&format!("{}/gone", server.uri()))
        .await;
    assert!(result.ok());
    assert_eq!(result.status_code, 404);
}

#[tokio::test]
async fn test_connection_refused_is_retried_then_reported() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let result = fast_fetcher(8)
        .resolve_redirects(&format!("http://127.0.0.1:{port}/jobs"))
        .await;
    assert!(!result.ok());
    assert!(!result.error.is_empty());
    assert_eq!(result.final_url, format!("http://127.0.0.1:{port}/jobs"));
}

#[tokio::test]
async fn test_fetch_html_truncates_at_byte_limit() {
    let server = MockServer::start().await;
    let page = format!("<html><body>{}</body></html>", "x".repeat(20_000));
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(page, "text/html; charset=utf-8"))
        .mount(&server)
        .await;

    let fetched = fast_fetcher(8)
        .fetch_html(&format!("{}/big", server.uri()), 1_000)
        .await;
    assert_eq!(fetched.body.len(), 1_000);
    assert!(fetched.body.starts_with("<html><body>x"));
    assert_eq!(fetched.final_url, format!("{}/big", server.uri()));
}

#[tokio::test]
async fn test_fetch_html_follows_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(redirect_to("/landing"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/landing"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<p>hello</p>", "text/html"))
        .mount(&server)
        .await;

    let fetched = fast_fetcher(8)
        .fetch_html(&format!("{}/start", server.uri()), 10_000)
        .await;
    assert_eq!(fetched.body, "<p>hello</p>");
    assert_eq!(fetched.final_url, format!("{}/landing", server.uri()));
}

#[tokio::test]
async fn test_fetch_html_rejects_other_content_and_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/postings.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"%PDF-1.4".to_vec(), "application/pdf"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_raw("<p>oops</p>", "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<urlset/>", "application/xml"))
        .mount(&server)
        .await;

    let fetcher = fast_fetcher(8);
    let base = server.uri();

    let pdf = fetcher.fetch_html(&format!("{base}/postings.pdf"), 10_000).await;
    assert!(pdf.is_empty());

    let broken = fetcher.fetch_html(&format!("{base}/broken"), 10_000).await;
    assert!(broken.is_empty());
    assert_eq!(broken.final_url, format!("{base}/broken"));

    let xml = fetcher.fetch_html(&format!("{base}/sitemap.xml"), 10_000).await;
    assert_eq!(xml.body, "<urlset/>");
}
