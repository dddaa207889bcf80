//! End-to-end tests over a real HTTP server

use std::sync::Arc;
use std::time::Duration;
use storefront_fetch::{
    FetchError, HttpResourceLoader, HttpTransport, LoadOutcome, Orchestrator, OrchestratorConfig,
    PreloadError, RequestOptions, ResourceLoader, ResourceType, TieredCache, TieredCacheConfig,
};
use wiremock::matchers::{body_json, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn orchestrator() -> Orchestrator {
    init_tracing();
    let cache = Arc::new(
        TieredCache::new(TieredCacheConfig::new().with_sweep_interval(Duration::ZERO)).unwrap(),
    );
    Orchestrator::new(
        Arc::new(HttpTransport::new().unwrap()),
        cache,
        // Short backoff so the retry test stays fast in real time
        OrchestratorConfig::new().with_backoff_base(Duration::from_millis(5)),
    )
    .unwrap()
}

#[tokio::test]
async fn get_round_trip_with_query_params() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/products"))
        .and(query_param("cat", "shoes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{"sku": "a1"}])))
        .expect(1)
        .mount(&server)
        .await;

    let orch = orchestrator();
    let url = format!("{}/api/products", server.uri());

    let response = orch
        .get(&url, &[("cat", "shoes")], &RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    let items: Vec<serde_json::Value> = response.json().unwrap();
    assert_eq!(items.len(), 1);

    // Second read comes from cache without touching the server
    let cached = orch
        .get(&url, &[("cat", "shoes")], &RequestOptions::default())
        .await
        .unwrap();
    assert!(cached.from_cache);
}

#[tokio::test]
async fn post_sends_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/cart"))
        .and(body_json(serde_json::json!({"sku": "a1", "qty": 2})))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 7})))
        .expect(1)
        .mount(&server)
        .await;

    let orch = orchestrator();
    let response = orch
        .post(
            &format!("{}/api/cart", server.uri()),
            serde_json::json!({"sku": "a1", "qty": 2}),
            &RequestOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(response.status, 201);
}

#[tokio::test]
async fn server_errors_surface_after_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/flaky"))
        .respond_with(ResponseTemplate::new(503))
        // Initial attempt plus the configured three retries
        .expect(4)
        .mount(&server)
        .await;

    let orch = orchestrator();
    let error = orch
        .get(
            &format!("{}/api/flaky", server.uri()),
            &[],
            &RequestOptions::no_cache(),
        )
        .await
        .unwrap_err();
    assert_eq!(error, FetchError::Http { status: 503 });
}

#[tokio::test]
async fn asset_loads_report_cdn_cache_hits() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hero.webp"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-cache", "HIT from edge")
                .set_body_bytes(vec![0u8; 64]),
        )
        .mount(&server)
        .await;

    let loader = HttpResourceLoader::new().unwrap();
    let outcome = loader
        .load(&format!("{}/hero.webp", server.uri()), ResourceType::Image)
        .await
        .unwrap();
    assert_eq!(outcome, LoadOutcome { from_cache: true });
}

#[tokio::test]
async fn route_probes_use_head() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/checkout"))
        .and(header_exists("host"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let loader = HttpResourceLoader::new().unwrap();
    let outcome = loader
        .load(&format!("{}/checkout", server.uri()), ResourceType::Route)
        .await
        .unwrap();
    assert!(!outcome.from_cache);
}

#[tokio::test]
async fn failed_probe_reports_the_status() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let loader = HttpResourceLoader::new().unwrap();
    let error = loader
        .load(&format!("{}/gone", server.uri()), ResourceType::Route)
        .await
        .unwrap_err();
    assert_eq!(error, PreloadError::Probe { status: 404 });
}
