// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /api/poll  (credential handling, summary shape)
// - GET /api/extraction-health (+ window, recent)
// - POST /api/extraction-health/reset
// - POST /api/feeds/validate

use std::sync::Arc;

use serde_json::json;
use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt as _; // for `oneshot`

use newswire_ingest::config::IngestConfig;
use newswire_ingest::ingest::types::{FeedSource, FeedType, StaticFetcher};
use newswire_ingest::resolve::StaticFollower;
use newswire_ingest::store::MemoryStore;
use newswire_ingest::{router, AppState, ExtractionEvent, IngestError};

const BODY_LIMIT: usize = 1024 * 1024;
const SECRET: &str = "test-secret";
const FEED_URL: &str = "https://investors.acme.com/rss";
const FEED: &str = include_str!("fixtures/wire_feed.xml");

fn test_state(secret: Option<&str>) -> AppState {
    let mut cfg = IngestConfig::default();
    cfg.poll.inter_source_delay_ms = 0;
    cfg.poll.fetch_full_articles = false;
    cfg.poll_secret = secret.map(str::to_string);

    let store = Arc::new(MemoryStore::new());
    store.add_source(FeedSource::new("t1", FEED_URL, "Acme IR", FeedType::IrNews));
    let fetcher = Arc::new(StaticFetcher::new().with(FEED_URL, FEED));
    AppState::build(&cfg, store, fetcher, Arc::new(StaticFollower::new()))
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Json) {
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, json)
}

fn post_json(uri: &str, payload: Json) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build POST")
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let app = router(test_state(None));
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");
    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(String::from_utf8(bytes.to_vec()).unwrap().trim(), "OK");
}

#[tokio::test]
async fn poll_without_server_secret_is_503() {
    let app = router(test_state(None));
    let (status, body) = send(app, post_json("/api/poll", json!({}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn poll_with_wrong_or_missing_secret_is_401() {
    let state = test_state(Some(SECRET));

    let (status, body) = send(router(state.clone()), post_json("/api/poll", json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());

    let mut req = post_json("/api/poll", json!({}));
    req.headers_mut()
        .insert("x-poll-secret", "nope".parse().unwrap());
    let (status, _) = send(router(state), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn poll_with_bearer_secret_returns_summary() {
    let app = router(test_state(Some(SECRET)));
    let mut req = post_json("/api/poll", json!({ "tenantId": "t1" }));
    req.headers_mut().insert(
        "authorization",
        format!("Bearer {SECRET}").parse().unwrap(),
    );
    let (status, body) = send(app, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["totalSources"], 1);
    assert_eq!(body["succeeded"], 1);
    assert_eq!(body["failed"], 0);
    assert_eq!(body["newItems"], 2);
    assert!(body["errors"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn poll_with_empty_body_covers_all_tenants() {
    let app = router(test_state(Some(SECRET)));
    let req = Request::builder()
        .method("POST")
        .uri("/api/poll")
        .header("x-poll-secret", SECRET)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalSources"], 1);
}

#[tokio::test]
async fn poll_for_unknown_tenant_is_structured_error() {
    let app = router(test_state(Some(SECRET)));
    let mut req = post_json("/api/poll", json!({ "tenantId": "ghost" }));
    req.headers_mut()
        .insert("x-poll-secret", SECRET.parse().unwrap());
    let (status, body) = send(app, req).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("scope resolution failed"));
}

#[tokio::test]
async fn extraction_health_reports_status_cache_and_optional_sections() {
    let state = test_state(None);
    state.monitor.record(
        ExtractionEvent::succeeded("https://acme.com/pr/1", "selector:article", 0.8)
            .with_timings(3, 20, false),
    );
    state.monitor.record(ExtractionEvent::failed(
        "https://acme.com/pr/2",
        &IngestError::NoContentFound,
    ));

    let req = Request::builder()
        .uri("/api/extraction-health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(router(state.clone()), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["metrics"]["total"], 2);
    assert!(body["insights"].as_array().unwrap().len() >= 2);
    assert_eq!(body["cacheStats"]["size"], 0);
    assert!(body.get("window").is_none());
    assert!(body.get("recentEvents").is_none());

    let req = Request::builder()
        .uri("/api/extraction-health?windowMs=600000&recent=1")
        .body(Body::empty())
        .unwrap();
    let (_, body) = send(router(state), req).await;
    assert_eq!(body["window"]["windowMs"], 600000);
    assert_eq!(body["window"]["total"], 2);
    let recent = body["recentEvents"].as_array().unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0]["url"], "https://acme.com/pr/2");
}

#[tokio::test]
async fn reset_clears_monitor_only() {
    let state = test_state(None);
    for i in 0..3 {
        state.monitor.record(ExtractionEvent::failed(
            &format!("https://acme.com/{i}"),
            &IngestError::NoContentFound,
        ));
    }
    let req = Request::builder()
        .method("POST")
        .uri("/api/extraction-health/reset")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(router(state.clone()), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let report = state.monitor.health_check();
    assert_eq!(report.total_recorded, 0);
    assert_eq!(report.status, newswire_ingest::HealthStatus::Healthy);
}

#[tokio::test]
async fn validate_feed_returns_structured_result() {
    let app = router(test_state(None));
    let (status, body) = send(app, post_json("/api/feeds/validate", json!({ "url": FEED_URL }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["suggestedName"], "Wire Releases");
    assert_eq!(body["detectedType"], "ir-news");
    assert!(body["timestamp"].is_string());

    let app = router(test_state(None));
    let (_, body) = send(
        app,
        post_json("/api/feeds/validate", json!({ "url": "https://nowhere.example/feed" })),
    )
    .await;
    assert_eq!(body["valid"], false);
    assert!(body["error"].as_str().unwrap().contains("unreachable"));
    assert_eq!(body["suggestedName"], "nowhere.example");

    let app = router(test_state(None));
    let (_, body) = send(app, post_json("/api/feeds/validate", json!({}))).await;
    assert_eq!(body["valid"], false);
    assert_eq!(body["error"], "url is required");
}

#[tokio::test]
async fn validate_feed_with_malformed_body_is_structured() {
    let app = router(test_state(None));
    let req = Request::builder()
        .method("POST")
        .uri("/api/feeds/validate")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["valid"], false);
    assert!(body["error"].as_str().unwrap().starts_with("invalid body"));
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn extraction_health_with_bad_query_is_structured() {
    let app = router(test_state(None));
    let req = Request::builder()
        .uri("/api/extraction-health?windowMs=abc")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().starts_with("invalid query"));
}
