// src/api.rs
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use shuttle_axum::axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::config::IngestConfig;
use crate::ingest::poll::{PollSummary, Poller, TenantScope};
use crate::ingest::types::Fetcher;
use crate::ingest::validator::{FeedValidation, FeedValidator};
use crate::monitor::{ExtractionEvent, ExtractionMonitor, HealthStatus, WindowMetrics};
use crate::resolve::{CacheStats, RedirectFollower, RedirectResolver};
use crate::store::Storage;

pub const POLL_SECRET_HEADER: &str = "x-poll-secret";
const MAX_RECENT_EVENTS: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub poller: Arc<Poller>,
    pub monitor: Arc<ExtractionMonitor>,
    pub resolver: Arc<RedirectResolver>,
    pub validator: Arc<FeedValidator>,
    pub poll_secret: Option<Arc<str>>,
    /// Parent of every poll run's cancellation token.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire the components once per process.
    pub fn build(
        cfg: &IngestConfig,
        storage: Arc<dyn Storage>,
        fetcher: Arc<dyn Fetcher>,
        follower: Arc<dyn RedirectFollower>,
    ) -> Self {
        let monitor = Arc::new(ExtractionMonitor::new(&cfg.monitor));
        let resolver = Arc::new(RedirectResolver::from_config(follower, &cfg.resolver));
        let validator = Arc::new(FeedValidator::new(
            fetcher.clone(),
            Duration::from_millis(cfg.http.fetch_timeout_ms),
        ));
        let poller = Arc::new(Poller::new(
            storage,
            fetcher,
            resolver.clone(),
            monitor.clone(),
            cfg,
        ));
        Self {
            poller,
            monitor,
            resolver,
            validator,
            poll_secret: cfg.poll_secret.as_deref().map(Arc::from),
            shutdown: CancellationToken::new(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/poll", post(trigger_poll))
        .route("/api/extraction-health", get(extraction_health))
        .route("/api/extraction-health/reset", post(reset_extraction_health))
        .route("/api/feeds/validate", post(validate_feed))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

fn fail(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(json!({ "success": false, "error": error.to_string() })),
    )
        .into_response()
}

fn presented_secret(headers: &HeaderMap) -> Option<&str> {
    if let Some(v) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(v.trim());
    }
    headers
        .get(POLL_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
}

/// Compares digests so the check takes the same time wherever the inputs differ.
fn secret_matches(presented: &str, expected: &str) -> bool {
    let a = Sha256::digest(presented.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollReq {
    #[serde(default)]
    tenant_id: Option<String>,
}

#[derive(Serialize)]
struct PollResp {
    success: bool,
    #[serde(flatten)]
    summary: PollSummary,
}

async fn trigger_poll(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let Some(expected) = state.poll_secret.as_deref() else {
        return fail(StatusCode::SERVICE_UNAVAILABLE, "poll trigger is not configured");
    };
    if !presented_secret(&headers).is_some_and(|p| secret_matches(p, expected)) {
        tracing::warn!(target: "api", "poll trigger rejected: bad credential");
        return fail(StatusCode::UNAUTHORIZED, "unauthorized");
    }

    let req: PollReq = if body.iter().all(u8::is_ascii_whitespace) {
        PollReq::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(e) => return fail(StatusCode::BAD_REQUEST, format!("invalid body: {e}")),
        }
    };

    let scope = TenantScope::from_option(req.tenant_id);
    tracing::info!(target: "api", ?scope, "poll triggered");
    match state.poller.poll_all(scope, state.shutdown.child_token()).await {
        Ok(summary) => Json(PollResp {
            success: true,
            summary,
        })
        .into_response(),
        Err(e) => {
            tracing::error!(target: "api", error = %e, "poll run aborted");
            fail(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HealthQuery {
    window_ms: Option<u64>,
    recent: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResp {
    success: bool,
    status: HealthStatus,
    metrics: WindowMetrics,
    insights: Vec<String>,
    total_recorded: u64,
    cache_stats: CacheStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    window: Option<WindowMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recent_events: Option<Vec<ExtractionEvent>>,
}

async fn extraction_health(
    State(state): State<AppState>,
    query: Result<Query<HealthQuery>, QueryRejection>,
) -> Response {
    let q = match query {
        Ok(Query(q)) => q,
        Err(e) => return fail(StatusCode::BAD_REQUEST, format!("invalid query: {}", e.body_text())),
    };
    let report = state.monitor.health_check();
    let window = q
        .window_ms
        .filter(|ms| *ms > 0)
        .map(|ms| state.monitor.metrics_for_window(Duration::from_millis(ms)));
    let recent_events = q
        .recent
        .map(|n| state.monitor.recent_events(n.min(MAX_RECENT_EVENTS)));

    Json(HealthResp {
        success: true,
        status: report.status,
        metrics: report.metrics,
        insights: report.insights,
        total_recorded: report.total_recorded,
        cache_stats: state.resolver.cache_stats(),
        window,
        recent_events,
    })
    .into_response()
}

async fn reset_extraction_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.monitor.reset();
    Json(json!({ "success": true }))
}

#[derive(Debug, Deserialize)]
struct ValidateReq {
    #[serde(default)]
    url: String,
}

fn invalid_request(error: impl ToString) -> FeedValidation {
    FeedValidation {
        valid: false,
        error: Some(error.to_string()),
        suggested_name: String::new(),
        detected_type: Default::default(),
        timestamp: chrono::Utc::now(),
    }
}

async fn validate_feed(
    State(state): State<AppState>,
    body: Result<Json<ValidateReq>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(e) => {
            let out = invalid_request(format!("invalid body: {}", e.body_text()));
            return (StatusCode::BAD_REQUEST, Json(out)).into_response();
        }
    };
    let url = req.url.trim();
    if url.is_empty() {
        return Json(invalid_request("url is required")).into_response();
    }
    Json(state.validator.validate(url).await).into_response()
}
