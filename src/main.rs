//! Newswire ingest service: binary entrypoint.
//! Boots the Axum HTTP server, wiring config, shared components and routes.

use std::sync::Arc;

use newswire_ingest::api::{self, AppState};
use newswire_ingest::config::IngestConfig;
use newswire_ingest::ingest::http::HttpFetcher;
use newswire_ingest::metrics::Metrics;
use newswire_ingest::resolve::HttpFollower;
use newswire_ingest::store::MemoryStore;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs by default, JSON when `LOG_FORMAT=json`. `RUST_LOG` overrides the filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("newswire_ingest=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    // The hosting runtime may already own the global subscriber.
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = IngestConfig::load_default()?;
    if cfg.poll_secret.is_none() {
        tracing::warn!("POLL_SHARED_SECRET not set; /api/poll will answer 503");
    }

    let store = Arc::new(MemoryStore::from_config(&cfg));
    let fetcher = Arc::new(HttpFetcher::new(&cfg.http)?);
    let follower = Arc::new(HttpFollower::new(&cfg.http, &cfg.resolver)?);
    let state = AppState::build(&cfg, store, fetcher, follower);

    let mut router = api::router(state);
    match Metrics::init(cfg.resolver.ttl_secs) {
        Ok(metrics) => router = router.merge(metrics.router()),
        Err(e) => tracing::warn!(error = %e, "prometheus recorder not installed; /metrics disabled"),
    }

    tracing::info!(
        sources = cfg.sources.len(),
        companies = cfg.companies.len(),
        "newswire ingest ready"
    );
    Ok(router.into())
}
