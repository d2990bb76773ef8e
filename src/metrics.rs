// src/metrics.rs
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static DESCRIBED: OnceCell<()> = OnceCell::new();

/// Register help text once per process.
pub fn ensure_metrics_described() {
    DESCRIBED.get_or_init(|| {
        describe_counter!("extraction_events_total", "Extraction attempts recorded by the monitor");
        describe_counter!("extraction_failures_total", "Extraction attempts that failed");
        describe_histogram!("extraction_total_ms", "End-to-end extraction latency (ms)");
        describe_counter!("redirect_cache_hits_total", "Redirect resolutions served from cache");
        describe_counter!("redirect_cache_misses_total", "Redirect resolutions that followed hops");
        describe_gauge!("redirect_cache_ttl_secs", "Configured redirect cache TTL (s)");
        describe_counter!("poll_runs_total", "Poll runs started");
        describe_counter!("poll_source_errors_total", "Feed sources that failed during a poll");
        describe_counter!("poll_new_items_total", "Releases newly persisted by polls");
        describe_gauge!("poll_last_run_ts", "Unix time of the last finished poll");
        describe_counter!("http_fetch_errors_total", "Outbound fetches that failed");
        describe_histogram!("feed_parse_ms", "Feed parse duration (ms)");
        describe_counter!("feed_items_total", "Items parsed from feeds");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and publish the static cache TTL gauge.
    pub fn init(redirect_ttl_secs: u64) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        ensure_metrics_described();
        gauge!("redirect_cache_ttl_secs").set(redirect_ttl_secs as f64);
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
