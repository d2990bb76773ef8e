// src/monitor.rs
//! # Extraction Monitor
//! Per-attempt extraction outcomes turned into a rolling health status.
//!
//! Memory is bounded two ways: a fixed-capacity ring of recent events, and
//! fixed-width time buckets (default 1 minute, retained 48h) holding running
//! aggregates. Windowed metrics are computed from buckets only, so bucket
//! granularity is the window resolution.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};

use crate::config::MonitorConfig;
use crate::error::IngestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    Timeout,
    NoContent,
    Resolution,
    Fetch,
    Other,
}

impl FailureKind {
    pub fn of(err: &IngestError) -> Self {
        match err {
            IngestError::Timeout { .. } => FailureKind::Timeout,
            IngestError::NoContentFound | IngestError::QualityRejected(_) => FailureKind::NoContent,
            IngestError::ResolutionFailed { .. } => FailureKind::Resolution,
            IngestError::FeedUnreachable { .. } | IngestError::InvalidFeed(_) => FailureKind::Fetch,
            _ => FailureKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::NoContent => "no-content",
            FailureKind::Resolution => "resolution",
            FailureKind::Fetch => "fetch",
            FailureKind::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionEvent {
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub success: bool,
    pub redirect_time_ms: u64,
    pub extraction_time_ms: u64,
    pub total_time_ms: u64,
    /// Redirect resolution was served from cache.
    pub cached: bool,
    pub final_source_domain: Option<String>,
    pub extracted_by: Option<String>,
    pub confidence: Option<f32>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
}

impl ExtractionEvent {
    pub fn succeeded(url: &str, method: &str, confidence: f32) -> Self {
        Self {
            timestamp: Utc::now(),
            url: url.to_string(),
            success: true,
            redirect_time_ms: 0,
            extraction_time_ms: 0,
            total_time_ms: 0,
            cached: false,
            final_source_domain: domain_of(url),
            extracted_by: Some(method.to_string()),
            confidence: Some(confidence),
            error: None,
            failure_kind: None,
        }
    }

    pub fn failed(url: &str, err: &IngestError) -> Self {
        Self {
            timestamp: Utc::now(),
            url: url.to_string(),
            success: false,
            redirect_time_ms: 0,
            extraction_time_ms: 0,
            total_time_ms: 0,
            cached: false,
            final_source_domain: domain_of(url),
            extracted_by: None,
            confidence: None,
            error: Some(err.to_string()),
            failure_kind: Some(FailureKind::of(err)),
        }
    }

    pub fn with_timings(mut self, redirect_ms: u64, extraction_ms: u64, cached: bool) -> Self {
        self.redirect_time_ms = redirect_ms;
        self.extraction_time_ms = extraction_ms;
        self.total_time_ms = redirect_ms + extraction_ms;
        self.cached = cached;
        self
    }

    pub fn at(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = ts;
        self
    }

    fn kind(&self) -> Option<FailureKind> {
        if self.success {
            None
        } else {
            Some(self.failure_kind.unwrap_or(FailureKind::Other))
        }
    }
}

fn domain_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Upper bounds (ms) of the latency histogram bins; the last bin is open.
const LATENCY_BOUNDS_MS: [u64; 12] = [
    10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 25_000, 60_000,
];
const LATENCY_BINS: usize = LATENCY_BOUNDS_MS.len() + 1;

fn latency_bin(ms: u64) -> usize {
    LATENCY_BOUNDS_MS
        .iter()
        .position(|&b| ms <= b)
        .unwrap_or(LATENCY_BOUNDS_MS.len())
}

#[derive(Debug, Clone, Default)]
struct Bucket {
    total: u64,
    successes: u64,
    cache_hits: u64,
    redirect_ms: u64,
    extraction_ms: u64,
    total_ms: u64,
    max_total_ms: u64,
    latency: [u64; LATENCY_BINS],
    methods: BTreeMap<String, u64>,
    failures: BTreeMap<FailureKind, u64>,
}

impl Bucket {
    fn add(&mut self, ev: &ExtractionEvent) {
        self.total += 1;
        if ev.success {
            self.successes += 1;
        }
        if ev.cached {
            self.cache_hits += 1;
        }
        self.redirect_ms += ev.redirect_time_ms;
        self.extraction_ms += ev.extraction_time_ms;
        self.total_ms += ev.total_time_ms;
        self.max_total_ms = self.max_total_ms.max(ev.total_time_ms);
        self.latency[latency_bin(ev.total_time_ms)] += 1;
        if let Some(m) = &ev.extracted_by {
            *self.methods.entry(m.clone()).or_default() += 1;
        }
        if let Some(k) = ev.kind() {
            *self.failures.entry(k).or_default() += 1;
        }
    }

    fn absorb(&mut self, other: &Bucket) {
        self.total += other.total;
        self.successes += other.successes;
        self.cache_hits += other.cache_hits;
        self.redirect_ms += other.redirect_ms;
        self.extraction_ms += other.extraction_ms;
        self.total_ms += other.total_ms;
        self.max_total_ms = self.max_total_ms.max(other.max_total_ms);
        for (a, b) in self.latency.iter_mut().zip(other.latency.iter()) {
            *a += b;
        }
        for (m, n) in &other.methods {
            *self.methods.entry(m.clone()).or_default() += n;
        }
        for (k, n) in &other.failures {
            *self.failures.entry(*k).or_default() += n;
        }
    }

    /// Upper bound of the bin holding the 95th percentile, capped at the max seen.
    fn p95_ms(&self) -> u64 {
        if self.total == 0 {
            return 0;
        }
        let target = (self.total as f64 * 0.95).ceil() as u64;
        let mut seen = 0;
        for (i, n) in self.latency.iter().enumerate() {
            seen += n;
            if seen >= target {
                let bound = LATENCY_BOUNDS_MS.get(i).copied().unwrap_or(u64::MAX);
                return bound.min(self.max_total_ms);
            }
        }
        self.max_total_ms
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowMetrics {
    pub window_ms: u64,
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
    pub success_rate: f64,
    pub cache_hits: u64,
    pub cache_hit_rate: f64,
    pub avg_redirect_ms: f64,
    pub avg_extraction_ms: f64,
    pub avg_total_ms: f64,
    pub p95_total_ms: u64,
    pub by_method: BTreeMap<String, u64>,
    pub by_failure: BTreeMap<String, u64>,
}

impl WindowMetrics {
    fn from_bucket(b: &Bucket, window: Duration) -> Self {
        let ratio = |n: u64| if b.total > 0 { n as f64 / b.total as f64 } else { 0.0 };
        Self {
            window_ms: window.as_millis() as u64,
            total: b.total,
            successes: b.successes,
            failures: b.total - b.successes,
            // Empty window reads as fully healthy.
            success_rate: if b.total > 0 { ratio(b.successes) } else { 1.0 },
            cache_hits: b.cache_hits,
            cache_hit_rate: ratio(b.cache_hits),
            avg_redirect_ms: ratio(b.redirect_ms),
            avg_extraction_ms: ratio(b.extraction_ms),
            avg_total_ms: ratio(b.total_ms),
            p95_total_ms: b.p95_ms(),
            by_method: b.methods.clone(),
            by_failure: b
                .failures
                .iter()
                .map(|(k, n)| (k.as_str().to_string(), *n))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub metrics: WindowMetrics,
    pub insights: Vec<String>,
    /// Events recorded since construction or the last reset.
    pub total_recorded: u64,
    pub last_event_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    pub degraded_success_rate: f64,
    pub degraded_p95_ms: u64,
    pub unhealthy_success_rate: f64,
}

#[derive(Debug, Default)]
struct Inner {
    ring: VecDeque<ExtractionEvent>,
    /// Keyed by bucket start (unix seconds).
    buckets: BTreeMap<i64, Bucket>,
    total_recorded: u64,
}

/// Thread-safe extraction monitor. Construct once per process and share via `Arc`.
#[derive(Debug)]
pub struct ExtractionMonitor {
    inner: Mutex<Inner>,
    ring_capacity: usize,
    bucket_secs: i64,
    retention: Duration,
    lookback: Duration,
    thresholds: HealthThresholds,
}

impl ExtractionMonitor {
    pub fn new(cfg: &MonitorConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            ring_capacity: cfg.ring_capacity.max(1),
            bucket_secs: cfg.bucket_secs.max(1) as i64,
            retention: Duration::from_secs(cfg.retention_hours * 3600),
            lookback: Duration::from_secs(cfg.lookback_mins * 60),
            thresholds: HealthThresholds {
                degraded_success_rate: cfg.degraded_success_rate,
                degraded_p95_ms: cfg.degraded_p95_ms,
                unhealthy_success_rate: cfg.unhealthy_success_rate,
            },
        }
    }

    fn bucket_start(&self, ts: DateTime<Utc>) -> i64 {
        ts.timestamp().div_euclid(self.bucket_secs) * self.bucket_secs
    }

    pub fn record(&self, ev: ExtractionEvent) {
        counter!("extraction_events_total").increment(1);
        histogram!("extraction_total_ms").record(ev.total_time_ms as f64);
        if !ev.success {
            counter!("extraction_failures_total").increment(1);
            tracing::debug!(
                target: "monitor",
                url = %ev.url,
                kind = ev.kind().map(|k| k.as_str()).unwrap_or("other"),
                error = ev.error.as_deref().unwrap_or(""),
                "extraction failed"
            );
        }

        let start = self.bucket_start(ev.timestamp);
        let cutoff = self.bucket_start(ev.timestamp - self.retention_chrono());

        let mut inner = self.inner.lock().expect("monitor mutex poisoned");
        inner.total_recorded += 1;
        inner.buckets.entry(start).or_default().add(&ev);
        // Drop buckets that fell out of retention.
        inner.buckets = inner.buckets.split_off(&cutoff);

        inner.ring.push_back(ev);
        while inner.ring.len() > self.ring_capacity {
            inner.ring.pop_front();
        }
    }

    fn retention_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.retention).unwrap_or_else(|_| chrono::Duration::hours(48))
    }

    pub fn metrics_for_window(&self, window: Duration) -> WindowMetrics {
        self.metrics_for_window_at(window, Utc::now())
    }

    /// Aggregate every bucket overlapping `[now - window, now]`.
    pub fn metrics_for_window_at(&self, window: Duration, now: DateTime<Utc>) -> WindowMetrics {
        let window = window.min(self.retention);
        let span = chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
        let from = self.bucket_start(now - span);
        let to = self.bucket_start(now);

        let inner = self.inner.lock().expect("monitor mutex poisoned");
        let mut acc = Bucket::default();
        for (_, b) in inner.buckets.range(from..=to) {
            acc.absorb(b);
        }
        WindowMetrics::from_bucket(&acc, window)
    }

    pub fn health_check(&self) -> HealthReport {
        self.health_check_at(Utc::now())
    }

    pub fn health_check_at(&self, now: DateTime<Utc>) -> HealthReport {
        let metrics = self.metrics_for_window_at(self.lookback, now);
        let status = self.classify(&metrics);
        let insights = self.insights(&metrics);
        let inner = self.inner.lock().expect("monitor mutex poisoned");
        HealthReport {
            status,
            metrics,
            insights,
            total_recorded: inner.total_recorded,
            last_event_at: inner.ring.back().map(|e| e.timestamp),
        }
    }

    fn classify(&self, m: &WindowMetrics) -> HealthStatus {
        let t = &self.thresholds;
        if m.total == 0 {
            return HealthStatus::Healthy;
        }
        if m.success_rate < t.unhealthy_success_rate {
            HealthStatus::Unhealthy
        } else if m.success_rate < t.degraded_success_rate || m.p95_total_ms > t.degraded_p95_ms {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    fn insights(&self, m: &WindowMetrics) -> Vec<String> {
        let mins = self.lookback.as_secs() / 60;
        if m.total == 0 {
            return vec![format!("no extractions recorded in the last {mins} min")];
        }
        let mut out = vec![format!(
            "{} of {} extractions succeeded in the last {mins} min ({:.0}%)",
            m.successes,
            m.total,
            m.success_rate * 100.0
        )];
        if let Some((kind, n)) = m.by_failure.iter().max_by_key(|(_, n)| **n) {
            out.push(format!("dominant failure cause: {kind} ({n} of {})", m.failures));
        }
        out.push(format!("redirect cache hit ratio {:.0}%", m.cache_hit_rate * 100.0));
        if let Some((method, n)) = m.by_method.iter().max_by_key(|(_, n)| **n) {
            out.push(format!("most used extraction method: {method} ({n})"));
        }
        if m.p95_total_ms > self.thresholds.degraded_p95_ms {
            out.push(format!(
                "p95 latency {}ms exceeds {}ms",
                m.p95_total_ms, self.thresholds.degraded_p95_ms
            ));
        }
        out
    }

    /// Up to `n` most recent events, newest first.
    pub fn recent_events(&self, n: usize) -> Vec<ExtractionEvent> {
        let inner = self.inner.lock().expect("monitor mutex poisoned");
        inner.ring.iter().rev().take(n).cloned().collect()
    }

    /// Clear events and aggregates. Does not touch the redirect cache.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("monitor mutex poisoned");
        *inner = Inner::default();
        tracing::info!(target: "monitor", "extraction metrics reset");
    }

    pub fn lookback(&self) -> Duration {
        self.lookback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> ExtractionMonitor {
        ExtractionMonitor::new(&MonitorConfig {
            ring_capacity: 5,
            ..MonitorConfig::default()
        })
    }

    fn ok(url: &str, ms: u64) -> ExtractionEvent {
        ExtractionEvent::succeeded(url, "selector:article", 0.8).with_timings(0, ms, false)
    }

    #[test]
    fn empty_monitor_is_healthy() {
        let m = monitor();
        let r = m.health_check();
        assert_eq!(r.status, HealthStatus::Healthy);
        assert_eq!(r.total_recorded, 0);
        assert_eq!(r.metrics.total, 0);
        assert!(r.insights[0].starts_with("no extractions"));
    }

    #[test]
    fn ring_is_bounded_and_newest_first() {
        let m = monitor();
        for i in 0..8 {
            m.record(ok(&format!("https://a.com/{i}"), 10));
        }
        let recent = m.recent_events(100);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].url, "https://a.com/7");
        assert_eq!(m.health_check().total_recorded, 8);
        assert_eq!(m.health_check().metrics.total, 8);
    }

    #[test]
    fn slow_extractions_degrade() {
        let m = monitor();
        for i in 0..20 {
            m.record(ok(&format!("https://a.com/{i}"), 8_000));
        }
        let r = m.health_check();
        assert_eq!(r.metrics.success_rate, 1.0);
        assert_eq!(r.metrics.p95_total_ms, 8_000);
        assert_eq!(r.status, HealthStatus::Degraded);
    }

    #[test]
    fn windows_exclude_old_buckets() {
        let m = monitor();
        let now = Utc::now();
        m.record(ok("https://a.com/old", 10).at(now - chrono::Duration::hours(3)));
        m.record(ok("https://a.com/new", 10).at(now));

        let hour = m.metrics_for_window_at(Duration::from_secs(3600), now);
        assert_eq!(hour.total, 1);
        let day = m.metrics_for_window_at(Duration::from_secs(24 * 3600), now);
        assert_eq!(day.total, 2);
    }

    #[test]
    fn retention_drops_expired_buckets() {
        let m = monitor();
        let now = Utc::now();
        m.record(ok("https://a.com/ancient", 10).at(now - chrono::Duration::hours(50)));
        m.record(ok("https://a.com/new", 10).at(now));
        let all = m.metrics_for_window_at(Duration::from_secs(100 * 3600), now);
        assert_eq!(all.total, 1);
    }

    #[test]
    fn failure_kinds_are_classified() {
        assert_eq!(FailureKind::of(&IngestError::NoContentFound), FailureKind::NoContent);
        assert_eq!(
            FailureKind::of(&IngestError::Timeout { op: "x", ms: 1 }),
            FailureKind::Timeout
        );
        assert_eq!(FailureKind::of(&IngestError::Cancelled), FailureKind::Other);
    }
}
