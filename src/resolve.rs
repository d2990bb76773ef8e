// src/resolve.rs
//! Redirect resolver: aggregator link → terminal publisher URL, with a TTL cache.
//!
//! Same split as a provider + caching wrapper: a low-level `RedirectFollower`
//! does the real hop-following, `RedirectResolver` wraps it with the cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;

use crate::config::{HttpConfig, ResolverConfig};
use crate::error::IngestError;

/// Hosts that forward through one or more hops to the publisher.
const AGGREGATOR_HOSTS: &[&str] = &[
    "news.google.com",
    "feedproxy.google.com",
    "feeds.feedburner.com",
    "rss.app",
    "t.co",
    "bit.ly",
    "lnkd.in",
    "ow.ly",
];

/// True if `link` looks like an aggregator redirect rather than a publisher URL.
pub fn looks_like_aggregator(link: &str) -> bool {
    let Ok(url) = url::Url::parse(link) else {
        return false;
    };
    let Some(host) = url.host_str().map(|h| h.trim_start_matches("www.").to_ascii_lowercase())
    else {
        return false;
    };
    if AGGREGATOR_HOSTS.contains(&host.as_str()) {
        return true;
    }
    if host.ends_with("bing.com") && url.path().starts_with("/news/apiclick") {
        return true;
    }
    url.query_pairs().any(|(k, v)| k == "url" && v.starts_with("http"))
}

/// Low-level hop follower. Separated so the cache wraps HTTP and test doubles alike.
#[async_trait]
pub trait RedirectFollower: Send + Sync {
    async fn follow(&self, url: &str) -> Result<String, IngestError>;
    fn name(&self) -> &'static str;
}

/// Follows HTTP redirects with reqwest, bounded by hop count and timeout.
pub struct HttpFollower {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFollower {
    pub fn new(http: &HttpConfig, cfg: &ResolverConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_millis(cfg.timeout_ms);
        let client = reqwest::Client::builder()
            .user_agent(&http.user_agent)
            .connect_timeout(Duration::from_millis(http.connect_timeout_ms))
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(cfg.max_hops))
            .build()?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl RedirectFollower for HttpFollower {
    async fn follow(&self, url: &str) -> Result<String, IngestError> {
        let resp = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                IngestError::resolution(
                    url,
                    format!("timed out after {}ms", self.timeout.as_millis()),
                )
            } else if e.is_redirect() {
                IngestError::resolution(url, "too many redirects")
            } else {
                IngestError::resolution(url, e)
            }
        })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(IngestError::resolution(
                url,
                format!("terminal status {status} at {}", resp.url()),
            ));
        }
        Ok(resp.url().to_string())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectCacheEntry {
    pub original_url: String,
    pub resolved_url: String,
    pub resolved_at: DateTime<Utc>,
    #[serde(rename = "ttlSecs", serialize_with = "ser_secs")]
    pub ttl: Duration,
}

fn ser_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

impl RedirectCacheEntry {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => self.resolved_at + ttl >= now,
            Err(_) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub final_url: String,
    pub cached: bool,
    pub resolution_time_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub ttl_secs: u64,
    /// Most recently resolved entries.
    pub sample: Vec<RedirectCacheEntry>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, RedirectCacheEntry>,
    hits: u64,
    misses: u64,
}

const STATS_SAMPLE: usize = 10;

/// Process-wide resolver; construct once and share via `Arc`.
pub struct RedirectResolver {
    follower: Arc<dyn RedirectFollower>,
    ttl: Duration,
    capacity: usize,
    state: Mutex<CacheState>,
}

impl RedirectResolver {
    pub fn new(follower: Arc<dyn RedirectFollower>, ttl: Duration, capacity: usize) -> Self {
        Self {
            follower,
            ttl,
            capacity: capacity.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn from_config(follower: Arc<dyn RedirectFollower>, cfg: &ResolverConfig) -> Self {
        Self::new(follower, Duration::from_secs(cfg.ttl_secs), cfg.capacity)
    }

    /// Resolve `url`. Callers fall back to the original URL on error.
    pub async fn resolve(&self, url: &str) -> Result<Resolution, IngestError> {
        if let Some(final_url) = self.lookup(url, Utc::now()) {
            counter!("redirect_cache_hits_total").increment(1);
            return Ok(Resolution {
                final_url,
                cached: true,
                resolution_time_ms: 0,
            });
        }
        counter!("redirect_cache_misses_total").increment(1);

        // Concurrent misses for one key may both follow; the last insert wins.
        let t0 = Instant::now();
        let final_url = self.follower.follow(url).await.inspect_err(|e| {
            tracing::debug!(target: "resolve", %url, error = %e, follower = self.follower.name(), "resolution failed");
        })?;
        let elapsed = t0.elapsed().as_millis() as u64;

        self.store(url, &final_url, Utc::now());
        Ok(Resolution {
            final_url,
            cached: false,
            resolution_time_ms: elapsed,
        })
    }

    fn lookup(&self, url: &str, now: DateTime<Utc>) -> Option<String> {
        let mut st = self.state.lock().expect("resolver cache mutex poisoned");
        let fresh = st.entries.get(url).map(|e| e.is_fresh(now));
        match fresh {
            Some(true) => {
                st.hits += 1;
                st.entries.get(url).map(|e| e.resolved_url.clone())
            }
            Some(false) => {
                st.entries.remove(url);
                st.misses += 1;
                None
            }
            None => {
                st.misses += 1;
                None
            }
        }
    }

    fn store(&self, original: &str, resolved: &str, now: DateTime<Utc>) {
        let mut st = self.state.lock().expect("resolver cache mutex poisoned");

        if !st.entries.contains_key(original) && st.entries.len() >= self.capacity {
            // TTL-first, then least-recently-resolved.
            st.entries.retain(|_, e| e.is_fresh(now));
            while st.entries.len() >= self.capacity {
                let oldest = st
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.resolved_at)
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(k) => {
                        st.entries.remove(&k);
                    }
                    None => break,
                }
            }
        }

        st.entries.insert(
            original.to_string(),
            RedirectCacheEntry {
                original_url: original.to_string(),
                resolved_url: resolved.to_string(),
                resolved_at: now,
                ttl: self.ttl,
            },
        );
    }

    pub fn cache_stats(&self) -> CacheStats {
        let st = self.state.lock().expect("resolver cache mutex poisoned");
        let total = st.hits + st.misses;
        let mut sample: Vec<RedirectCacheEntry> = st.entries.values().cloned().collect();
        sample.sort_by(|a, b| b.resolved_at.cmp(&a.resolved_at));
        sample.truncate(STATS_SAMPLE);
        CacheStats {
            size: st.entries.len(),
            capacity: self.capacity,
            hits: st.hits,
            misses: st.misses,
            hit_rate: if total > 0 {
                st.hits as f64 / total as f64
            } else {
                0.0
            },
            ttl_secs: self.ttl.as_secs(),
            sample,
        }
    }
}

// --- Test helper ---
/// Follower with a fixed redirect table; unmapped URLs fail to resolve.
#[derive(Default)]
pub struct StaticFollower {
    table: HashMap<String, String>,
    pub calls: std::sync::atomic::AtomicUsize,
}

impl StaticFollower {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, from: &str, to: &str) -> Self {
        self.table.insert(from.to_string(), to.to_string());
        self
    }
}

#[async_trait]
impl RedirectFollower for StaticFollower {
    async fn follow(&self, url: &str) -> Result<String, IngestError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.table
            .get(url)
            .cloned()
            .ok_or_else(|| IngestError::resolution(url, "too many redirects"))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFollower {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RedirectFollower for CountingFollower {
        async fn follow(&self, url: &str) -> Result<String, IngestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{url}/final"))
        }
        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn resolver(ttl: Duration, cap: usize) -> (Arc<CountingFollower>, RedirectResolver) {
        let f = Arc::new(CountingFollower {
            calls: AtomicUsize::new(0),
        });
        let r = RedirectResolver::new(f.clone(), ttl, cap);
        (f, r)
    }

    #[test]
    fn aggregator_detection() {
        assert!(looks_like_aggregator(
            "https://news.google.com/rss/articles/CBMiabc?oc=5"
        ));
        assert!(looks_like_aggregator("https://www.bing.com/news/apiclick.aspx?ref=x"));
        assert!(looks_like_aggregator(
            "https://track.example.com/click?url=https%3A%2F%2Facme.com%2Fpr"
        ));
        assert!(!looks_like_aggregator("https://www.prnewswire.com/news-releases/x.html"));
        assert!(!looks_like_aggregator("not a url"));
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_resolved() {
        let (_, r) = resolver(Duration::from_secs(3600), 2);
        r.resolve("https://a.example").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        r.resolve("https://b.example").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        r.resolve("https://c.example").await.unwrap();

        let stats = r.cache_stats();
        assert_eq!(stats.size, 2);
        let keys: Vec<_> = stats.sample.iter().map(|e| e.original_url.as_str()).collect();
        assert_eq!(keys, vec!["https://c.example", "https://b.example"]);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        struct Failing;
        #[async_trait]
        impl RedirectFollower for Failing {
            async fn follow(&self, url: &str) -> Result<String, IngestError> {
                Err(IngestError::resolution(url, "too many redirects"))
            }
            fn name(&self) -> &'static str {
                "failing"
            }
        }
        let r = RedirectResolver::new(Arc::new(Failing), Duration::from_secs(60), 10);
        let err = r.resolve("https://t.co/x").await.unwrap_err();
        assert!(matches!(err, IngestError::ResolutionFailed { .. }));
        assert_eq!(r.cache_stats().size, 0);
        assert_eq!(r.cache_stats().misses, 1);
    }

    #[tokio::test]
    async fn repeated_hits_skip_the_follower() {
        let (f, r) = resolver(Duration::from_secs(3600), 10);
        for _ in 0..5 {
            r.resolve("https://t.co/abc").await.unwrap();
        }
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);
        let stats = r.cache_stats();
        assert_eq!((stats.hits, stats.misses), (4, 1));
        assert!((stats.hit_rate - 0.8).abs() < 1e-9);
    }
}
