// src/ingest/validator.rs
//! Feed validation: connectivity probe, type inference, display-name suggestion.
//! Validation never persists anything.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::IngestError;
use crate::ingest::feed::parse_feed;
use crate::ingest::types::{FeedType, Fetcher};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityReport {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub suggested_name: String,
    pub detected_type: FeedType,
    pub timestamp: DateTime<Utc>,
}

const SEC_HOSTS: &[&str] = &["sec.gov"];
const WIRE_HOSTS: &[&str] = &["prnewswire.com", "globenewswire.com", "businesswire.com", "accesswire.com"];
const GENERAL_NEWS_HOSTS: &[&str] = &[
    "reuters.com",
    "bloomberg.com",
    "cnbc.com",
    "news.google.com",
    "apnews.com",
    "wsj.com",
    "ft.com",
];

fn host_matches(host: &str, list: &[&str]) -> bool {
    list.iter()
        .any(|d| host == *d || host.ends_with(&format!(".{d}")))
}

/// Classify a feed URL by domain/path heuristics.
pub fn detect_feed_type(url: &str) -> FeedType {
    let Ok(parsed) = url::Url::parse(url.trim()) else {
        return FeedType::Custom;
    };
    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
    let path = parsed.path().to_ascii_lowercase();

    if host_matches(&host, SEC_HOSTS) || path.contains("edgar") {
        return FeedType::SecFilings;
    }
    let ir_host = host.starts_with("ir.") || host.starts_with("investor.") || host.starts_with("investors.");
    let ir_path = path.contains("/investor")
        || path.contains("/ir/")
        || path.contains("press-release")
        || path.contains("news-release");
    if ir_host || ir_path || host_matches(&host, WIRE_HOSTS) {
        return FeedType::IrNews;
    }
    if host_matches(&host, GENERAL_NEWS_HOSTS) {
        return FeedType::GeneralNews;
    }
    if host.contains("industry") || path.contains("industry") || host.contains("trade") {
        return FeedType::Industry;
    }
    FeedType::Custom
}

/// Prefer the fetched feed title, else a tidied hostname.
pub fn suggest_feed_name(url: &str, title: Option<&str>) -> String {
    if let Some(t) = title.map(str::trim).filter(|t| !t.is_empty()) {
        return t.to_string();
    }
    let host = url::Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_string));
    match host {
        Some(h) => {
            let mut h = h.to_ascii_lowercase();
            for prefix in ["www.", "feeds.", "rss."] {
                if let Some(rest) = h.strip_prefix(prefix) {
                    h = rest.to_string();
                }
            }
            h
        }
        None => url.trim().to_string(),
    }
}

pub struct FeedValidator {
    fetcher: Arc<dyn Fetcher>,
    timeout: Duration,
}

impl FeedValidator {
    pub fn new(fetcher: Arc<dyn Fetcher>, timeout: Duration) -> Self {
        Self { fetcher, timeout }
    }

    /// Fetch `url` within the timeout and confirm it parses as a feed.
    pub async fn test_connectivity(&self, url: &str) -> ConnectivityReport {
        match self.probe(url).await {
            Ok((title, count)) => ConnectivityReport {
                valid: true,
                title,
                item_count: Some(count),
                error: None,
            },
            Err(e) => {
                tracing::info!(target: "validator", %url, error = %e, "feed validation failed");
                ConnectivityReport {
                    valid: false,
                    title: None,
                    item_count: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn probe(&self, url: &str) -> Result<(Option<String>, usize), IngestError> {
        let parsed = url::Url::parse(url.trim())
            .map_err(|e| IngestError::unreachable(url, format!("invalid url: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(IngestError::unreachable(url, "only http(s) feeds are supported"));
        }
        let body = tokio::time::timeout(self.timeout, self.fetcher.get_text(url))
            .await
            .map_err(|_| IngestError::Timeout {
                op: "feed validation",
                ms: self.timeout.as_millis() as u64,
            })??;
        let feed = parse_feed(&body, url, Utc::now())?;
        Ok((feed.title, feed.items.len()))
    }

    pub async fn validate(&self, url: &str) -> FeedValidation {
        let report = self.test_connectivity(url).await;
        FeedValidation {
            valid: report.valid,
            suggested_name: suggest_feed_name(url, report.title.as_deref()),
            detected_type: detect_feed_type(url),
            error: report.error,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[test]
    fn detects_types_from_domain_and_path() {
        assert_eq!(
            detect_feed_type("https://www.sec.gov/cgi-bin/browse-edgar?action=getcurrent"),
            FeedType::SecFilings
        );
        assert_eq!(detect_feed_type("https://investors.acme.com/rss"), FeedType::IrNews);
        assert_eq!(detect_feed_type("https://acme.com/investor/news.xml"), FeedType::IrNews);
        assert_eq!(
            detect_feed_type("https://www.prnewswire.com/rss/news-releases-list.rss"),
            FeedType::IrNews
        );
        assert_eq!(detect_feed_type("https://feeds.reuters.com/business"), FeedType::GeneralNews);
        assert_eq!(detect_feed_type("https://steelindustry.example/feed"), FeedType::Industry);
        assert_eq!(detect_feed_type("https://blog.example.org/feed"), FeedType::Custom);
        assert_eq!(detect_feed_type("garbage"), FeedType::Custom);
    }

    #[test]
    fn suggested_name_prefers_title() {
        assert_eq!(suggest_feed_name("https://x.com/rss", Some(" Acme News ")), "Acme News");
        assert_eq!(suggest_feed_name("https://feeds.acme.com/rss", None), "acme.com");
        assert_eq!(suggest_feed_name("https://www.acme.com/rss", Some("  ")), "acme.com");
    }

    struct Slow;

    #[async_trait]
    impl Fetcher for Slow {
        async fn get_text(&self, _url: &str) -> Result<String, IngestError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(String::new())
        }
        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn connectivity_check_times_out_instead_of_hanging() {
        let v = FeedValidator::new(Arc::new(Slow), Duration::from_millis(50));
        let out = v.validate("https://investors.acme.com/rss").await;
        assert!(!out.valid);
        assert!(out.error.unwrap().contains("timed out"));
        assert_eq!(out.detected_type, FeedType::IrNews);
        assert_eq!(out.suggested_name, "investors.acme.com");
    }

    #[tokio::test]
    async fn rejects_non_http_urls() {
        let v = FeedValidator::new(Arc::new(Slow), Duration::from_millis(50));
        let r = v.test_connectivity("ftp://acme.com/feed").await;
        assert!(!r.valid);
        assert!(r.error.unwrap().contains("http"));
    }
}
