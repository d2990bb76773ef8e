// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FeedType {
    IrNews,
    SecFilings,
    GeneralNews,
    Industry,
    #[default]
    Custom,
}

impl FeedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedType::IrNews => "ir-news",
            FeedType::SecFilings => "sec-filings",
            FeedType::GeneralNews => "general-news",
            FeedType::Industry => "industry",
            FeedType::Custom => "custom",
        }
    }
}

/// A configured feed endpoint owned by a tenant. Mutated by every poll.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedSource {
    pub id: String,
    pub tenant_id: String,
    pub url: String,
    pub display_name: String,
    pub feed_type: FeedType,
    pub enabled: bool,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Exponential moving average of poll outcomes, 0.0..=1.0.
    pub success_rate: f32,
    /// Set when the feed belongs to a single company (typical for IR feeds).
    #[serde(default)]
    pub company_id: Option<String>,
    /// Fetch and extract the full article page for each item.
    #[serde(default = "default_true")]
    pub full_article: bool,
}

fn default_true() -> bool {
    true
}

impl FeedSource {
    pub fn new(tenant_id: &str, url: &str, display_name: &str, feed_type: FeedType) -> Self {
        Self {
            id: crate::dedup::short_hash(&format!("{tenant_id}|{url}")),
            tenant_id: tenant_id.to_string(),
            url: url.to_string(),
            display_name: display_name.to_string(),
            feed_type,
            enabled: true,
            last_fetched_at: None,
            last_error: None,
            success_rate: 1.0,
            company_id: None,
            full_article: true,
        }
    }

    /// Fold one poll outcome into the source's health fields.
    pub fn record_outcome(&mut self, at: DateTime<Utc>, error: Option<String>) {
        const ALPHA: f32 = 0.2;
        let sample = if error.is_none() { 1.0 } else { 0.0 };
        self.success_rate = (ALPHA * sample + (1.0 - ALPHA) * self.success_rate).clamp(0.0, 1.0);
        self.last_fetched_at = Some(at);
        self.last_error = error;
    }
}

/// One item of a freshly fetched feed. Never persisted directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub title: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
    pub link: String,
    pub source_feed_url: String,
}

/// Parsed feed envelope: channel title plus items.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub items: Vec<FeedItem>,
}

/// Outbound text fetch (feeds and article pages). Implementations carry their own timeout.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn get_text(&self, url: &str) -> Result<String, IngestError>;
    fn name(&self) -> &'static str;
}

// --- Test helper ---
/// In-memory fetcher serving canned bodies; unknown URLs are unreachable.
#[derive(Default)]
pub struct StaticFetcher {
    pages: std::collections::HashMap<String, String>,
    pub calls: std::sync::Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait::async_trait]
impl Fetcher for StaticFetcher {
    async fn get_text(&self, url: &str) -> Result<String, IngestError> {
        self.calls.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| IngestError::unreachable(url, "http status 404 Not Found"))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
