// src/dedup.rs
//! Aggregation & dedup: merge freshly polled releases with persisted ones.
//!
//! Identity is the normalized source URL. A live item replaces a stored one
//! only while it is younger than the recency window.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::DedupConfig;

fn hex_prefix(text: &str, bytes: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(bytes * 2);
    for b in digest.iter().take(bytes) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Stable 16-hex-char identifier.
pub fn short_hash(text: &str) -> String {
    hex_prefix(text, 8)
}

/// SHA-256 of case-folded, whitespace-collapsed text.
pub fn content_hash(text: &str) -> String {
    let folded = text
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ");
    hex_prefix(&folded, 32)
}

/// Dedup key for a source URL.
///
/// Lowercases scheme/host (via `url`), drops the fragment and `utm_*`
/// tracking parameters, trims a trailing slash. Unparseable input is only
/// trimmed.
pub fn normalize_url_key(raw: &str) -> String {
    let raw = raw.trim();
    let Ok(mut url) = url::Url::parse(raw) else {
        return raw.trim_end_matches('/').to_string();
    };
    url.set_fragment(None);

    if url.query_pairs().any(|(k, _)| k.starts_with("utm_")) {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !k.starts_with("utm_"))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept.iter());
        }
    }

    if url.path().len() > 1 && url.path().ends_with('/') {
        let trimmed = url.path().trim_end_matches('/').to_string();
        url.set_path(&trimmed);
    }

    let mut key = url.to_string();
    if url.query().is_none() && key.ends_with('/') {
        key.pop();
    }
    key
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Rss,
    Stored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedRelease {
    pub id: String,
    pub title: String,
    pub content: String,
    pub summary: String,
    pub source_url: String,
    pub published_at: DateTime<Utc>,
    pub company_id: Option<String>,
    pub matched_company_name: Option<String>,
    pub origin: Origin,
    pub content_hash: String,
}

impl MergedRelease {
    /// Build a release; `id` and `content_hash` are derived.
    pub fn new(
        title: &str,
        content: &str,
        summary: &str,
        source_url: &str,
        published_at: DateTime<Utc>,
        origin: Origin,
    ) -> Self {
        Self {
            id: short_hash(&normalize_url_key(source_url)),
            title: title.to_string(),
            content: content.to_string(),
            summary: summary.to_string(),
            source_url: source_url.to_string(),
            published_at,
            company_id: None,
            matched_company_name: None,
            origin,
            content_hash: content_hash(content),
        }
    }

    pub fn key(&self) -> String {
        normalize_url_key(&self.source_url)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DedupPolicy {
    pub recency: Duration,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self {
            recency: Duration::days(7),
        }
    }
}

impl DedupPolicy {
    pub fn from_config(cfg: &DedupConfig) -> Self {
        Self {
            recency: Duration::days(cfg.recency_days),
        }
    }

    fn live_wins(&self, live: &MergedRelease, now: DateTime<Utc>) -> bool {
        live.origin == Origin::Rss && now - live.published_at < self.recency
    }

    /// Merge `live` over `stored`. At most one release per key; newest first,
    /// ties broken by key.
    pub fn merge(
        &self,
        live: Vec<MergedRelease>,
        stored: Vec<MergedRelease>,
        now: DateTime<Utc>,
    ) -> Vec<MergedRelease> {
        let mut by_key: HashMap<String, MergedRelease> =
            HashMap::with_capacity(live.len() + stored.len());

        for rel in stored {
            by_key.entry(rel.key()).or_insert(rel);
        }

        for rel in live {
            let key = rel.key();
            match by_key.get(&key) {
                None => {
                    by_key.insert(key, rel);
                }
                Some(existing) if existing.origin == Origin::Stored && self.live_wins(&rel, now) => {
                    tracing::trace!(target: "dedup", %key, "live item replaces stored");
                    by_key.insert(key, rel);
                }
                Some(_) => {}
            }
        }

        let mut out: Vec<(String, MergedRelease)> = by_key.into_iter().collect();
        out.sort_by(|(ka, a), (kb, b)| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| ka.cmp(kb))
        });
        out.into_iter().map(|(_, r)| r).collect()
    }
}
