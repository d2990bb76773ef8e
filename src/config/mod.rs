// src/config/mod.rs
//! Service configuration loaded from TOML with env overrides.
//!
//! Lookup order:
//! 1) `$INGEST_CONFIG_PATH` (error if it points nowhere)
//! 2) `config/ingest.toml`
//! 3) built-in defaults

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::types::FeedType;

pub const ENV_CONFIG_PATH: &str = "INGEST_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/ingest.toml";
pub const ENV_POLL_SECRET: &str = "POLL_SHARED_SECRET";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct IngestConfig {
    pub http: HttpConfig,
    pub resolver: ResolverConfig,
    pub monitor: MonitorConfig,
    pub dedup: DedupConfig,
    pub poll: PollConfig,
    /// Shared secret for the poll trigger; usually supplied via env.
    pub poll_secret: Option<String>,
    pub sources: Vec<SeedSource>,
    pub companies: Vec<SeedCompany>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub fetch_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: "newswire-ingest/0.1 (+https://github.com/lumlich/newswire-ingest)"
                .to_string(),
            fetch_timeout_ms: 10_000,
            connect_timeout_ms: 4_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub ttl_secs: u64,
    pub capacity: usize,
    pub max_hops: usize,
    pub timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 3600,
            capacity: 1_000,
            max_hops: 10,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub ring_capacity: usize,
    pub bucket_secs: u64,
    pub retention_hours: u64,
    pub lookback_mins: u64,
    pub degraded_success_rate: f64,
    pub degraded_p95_ms: u64,
    pub unhealthy_success_rate: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 1_000,
            bucket_secs: 60,
            retention_hours: 48,
            lookback_mins: 60,
            degraded_success_rate: 0.90,
            degraded_p95_ms: 5_000,
            unhealthy_success_rate: 0.50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub recency_days: i64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { recency_days: 7 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub inter_source_delay_ms: u64,
    pub fetch_full_articles: bool,
    pub stored_lookback_days: i64,
    pub item_timeout_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            inter_source_delay_ms: 1_000,
            fetch_full_articles: true,
            stored_lookback_days: 30,
            item_timeout_ms: 20_000,
        }
    }
}

/// Feed source seeded into the in-memory store at boot.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedSource {
    pub tenant: String,
    pub url: String,
    pub display_name: Option<String>,
    pub feed_type: Option<FeedType>,
    pub company_id: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedCompany {
    pub tenant: String,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl IngestConfig {
    /// Load from an explicit path, then apply env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let mut cfg: IngestConfig =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        cfg.apply_env();
        Ok(cfg)
    }

    /// Load using env var + fallbacks (see module docs).
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        let mut cfg = Self::default();
        cfg.apply_env();
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Ok(s) = std::env::var(ENV_POLL_SECRET) {
            let s = s.trim();
            if !s.is_empty() {
                self.poll_secret = Some(s.to_string());
            }
        }
        if let Some(ms) = env_parse::<u64>("POLL_INTER_SOURCE_DELAY_MS") {
            self.poll.inter_source_delay_ms = ms;
        }
        if let Ok(v) = std::env::var("POLL_FETCH_FULL_ARTICLES") {
            self.poll.fetch_full_articles = matches!(v.trim(), "1" | "true" | "yes");
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
