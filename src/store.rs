// src/store.rs
//! Storage collaborator seam plus an in-memory implementation.
//!
//! The real persistence layer lives outside this crate; the binary boots a
//! `MemoryStore` seeded from config.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

use crate::companies::Company;
use crate::config::IngestConfig;
use crate::dedup::{MergedRelease, Origin};
use crate::ingest::types::FeedSource;

#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    /// All tenants known to storage.
    async fn tenants(&self) -> Result<Vec<String>>;
    async fn enabled_sources(&self, tenant: &str) -> Result<Vec<FeedSource>>;
    /// Persist health fields after a poll.
    async fn update_source(&self, source: &FeedSource) -> Result<()>;
    async fn companies(&self, tenant: &str) -> Result<Vec<Company>>;
    /// Upsert by release id; returns how many were not present before.
    async fn upsert_releases(&self, tenant: &str, releases: &[MergedRelease]) -> Result<usize>;
    /// Persisted releases published at or after `since`, origin `Stored`.
    async fn releases_since(&self, tenant: &str, since: DateTime<Utc>) -> Result<Vec<MergedRelease>>;
    /// Which of `ids` are already persisted, regardless of publish date.
    async fn existing_release_ids(&self, tenant: &str, ids: &[String]) -> Result<HashSet<String>>;
}

#[derive(Default)]
struct Tables {
    sources: BTreeMap<String, Vec<FeedSource>>,
    companies: HashMap<String, Vec<Company>>,
    releases: HashMap<String, BTreeMap<String, MergedRelease>>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(cfg: &IngestConfig) -> Self {
        let store = Self::new();
        for s in &cfg.sources {
            let name = s.display_name.clone().unwrap_or_else(|| s.url.clone());
            let mut src = FeedSource::new(&s.tenant, &s.url, &name, s.feed_type.unwrap_or_default());
            src.enabled = s.enabled;
            src.company_id = s.company_id.clone();
            store.add_source(src);
        }
        for c in &cfg.companies {
            store.add_company(&c.tenant, Company::from(c));
        }
        store
    }

    pub fn add_source(&self, source: FeedSource) {
        let mut t = self.tables.lock().expect("store mutex poisoned");
        t.sources.entry(source.tenant_id.clone()).or_default().push(source);
    }

    pub fn add_company(&self, tenant: &str, company: Company) {
        let mut t = self.tables.lock().expect("store mutex poisoned");
        t.companies.entry(tenant.to_string()).or_default().push(company);
    }

    /// Snapshot of a tenant's sources, enabled or not.
    pub fn sources(&self, tenant: &str) -> Vec<FeedSource> {
        let t = self.tables.lock().expect("store mutex poisoned");
        t.sources.get(tenant).cloned().unwrap_or_default()
    }

    pub fn releases(&self, tenant: &str) -> Vec<MergedRelease> {
        let t = self.tables.lock().expect("store mutex poisoned");
        t.releases
            .get(tenant)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Storage for MemoryStore {
    async fn tenants(&self) -> Result<Vec<String>> {
        let t = self.tables.lock().expect("store mutex poisoned");
        Ok(t.sources.keys().cloned().collect())
    }

    async fn enabled_sources(&self, tenant: &str) -> Result<Vec<FeedSource>> {
        let t = self.tables.lock().expect("store mutex poisoned");
        let sources = t
            .sources
            .get(tenant)
            .ok_or_else(|| anyhow!("unknown tenant {tenant}"))?;
        Ok(sources.iter().filter(|s| s.enabled).cloned().collect())
    }

    async fn update_source(&self, source: &FeedSource) -> Result<()> {
        let mut t = self.tables.lock().expect("store mutex poisoned");
        let slot = t
            .sources
            .get_mut(&source.tenant_id)
            .and_then(|v| v.iter_mut().find(|s| s.id == source.id))
            .ok_or_else(|| anyhow!("unknown source {}", source.id))?;
        *slot = source.clone();
        Ok(())
    }

    async fn companies(&self, tenant: &str) -> Result<Vec<Company>> {
        let t = self.tables.lock().expect("store mutex poisoned");
        Ok(t.companies.get(tenant).cloned().unwrap_or_default())
    }

    async fn upsert_releases(&self, tenant: &str, releases: &[MergedRelease]) -> Result<usize> {
        let mut t = self.tables.lock().expect("store mutex poisoned");
        let table = t.releases.entry(tenant.to_string()).or_default();
        let mut inserted = 0;
        for r in releases {
            if table.insert(r.id.clone(), r.clone()).is_none() {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn releases_since(&self, tenant: &str, since: DateTime<Utc>) -> Result<Vec<MergedRelease>> {
        let t = self.tables.lock().expect("store mutex poisoned");
        Ok(t.releases
            .get(tenant)
            .map(|m| {
                m.values()
                    .filter(|r| r.published_at >= since)
                    .cloned()
                    .map(|mut r| {
                        r.origin = Origin::Stored;
                        r
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn existing_release_ids(&self, tenant: &str, ids: &[String]) -> Result<HashSet<String>> {
        let t = self.tables.lock().expect("store mutex poisoned");
        let Some(table) = t.releases.get(tenant) else {
            return Ok(HashSet::new());
        };
        Ok(ids.iter().filter(|id| table.contains_key(*id)).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::FeedType;
    use chrono::Duration;

    #[tokio::test]
    async fn upsert_counts_only_new_ids_and_reads_back_as_stored() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let a = MergedRelease::new("A", "a", "a", "https://x.com/a", now, Origin::Rss);
        let b = MergedRelease::new("B", "b", "b", "https://x.com/b", now - Duration::days(40), Origin::Rss);

        assert_eq!(store.upsert_releases("t1", &[a.clone(), b]).await.unwrap(), 2);
        assert_eq!(store.upsert_releases("t1", &[a]).await.unwrap(), 0);

        let recent = store.releases_since("t1", now - Duration::days(30)).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].origin, Origin::Stored);

        let old_id = MergedRelease::new("B", "b", "b", "https://x.com/b", now, Origin::Rss).id;
        let found = store
            .existing_release_ids("t1", &[old_id.clone(), "missing".into()])
            .await
            .unwrap();
        assert_eq!(found, HashSet::from([old_id]));
    }

    #[tokio::test]
    async fn sources_filter_and_update() {
        let store = MemoryStore::new();
        let mut on = FeedSource::new("t1", "https://a.com/rss", "A", FeedType::IrNews);
        let mut off = FeedSource::new("t1", "https://b.com/rss", "B", FeedType::Custom);
        off.enabled = false;
        store.add_source(on.clone());
        store.add_source(off);

        assert_eq!(store.tenants().await.unwrap(), vec!["t1".to_string()]);
        assert_eq!(store.enabled_sources("t1").await.unwrap().len(), 1);
        assert!(store.enabled_sources("nope").await.is_err());

        on.record_outcome(Utc::now(), Some("down".into()));
        store.update_source(&on).await.unwrap();
        assert_eq!(store.sources("t1")[0].last_error.as_deref(), Some("down"));
    }
}
