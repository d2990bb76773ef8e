// src/ingest/poll.rs
//! Poll orchestrator: for every enabled source in scope, fetch → resolve →
//! extract → record → merge → persist, and summarize the run.
//!
//! Sources are polled sequentially with a fixed politeness delay. Per-source
//! and per-item failures are recorded and the run continues; only failing to
//! enumerate tenants/sources aborts it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::companies::CompanyMatcher;
use crate::config::{IngestConfig, PollConfig};
use crate::dedup::{DedupPolicy, MergedRelease, Origin};
use crate::error::IngestError;
use crate::extract::ContentExtractor;
use crate::ingest::feed::parse_feed;
use crate::ingest::lead_sentences;
use crate::ingest::types::{FeedItem, FeedSource, Fetcher};
use crate::monitor::{ExtractionEvent, ExtractionMonitor};
use crate::resolve::{looks_like_aggregator, RedirectResolver};
use crate::store::Storage;

const SUMMARY_SENTENCES: usize = 2;
const SUMMARY_MAX_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantScope {
    All,
    Tenant(String),
}

impl TenantScope {
    pub fn from_option(tenant: Option<String>) -> Self {
        match tenant.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) {
            Some(t) => TenantScope::Tenant(t),
            None => TenantScope::All,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollErrorEntry {
    pub source_url: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSummary {
    pub total_sources: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub new_items: usize,
    pub errors: Vec<PollErrorEntry>,
}

pub struct Poller {
    storage: Arc<dyn Storage>,
    fetcher: Arc<dyn Fetcher>,
    resolver: Arc<RedirectResolver>,
    monitor: Arc<ExtractionMonitor>,
    extractor: ContentExtractor,
    dedup: DedupPolicy,
    cfg: PollConfig,
}

impl Poller {
    pub fn new(
        storage: Arc<dyn Storage>,
        fetcher: Arc<dyn Fetcher>,
        resolver: Arc<RedirectResolver>,
        monitor: Arc<ExtractionMonitor>,
        cfg: &IngestConfig,
    ) -> Self {
        Self {
            storage,
            fetcher,
            resolver,
            monitor,
            extractor: ContentExtractor::new(),
            dedup: DedupPolicy::from_config(&cfg.dedup),
            cfg: cfg.poll.clone(),
        }
    }

    async fn resolve_scope(
        &self,
        scope: &TenantScope,
    ) -> Result<Vec<(String, Vec<FeedSource>)>, IngestError> {
        let tenants = match scope {
            TenantScope::All => self
                .storage
                .tenants()
                .await
                .map_err(|e| IngestError::ScopeResolutionFailed(format!("listing tenants: {e:#}")))?,
            TenantScope::Tenant(t) => vec![t.clone()],
        };
        let mut out = Vec::with_capacity(tenants.len());
        for t in tenants {
            let sources = self.storage.enabled_sources(&t).await.map_err(|e| {
                IngestError::ScopeResolutionFailed(format!("sources for tenant {t}: {e:#}"))
            })?;
            out.push((t, sources));
        }
        Ok(out)
    }

    /// Poll every enabled source in `scope`. Cancelling `cancel` stops the run
    /// and returns the partial summary with a "poll cancelled" entry.
    pub async fn poll_all(
        &self,
        scope: TenantScope,
        cancel: CancellationToken,
    ) -> Result<PollSummary, IngestError> {
        counter!("poll_runs_total").increment(1);
        let plan = self.resolve_scope(&scope).await?;

        let mut summary = PollSummary {
            total_sources: plan.iter().map(|(_, s)| s.len()).sum(),
            ..PollSummary::default()
        };
        let delay = Duration::from_millis(self.cfg.inter_source_delay_ms);
        let mut first = true;
        let mut cancelled = false;

        for (tenant, sources) in plan {
            let companies = match self.storage.companies(&tenant).await {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(target: "poll", %tenant, error = %e, "company lookup failed");
                    Vec::new()
                }
            };
            let matcher = CompanyMatcher::new(companies);
            let mut live: Vec<MergedRelease> = Vec::new();

            for mut source in sources {
                if !first && !delay.is_zero() {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => { cancelled = true; break; }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                first = false;

                match self.poll_source(&source, &matcher, &cancel).await {
                    Ok(mut releases) => {
                        summary.succeeded += 1;
                        tracing::info!(target: "poll", %tenant, source = %source.url, items = releases.len(), "source polled");
                        live.append(&mut releases);
                        source.record_outcome(Utc::now(), None);
                    }
                    Err(IngestError::Cancelled) => {
                        cancelled = true;
                        break;
                    }
                    Err(e) => {
                        summary.failed += 1;
                        counter!("poll_source_errors_total").increment(1);
                        tracing::warn!(target: "poll", %tenant, source = %source.url, error = %e, "source failed");
                        summary.errors.push(PollErrorEntry {
                            source_url: source.url.clone(),
                            message: e.to_string(),
                        });
                        source.record_outcome(Utc::now(), Some(e.to_string()));
                    }
                }
                if let Err(e) = self.storage.update_source(&source).await {
                    tracing::warn!(target: "poll", source = %source.url, error = %e, "source update failed");
                }
            }

            // Whatever completed before a cancel is still persisted.
            summary.new_items += self.persist(&tenant, live).await;

            if cancelled {
                break;
            }
        }

        if cancelled {
            tracing::info!(target: "poll", "poll cancelled");
            summary.errors.push(PollErrorEntry {
                source_url: String::new(),
                message: "poll cancelled".to_string(),
            });
        }

        counter!("poll_new_items_total").increment(summary.new_items as u64);
        gauge!("poll_last_run_ts").set(Utc::now().timestamp() as f64);
        tracing::info!(
            target: "poll",
            total = summary.total_sources,
            succeeded = summary.succeeded,
            failed = summary.failed,
            new_items = summary.new_items,
            "poll run finished"
        );
        Ok(summary)
    }

    async fn persist(&self, tenant: &str, live: Vec<MergedRelease>) -> usize {
        if live.is_empty() {
            return 0;
        }
        let now = Utc::now();
        let lookback = chrono::Duration::days(self.cfg.stored_lookback_days).max(self.dedup.recency);
        let since = now - lookback;
        let live = self.drop_persisted_aged(tenant, live, since).await;
        let stored = match self.storage.releases_since(tenant, since).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(target: "poll", %tenant, error = %e, "reading stored releases failed");
                Vec::new()
            }
        };
        let merged = self.dedup.merge(live, stored, now);
        match self.storage.upsert_releases(tenant, &merged).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(target: "poll", %tenant, error = %e, "upserting releases failed");
                0
            }
        }
    }

    /// Live items published before `since` never meet their stored twin in
    /// `merge`, and are past the recency window anyway: keep only the ones
    /// storage has never seen.
    async fn drop_persisted_aged(
        &self,
        tenant: &str,
        live: Vec<MergedRelease>,
        since: chrono::DateTime<Utc>,
    ) -> Vec<MergedRelease> {
        let (recent, aged): (Vec<_>, Vec<_>) =
            live.into_iter().partition(|r| r.published_at >= since);
        if aged.is_empty() {
            return recent;
        }
        let ids: Vec<String> = aged.iter().map(|r| r.id.clone()).collect();
        let existing = match self.storage.existing_release_ids(tenant, &ids).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(target: "poll", %tenant, error = %e, "release lookup failed; skipping aged items");
                return recent;
            }
        };
        let before = aged.len();
        let mut out = recent;
        out.extend(aged.into_iter().filter(|r| !existing.contains(&r.id)));
        tracing::debug!(target: "poll", %tenant, kept_stored = existing.len(), aged = before, "aged live items reconciled");
        out
    }

    fn item_timeout(&self) -> Duration {
        Duration::from_millis(self.cfg.item_timeout_ms)
    }

    async fn poll_source(
        &self,
        source: &FeedSource,
        matcher: &CompanyMatcher,
        cancel: &CancellationToken,
    ) -> Result<Vec<MergedRelease>, IngestError> {
        let fetch = tokio::time::timeout(self.item_timeout(), self.fetcher.get_text(&source.url));
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(IngestError::Cancelled),
            r = fetch => r.map_err(|_| IngestError::Timeout {
                op: "feed fetch",
                ms: self.cfg.item_timeout_ms,
            })??,
        };
        let feed = parse_feed(&body, &source.url, Utc::now())?;

        let mut out = Vec::with_capacity(feed.items.len());
        for item in &feed.items {
            let work = tokio::time::timeout(self.item_timeout(), self.process_item(item, source, matcher));
            let release = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(IngestError::Cancelled),
                r = work => match r {
                    Ok(rel) => rel,
                    Err(_) => {
                        let err = IngestError::Timeout { op: "item processing", ms: self.cfg.item_timeout_ms };
                        self.monitor.record(ExtractionEvent::failed(&item.link, &err));
                        self.release_for(item, &item.link, None, source, matcher)
                    }
                },
            };
            out.push(release);
        }
        Ok(out)
    }

    async fn process_item(
        &self,
        item: &FeedItem,
        source: &FeedSource,
        matcher: &CompanyMatcher,
    ) -> MergedRelease {
        let mut link = item.link.clone();
        let mut redirect_ms = 0;
        let mut cached = false;

        if looks_like_aggregator(&link) {
            match self.resolver.resolve(&link).await {
                Ok(res) => {
                    redirect_ms = res.resolution_time_ms;
                    cached = res.cached;
                    link = res.final_url;
                }
                // Fall back to the aggregator link itself.
                Err(e) => tracing::debug!(target: "poll", link = %item.link, error = %e, "redirect unresolved"),
            }
        }

        if !(self.cfg.fetch_full_articles && source.full_article) {
            return self.release_for(item, &link, None, source, matcher);
        }

        let t0 = Instant::now();
        let extracted = match self.fetcher.get_text(&link).await {
            Ok(html) => self.extractor.extract(&html, Some(&link)),
            Err(e) => Err(e),
        };
        let extraction_ms = t0.elapsed().as_millis() as u64;

        match extracted {
            Ok(article) => {
                self.monitor.record(
                    ExtractionEvent::succeeded(&link, &article.extraction_method, article.confidence_score)
                        .with_timings(redirect_ms, extraction_ms, cached),
                );
                self.release_for(item, &link, Some(&article.text_content), source, matcher)
            }
            Err(e) => {
                self.monitor.record(
                    ExtractionEvent::failed(&link, &e).with_timings(redirect_ms, extraction_ms, cached),
                );
                self.release_for(item, &link, None, source, matcher)
            }
        }
    }

    /// Build the live release; without extracted text the feed description stands in.
    fn release_for(
        &self,
        item: &FeedItem,
        link: &str,
        text: Option<&str>,
        source: &FeedSource,
        matcher: &CompanyMatcher,
    ) -> MergedRelease {
        let content = text
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(item.description.as_str());
        let summary_src = if content.trim().is_empty() { item.title.as_str() } else { content };
        let mut rel = MergedRelease::new(
            &item.title,
            content,
            &lead_sentences(summary_src, SUMMARY_SENTENCES, SUMMARY_MAX_CHARS),
            link,
            item.published_at,
            Origin::Rss,
        );
        if let Some(m) = matcher.match_title(&item.title, source.company_id.as_deref()) {
            rel.company_id = Some(m.id);
            rel.matched_company_name = Some(m.name);
        }
        rel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_from_option() {
        assert_eq!(TenantScope::from_option(None), TenantScope::All);
        assert_eq!(TenantScope::from_option(Some("  ".into())), TenantScope::All);
        assert_eq!(
            TenantScope::from_option(Some("t1".into())),
            TenantScope::Tenant("t1".into())
        );
    }

    #[test]
    fn summary_serializes_camel_case() {
        let s = PollSummary {
            total_sources: 2,
            succeeded: 1,
            failed: 1,
            new_items: 3,
            errors: vec![PollErrorEntry {
                source_url: "https://x/rss".into(),
                message: "boom".into(),
            }],
        };
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["totalSources"], 2);
        assert_eq!(v["newItems"], 3);
        assert_eq!(v["errors"][0]["sourceUrl"], "https://x/rss");
    }
}
