// src/ingest/http.rs
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use metrics::counter;

use crate::config::HttpConfig;
use crate::error::IngestError;
use crate::ingest::types::Fetcher;

/// Reqwest-backed fetcher for feeds and article pages.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(cfg: &HttpConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_millis(cfg.fetch_timeout_ms);
        let client = reqwest::Client::builder()
            .user_agent(&cfg.user_agent)
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .gzip(true)
            .build()
            .context("building http fetcher client")?;
        Ok(Self { client, timeout })
    }
}

/// Map a transport error onto the taxonomy: timeouts stay distinguishable.
pub(crate) fn map_reqwest(url: &str, timeout: Duration, e: reqwest::Error) -> IngestError {
    if e.is_timeout() {
        IngestError::Timeout {
            op: "http fetch",
            ms: timeout.as_millis() as u64,
        }
    } else {
        IngestError::unreachable(url, e)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get_text(&self, url: &str) -> Result<String, IngestError> {
        let resp = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(error = ?e, %url, "http fetch error");
                counter!("http_fetch_errors_total").increment(1);
                return Err(map_reqwest(url, self.timeout, e));
            }
        };
        let status = resp.status();
        if !status.is_success() {
            counter!("http_fetch_errors_total").increment(1);
            return Err(IngestError::unreachable(url, format!("http status {status}")));
        }
        resp.text()
            .await
            .map_err(|e| map_reqwest(url, self.timeout, e))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
