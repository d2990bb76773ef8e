// src/extract/mod.rs
//! Content extractor: raw publisher HTML → sanitized article HTML + text.
//!
//! Strategy chain, first candidate passing the quality gate wins:
//! 1. structural boundary extraction for known wire-service templates
//! 2. ranked selector list (class, id, tag)
//! 3. heuristics (dateline paragraph, dense paragraph run)

pub mod boundary;
pub mod heuristics;
pub mod quality;
pub mod sanitize;
pub mod selectors;

use scraper::Html;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

pub const METHOD_BOUNDARY: &str = "precise-boundary";
pub const METHOD_DATELINE: &str = "heuristic:dateline";
pub const METHOD_PARAGRAPH_RUN: &str = "heuristic:paragraph-run";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedArticle {
    pub sanitized_html: String,
    pub text_content: String,
    pub extraction_method: String,
    pub confidence_score: f32,
}

/// Stateless; one instance is shared by every poll run.
#[derive(Debug, Clone, Default)]
pub struct ContentExtractor;

impl ContentExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract the article body. `source_hint` is the page URL or host and only
    /// reorders the boundary templates.
    pub fn extract(
        &self,
        html: &str,
        source_hint: Option<&str>,
    ) -> Result<ExtractedArticle, IngestError> {
        let doc = Html::parse_document(html);
        let host = source_hint.map(hint_host);

        for tpl in boundary::ordered(host.as_deref()) {
            if let Some(cand) = boundary::cut(&doc, tpl) {
                match accept(cand, METHOD_BOUNDARY.to_string(), 0.95) {
                    Ok(article) => {
                        tracing::debug!(target: "extract", template = tpl.name, "boundary hit");
                        return Ok(article);
                    }
                    Err(e) => log_rejection(METHOD_BOUNDARY, &e),
                }
            }
        }

        for (rank, (sel, _)) in selectors::COMPILED.iter().enumerate() {
            if let Some(cand) = selectors::candidate(&doc, rank) {
                let method = format!("selector:{sel}");
                match accept(cand, method, selectors::base_confidence(rank)) {
                    Ok(article) => return Ok(article),
                    Err(e) => log_rejection(sel, &e),
                }
            }
        }

        let fallbacks: [(&str, fn(&Html) -> Option<(String, String)>, f32); 2] = [
            (METHOD_DATELINE, heuristics::dateline, 0.65),
            (METHOD_PARAGRAPH_RUN, heuristics::paragraph_run, 0.55),
        ];
        for (method, strategy, base) in fallbacks {
            if let Some(cand) = strategy(&doc) {
                match accept(cand, method.to_string(), base) {
                    Ok(article) => return Ok(article),
                    Err(e) => log_rejection(method, &e),
                }
            }
        }

        Err(IngestError::NoContentFound)
    }
}

fn accept(
    (html, text): (String, String),
    method: String,
    base: f32,
) -> Result<ExtractedArticle, IngestError> {
    let signals = quality::check(&text).map_err(IngestError::QualityRejected)?;
    let length_factor = 0.7 + 0.3 * (signals.words as f32 / 300.0).min(1.0);
    Ok(ExtractedArticle {
        sanitized_html: html,
        text_content: text,
        extraction_method: method,
        confidence_score: (base * length_factor).clamp(0.0, 1.0),
    })
}

fn log_rejection(strategy: &str, err: &IngestError) {
    tracing::trace!(target: "extract", strategy, error = %err, "candidate rejected");
}

fn hint_host(hint: &str) -> String {
    url::Url::parse(hint)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| hint.trim().to_ascii_lowercase())
}
