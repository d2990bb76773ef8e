//! Error taxonomy shared by the extractor, resolver, feed fetch and poll run.
//!
//! Per-item failures are recorded and the run continues; only
//! `ScopeResolutionFailed` aborts a whole poll run.

use thiserror::Error;

use crate::extract::quality::Rejection;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum IngestError {
    /// Every extraction strategy was tried and none passed the quality gate.
    #[error("no content found")]
    NoContentFound,

    #[error("resolution failed for {url}: {reason}")]
    ResolutionFailed { url: String, reason: String },

    #[error("feed unreachable at {url}: {reason}")]
    FeedUnreachable { url: String, reason: String },

    #[error("invalid feed: {0}")]
    InvalidFeed(String),

    /// Internal to the extractor: a candidate failed the gate and the chain falls through.
    #[error("quality rejected: {0}")]
    QualityRejected(Rejection),

    #[error("scope resolution failed: {0}")]
    ScopeResolutionFailed(String),

    #[error("{op} timed out after {ms}ms")]
    Timeout { op: &'static str, ms: u64 },

    #[error("operation cancelled")]
    Cancelled,
}

impl IngestError {
    pub fn unreachable(url: &str, reason: impl ToString) -> Self {
        Self::FeedUnreachable {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn resolution(url: &str, reason: impl ToString) -> Self {
        Self::ResolutionFailed {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type IngestResult<T> = Result<T, IngestError>;
