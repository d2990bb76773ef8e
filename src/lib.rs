// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod companies;
pub mod config;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod metrics;
pub mod monitor;
pub mod resolve;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::error::{IngestError, IngestResult};
pub use crate::extract::{ContentExtractor, ExtractedArticle};
pub use crate::ingest::poll::{PollSummary, Poller, TenantScope};
pub use crate::monitor::{ExtractionEvent, ExtractionMonitor, HealthStatus};
pub use crate::resolve::RedirectResolver;
