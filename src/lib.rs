// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod config;
pub mod dedup;
pub mod gate;
pub mod ingest;
pub mod model;
pub mod rate_limit;
pub mod sink;
pub mod store;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::config::{IngestSettings, QualityConfig};
pub use crate::dedup::{hash_content, BatchScope, DedupEngine, DuplicateLayer};
pub use crate::gate::{ItemOutcome, QualityGate, RejectReason, RunSummary};
pub use crate::model::ContentItem;
pub use crate::rate_limit::{RateLimitProfile, RateLimiter};
pub use crate::sink::EmitSink;
pub use crate::store::{ObjectStore, StoreError};
