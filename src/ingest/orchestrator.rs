// src/ingest/orchestrator.rs
//! Runs every source concurrently: rate-limited page fetches feed the quality
//! gate as a stream, so items are gated while later pages are still loading.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::{FutureExt, Stream};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::gate::{QualityGate, RunSummary};
use crate::ingest::types::{Collector, CollectorError};
use crate::model::ContentItem;
use crate::rate_limit::RateLimiter;
use crate::sink::EmitSink;

/// A collector bound to the limiter that guards its host.
#[derive(Clone)]
pub struct SourceTask {
    pub collector: Arc<dyn Collector>,
    pub limiter: Arc<RateLimiter>,
    pub max_pages: u32,
}

impl SourceTask {
    pub fn new(collector: Arc<dyn Collector>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            collector,
            limiter,
            max_pages: 1,
        }
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }
}

impl std::fmt::Debug for SourceTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceTask")
            .field("collector", &self.collector.name())
            .field("limiter", &self.limiter.name())
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorSettings {
    /// Upper bound on one limiter wait; `None` waits indefinitely.
    pub acquire_timeout: Option<Duration>,
    /// 429 answers tolerated per page before the source is failed.
    pub max_retries: u32,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            acquire_timeout: Some(Duration::from_secs(120)),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    Completed,
    /// Stopped early without an error, e.g. the limiter timed out.
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub pages: u32,
    pub fetched: usize,
    pub rate_limited: u32,
    pub status: SourceStatus,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub sources: Vec<SourceReport>,
}

impl RunReport {
    pub fn totals(&self) -> RunSummary {
        let mut total = RunSummary::default();
        for s in &self.sources {
            total.merge(&s.summary);
        }
        total
    }

    pub fn source(&self, name: &str) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.source == name)
    }
}

/// Fetch-side bookkeeping, written by the page stream while the gate consumes it.
#[derive(Debug)]
struct FetchLog {
    pages: u32,
    fetched: usize,
    rate_limited: u32,
    status: SourceStatus,
}

impl Default for FetchLog {
    fn default() -> Self {
        Self {
            pages: 0,
            fetched: 0,
            rate_limited: 0,
            status: SourceStatus::Completed,
        }
    }
}

pub struct CollectorOrchestrator {
    gate: Arc<QualityGate>,
    sink: Arc<dyn EmitSink>,
    settings: OrchestratorSettings,
}

impl CollectorOrchestrator {
    pub fn new(gate: Arc<QualityGate>, sink: Arc<dyn EmitSink>) -> Self {
        Self {
            gate,
            sink,
            settings: OrchestratorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> OrchestratorSettings {
        self.settings
    }

    /// One pass over all sources. A failing source never affects the others.
    pub async fn run_once(&self, tasks: &[SourceTask]) -> RunReport {
        crate::ingest::ensure_metrics_described();
        let sources = join_all(tasks.iter().map(|t| self.run_source(t))).await;
        let report = RunReport { sources };

        counter!("ingest_runs_total").increment(1);
        gauge!("ingest_pipeline_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        let totals = report.totals();
        info!(
            target: "ingest",
            sources = report.sources.len(),
            received = totals.received,
            accepted = totals.accepted,
            emitted = totals.emitted,
            "ingest pass finished"
        );
        report
    }

    async fn run_source(&self, task: &SourceTask) -> SourceReport {
        let log = Mutex::new(FetchLog::default());
        let items = page_stream(task, self.settings, &log);
        let summary = self.gate.run(items, self.sink.as_ref()).await;
        let log = log.into_inner();

        if let SourceStatus::Failed { error } = &log.status {
            counter!("ingest_provider_errors_total").increment(1);
            warn!(target: "ingest", source = task.collector.name(), %error, "source failed");
        }
        SourceReport {
            source: task.collector.name().to_string(),
            pages: log.pages,
            fetched: log.fetched,
            rate_limited: log.rate_limited,
            status: log.status,
            summary,
        }
    }
}

/// Pages of one source, flattened to items. Every fetch first takes a token;
/// a 429 backs the limiter off and retries the same cursor.
fn page_stream<'a>(
    task: &'a SourceTask,
    settings: OrchestratorSettings,
    log: &'a Mutex<FetchLog>,
) -> impl Stream<Item = ContentItem> + 'a {
    async_stream::stream! {
        let name = task.collector.name().to_string();
        let mut cursor: Option<String> = None;
        let mut retries = 0u32;
        let mut pages = 0u32;

        while pages < task.max_pages {
            if !task.limiter.acquire(settings.acquire_timeout).await {
                warn!(target: "ingest", source = %name, "rate limiter wait timed out; skipping source");
                log.lock().status = SourceStatus::Skipped {
                    reason: "rate limiter acquire timed out".to_string(),
                };
                break;
            }

            let fetched = AssertUnwindSafe(task.collector.fetch_page(cursor.as_deref()))
                .catch_unwind()
                .await;
            match fetched {
                Ok(Ok(page)) => {
                    task.limiter.reset_backoff().await;
                    retries = 0;
                    pages += 1;
                    {
                        let mut l = log.lock();
                        l.pages += 1;
                        l.fetched += page.items.len();
                    }
                    counter!("ingest_pages_total").increment(1);

                    for item in page.items {
                        yield item;
                    }
                    match page.next_cursor {
                        Some(next) => cursor = Some(next),
                        None => break,
                    }
                }
                Ok(Err(CollectorError::RateLimited { retry_after })) => {
                    log.lock().rate_limited += 1;
                    task.limiter.handle_429(retry_after).await;
                    if retries >= settings.max_retries {
                        log.lock().status = SourceStatus::Failed {
                            error: format!("still rate limited after {retries} retries"),
                        };
                        break;
                    }
                    retries += 1;
                }
                Ok(Err(CollectorError::Other(e))) => {
                    log.lock().status = SourceStatus::Failed { error: format!("{e:#}") };
                    break;
                }
                Err(_) => {
                    log.lock().status = SourceStatus::Failed {
                        error: "collector panicked".to_string(),
                    };
                    break;
                }
            }
        }
    }
}
