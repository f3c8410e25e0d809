// tests/ingest_scheduler.rs
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use feed_curator::dedup::DedupEngine;
use feed_curator::gate::QualityGate;
use feed_curator::ingest::orchestrator::SourceTask;
use feed_curator::ingest::scheduler::run_every;
use feed_curator::ingest::{Collector, CollectorError, CollectorOrchestrator, FetchedPage};
use feed_curator::sink::{EmitSink, MemorySink};
use feed_curator::store::{MemoryStore, ObjectStore};
use feed_curator::{ContentItem, QualityConfig, RateLimitProfile, RateLimiter};

/// Serves the same two posts on every call.
#[derive(Default)]
struct SteadyFeed {
    calls: AtomicUsize,
}

#[async_trait]
impl Collector for SteadyFeed {
    async fn fetch_page(&self, _cursor: Option<&str>) -> Result<FetchedPage, CollectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let items = ["Executor design", "Timer wheels"]
            .into_iter()
            .map(|t| {
                ContentItem::new(
                    format!("steady-{t}"),
                    t,
                    format!("{t} explained in depth. ").repeat(20),
                    "steady",
                )
            })
            .collect();
        Ok(FetchedPage {
            items,
            next_cursor: None,
        })
    }

    fn name(&self) -> &str {
        "steady"
    }
}

fn orchestrator() -> (CollectorOrchestrator, Arc<MemorySink>) {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let gate = Arc::new(QualityGate::new(
        Arc::new(QualityConfig::default()),
        DedupEngine::new(Some(store)),
    ));
    let sink = Arc::new(MemorySink::new());
    let orch = CollectorOrchestrator::new(gate, sink.clone() as Arc<dyn EmitSink>);
    (orch, sink)
}

#[tokio::test(start_paused = true)]
async fn runs_on_each_tick_until_shutdown() {
    let (orch, sink) = orchestrator();
    let feed = Arc::new(SteadyFeed::default());
    let limiter = Arc::new(RateLimiter::new("steady.example", RateLimitProfile::generic()));
    let tasks = [SourceTask::new(feed.clone(), limiter)];

    // Ticks at 0s, 10s and 20s; shutdown at 25s.
    let passes = run_every(
        &orch,
        &tasks,
        Duration::from_secs(10),
        tokio::time::sleep(Duration::from_secs(25)),
    )
    .await;

    assert_eq!(passes, 3);
    assert_eq!(feed.calls.load(Ordering::SeqCst), 3);
    // Later passes see the same posts again; dedup keeps them out of the sink.
    assert_eq!(sink.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_before_second_tick_stops_after_one_pass() {
    let (orch, sink) = orchestrator();
    let feed = Arc::new(SteadyFeed::default());
    let limiter = Arc::new(RateLimiter::new("steady.example", RateLimitProfile::generic()));
    let tasks = [SourceTask::new(feed.clone(), limiter)];

    let passes = run_every(
        &orch,
        &tasks,
        Duration::from_secs(60),
        tokio::time::sleep(Duration::from_secs(5)),
    )
    .await;

    assert_eq!(passes, 1);
    assert_eq!(sink.len(), 2);
}
