// tests/orchestrator.rs
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use feed_curator::dedup::DedupEngine;
use feed_curator::gate::QualityGate;
use feed_curator::ingest::orchestrator::SourceTask;
use feed_curator::ingest::{
    Collector, CollectorError, CollectorOrchestrator, FetchedPage, OrchestratorSettings,
    SourceStatus,
};
use feed_curator::sink::{EmitSink, MemorySink};
use feed_curator::store::{MemoryStore, ObjectStore};
use feed_curator::{ContentItem, QualityConfig, RateLimitProfile, RateLimiter};
use parking_lot::Mutex;
use tokio::time::Instant;

enum Step {
    Page(Vec<&'static str>, Option<&'static str>),
    RateLimited(Option<Duration>),
    Fail(&'static str),
    Panic,
}

/// Replays a fixed script of responses and records the cursors it was given.
struct ScriptedCollector {
    name: &'static str,
    script: Mutex<VecDeque<Step>>,
    cursors: Mutex<Vec<Option<String>>>,
}

impl ScriptedCollector {
    fn new(name: &'static str, steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            name,
            script: Mutex::new(steps.into()),
            cursors: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.cursors.lock().len()
    }
}

#[async_trait]
impl Collector for ScriptedCollector {
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<FetchedPage, CollectorError> {
        self.cursors.lock().push(cursor.map(str::to_string));
        let step = self.script.lock().pop_front();
        match step {
            Some(Step::Page(titles, next)) => Ok(FetchedPage {
                items: titles
                    .into_iter()
                    .map(|t| {
                        ContentItem::new(
                            format!("{}-{t}", self.name),
                            t,
                            format!("{t} explained in depth. ").repeat(20),
                            self.name,
                        )
                    })
                    .collect(),
                next_cursor: next.map(str::to_string),
            }),
            Some(Step::RateLimited(retry_after)) => Err(CollectorError::RateLimited { retry_after }),
            Some(Step::Fail(msg)) => Err(anyhow::anyhow!(msg).into()),
            Some(Step::Panic) => panic!("collector blew up"),
            None => Ok(FetchedPage::default()),
        }
    }

    fn name(&self) -> &str {
        self.name
    }
}

fn orchestrator(settings: OrchestratorSettings) -> (CollectorOrchestrator, Arc<MemorySink>) {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let dedup = DedupEngine::new(Some(store));
    let gate = Arc::new(QualityGate::new(Arc::new(QualityConfig::default()), dedup));
    let sink = Arc::new(MemorySink::new());
    let orch = CollectorOrchestrator::new(gate, sink.clone() as Arc<dyn EmitSink>)
        .with_settings(settings);
    (orch, sink)
}

fn limiter(name: &str) -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(name, RateLimitProfile::generic()))
}

#[tokio::test(start_paused = true)]
async fn retries_after_429_and_resets_backoff() {
    let (orch, sink) = orchestrator(OrchestratorSettings::default());
    let collector = ScriptedCollector::new(
        "blog",
        vec![
            Step::RateLimited(None),
            Step::Page(vec!["Pinning explained", "Waker internals"], None),
        ],
    );
    let lim = limiter("blog.example");
    let task = SourceTask::new(collector.clone(), lim.clone());

    let started = Instant::now();
    let report = orch.run_once(&[task]).await;
    let src = report.source("blog").unwrap();

    assert_eq!(src.status, SourceStatus::Completed);
    assert_eq!(src.rate_limited, 1);
    assert_eq!(src.pages, 1);
    assert_eq!(src.fetched, 2);
    assert_eq!(src.summary.accepted, 2);
    assert_eq!(sink.len(), 2);
    assert_eq!(collector.calls(), 2);

    // The retry waited out the first backoff step (generic: 2s).
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(lim.current_delay().await, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn explicit_retry_after_is_honored() {
    let (orch, _sink) = orchestrator(OrchestratorSettings::default());
    let collector = ScriptedCollector::new(
        "api",
        vec![
            Step::RateLimited(Some(Duration::from_secs(45))),
            Step::Page(vec!["Release notes"], None),
        ],
    );
    let started = Instant::now();
    let report = orch
        .run_once(&[SourceTask::new(collector, limiter("api.example"))])
        .await;

    assert_eq!(report.sources[0].status, SourceStatus::Completed);
    assert!(started.elapsed() >= Duration::from_secs(45));
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_retries() {
    let (orch, sink) = orchestrator(OrchestratorSettings {
        acquire_timeout: None,
        max_retries: 2,
    });
    let collector = ScriptedCollector::new(
        "grumpy",
        vec![
            Step::RateLimited(None),
            Step::RateLimited(None),
            Step::RateLimited(None),
            Step::Page(vec!["Never reached"], None),
        ],
    );
    let lim = limiter("grumpy.example");
    let report = orch
        .run_once(&[SourceTask::new(collector.clone(), lim.clone())])
        .await;

    let src = &report.sources[0];
    assert!(matches!(src.status, SourceStatus::Failed { .. }));
    assert_eq!(src.rate_limited, 3);
    assert_eq!(collector.calls(), 3);
    assert!(sink.is_empty());
    // 2s -> 4s -> 8s
    assert_eq!(lim.current_delay().await, Duration::from_secs(8));
}

#[tokio::test(start_paused = true)]
async fn skips_source_when_limiter_times_out() {
    let (orch, _sink) = orchestrator(OrchestratorSettings {
        acquire_timeout: Some(Duration::from_millis(100)),
        max_retries: 3,
    });
    let slow = Arc::new(RateLimiter::new(
        "slow.example",
        RateLimitProfile {
            requests_per_minute: 1,
            ..RateLimitProfile::generic()
        },
    ));
    // Drain the single token; the next one is a minute away.
    assert!(slow.acquire(None).await);

    let collector = ScriptedCollector::new("slow", vec![Step::Page(vec!["Unreached"], None)]);
    let report = orch
        .run_once(&[SourceTask::new(collector.clone(), slow)])
        .await;

    assert!(matches!(
        report.sources[0].status,
        SourceStatus::Skipped { .. }
    ));
    assert_eq!(collector.calls(), 0);
    assert_eq!(report.sources[0].summary.received, 0);
}

#[tokio::test(start_paused = true)]
async fn sources_are_isolated_and_paginate() {
    let (orch, sink) = orchestrator(OrchestratorSettings::default());

    let paged = ScriptedCollector::new(
        "paged",
        vec![
            Step::Page(vec!["Lifetimes", "Traits"], Some("p2")),
            Step::Page(vec!["Macros"], Some("p3")),
            Step::Page(vec!["Beyond max pages"], None),
        ],
    );
    let broken = ScriptedCollector::new("broken", vec![Step::Fail("feed returned garbage")]);
    let panicky = ScriptedCollector::new("panicky", vec![Step::Panic]);

    let tasks = vec![
        SourceTask::new(paged.clone(), limiter("paged.example")).with_max_pages(2),
        SourceTask::new(broken, limiter("broken.example")),
        SourceTask::new(panicky, limiter("panicky.example")),
    ];
    let report = orch.run_once(&tasks).await;

    let p = report.source("paged").unwrap();
    assert_eq!(p.status, SourceStatus::Completed);
    assert_eq!(p.pages, 2);
    assert_eq!(p.summary.accepted, 3);
    assert_eq!(
        *paged.cursors.lock(),
        vec![None, Some("p2".to_string())]
    );

    match &report.source("broken").unwrap().status {
        SourceStatus::Failed { error } => assert!(error.contains("garbage")),
        other => panic!("unexpected status {other:?}"),
    }
    assert!(matches!(
        report.source("panicky").unwrap().status,
        SourceStatus::Failed { .. }
    ));

    let totals = report.totals();
    assert_eq!(totals.accepted, 3);
    assert_eq!(sink.len(), 3);
}
