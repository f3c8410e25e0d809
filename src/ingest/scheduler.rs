// src/ingest/scheduler.rs
use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::ingest::orchestrator::{CollectorOrchestrator, SourceTask};

/// Run an ingest pass every `interval` until `shutdown` resolves. The first
/// pass starts immediately; a pass that overruns delays the next tick rather
/// than bursting. Returns the number of completed passes.
pub async fn run_every<F>(
    orchestrator: &CollectorOrchestrator,
    tasks: &[SourceTask],
    interval: Duration,
    shutdown: F,
) -> u64
where
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut passes = 0u64;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!(target: "ingest", passes, "scheduler stopping");
                return passes;
            }
            _ = ticker.tick() => {
                let report = orchestrator.run_once(tasks).await;
                passes += 1;
                tracing::info!(
                    target: "ingest",
                    pass = passes,
                    accepted = report.totals().accepted,
                    "scheduled ingest tick"
                );
            }
        }
    }
}
