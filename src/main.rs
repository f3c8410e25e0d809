//! feed-curator binary entrypoint.
//! Loads config, wires store -> dedup -> gate -> sink, and runs the ingest
//! pass once or on an interval.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use feed_curator::config::{IngestSettings, QualityConfig};
use feed_curator::dedup::DedupEngine;
use feed_curator::gate::QualityGate;
use feed_curator::ingest::config::load_sources_default;
use feed_curator::ingest::scheduler::run_every;
use feed_curator::ingest::{tasks_from_specs, CollectorOrchestrator, OrchestratorSettings};
use feed_curator::sink::{EmitSink, JsonlSink};
use feed_curator::store::{FsStore, ObjectStore};
use feed_curator::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        let addr = addr
            .parse()
            .with_context(|| format!("METRICS_ADDR `{addr}` is not a socket address"))?;
        telemetry::install_prometheus(addr)?;
    }

    let settings = IngestSettings::from_env()?;
    let quality = QualityConfig::load()?;
    info!(
        target: "config",
        threshold = quality.score_threshold,
        store = %settings.store_dir.display(),
        sink = %settings.sink_path.display(),
        "configuration loaded"
    );

    let specs = load_sources_default()?;
    if specs.is_empty() {
        warn!(target: "config", "no sources configured; nothing to ingest");
        return Ok(());
    }
    let tasks = tasks_from_specs(&specs)?;

    let store: Arc<dyn ObjectStore> = Arc::new(FsStore::new(settings.store_dir.clone()));
    let dedup = DedupEngine::new(Some(store));
    let gate = Arc::new(QualityGate::new(Arc::new(quality), dedup));
    let sink: Arc<dyn EmitSink> = Arc::new(JsonlSink::open(&settings.sink_path).await?);
    let orchestrator = CollectorOrchestrator::new(gate, sink).with_settings(OrchestratorSettings {
        acquire_timeout: settings.acquire_timeout,
        max_retries: settings.max_retries,
    });

    match settings.interval {
        None => {
            let report = orchestrator.run_once(&tasks).await;
            for s in &report.sources {
                info!(
                    target: "ingest",
                    source = %s.source,
                    pages = s.pages,
                    fetched = s.fetched,
                    accepted = s.summary.accepted,
                    status = ?s.status,
                    "source finished"
                );
            }
        }
        Some(interval) => {
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = ?e, "ctrl-c handler failed; stopping");
                }
            };
            run_every(&orchestrator, &tasks, interval, shutdown).await;
        }
    }
    Ok(())
}
