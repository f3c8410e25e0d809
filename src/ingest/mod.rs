// src/ingest/mod.rs
pub mod config;
pub mod orchestrator;
pub mod providers;
pub mod scheduler;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

use crate::analyze::detectors::url_host;
use crate::ingest::config::SourceSpec;
use crate::ingest::orchestrator::SourceTask;
use crate::ingest::providers::RssCollector;
use crate::rate_limit::{RateLimitProfile, RateLimiter};

pub use orchestrator::{
    CollectorOrchestrator, OrchestratorSettings, RunReport, SourceReport, SourceStatus,
};
pub use types::{Collector, CollectorError, FetchedPage};

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_events_total", "Total items parsed from feeds.");
        describe_counter!("ingest_pages_total", "Pages fetched from sources.");
        describe_counter!("ingest_items_total", "Items evaluated by the quality gate.");
        describe_counter!("ingest_accepted_total", "Items accepted and emitted downstream.");
        describe_counter!(
            "ingest_duplicates_total",
            "Items rejected as duplicates, by dedup layer."
        );
        describe_counter!(
            "ingest_rejected_total",
            "Items rejected by the gate, by reason."
        );
        describe_counter!("ingest_emit_errors_total", "Accepted items the sink refused.");
        describe_counter!(
            "ingest_rate_limited_total",
            "429 answers received from sources."
        );
        describe_counter!(
            "ingest_dedup_store_errors_total",
            "Dedup store failures, by operation."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Source fetch/parse errors."
        );
        describe_counter!("ingest_runs_total", "Completed ingest passes.");
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when ingest pipeline last ran."
        );
    });
}

/// Normalize text: collapse whitespace, trim, strip stray punctuation.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize curly and angle quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("whitespace regex"));
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // 5) Length cap: 5000 chars
    if out.chars().count() > 5000 {
        out = out.chars().take(5000).collect();
    }

    out
}

/// Build one task per configured source. Sources on the same host with the
/// same profile share a limiter, so the host sees one combined request rate.
pub fn tasks_from_specs(specs: &[SourceSpec]) -> Result<Vec<SourceTask>> {
    let mut limiters: HashMap<(String, &'static str), Arc<RateLimiter>> = HashMap::new();
    let mut tasks = Vec::with_capacity(specs.len());

    for spec in specs {
        let preset = RateLimitProfile::canonical_name(&spec.profile).ok_or_else(|| {
            anyhow!("source `{}`: unknown rate-limit profile `{}`", spec.name, spec.profile)
        })?;
        let profile = RateLimitProfile::from_name(preset).unwrap_or_default();
        let host = url_host(&spec.url).unwrap_or_else(|| spec.name.clone());
        let limiter = limiters
            .entry((host.clone(), preset))
            .or_insert_with(|| Arc::new(RateLimiter::new(host, profile)))
            .clone();
        let collector = RssCollector::from_url(spec.name.clone(), spec.url.clone())?;
        tasks.push(SourceTask::new(Arc::new(collector), limiter).with_max_pages(spec.max_pages));
    }
    Ok(tasks)
}
