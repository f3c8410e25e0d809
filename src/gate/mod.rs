// src/gate/mod.rs
//! Streaming quality gate.
//!
//! Each item runs through validate -> dedup -> score -> threshold on its own,
//! and its outcome is yielded as soon as it is known. A failure inside one
//! item (error or panic) becomes a `Failed` rejection for that item only.

pub mod outcome;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::{bail, Result};
use futures::{FutureExt, Stream, StreamExt};
use metrics::counter;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::analyze::score_item;
use crate::config::QualityConfig;
use crate::dedup::{system_clock, BatchScope, Clock, DedupEngine};
use crate::model::ContentItem;
use crate::sink::EmitSink;

pub use outcome::{ItemOutcome, RejectReason, Rejection, RunSummary};

#[derive(Clone)]
pub struct QualityGate {
    config: Arc<QualityConfig>,
    dedup: DedupEngine,
    clock: Clock,
}

impl QualityGate {
    pub fn new(config: Arc<QualityConfig>, dedup: DedupEngine) -> Self {
        Self {
            config,
            dedup,
            clock: system_clock(),
        }
    }

    /// Clock used for recency scoring.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    pub fn dedup(&self) -> &DedupEngine {
        &self.dedup
    }

    /// Evaluate one item. Never fails: errors and panics become
    /// `RejectReason::Failed`.
    pub async fn evaluate(&self, batch: &mut BatchScope, item: ContentItem) -> ItemOutcome {
        counter!("ingest_items_total").increment(1);
        let item_id = item.id().to_string();
        let source = item.source().to_string();

        let outcome = match AssertUnwindSafe(self.process(batch, item))
            .catch_unwind()
            .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => reject(&item_id, &source, RejectReason::Failed {
                error: format!("{e:#}"),
            }),
            Err(panic) => reject(&item_id, &source, RejectReason::Failed {
                error: panic_message(panic.as_ref()),
            }),
        };

        match &outcome {
            ItemOutcome::Accepted(item) => {
                counter!("ingest_accepted_total").increment(1);
                debug!(target: "gate", id = item.id(), score = item.priority_score(), "accepted");
            }
            ItemOutcome::Rejected(r) => {
                if let RejectReason::Duplicate { layer } = &r.reason {
                    counter!("ingest_duplicates_total", "layer" => layer.as_str()).increment(1);
                }
                counter!("ingest_rejected_total", "reason" => r.reason.category()).increment(1);
                match &r.reason {
                    RejectReason::Failed { .. } => {
                        warn!(target: "gate", id = %r.item_id, source = %r.source, reason = %r.reason, "item failed")
                    }
                    _ => debug!(target: "gate", id = %r.item_id, reason = %r.reason, "rejected"),
                }
            }
        }
        outcome
    }

    async fn process(&self, batch: &mut BatchScope, mut item: ContentItem) -> Result<ItemOutcome> {
        if let Some(field) = missing_field(&item) {
            return Ok(reject(item.id(), item.source(), RejectReason::Invalid {
                field: field.to_string(),
            }));
        }

        let hash = item.content_hash();
        if let Some(layer) = self.dedup.check(batch, &hash).await {
            return Ok(reject(item.id(), item.source(), RejectReason::Duplicate { layer }));
        }

        let q = score_item(&item, &self.config, (self.clock)());
        if !q.score.is_finite() {
            bail!("non-finite quality score for item {}", item.id());
        }
        item.set_priority_score(q.score);
        item.insert_metadata("quality_score", json!(q.score));
        item.insert_metadata(
            "quality_signals",
            serde_json::to_value(&q.signals).unwrap_or(Value::Null),
        );
        item.insert_metadata("content_hash", Value::String(hash.clone()));

        let threshold = self.config.score_threshold;
        if q.score < threshold {
            return Ok(reject(item.id(), item.source(), RejectReason::BelowThreshold {
                score: q.score,
                threshold,
            }));
        }

        if !self.dedup.mark_seen(&hash).await {
            warn!(target: "gate", id = item.id(), "could not persist dedup record; item still accepted");
        }
        Ok(ItemOutcome::Accepted(item))
    }

    /// Lazily evaluate `items`, yielding one outcome per input item in input
    /// order. In-batch dedup spans the whole stream.
    pub fn stream<'a, S>(&'a self, items: S) -> impl Stream<Item = ItemOutcome> + 'a
    where
        S: Stream<Item = ContentItem> + 'a,
    {
        async_stream::stream! {
            let mut batch = BatchScope::new();
            futures::pin_mut!(items);
            while let Some(item) = items.next().await {
                yield self.evaluate(&mut batch, item).await;
            }
        }
    }

    /// Drive `items` through the gate, handing every accepted item to `sink`
    /// as soon as it is accepted.
    pub async fn run<S>(&self, items: S, sink: &dyn EmitSink) -> RunSummary
    where
        S: Stream<Item = ContentItem>,
    {
        let mut summary = RunSummary::default();
        let outcomes = self.stream(items);
        futures::pin_mut!(outcomes);
        while let Some(outcome) = outcomes.next().await {
            summary.record(&outcome);
            if let ItemOutcome::Accepted(item) = outcome {
                let id = item.id().to_string();
                match sink.enqueue(item).await {
                    Ok(()) => summary.emitted += 1,
                    Err(e) => {
                        summary.emit_failed += 1;
                        counter!("ingest_emit_errors_total").increment(1);
                        warn!(target: "gate", id = %id, sink = sink.name(), error = ?e, "emit failed");
                    }
                }
            }
        }
        info!(
            target: "gate",
            received = summary.received,
            accepted = summary.accepted,
            duplicates = summary.duplicates,
            quality_rejected = summary.quality_rejected,
            invalid = summary.invalid,
            failed = summary.failed,
            "run finished"
        );
        summary
    }
}

impl std::fmt::Debug for QualityGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityGate")
            .field("threshold", &self.config.score_threshold)
            .field("lookback_days", &self.dedup.lookback_days())
            .finish()
    }
}

/// First required field that is blank, in a fixed order.
fn missing_field(item: &ContentItem) -> Option<&'static str> {
    [
        ("id", item.id()),
        ("title", item.title()),
        ("content", item.content()),
        ("source", item.source()),
    ]
    .into_iter()
    .find(|(_, v)| v.trim().is_empty())
    .map(|(name, _)| name)
    .or_else(|| item.collected_at().is_none().then_some("collected_at"))
}

fn reject(item_id: &str, source: &str, reason: RejectReason) -> ItemOutcome {
    ItemOutcome::Rejected(Rejection {
        item_id: item_id.to_string(),
        source: source.to_string(),
        reason,
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic".to_string()
    }
}
