// src/gate/outcome.rs
//! Per-item outcomes and the run summary built from them.

use serde::Serialize;

use crate::dedup::DuplicateLayer;
use crate::model::ContentItem;

/// Why an item did not make it through the gate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    /// A required field was empty or missing.
    Invalid { field: String },
    Duplicate { layer: DuplicateLayer },
    BelowThreshold { score: f64, threshold: f64 },
    /// A stage errored or panicked on this item.
    Failed { error: String },
}

impl RejectReason {
    /// Stable label for metrics and summaries.
    pub fn category(&self) -> &'static str {
        match self {
            RejectReason::Invalid { .. } => "invalid",
            RejectReason::Duplicate { .. } => "duplicate",
            RejectReason::BelowThreshold { .. } => "quality",
            RejectReason::Failed { .. } => "failed",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Invalid { field } => write!(f, "missing required field `{field}`"),
            RejectReason::Duplicate { layer } => write!(f, "duplicate ({layer})"),
            RejectReason::BelowThreshold { score, threshold } => {
                write!(f, "score {score:.3} below threshold {threshold:.3}")
            }
            RejectReason::Failed { error } => write!(f, "processing failed: {error}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub item_id: String,
    pub source: String,
    pub reason: RejectReason,
}

/// Terminal state of one item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Accepted(ContentItem),
    Rejected(Rejection),
}

impl ItemOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ItemOutcome::Accepted(_))
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            ItemOutcome::Rejected(r) => Some(r),
            ItemOutcome::Accepted(_) => None,
        }
    }
}

/// Tally of one run. Every outcome passes through `record`, so counts always
/// add up to `received`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub received: usize,
    /// Passed validation (accepted + duplicate + quality-rejected).
    pub validated: usize,
    pub invalid: usize,
    pub duplicates: usize,
    pub quality_rejected: usize,
    pub failed: usize,
    pub accepted: usize,
    pub emitted: usize,
    pub emit_failed: usize,
    pub rejections: Vec<Rejection>,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &ItemOutcome) {
        self.received += 1;
        match outcome {
            ItemOutcome::Accepted(_) => {
                self.validated += 1;
                self.accepted += 1;
            }
            ItemOutcome::Rejected(r) => {
                match r.reason {
                    RejectReason::Invalid { .. } => self.invalid += 1,
                    RejectReason::Duplicate { .. } => {
                        self.validated += 1;
                        self.duplicates += 1;
                    }
                    RejectReason::BelowThreshold { .. } => {
                        self.validated += 1;
                        self.quality_rejected += 1;
                    }
                    RejectReason::Failed { .. } => self.failed += 1,
                }
                self.rejections.push(r.clone());
            }
        }
    }

    pub fn rejected(&self) -> usize {
        self.invalid + self.duplicates + self.quality_rejected + self.failed
    }

    pub fn merge(&mut self, other: &RunSummary) {
        self.received += other.received;
        self.validated += other.validated;
        self.invalid += other.invalid;
        self.duplicates += other.duplicates;
        self.quality_rejected += other.quality_rejected;
        self.failed += other.failed;
        self.accepted += other.accepted;
        self.emitted += other.emitted;
        self.emit_failed += other.emit_failed;
        self.rejections.extend(other.rejections.iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(reason: RejectReason) -> ItemOutcome {
        ItemOutcome::Rejected(Rejection {
            item_id: "x".into(),
            source: "s".into(),
            reason,
        })
    }

    #[test]
    fn counts_add_up() {
        let mut s = RunSummary::default();
        s.record(&ItemOutcome::Accepted(ContentItem::new("1", "t", "c", "s")));
        s.record(&rejected(RejectReason::Invalid {
            field: "title".into(),
        }));
        s.record(&rejected(RejectReason::Duplicate {
            layer: DuplicateLayer::SameDay,
        }));
        s.record(&rejected(RejectReason::BelowThreshold {
            score: 0.1,
            threshold: 0.4,
        }));
        s.record(&rejected(RejectReason::Failed {
            error: "boom".into(),
        }));

        assert_eq!(s.received, 5);
        assert_eq!(s.validated, 3);
        assert_eq!(s.accepted + s.rejected(), s.received);
        assert_eq!(s.rejections.len(), 4);

        let mut total = RunSummary::default();
        total.merge(&s);
        total.merge(&s);
        assert_eq!(total.received, 10);
        assert_eq!(total.rejections.len(), 8);
    }

    #[test]
    fn reasons_render_and_serialize() {
        let r = RejectReason::BelowThreshold {
            score: 0.2,
            threshold: 0.45,
        };
        assert_eq!(r.to_string(), "score 0.200 below threshold 0.450");
        assert_eq!(r.category(), "quality");
        let v = serde_json::to_value(RejectReason::Duplicate {
            layer: DuplicateLayer::Historical,
        })
        .unwrap();
        assert_eq!(v["kind"], "duplicate");
        assert_eq!(v["layer"], "historical");
    }
}
