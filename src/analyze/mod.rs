// src/analyze/mod.rs
//! Quality analysis: detectors + composite scoring. Everything here is pure
//! and deterministic given `(item, config, now)`.

pub mod detectors;
pub mod scoring;

// Re-export convenient types.
pub use crate::analyze::detectors::{run_detectors, Detector, Signal};
pub use crate::analyze::scoring::{base_score, score_item, QualityScore, ScoreInputs};
