// src/analyze/scoring.rs
//! Composite quality score.
//!
//! `ScoreInputs` are three normalized signals in [0,1]:
//! - `engagement` : log-scaled reactions from item metadata
//! - `recency`    : exponential decay of the item's age
//! - `depth`      : body length relative to `min_content_chars`
//!
//! Base = weighted mean of the inputs (divided by the weight sum), then every
//! fired detector adds its signed weight; the result is clamped to [0,1].

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;

use super::detectors::{run_detectors, Signal};
use crate::config::{QualityConfig, ScoreWeights};
use crate::model::ContentItem;

/// Neutral value when an item carries no data for an input.
const NEUTRAL: f64 = 0.5;

const LIKE_KEYS: &[&str] = &["score", "upvotes", "likes", "favourites_count", "ups"];
const COMMENT_KEYS: &[&str] = &["comments", "num_comments", "replies_count"];
const SHARE_KEYS: &[&str] = &["shares", "reblogs", "reblogs_count"];

/// Normalized inputs in [0,1].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ScoreInputs {
    pub engagement: f64,
    pub recency: f64,
    pub depth: f64,
}

impl ScoreInputs {
    /// Safe constructor with clamping.
    pub fn new(engagement: f64, recency: f64, depth: f64) -> Self {
        fn c(x: f64) -> f64 {
            if x.is_nan() {
                0.0
            } else {
                x.clamp(0.0, 1.0)
            }
        }
        Self {
            engagement: c(engagement),
            recency: c(recency),
            depth: c(depth),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityScore {
    pub score: f64,
    pub inputs: ScoreInputs,
    pub signals: Vec<Signal>,
}

/// Weighted mean of the inputs; zero or negative weights are ignored.
pub fn base_score(inputs: &ScoreInputs, w: &ScoreWeights) -> f64 {
    let we = w.engagement.max(0.0);
    let wr = w.recency.max(0.0);
    let wd = w.depth.max(0.0);
    let raw = inputs.engagement * we + inputs.recency * wr + inputs.depth * wd;

    // Light normalization: divide by sum of weights if > 0, then clamp.
    let denom = (we + wr + wd).max(1e-6);
    (raw / denom).clamp(0.0, 1.0)
}

/// Full score of one item at `now`.
pub fn score_item(item: &ContentItem, cfg: &QualityConfig, now: DateTime<Utc>) -> QualityScore {
    let inputs = ScoreInputs::new(
        engagement_score(item, cfg),
        recency_score(item, cfg, now),
        depth_score(item, cfg),
    );
    let signals = run_detectors(item, cfg);
    let adjust: f64 = signals.iter().map(|s| s.weight).sum();
    let score = (base_score(&inputs, &cfg.weights) + adjust).clamp(0.0, 1.0);
    QualityScore {
        score,
        inputs,
        signals,
    }
}

/// `ln(1 + likes + 2*comments + 1.5*shares) / ln(1 + saturation)`, or neutral without data.
pub fn engagement_score(item: &ContentItem, cfg: &QualityConfig) -> f64 {
    let meta = item.metadata();
    let sum_of = |keys: &[&str]| -> Option<f64> {
        let vals: Vec<f64> = keys
            .iter()
            .filter_map(|k| meta.get(*k).and_then(as_number))
            .collect();
        (!vals.is_empty()).then(|| vals.iter().map(|v| v.max(0.0)).sum())
    };

    let likes = sum_of(LIKE_KEYS);
    let comments = sum_of(COMMENT_KEYS);
    let shares = sum_of(SHARE_KEYS);
    if likes.is_none() && comments.is_none() && shares.is_none() {
        return NEUTRAL;
    }

    let raw =
        likes.unwrap_or(0.0) + 2.0 * comments.unwrap_or(0.0) + 1.5 * shares.unwrap_or(0.0);
    ((1.0 + raw).ln() / (1.0 + cfg.engagement_saturation).ln()).clamp(0.0, 1.0)
}

/// `0.5 ^ (age_hours / half_life)`; future timestamps count as fresh.
pub fn recency_score(item: &ContentItem, cfg: &QualityConfig, now: DateTime<Utc>) -> f64 {
    let Some(ts) = published_at(item).or(item.collected_at()) else {
        return NEUTRAL;
    };
    let age_hours = (now - ts).num_seconds().max(0) as f64 / 3600.0;
    0.5_f64
        .powf(age_hours / cfg.recency_half_life_hours)
        .clamp(0.0, 1.0)
}

pub fn depth_score(item: &ContentItem, cfg: &QualityConfig) -> f64 {
    let chars = item.content().trim().chars().count() as f64;
    (chars / cfg.min_content_chars as f64).clamp(0.0, 1.0)
}

/// `metadata.published_at` as RFC 3339 string or unix seconds.
fn published_at(item: &ContentItem) -> Option<DateTime<Utc>> {
    match item.metadata().get("published_at")? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|d| d.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .filter(|secs| *secs > 0)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        _ => None,
    }
}

fn as_number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|x| x.is_finite())
}
