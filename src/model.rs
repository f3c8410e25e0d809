// src/model.rs
//! Standardized content item shared by collectors, the quality gate and sinks.
//!
//! Identity fields (`id`, `title`, `content`, `source`, `url`, `collected_at`) are
//! fixed once the item is built; later stages may only append metadata and set
//! the priority score.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dedup::hash_content;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    collected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(default)]
    priority_score: f64,
}

impl ContentItem {
    /// Standardize a freshly collected item; `collected_at` is stamped with now.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            source: source.into(),
            url: None,
            collected_at: Some(Utc::now()),
            metadata: Map::new(),
            priority_score: 0.0,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Override the collection timestamp (`None` models a collector that did not set it).
    pub fn with_collected_at(mut self, ts: Option<DateTime<Utc>>) -> Self {
        self.collected_at = ts;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn collected_at(&self) -> Option<DateTime<Utc>> {
        self.collected_at
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn priority_score(&self) -> f64 {
        self.priority_score
    }

    /// Append (or replace) a metadata entry produced by a later stage.
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Clamped to [0, 1]; NaN becomes 0.
    pub fn set_priority_score(&mut self, score: f64) {
        self.priority_score = if score.is_nan() {
            0.0
        } else {
            score.clamp(0.0, 1.0)
        };
    }

    /// Dedup key for this item (see [`hash_content`]).
    pub fn content_hash(&self) -> String {
        hash_content(&self.title, &self.content)
    }
}
