// src/dedup/mod.rs
//! Three-layer duplicate detection keyed by a content hash.
//!
//! Layers, cheapest first:
//! 1. in-batch: a per-run `BatchScope` set, never persisted;
//! 2. same-day: today's persisted `DedupRecord`;
//! 3. historical: the records of the 13 days before today.
//!
//! Records live in an [`ObjectStore`] at `{prefix}/{YYYY-MM-DD}.json`.
//!
//! Store failures while *reading* are fail-open: they are logged and the hash
//! is reported as not seen, so a degraded store never blocks ingestion. The
//! price is an occasional duplicate during an outage.

mod hash;

use std::collections::HashSet;
use std::ops::Range;
use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::{ObjectStore, StoreError};

pub use hash::{hash_content, HASH_CONTENT_PREFIX_CHARS};

pub const DEFAULT_DEDUP_PREFIX: &str = "deduplicated-content";
pub const DEFAULT_LOOKBACK_DAYS: u32 = 14;

/// Source of "now"; injectable so day boundaries are testable.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Persisted set of hashes seen on one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupRecord {
    #[serde(default)]
    pub hashes: Vec<String>,
    #[serde(default = "Utc::now")]
    pub updated: DateTime<Utc>,
}

impl DedupRecord {
    fn empty(now: DateTime<Utc>) -> Self {
        Self {
            hashes: Vec::new(),
            updated: now,
        }
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.hashes.iter().any(|h| h == hash)
    }
}

/// Which layer reported the duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateLayer {
    InBatch,
    SameDay,
    Historical,
}

impl DuplicateLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateLayer::InBatch => "in_batch",
            DuplicateLayer::SameDay => "same_day",
            DuplicateLayer::Historical => "historical",
        }
    }
}

impl std::fmt::Display for DuplicateLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transient per-run hash set (layer 1).
#[derive(Debug, Default, Clone)]
pub struct BatchScope {
    seen: HashSet<String>,
}

impl BatchScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the hash was already present.
    pub fn insert(&mut self, hash: &str) -> bool {
        self.seen.insert(hash.to_string())
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.seen.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[derive(Clone)]
pub struct DedupEngine {
    store: Option<Arc<dyn ObjectStore>>,
    prefix: String,
    lookback_days: u32,
    clock: Clock,
    /// Serializes record read-modify-write across clones of this engine.
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl DedupEngine {
    /// `None` disables the persisted layers; only in-batch dedup remains.
    pub fn new(store: Option<Arc<dyn ObjectStore>>) -> Self {
        Self {
            store,
            prefix: DEFAULT_DEDUP_PREFIX.to_string(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            clock: system_clock(),
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    /// Window length in days, today included. At least 1.
    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days.max(1);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    pub fn lookback_days(&self) -> u32 {
        self.lookback_days
    }

    pub fn today(&self) -> NaiveDate {
        (self.clock)().date_naive()
    }

    pub fn record_path(&self, day: NaiveDate) -> String {
        format!("{}/{}.json", self.prefix, day.format("%Y-%m-%d"))
    }

    pub async fn is_seen(&self, hash: &str) -> bool {
        self.is_seen_on(hash, self.today()).await
    }

    /// Scan `today` back through `lookback_days - 1` earlier days, stopping at the first hit.
    pub async fn is_seen_on(&self, hash: &str, today: NaiveDate) -> bool {
        let Some(store) = self.store.as_deref() else {
            return false;
        };
        if hash.is_empty() {
            return false;
        }
        match self.scan(store, hash, today, 0..self.lookback_days).await {
            Ok(hit) => hit.is_some(),
            Err(e) => {
                fail_open(hash, &e);
                false
            }
        }
    }

    /// Run all three layers; `Some(layer)` means duplicate.
    ///
    /// The hash is added to `batch` as a side effect, so a second call with the
    /// same hash in the same run reports `InBatch`.
    pub async fn check(&self, batch: &mut BatchScope, hash: &str) -> Option<DuplicateLayer> {
        if !batch.insert(hash) {
            return Some(DuplicateLayer::InBatch);
        }
        let store = self.store.as_deref()?;
        if hash.is_empty() {
            return None;
        }
        match self.scan(store, hash, self.today(), 0..self.lookback_days).await {
            Ok(Some(0)) => Some(DuplicateLayer::SameDay),
            Ok(Some(_)) => Some(DuplicateLayer::Historical),
            Ok(None) => None,
            Err(e) => {
                fail_open(hash, &e);
                None
            }
        }
    }

    pub async fn mark_seen(&self, hash: &str) -> bool {
        self.mark_seen_on(hash, self.today()).await
    }

    /// Append `hash` to the record of `day`. Returns `false` on any store failure.
    pub async fn mark_seen_on(&self, hash: &str, day: NaiveDate) -> bool {
        let Some(store) = self.store.as_deref() else {
            return false;
        };
        if hash.is_empty() {
            return false;
        }
        let path = self.record_path(day);
        let now = (self.clock)();

        let _guard = self.write_lock.lock().await;
        let mut record = match load_record(store, &path).await {
            Ok(Some(r)) => r,
            Ok(None) => DedupRecord::empty(now),
            Err(e) => {
                debug!(target: "dedup", %path, error = %e, "record unreadable; starting empty");
                DedupRecord::empty(now)
            }
        };

        if !record.contains(hash) {
            record.hashes.push(hash.to_string());
        }
        record.updated = now;

        let value = match serde_json::to_value(&record) {
            Ok(v) => v,
            Err(e) => {
                warn!(target: "dedup", %path, error = %e, "failed to encode dedup record");
                return false;
            }
        };
        match store.put(&path, &value).await {
            Ok(()) => true,
            Err(e) => {
                counter!("ingest_dedup_store_errors_total", "op" => "write").increment(1);
                warn!(target: "dedup", %path, error = %e, "failed to persist dedup record");
                false
            }
        }
    }

    /// Offset (days before `today`) of the first record containing `hash`.
    async fn scan(
        &self,
        store: &dyn ObjectStore,
        hash: &str,
        today: NaiveDate,
        offsets: Range<u32>,
    ) -> Result<Option<u32>, StoreError> {
        for offset in offsets {
            let Some(day) = today.checked_sub_days(Days::new(u64::from(offset))) else {
                break;
            };
            let path = self.record_path(day);
            match load_record(store, &path).await? {
                Some(record) if record.contains(hash) => return Ok(Some(offset)),
                // Missing day = not seen that day.
                _ => continue,
            }
        }
        Ok(None)
    }
}

async fn load_record(store: &dyn ObjectStore, path: &str) -> Result<Option<DedupRecord>, StoreError> {
    let Some(value) = store.get(path).await? else {
        return Ok(None);
    };
    serde_json::from_value(value)
        .map(Some)
        .map_err(|source| StoreError::Decode {
            path: path.to_string(),
            source,
        })
}

fn fail_open(hash: &str, err: &StoreError) {
    counter!("ingest_dedup_store_errors_total", "op" => "read").increment(1);
    let short: String = hash.chars().take(12).collect();
    warn!(
        target: "dedup",
        hash = %short,
        error = %err,
        "dedup store read failed; treating as not seen"
    );
}
