// src/config/mod.rs
//! Runtime configuration: quality config (TOML) and process settings (env).

pub mod quality;

pub use quality::{DetectionWeights, QualityConfig, ScoreWeights};

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_STORE_DIR: &str = "INGEST_STORE_DIR";
pub const ENV_SINK_PATH: &str = "INGEST_SINK_PATH";
pub const ENV_ACQUIRE_TIMEOUT_SECS: &str = "INGEST_ACQUIRE_TIMEOUT_SECS";
pub const ENV_INTERVAL_SECS: &str = "INGEST_INTERVAL_SECS";
pub const ENV_MAX_RETRIES: &str = "INGEST_MAX_RETRIES";

/// Timeouts and intervals above one week are clamped to one week.
pub const MAX_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Process-level knobs read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestSettings {
    /// Root directory of the local dedup store.
    pub store_dir: PathBuf,
    /// JSON-lines file accepted items are appended to.
    pub sink_path: PathBuf,
    /// `None` = wait for rate-limit tokens indefinitely.
    pub acquire_timeout: Option<Duration>,
    /// `None` = run once and exit.
    pub interval: Option<Duration>,
    /// Retries per page after a 429.
    pub max_retries: u32,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("data/store"),
            sink_path: PathBuf::from("data/accepted.jsonl"),
            acquire_timeout: Some(Duration::from_secs(120)),
            interval: None,
            max_retries: 3,
        }
    }
}

impl IngestSettings {
    /// Read overrides from the environment. Unparsable numbers are fatal.
    /// A timeout of `0` disables it; larger values are clamped to
    /// [`MAX_DURATION_SECS`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut s = Self::default();
        if let Some(v) = get(ENV_STORE_DIR).filter(|v| !v.trim().is_empty()) {
            s.store_dir = PathBuf::from(v.trim());
        }
        if let Some(v) = get(ENV_SINK_PATH).filter(|v| !v.trim().is_empty()) {
            s.sink_path = PathBuf::from(v.trim());
        }
        if let Some(secs) = parse_u64(&get, ENV_ACQUIRE_TIMEOUT_SECS)? {
            s.acquire_timeout = bounded_secs(secs);
        }
        if let Some(secs) = parse_u64(&get, ENV_INTERVAL_SECS)? {
            s.interval = bounded_secs(secs);
        }
        if let Some(n) = parse_u64(&get, ENV_MAX_RETRIES)? {
            s.max_retries = u32::try_from(n).context("INGEST_MAX_RETRIES out of range")?;
        }
        Ok(s)
    }
}

fn bounded_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs.min(MAX_DURATION_SECS)))
}

fn parse_u64(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    match get(key) {
        None => Ok(None),
        Some(v) if v.trim().is_empty() => Ok(None),
        Some(v) => v
            .trim()
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("{key} must be a non-negative integer, got `{v}`")),
    }
}
