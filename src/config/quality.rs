// src/config/quality.rs
//! Quality-gate configuration: threshold, score weights, detector weights,
//! paywall lists and title patterns.
//!
//! TOML shape (every section optional, missing keys fall back to built-ins):
//! ```toml
//! [quality]
//! score_threshold = 0.45
//! engagement_saturation = 500.0
//! recency_half_life_hours = 24.0
//! min_content_chars = 280
//!
//! [weights]
//! engagement = 1.0
//! recency = 1.0
//! depth = 1.0
//!
//! [detection]
//! paywall = -0.5
//! listicle = -0.2
//! comparison = 0.1
//!
//! [paywall]
//! domains = ["wsj.com"]
//! keywords = ["subscribe to continue"]
//!
//! [patterns]
//! listicle = ['^\s*\d+\s+(things|ways|reasons)\b']
//! comparison = ['\bvs\.?\s']
//! ```
//! Patterns are compiled case-insensitive; a bad pattern is a startup error.

use anyhow::{anyhow, Context, Result};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_QUALITY_CONFIG_PATH: &str = "config/quality.toml";
pub const DEFAULT_SCORE_THRESHOLD: f64 = 0.45;

pub const ENV_QUALITY_CONFIG_PATH: &str = "QUALITY_CONFIG_PATH";
pub const ENV_QUALITY_SCORE_THRESHOLD: &str = "QUALITY_SCORE_THRESHOLD";

/* ----------------------------
Config schema (from TOML)
---------------------------- */

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct QualityFile {
    quality: QualitySection,
    weights: ScoreWeights,
    detection: DetectionWeights,
    paywall: PaywallSection,
    patterns: PatternSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct QualitySection {
    score_threshold: f64,
    engagement_saturation: f64,
    recency_half_life_hours: f64,
    min_content_chars: usize,
}

impl Default for QualitySection {
    fn default() -> Self {
        Self {
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            engagement_saturation: 500.0,
            recency_half_life_hours: 24.0,
            min_content_chars: 280,
        }
    }
}

/// Weights of the continuous score inputs.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub engagement: f64,
    pub recency: f64,
    pub depth: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            engagement: 1.0,
            recency: 1.0,
            depth: 1.0,
        }
    }
}

/// Signed adjustment applied when a detector fires.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetectionWeights {
    pub paywall: f64,
    pub listicle: f64,
    pub comparison: f64,
}

impl Default for DetectionWeights {
    fn default() -> Self {
        Self {
            paywall: -0.5,
            listicle: -0.2,
            comparison: 0.1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct PaywallSection {
    domains: Vec<String>,
    keywords: Vec<String>,
}

impl Default for PaywallSection {
    fn default() -> Self {
        Self {
            domains: [
                "wsj.com",
                "ft.com",
                "nytimes.com",
                "bloomberg.com",
                "economist.com",
                "washingtonpost.com",
                "theatlantic.com",
                "medium.com",
            ]
            .map(String::from)
            .to_vec(),
            keywords: [
                "subscribe to continue",
                "subscribe to read",
                "subscribers only",
                "for subscribers",
                "premium content",
                "sign in to read",
                "paywall",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct PatternSection {
    listicle: Vec<String>,
    comparison: Vec<String>,
}

impl Default for PatternSection {
    fn default() -> Self {
        Self {
            listicle: [
                r"^\s*(top\s+)?\d+\s+(things|ways|reasons|tips|tricks|facts|signs|mistakes|lessons|tools)\b",
                r"^\s*the\s+\d+\s+(best|worst|most)\b",
                r"\b\d+\s+(things|reasons)\s+(you|to|why)\b",
            ]
            .map(String::from)
            .to_vec(),
            comparison: [
                r"\bvs\.?\s",
                r"\bversus\b",
                r"\bcompared\s+(to|with)\b",
                r"\bcomparison\s+of\b",
                r"\bbenchmark(s|ed|ing)?\b",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

/* ----------------------------
Compiled, immutable config
---------------------------- */

#[derive(Debug, Clone)]
pub struct QualityConfig {
    pub score_threshold: f64,
    pub engagement_saturation: f64,
    pub recency_half_life_hours: f64,
    pub min_content_chars: usize,
    pub weights: ScoreWeights,
    pub detection: DetectionWeights,
    /// Lowercased, without leading dots.
    pub paywall_domains: Vec<String>,
    /// Lowercased.
    pub paywall_keywords: Vec<String>,
    pub listicle_patterns: Vec<Regex>,
    pub comparison_patterns: Vec<Regex>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self::compile(QualityFile::default()).expect("built-in quality patterns")
    }
}

impl QualityConfig {
    /// Resolve path from $QUALITY_CONFIG_PATH or `config/quality.toml`, then apply
    /// the $QUALITY_SCORE_THRESHOLD override.
    ///
    /// A missing default file yields built-ins; an explicit env path that does
    /// not exist, an unreadable file or a bad pattern is an error.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_QUALITY_CONFIG_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    return Err(anyhow!(
                        "{ENV_QUALITY_CONFIG_PATH} points to non-existent path {}",
                        pb.display()
                    ));
                }
                Self::from_path(&pb)?
            }
            Err(_) => {
                let pb = PathBuf::from(DEFAULT_QUALITY_CONFIG_PATH);
                if pb.exists() {
                    Self::from_path(&pb)?
                } else {
                    tracing::info!(target: "config", "no quality config found; using built-in defaults");
                    Self::default()
                }
            }
        };

        if let Some(t) = parse_threshold_env(std::env::var(ENV_QUALITY_SCORE_THRESHOLD).ok()) {
            cfg.score_threshold = t;
        }
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading quality config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing quality config {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: QualityFile = toml::from_str(s)?;
        Self::compile(file)
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.score_threshold = sanitize_threshold(threshold);
        self
    }

    fn compile(file: QualityFile) -> Result<Self> {
        let q = file.quality;
        Ok(Self {
            score_threshold: sanitize_threshold(q.score_threshold),
            engagement_saturation: if q.engagement_saturation.is_finite()
                && q.engagement_saturation > 0.0
            {
                q.engagement_saturation
            } else {
                QualitySection::default().engagement_saturation
            },
            recency_half_life_hours: if q.recency_half_life_hours.is_finite()
                && q.recency_half_life_hours > 0.0
            {
                q.recency_half_life_hours
            } else {
                QualitySection::default().recency_half_life_hours
            },
            min_content_chars: q.min_content_chars.max(1),
            weights: file.weights,
            detection: file.detection,
            paywall_domains: clean_list(file.paywall.domains, |d| {
                d.trim_start_matches('.').to_string()
            }),
            paywall_keywords: clean_list(file.paywall.keywords, |k| k.to_string()),
            listicle_patterns: compile_patterns("listicle", &file.patterns.listicle)?,
            comparison_patterns: compile_patterns("comparison", &file.patterns.comparison)?,
        })
    }
}

fn sanitize_threshold(t: f64) -> f64 {
    if t.is_finite() {
        t.clamp(0.0, 1.0)
    } else {
        DEFAULT_SCORE_THRESHOLD
    }
}

// parse optional float env and clamp to <0.0..=1.0>
fn parse_threshold_env(raw: Option<String>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
}

fn clean_list(items: Vec<String>, f: impl Fn(&str) -> String) -> Vec<String> {
    let mut out: Vec<String> = items
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .map(|s| f(&s))
        .collect();
    out.sort();
    out.dedup();
    out
}

fn compile_patterns(kind: &str, patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .map_err(|e| anyhow!("{kind} pattern `{p}` regex error: {e}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn defaults_compile() {
        let cfg = QualityConfig::default();
        assert_eq!(cfg.score_threshold, DEFAULT_SCORE_THRESHOLD);
        assert!(!cfg.listicle_patterns.is_empty());
        assert!(cfg.paywall_domains.contains(&"wsj.com".to_string()));
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg = QualityConfig::from_toml_str(
            r#"
[quality]
score_threshold = 0.7

[paywall]
domains = [" .Example.COM ", "", "example.com"]
"#,
        )
        .unwrap();
        assert!((cfg.score_threshold - 0.7).abs() < 1e-9);
        assert_eq!(cfg.paywall_domains, vec!["example.com".to_string()]);
        assert_eq!(cfg.weights, ScoreWeights::default());
        assert!(!cfg.paywall_keywords.is_empty());
    }

    #[test]
    fn bad_pattern_is_an_error() {
        let err = QualityConfig::from_toml_str(
            r#"
[patterns]
listicle = ["(unclosed"]
"#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("listicle pattern"));
    }

    #[test]
    fn threshold_is_clamped() {
        let cfg = QualityConfig::from_toml_str("[quality]\nscore_threshold = 3.0\n").unwrap();
        assert_eq!(cfg.score_threshold, 1.0);
        assert_eq!(parse_threshold_env(Some(" 0.25 ".into())), Some(0.25));
        assert_eq!(parse_threshold_env(Some("-1".into())), Some(0.0));
        assert_eq!(parse_threshold_env(Some("abc".into())), None);
        assert_eq!(parse_threshold_env(None), None);
    }

    #[serial_test::serial]
    #[test]
    fn load_uses_env_path_and_threshold_override() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("quality.toml");
        fs::write(&p, "[quality]\nscore_threshold = 0.3\n").unwrap();

        env::set_var(ENV_QUALITY_CONFIG_PATH, p.display().to_string());
        env::remove_var(ENV_QUALITY_SCORE_THRESHOLD);
        let cfg = QualityConfig::load().unwrap();
        assert!((cfg.score_threshold - 0.3).abs() < 1e-9);

        env::set_var(ENV_QUALITY_SCORE_THRESHOLD, "0.9");
        let cfg = QualityConfig::load().unwrap();
        assert!((cfg.score_threshold - 0.9).abs() < 1e-9);

        env::set_var(ENV_QUALITY_CONFIG_PATH, tmp.path().join("nope.toml").display().to_string());
        assert!(QualityConfig::load().is_err());

        env::remove_var(ENV_QUALITY_CONFIG_PATH);
        env::remove_var(ENV_QUALITY_SCORE_THRESHOLD);
    }
}
