// src/ingest/config.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_SOURCES_PATH: &str = "INGEST_SOURCES_PATH";
pub const DEFAULT_SOURCES_PATH: &str = "config/sources.toml";

/// One configured feed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    pub url: String,
    /// Rate-limit profile name (`generic` or `conservative`).
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

fn default_profile() -> String {
    "generic".to_string()
}

fn default_max_pages() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct SourcesFile {
    #[serde(default)]
    sources: Vec<SourceSpec>,
}

/// Load sources from an explicit TOML file.
pub fn load_sources_from(path: &Path) -> Result<Vec<SourceSpec>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    parse_sources(&content).with_context(|| format!("parsing {}", path.display()))
}

/// Load sources using env var + fallback:
/// 1) $INGEST_SOURCES_PATH (must exist)
/// 2) config/sources.toml
/// 3) no sources
pub fn load_sources_default() -> Result<Vec<SourceSpec>> {
    if let Ok(p) = std::env::var(ENV_SOURCES_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_sources_from(&pb);
        }
        return Err(anyhow!("{ENV_SOURCES_PATH} points to non-existent path"));
    }
    let fallback = PathBuf::from(DEFAULT_SOURCES_PATH);
    if fallback.exists() {
        return load_sources_from(&fallback);
    }
    Ok(Vec::new())
}

fn parse_sources(s: &str) -> Result<Vec<SourceSpec>> {
    let file: SourcesFile = toml::from_str(s)?;
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(file.sources.len());
    for mut spec in file.sources {
        spec.name = spec.name.trim().to_string();
        spec.url = spec.url.trim().to_string();
        spec.profile = spec.profile.trim().to_ascii_lowercase();
        if spec.name.is_empty() || spec.url.is_empty() {
            bail!("source entries need a non-empty name and url");
        }
        if !seen.insert(spec.name.clone()) {
            bail!("duplicate source name `{}`", spec.name);
        }
        spec.max_pages = spec.max_pages.max(1);
        out.push(spec);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn defaults_and_trimming() {
        let toml = r#"
            [[sources]]
            name = " rust-blog "
            url = "https://blog.rust-lang.org/feed.xml"

            [[sources]]
            name = "hn"
            url = "https://hnrss.org/frontpage"
            profile = "Conservative"
            max_pages = 0
        "#;
        let v = parse_sources(toml).unwrap();
        assert_eq!(v.len(), 2);
        assert_eq!(v[0].name, "rust-blog");
        assert_eq!(v[0].profile, "generic");
        assert_eq!(v[0].max_pages, 1);
        assert_eq!(v[1].profile, "conservative");
        assert_eq!(v[1].max_pages, 1);
    }

    #[test]
    fn rejects_duplicates_and_blanks() {
        let dup = r#"
            [[sources]]
            name = "a"
            url = "u1"
            [[sources]]
            name = "a"
            url = "u2"
        "#;
        assert!(parse_sources(dup).is_err());
        assert!(parse_sources("[[sources]]\nname = \"\"\nurl = \"u\"").is_err());
        assert!(parse_sources("").unwrap().is_empty());
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallback() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_SOURCES_PATH);

        assert!(load_sources_default().unwrap().is_empty());

        let p = tmp.path().join("mine.toml");
        fs::write(&p, "[[sources]]\nname = \"x\"\nurl = \"http://x\"\n").unwrap();
        env::set_var(ENV_SOURCES_PATH, p.display().to_string());
        assert_eq!(load_sources_default().unwrap()[0].name, "x");

        env::set_var(ENV_SOURCES_PATH, tmp.path().join("nope.toml").display().to_string());
        assert!(load_sources_default().is_err());
        env::remove_var(ENV_SOURCES_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
