// src/analyze/detectors.rs
//! Quality detectors. Pure functions of `(item, config)`; each returns a
//! weighted `Signal` when it fires.

use serde::Serialize;
use url::Url;

use crate::config::QualityConfig;
use crate::model::ContentItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Detector {
    Paywall,
    Listicle,
    Comparison,
}

/// A fired detector: signed score adjustment plus what matched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub detector: Detector,
    pub weight: f64,
    pub evidence: String,
}

/// Run every detector in a fixed order.
pub fn run_detectors(item: &ContentItem, cfg: &QualityConfig) -> Vec<Signal> {
    [
        detect_paywall(item, cfg),
        detect_listicle(item, cfg),
        detect_comparison(item, cfg),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Paywalled domain in the URL, or a paywall phrase in title/body.
pub fn detect_paywall(item: &ContentItem, cfg: &QualityConfig) -> Option<Signal> {
    if let Some(host) = item.url().and_then(url_host) {
        if let Some(d) = cfg
            .paywall_domains
            .iter()
            .find(|d| host == **d || host.ends_with(&format!(".{d}")))
        {
            return Some(Signal {
                detector: Detector::Paywall,
                weight: cfg.detection.paywall,
                evidence: format!("domain:{d}"),
            });
        }
    }

    let haystack = format!("{}\n{}", item.title(), item.content()).to_lowercase();
    cfg.paywall_keywords
        .iter()
        .find(|k| haystack.contains(k.as_str()))
        .map(|k| Signal {
            detector: Detector::Paywall,
            weight: cfg.detection.paywall,
            evidence: format!("keyword:{k}"),
        })
}

/// "10 things you ..." style titles.
pub fn detect_listicle(item: &ContentItem, cfg: &QualityConfig) -> Option<Signal> {
    first_match(item.title(), &cfg.listicle_patterns).map(|m| Signal {
        detector: Detector::Listicle,
        weight: cfg.detection.listicle,
        evidence: m,
    })
}

/// "X vs Y" / benchmark style titles.
pub fn detect_comparison(item: &ContentItem, cfg: &QualityConfig) -> Option<Signal> {
    first_match(item.title(), &cfg.comparison_patterns).map(|m| Signal {
        detector: Detector::Comparison,
        weight: cfg.detection.comparison,
        evidence: m,
    })
}

fn first_match(text: &str, patterns: &[regex::Regex]) -> Option<String> {
    patterns
        .iter()
        .find_map(|re| re.find(text))
        .map(|m| m.as_str().trim().to_string())
}

/// Lowercased host of an absolute or scheme-less URL, without port or `www.`.
pub(crate) fn url_host(url: &str) -> Option<String> {
    let raw = url.trim();
    if raw.is_empty() {
        return None;
    }
    let parsed = match Url::parse(raw) {
        Ok(u) if u.has_host() => u,
        _ => Url::parse(&format!("http://{raw}")).ok()?,
    };
    let host = parsed.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    (!host.is_empty()).then(|| host.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, content: &str, url: Option<&str>) -> ContentItem {
        let it = ContentItem::new("id", title, content, "test");
        match url {
            Some(u) => it.with_url(u),
            None => it,
        }
    }

    #[test]
    fn host_extraction() {
        assert_eq!(
            url_host("https://www.WSJ.com:443/articles/x?y=1").as_deref(),
            Some("wsj.com")
        );
        assert_eq!(url_host("blog.example.org/post").as_deref(), Some("blog.example.org"));
        assert_eq!(url_host("https://user@host.io/a").as_deref(), Some("host.io"));
        assert_eq!(url_host(""), None);
        assert_eq!(
            url_host("http://[2001:db8::1]:8080/feed.xml").as_deref(),
            Some("[2001:db8::1]")
        );
        assert_eq!(url_host("https://a.io/r?next=http://b.io/").as_deref(), Some("a.io"));
        assert_eq!(url_host("https://host.io#frag@evil.io").as_deref(), Some("host.io"));
        assert_eq!(url_host("localhost:8080/rss").as_deref(), Some("localhost"));
    }

    #[test]
    fn paywall_by_domain_and_subdomain() {
        let cfg = QualityConfig::default();
        let s = detect_paywall(&item("t", "c", Some("https://markets.ft.com/data")), &cfg).unwrap();
        assert_eq!(s.detector, Detector::Paywall);
        assert_eq!(s.evidence, "domain:ft.com");
        assert!(s.weight < 0.0);

        // Suffix match must respect label boundaries.
        assert!(detect_paywall(&item("t", "c", Some("https://notft.com/")), &cfg).is_none());
    }

    #[test]
    fn paywall_by_keyword() {
        let cfg = QualityConfig::default();
        let s = detect_paywall(
            &item("Big story", "Intro... Subscribe to continue reading.", None),
            &cfg,
        )
        .unwrap();
        assert_eq!(s.evidence, "keyword:subscribe to continue");
    }

    #[test]
    fn listicle_and_comparison_titles() {
        let cfg = QualityConfig::default();
        assert!(detect_listicle(&item("10 Things You Missed in Rust", "", None), &cfg).is_some());
        assert!(detect_listicle(&item("Top 5 tools for tracing", "", None), &cfg).is_some());
        assert!(detect_listicle(&item("Rust 2024 edition is out", "", None), &cfg).is_none());

        assert!(detect_comparison(&item("Tokio vs. async-std in 2025", "", None), &cfg).is_some());
        assert!(detect_comparison(&item("Postgres versus MySQL", "", None), &cfg).is_some());
        assert!(detect_comparison(&item("Release notes", "", None), &cfg).is_none());
    }

    #[test]
    fn run_detectors_is_deterministic() {
        let cfg = QualityConfig::default();
        let it = item("7 reasons to pick Rust vs Go", "premium content", Some("https://wsj.com/x"));
        let a = run_detectors(&it, &cfg);
        let b = run_detectors(&it, &cfg);
        assert_eq!(a, b);
        let kinds: Vec<Detector> = a.iter().map(|s| s.detector).collect();
        assert_eq!(
            kinds,
            vec![Detector::Paywall, Detector::Listicle, Detector::Comparison]
        );
    }
}
