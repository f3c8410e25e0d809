// src/ingest/providers/rss.rs
//! RSS 2.0 collector. One fetch = one page; RSS has no cursor.

use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::dedup::hash_content;
use crate::ingest::normalize_text;
use crate::ingest::types::{Collector, CollectorError, FetchedPage};
use crate::model::ContentItem;
use crate::rate_limit::parse_retry_after;

const USER_AGENT: &str = concat!("feed-curator/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<Guid>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

/// `<guid isPermaLink="...">` carries attributes, so take its text explicitly.
#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "$text", default)]
    value: String,
}

fn parse_rfc2822_to_unix(ts: &str) -> Option<i64> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.unix_timestamp())
        .filter(|secs| *secs > 0)
}

pub struct RssCollector {
    name: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssCollector {
    /// Serve a fixed XML document on every fetch.
    pub fn from_fixture_str(name: impl Into<String>, xml: &str) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_url(name: impl Into<String>, url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .context("building http client")?;
        Ok(Self {
            name: name.into(),
            mode: Mode::Http {
                url: url.into(),
                client,
            },
        })
    }

    /// Parse an RSS document into items attributed to `source`. Entries
    /// whose title and description both normalize to empty are skipped.
    pub fn parse_items(source: &str, xml: &str) -> anyhow::Result<Vec<ContentItem>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(xml);
        let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let title = normalize_text(it.title.as_deref().unwrap_or_default());
            let content = normalize_text(it.description.as_deref().unwrap_or_default());
            if title.is_empty() && content.is_empty() {
                continue;
            }

            let link = it.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty());
            let id = it
                .guid
                .map(|g| g.value.trim().to_string())
                .filter(|g| !g.is_empty())
                .or_else(|| link.clone())
                .unwrap_or_else(|| hash_content(&title, &content));

            let mut item = ContentItem::new(id, title, content, source);
            if let Some(l) = link {
                item = item.with_url(l);
            }
            if let Some(ts) = it.pub_date.as_deref().and_then(parse_rfc2822_to_unix) {
                item = item.with_metadata("published_at", json!(ts));
            }
            out.push(item);
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        counter!("ingest_events_total").increment(out.len() as u64);
        Ok(out)
    }

    async fn fetch_body(&self, url: &str, client: &reqwest::Client) -> Result<String, CollectorError> {
        let resp = client.get(url).send().await.map_err(|e| {
            counter!("ingest_provider_errors_total").increment(1);
            tracing::warn!(target: "ingest", error = ?e, source = %self.name, "provider http error");
            anyhow!(e).context(format!("GET {url}"))
        })?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(CollectorError::RateLimited { retry_after });
        }
        if !status.is_success() {
            counter!("ingest_provider_errors_total").increment(1);
            return Err(anyhow!("GET {url} returned {status}").into());
        }
        Ok(resp.text().await.context("reading rss body")?)
    }
}

#[async_trait]
impl Collector for RssCollector {
    async fn fetch_page(&self, _cursor: Option<&str>) -> Result<FetchedPage, CollectorError> {
        let items = match &self.mode {
            Mode::Fixture(xml) => Self::parse_items(&self.name, xml)?,
            Mode::Http { url, client } => {
                let body = self.fetch_body(url, client).await?;
                Self::parse_items(&self.name, &body)?
            }
        };
        Ok(FetchedPage {
            items,
            next_cursor: None,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
