// src/ingest/types.rs
use std::time::Duration;

use async_trait::async_trait;

use crate::model::ContentItem;

/// One page of results from a source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedPage {
    pub items: Vec<ContentItem>,
    /// Cursor for the next page; `None` means the source is exhausted.
    pub next_cursor: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// The source answered 429; `retry_after` is its explicit hint, if any.
    #[error("rate limited by source (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait Collector: Send + Sync {
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<FetchedPage, CollectorError>;
    fn name(&self) -> &str;
}
