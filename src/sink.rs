// src/sink.rs
//! Downstream emission: one accepted item at a time.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::model::ContentItem;

#[async_trait]
pub trait EmitSink: Send + Sync {
    /// Hand one accepted item to the next stage. Fire-and-forget from the
    /// gate's point of view: errors are logged and counted, never retried.
    async fn enqueue(&self, item: ContentItem) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Forwards items into a bounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ContentItem>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<ContentItem>) -> Self {
        Self { tx }
    }

    /// Build a sink plus the receiving end of a fresh channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ContentItem>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl EmitSink for ChannelSink {
    async fn enqueue(&self, item: ContentItem) -> Result<()> {
        self.tx
            .send(item)
            .await
            .map_err(|_| anyhow::anyhow!("downstream channel closed"))
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

// --- Test helper ---
/// Collects items in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    items: Mutex<Vec<ContentItem>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> Vec<ContentItem> {
        self.items.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[async_trait]
impl EmitSink for MemorySink {
    async fn enqueue(&self, item: ContentItem) -> Result<()> {
        self.items.lock().push(item);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Appends one JSON object per line to a file.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    file: tokio::sync::Mutex<tokio::fs::File>,
}

impl JsonlSink {
    /// Open (or create) `path` for appending; parent directories are created.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating sink directory {}", parent.display()))?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("opening sink file {}", path.display()))?;
        Ok(Self {
            path,
            file: tokio::sync::Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EmitSink for JsonlSink {
    async fn enqueue(&self, item: ContentItem) -> Result<()> {
        let mut line = serde_json::to_vec(&item).context("encoding item")?;
        line.push(b'\n');
        let mut f = self.file.lock().await;
        f.write_all(&line)
            .await
            .with_context(|| format!("appending to {}", self.path.display()))?;
        f.flush().await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "jsonl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_forwards_and_reports_closed() {
        let (sink, mut rx) = ChannelSink::channel(4);
        sink.enqueue(ContentItem::new("1", "t", "c", "s")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().id(), "1");
        drop(rx);
        assert!(sink.enqueue(ContentItem::new("2", "t", "c", "s")).await.is_err());
    }

    #[tokio::test]
    async fn jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/accepted.jsonl");
        let sink = JsonlSink::open(&path).await.unwrap();
        sink.enqueue(ContentItem::new("a", "t", "c", "s")).await.unwrap();
        sink.enqueue(ContentItem::new("b", "t", "c", "s")).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let ids: Vec<String> = text
            .lines()
            .map(|l| {
                serde_json::from_str::<ContentItem>(l)
                    .unwrap()
                    .id()
                    .to_string()
            })
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
