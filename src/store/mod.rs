// src/store/mod.rs
//! Narrow key/path JSON object store used for dedup records.
//!
//! Any backend that can `get`/`put` a JSON object by path is substitutable;
//! the crate ships an in-memory store (tests, dry runs) and a local
//! directory-backed store.

pub mod fs;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

pub use fs::FsStore;
pub use memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid object path `{0}`")]
    InvalidPath(String),

    #[error("I/O error on `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed object at `{path}`: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// `Ok(None)` when nothing is stored at `path`.
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    async fn put(&self, path: &str, object: &Value) -> Result<(), StoreError>;
}
