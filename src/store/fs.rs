// src/store/fs.rs
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use super::{ObjectStore, StoreError};

/// Directory-rooted store: object `a/b.json` lives at `<root>/a/b.json`.
/// Writes go to a temp file first and are renamed into place.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let rel = Path::new(path);
        let clean = !path.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !clean {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

/// Sibling temp path, unique per write so concurrent puts never share one.
fn temp_path(full: &Path) -> PathBuf {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    let n = NEXT.fetch_add(1, Ordering::Relaxed);
    let name = full
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    full.with_file_name(format!(".{name}.{}.{n}.tmp", std::process::id()))
}

fn io_err(path: &str) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_string(),
        source,
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let full = self.resolve(path)?;
        let bytes = match tokio::fs::read(&full).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(path)(e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Decode {
                path: path.to_string(),
                source,
            })
    }

    async fn put(&self, path: &str, object: &Value) -> Result<(), StoreError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err(path))?;
        }
        let json = serde_json::to_vec(object).map_err(|source| StoreError::Decode {
            path: path.to_string(),
            source,
        })?;
        let tmp = temp_path(&full);
        let written = match tokio::fs::write(&tmp, json).await {
            Ok(()) => tokio::fs::rename(&tmp, &full).await,
            Err(e) => Err(e),
        };
        if written.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        written.map_err(io_err(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn roundtrip_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());

        assert_eq!(store.get("deduplicated-content/2025-01-01.json").await.unwrap(), None);

        let obj = json!({"hashes": ["ab"], "updated": "2025-01-01T00:00:00Z"});
        store.put("deduplicated-content/2025-01-01.json", &obj).await.unwrap();
        assert_eq!(
            store.get("deduplicated-content/2025-01-01.json").await.unwrap(),
            Some(obj)
        );
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("deduplicated-content"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec!["2025-01-01.json"]);

        std::fs::write(dir.path().join("broken.json"), b"{not json").unwrap();
        assert!(matches!(
            store.get("broken.json").await,
            Err(StoreError::Decode { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_puts_to_one_object_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(FsStore::new(dir.path()));

        let writes = (0..16).map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.put("d/day.json", &json!({ "n": i })).await })
        });
        for r in futures::future::join_all(writes).await {
            r.unwrap().unwrap();
        }

        let last = store.get("d/day.json").await.unwrap().unwrap();
        assert!(last["n"].as_u64().is_some_and(|n| n < 16));
        assert_eq!(std::fs::read_dir(dir.path().join("d")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        assert!(matches!(
            store.get("../etc/passwd").await,
            Err(StoreError::InvalidPath(_))
        ));
        assert!(matches!(
            store.put("/abs.json", &json!({})).await,
            Err(StoreError::InvalidPath(_))
        ));
    }
}
