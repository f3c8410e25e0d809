// src/store/memory.rs
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{ObjectStore, StoreError};

/// In-process store with switchable failure injection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Value>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `get` fail with `StoreError::Unavailable`.
    pub fn set_fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    /// Make every `put` fail with `StoreError::Unavailable`.
    pub fn set_fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    /// Seed an object directly, bypassing failure injection.
    pub fn insert(&self, path: impl Into<String>, object: Value) {
        self.objects.lock().insert(path.into(), object);
    }

    pub fn object(&self, path: &str) -> Option<Value> {
        self.objects.lock().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        let mut v: Vec<String> = self.objects.lock().keys().cloned().collect();
        v.sort();
        v
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("read of `{path}` refused")));
        }
        Ok(self.objects.lock().get(path).cloned())
    }

    async fn put(&self, path: &str, object: &Value) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("write of `{path}` refused")));
        }
        self.objects.lock().insert(path.to_string(), object.clone());
        Ok(())
    }
}
