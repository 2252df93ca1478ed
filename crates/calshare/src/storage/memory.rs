//! In-memory storage, used by tests and ephemeral sessions.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{SyncError, SyncResult};
use crate::storage::Storage;

#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<MemoryStorageInner>,
}

#[derive(Debug, Default)]
struct MemoryStorageInner {
    data: HashMap<String, Value>,
    writes: usize,
    deletes: usize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `write` calls so far.
    pub fn write_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.writes).unwrap_or_default()
    }

    pub fn delete_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.deletes).unwrap_or_default()
    }

    pub fn contains(&self, keys: &[&str]) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.data.contains_key(&join_keys(keys)))
            .unwrap_or(false)
    }

    fn lock(&self) -> SyncResult<std::sync::MutexGuard<'_, MemoryStorageInner>> {
        self.inner
            .lock()
            .map_err(|_| SyncError::Internal("memory storage lock poisoned".to_string()))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn write(&self, keys: &[&str], data: &Value) -> SyncResult<()> {
        if keys.is_empty() {
            return Err(SyncError::InvalidInput("storage keys empty".to_string()));
        }
        let mut inner = self.lock()?;
        inner.writes += 1;
        inner.data.insert(join_keys(keys), data.clone());
        Ok(())
    }

    async fn read(&self, keys: &[&str]) -> SyncResult<Option<Value>> {
        Ok(self.lock()?.data.get(&join_keys(keys)).cloned())
    }

    async fn delete(&self, keys: &[&str]) -> SyncResult<()> {
        let mut inner = self.lock()?;
        inner.deletes += 1;
        inner.data.remove(&join_keys(keys));
        Ok(())
    }
}

fn join_keys(keys: &[&str]) -> String {
    keys.join("/")
}
