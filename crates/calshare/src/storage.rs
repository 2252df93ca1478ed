//! Durable key/value storage for locally persisted state.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::SyncResult;

pub use file::FileStorage;
pub use memory::MemoryStorage;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn write(&self, keys: &[&str], data: &Value) -> SyncResult<()>;
    async fn read(&self, keys: &[&str]) -> SyncResult<Option<Value>>;
    /// Remove the entry; absent entries are not an error.
    async fn delete(&self, keys: &[&str]) -> SyncResult<()>;
}

pub type SharedStorage = Arc<dyn Storage>;
