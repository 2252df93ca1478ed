//! The remote document store the sync core talks to.
//!
//! Only the capabilities the core relies on are modelled: document CRUD,
//! atomic field updates, and real-time collection queries with push.

pub mod memory;
pub mod path;
pub mod query;
pub mod update;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::Stream;
use serde_json::Value;

use crate::error::SyncResult;
use crate::model::Document;

pub use memory::{MemoryRemote, WriteOp, WriteRecord};
pub use path::{CollectionPath, DocumentPath};
pub use query::{Query, MAX_QUERY_IDS};
pub use update::FieldUpdate;

/// Current contents of a query result, ordered by document id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub documents: Vec<Document>,
}

/// Ordered snapshots for one query. Dropping the stream ends the listener.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = SyncResult<Snapshot>> + Send>>;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get(&self, path: &DocumentPath) -> SyncResult<Option<Document>>;

    async fn list(&self, collection: &CollectionPath) -> SyncResult<Vec<Document>>;

    /// Create a document under a store-assigned id.
    async fn add(&self, collection: &CollectionPath, data: Value) -> SyncResult<String>;

    /// Create or fully replace.
    async fn set(&self, path: &DocumentPath, data: Value) -> SyncResult<()>;

    /// Apply all updates atomically; the document must exist.
    async fn update(&self, path: &DocumentPath, updates: Vec<FieldUpdate>) -> SyncResult<()>;

    async fn delete(&self, path: &DocumentPath) -> SyncResult<()>;

    /// A fresh id for a document the caller is about to write.
    fn allocate_id(&self, collection: &CollectionPath) -> String;

    /// Starts with the current result, then one snapshot per change.
    async fn subscribe(&self, query: Query) -> SyncResult<SnapshotStream>;
}

pub type SharedRemote = Arc<dyn RemoteStore>;
