//! In-process remote store with real-time push.
//!
//! Every listener receives the current result when it subscribes and a fresh
//! snapshot after each write touching a document its query matches.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::model::Document;
use crate::remote::path::{CollectionPath, DocumentPath};
use crate::remote::query::Query;
use crate::remote::update::{apply_all, FieldUpdate};
use crate::remote::{RemoteStore, Snapshot, SnapshotStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Add,
    Set,
    Update,
    Delete,
}

/// One attempted write, kept for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub op: WriteOp,
    pub path: DocumentPath,
    pub succeeded: bool,
}

#[derive(Default)]
pub struct MemoryRemote {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    collections: BTreeMap<CollectionPath, BTreeMap<String, Value>>,
    listeners: Vec<Listener>,
    failing_prefixes: Vec<String>,
    writes: Vec<WriteRecord>,
}

struct Listener {
    query: Query,
    sender: mpsc::UnboundedSender<SyncResult<Snapshot>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write to a path starting with `prefix` fail.
    pub fn fail_writes(&self, prefix: impl Into<String>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing_prefixes.push(prefix.into());
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing_prefixes.clear();
        }
    }

    /// Deliver an error to every live listener on `collection`.
    pub fn break_listeners(&self, collection: &CollectionPath, message: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.listeners.retain(|listener| {
                if listener.query.target() != collection {
                    return true;
                }
                listener
                    .sender
                    .send(Err(SyncError::Remote(message.to_string())))
                    .is_ok()
            });
        }
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.inner
            .lock()
            .map(|inner| inner.writes.clone())
            .unwrap_or_default()
    }

    pub fn listener_count(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .listeners
                    .iter()
                    .filter(|listener| !listener.sender.is_closed())
                    .count()
            })
            .unwrap_or_default()
    }

    fn lock(&self) -> SyncResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| SyncError::Internal("memory remote lock poisoned".to_string()))
    }
}

impl Inner {
    fn document(&self, path: &DocumentPath) -> Option<&Value> {
        self.collections
            .get(path.collection())
            .and_then(|documents| documents.get(path.id()))
    }

    fn snapshot(&self, query: &Query) -> Snapshot {
        let documents = self
            .collections
            .get(query.target())
            .map(|documents| {
                documents
                    .iter()
                    .filter(|(id, _)| query.ids().map_or(true, |ids| ids.contains(*id)))
                    .map(|(id, data)| Document::new(id.clone(), data.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Snapshot { documents }
    }

    /// Log the attempt and fail it if its path is marked failing.
    fn begin_write(&mut self, op: WriteOp, path: &DocumentPath) -> SyncResult<()> {
        let rendered = path.to_string();
        let failing = self
            .failing_prefixes
            .iter()
            .any(|prefix| rendered.starts_with(prefix.as_str()));
        self.writes.push(WriteRecord {
            op,
            path: path.clone(),
            succeeded: !failing,
        });
        if failing {
            return Err(SyncError::Remote(format!("write to {rendered} rejected")));
        }
        Ok(())
    }

    fn store(&mut self, path: &DocumentPath, data: Option<Value>) {
        match data {
            Some(data) => {
                self.collections
                    .entry(path.collection().clone())
                    .or_default()
                    .insert(path.id().to_string(), data);
            }
            None => {
                if let Some(documents) = self.collections.get_mut(path.collection()) {
                    documents.remove(path.id());
                    if documents.is_empty() {
                        self.collections.remove(path.collection());
                    }
                }
            }
        }
        self.notify(path);
    }

    fn notify(&mut self, path: &DocumentPath) {
        let mut listeners = std::mem::take(&mut self.listeners);
        listeners.retain(|listener| {
            if listener.sender.is_closed() {
                return false;
            }
            if !listener.query.matches(path) {
                return true;
            }
            listener.sender.send(Ok(self.snapshot(&listener.query))).is_ok()
        });
        self.listeners = listeners;
    }
}

fn require_object(path: &DocumentPath, data: &Value) -> SyncResult<()> {
    if data.is_object() {
        Ok(())
    } else {
        Err(SyncError::InvalidInput(format!(
            "document {path} must be an object"
        )))
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn get(&self, path: &DocumentPath) -> SyncResult<Option<Document>> {
        let inner = self.lock()?;
        Ok(inner
            .document(path)
            .map(|data| Document::new(path.id(), data.clone())))
    }

    async fn list(&self, collection: &CollectionPath) -> SyncResult<Vec<Document>> {
        let inner = self.lock()?;
        Ok(inner
            .snapshot(&Query::collection(collection.clone()))
            .documents)
    }

    async fn add(&self, collection: &CollectionPath, data: Value) -> SyncResult<String> {
        let id = self.allocate_id(collection);
        let path = collection.doc(&id);
        require_object(&path, &data)?;
        let mut inner = self.lock()?;
        inner.begin_write(WriteOp::Add, &path)?;
        inner.store(&path, Some(data));
        Ok(id)
    }

    async fn set(&self, path: &DocumentPath, data: Value) -> SyncResult<()> {
        require_object(path, &data)?;
        let mut inner = self.lock()?;
        inner.begin_write(WriteOp::Set, path)?;
        inner.store(path, Some(data));
        Ok(())
    }

    async fn update(&self, path: &DocumentPath, updates: Vec<FieldUpdate>) -> SyncResult<()> {
        let mut inner = self.lock()?;
        inner.begin_write(WriteOp::Update, path)?;
        let current = inner
            .document(path)
            .ok_or_else(|| SyncError::NotFound(path.to_string()))?;
        let next = apply_all(current, &updates)?;
        inner.store(path, Some(next));
        Ok(())
    }

    async fn delete(&self, path: &DocumentPath) -> SyncResult<()> {
        let mut inner = self.lock()?;
        inner.begin_write(WriteOp::Delete, path)?;
        if inner.document(path).is_some() {
            inner.store(path, None);
        }
        Ok(())
    }

    fn allocate_id(&self, _collection: &CollectionPath) -> String {
        Uuid::now_v7().simple().to_string()
    }

    async fn subscribe(&self, query: Query) -> SyncResult<SnapshotStream> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.lock()?;
        sender
            .send(Ok(inner.snapshot(&query)))
            .map_err(|_| SyncError::Internal("listener closed".to_string()))?;
        inner.listeners.push(Listener { query, sender });
        Ok(Box::pin(UnboundedReceiverStream::new(receiver)))
    }
}
