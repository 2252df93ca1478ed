use async_trait::async_trait;
use serde_json::Value;

use crate::error::SyncResult;
use crate::remote::{CollectionPath, SharedRemote};

/// Where mirrored events are written.
///
/// Writes are independent and never retried or compensated here.
#[async_trait]
pub trait MirrorTarget: Send + Sync {
    /// Create or fully replace the mirror `event_id` in a group.
    async fn put(&self, group_id: &str, event_id: &str, fields: Value) -> SyncResult<()>;

    async fn remove(&self, group_id: &str, event_id: &str) -> SyncResult<()>;
}

/// Writes mirrors straight into `groups/{gid}/calendar`.
pub struct DirectMirrorTarget {
    remote: SharedRemote,
}

impl DirectMirrorTarget {
    pub fn new(remote: SharedRemote) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl MirrorTarget for DirectMirrorTarget {
    async fn put(&self, group_id: &str, event_id: &str, fields: Value) -> SyncResult<()> {
        let path = CollectionPath::group_calendar(group_id).doc(event_id);
        self.remote.set(&path, fields).await
    }

    async fn remove(&self, group_id: &str, event_id: &str) -> SyncResult<()> {
        let path = CollectionPath::group_calendar(group_id).doc(event_id);
        self.remote.delete(&path).await
    }
}
