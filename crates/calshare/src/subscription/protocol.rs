use tokio::sync::oneshot;

use crate::error::SyncResult;
use crate::remote::Snapshot;
use crate::subscription::key::SubscriptionKey;

pub enum SyncCommand {
    /// Begin syncing for a signed-in user. Repeated calls are no-ops.
    StartAfterAuthentication {
        user_id: String,
        reply: oneshot::Sender<SyncResult<()>>,
    },
    Start {
        key: SubscriptionKey,
        reply: oneshot::Sender<SyncResult<bool>>,
    },
    Stop {
        key: SubscriptionKey,
        reply: oneshot::Sender<bool>,
    },
    /// Re-read the profile's group ids and re-resolve the batches.
    RefreshGroups {
        reply: oneshot::Sender<SyncResult<()>>,
    },
    ResolveGroups {
        group_ids: Vec<String>,
        reply: oneshot::Sender<SyncResult<()>>,
    },
    ActiveKeys {
        reply: oneshot::Sender<Vec<SubscriptionKey>>,
    },
    StopAll {
        reply: oneshot::Sender<()>,
    },
    Shutdown,
    Delivery(Delivery),
}

/// A snapshot or error from the pump of one subscription generation.
pub struct Delivery {
    pub key: SubscriptionKey,
    pub generation: u64,
    pub result: SyncResult<Snapshot>,
}
