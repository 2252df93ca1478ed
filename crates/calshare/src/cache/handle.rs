use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use crate::bus::Bus;
use crate::cache::actor::{CacheActor, CacheCommand};
use crate::cache::state::CacheState;
use crate::cache::store::{CacheMutation, LocalCache};
use crate::error::{SyncError, SyncResult};
use crate::model::{Event, Group, Proposal, User};

#[derive(Clone)]
pub struct CacheHandle {
    command_tx: mpsc::UnboundedSender<CacheCommand>,
    state_rx: watch::Receiver<Arc<CacheState>>,
    bus: Bus,
}

impl CacheHandle {
    /// Latest published state.
    pub fn state(&self) -> Arc<CacheState> {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<CacheState>> {
        self.state_rx.clone()
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    /// Apply and wait; `Ok(true)` when the cache changed.
    pub async fn apply(&self, mutation: CacheMutation) -> SyncResult<bool> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(CacheCommand::Apply {
                mutation,
                reply: Some(reply_tx),
            })
            .map_err(|_| SyncError::Internal("cache actor stopped".to_string()))?;
        reply_rx
            .await
            .map_err(|_| SyncError::Internal("cache actor dropped response".to_string()))?
    }

    /// Apply without waiting; failures are logged by the actor.
    pub fn submit(&self, mutation: CacheMutation) -> SyncResult<()> {
        self.command_tx
            .send(CacheCommand::Apply {
                mutation,
                reply: None,
            })
            .map_err(|_| SyncError::Internal("cache actor stopped".to_string()))
    }

    pub async fn set_user(&self, user: Option<User>) -> SyncResult<bool> {
        self.apply(CacheMutation::SetUser(user)).await
    }

    pub async fn set_events(&self, events: Vec<Event>) -> SyncResult<bool> {
        self.apply(CacheMutation::SetEvents(events)).await
    }

    pub async fn upsert_event(&self, event: Event) -> SyncResult<bool> {
        self.apply(CacheMutation::UpsertEvent(event)).await
    }

    pub async fn remove_event(&self, event_id: &str) -> SyncResult<bool> {
        self.apply(CacheMutation::RemoveEvent(event_id.to_string()))
            .await
    }

    pub async fn set_groups(&self, groups: Vec<Group>) -> SyncResult<bool> {
        self.apply(CacheMutation::SetGroups(groups)).await
    }

    pub async fn remove_group(&self, group_id: &str) -> SyncResult<bool> {
        self.apply(CacheMutation::RemoveGroup(group_id.to_string()))
            .await
    }

    pub async fn set_group_events(&self, group_id: &str, events: Vec<Event>) -> SyncResult<bool> {
        self.apply(CacheMutation::SetGroupEvents {
            group_id: group_id.to_string(),
            events,
        })
        .await
    }

    pub async fn set_group_proposals(
        &self,
        group_id: &str,
        proposals: Vec<Proposal>,
    ) -> SyncResult<bool> {
        self.apply(CacheMutation::SetGroupProposals {
            group_id: group_id.to_string(),
            proposals,
        })
        .await
    }

    pub async fn clear(&self) -> SyncResult<bool> {
        self.apply(CacheMutation::Clear).await
    }
}

pub fn spawn_cache(cache: LocalCache) -> CacheHandle {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let state_rx = cache.subscribe();
    let bus = cache.bus().clone();
    let actor = CacheActor::new(cache, command_rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    CacheHandle {
        command_tx,
        state_rx,
        bus,
    }
}
