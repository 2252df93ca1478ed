//! The in-memory cache and its single persisted snapshot.
//!
//! Every setter compares the new value with the cached one and is a no-op
//! when they are equal, so repeated identical remote snapshots cost no
//! durable writes. A changed value replaces the whole state (readers holding
//! the previous `Arc<CacheState>` are unaffected), notifies the bus, and
//! persists.

use std::sync::Arc;

use tokio::sync::watch;

use crate::bus::Bus;
use crate::cache::state::{CacheSnapshot, CacheState};
use crate::error::{SyncError, SyncResult};
use crate::event::CacheEvent;
use crate::model::{Event, Group, Proposal, User};
use crate::storage::SharedStorage;

/// A single cache write.
#[derive(Debug, Clone)]
pub enum CacheMutation {
    SetUser(Option<User>),
    SetEvents(Vec<Event>),
    /// Replace the event with the same id, or append it.
    UpsertEvent(Event),
    RemoveEvent(String),
    SetGroups(Vec<Group>),
    /// Forget a group the user left: list entry, caches and profile reference.
    RemoveGroup(String),
    SetGroupEvents {
        group_id: String,
        events: Vec<Event>,
    },
    SetGroupProposals {
        group_id: String,
        proposals: Vec<Proposal>,
    },
    Clear,
}

pub struct LocalCache {
    state: CacheState,
    storage: SharedStorage,
    key: String,
    published: watch::Sender<Arc<CacheState>>,
    bus: Bus,
}

impl LocalCache {
    /// Hydrate from the last persisted snapshot; absent means empty.
    ///
    /// An unreadable snapshot is discarded rather than failing startup.
    pub async fn load(storage: SharedStorage, key: &str, bus: Bus) -> SyncResult<Self> {
        let decoded = match storage.read(&[key]).await {
            Ok(None) => Ok(None),
            Ok(Some(value)) => serde_json::from_value::<CacheSnapshot>(value)
                .map(Some)
                .map_err(SyncError::from),
            // a corrupt file is as unreadable as a snapshot of the wrong shape
            Err(error @ SyncError::Decode(_)) => Err(error),
            Err(error) => return Err(error),
        };
        let state = match decoded {
            Ok(snapshot) => snapshot.map(CacheSnapshot::into_state).unwrap_or_default(),
            Err(error) => {
                tracing::warn!("discarding unreadable cache snapshot {}: {}", key, error);
                storage.delete(&[key]).await?;
                CacheState::default()
            }
        };
        let (published, _) = watch::channel(Arc::new(state.clone()));
        Ok(Self {
            state,
            storage,
            key: key.to_string(),
            published,
            bus,
        })
    }

    pub fn state(&self) -> &CacheState {
        &self.state
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<CacheState>> {
        self.published.subscribe()
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub async fn set_user(&mut self, user: Option<User>) -> SyncResult<bool> {
        if self.state.user == user {
            return Ok(false);
        }
        self.state.user = user;
        self.commit(vec![CacheEvent::UserChanged]).await
    }

    pub async fn set_events(&mut self, events: Vec<Event>) -> SyncResult<bool> {
        if self.state.events == events {
            return Ok(false);
        }
        self.state.events = events;
        self.commit(vec![CacheEvent::EventsChanged]).await
    }

    pub async fn set_groups(&mut self, groups: Vec<Group>) -> SyncResult<bool> {
        if self.state.groups == groups {
            return Ok(false);
        }
        self.state.groups = groups;
        self.commit(vec![CacheEvent::GroupsChanged]).await
    }

    pub async fn set_group_events(&mut self, group_id: &str, events: Vec<Event>) -> SyncResult<bool> {
        if self.state.group_events_cache.get(group_id) == Some(&events) {
            return Ok(false);
        }
        self.state
            .group_events_cache
            .insert(group_id.to_string(), events);
        self.commit(vec![CacheEvent::group_events(group_id)]).await
    }

    pub async fn set_group_proposals(
        &mut self,
        group_id: &str,
        proposals: Vec<Proposal>,
    ) -> SyncResult<bool> {
        if self.state.group_proposals_cache.get(group_id) == Some(&proposals) {
            return Ok(false);
        }
        self.state
            .group_proposals_cache
            .insert(group_id.to_string(), proposals);
        self.commit(vec![CacheEvent::group_proposals(group_id)]).await
    }

    pub async fn upsert_event(&mut self, event: Event) -> SyncResult<bool> {
        let mut events = self.state.events.clone();
        match events
            .iter_mut()
            .find(|existing| existing.id.is_some() && existing.id == event.id)
        {
            Some(existing) => *existing = event,
            None => events.push(event),
        }
        self.set_events(events).await
    }

    pub async fn remove_event(&mut self, event_id: &str) -> SyncResult<bool> {
        let mut events = self.state.events.clone();
        events.retain(|event| event.id.as_deref() != Some(event_id));
        self.set_events(events).await
    }

    pub async fn remove_group(&mut self, group_id: &str) -> SyncResult<bool> {
        let mut changes = Vec::new();
        let before = self.state.groups.len();
        self.state
            .groups
            .retain(|group| group.id.as_deref() != Some(group_id));
        if self.state.groups.len() != before {
            changes.push(CacheEvent::GroupsChanged);
        }
        if let Some(user) = self.state.user.as_mut() {
            let before = user.groups.len();
            user.groups.retain(|id| id != group_id);
            if user.groups.len() != before {
                changes.push(CacheEvent::UserChanged);
            }
        }
        if self.state.group_events_cache.remove(group_id).is_some() {
            changes.push(CacheEvent::group_events(group_id));
        }
        if self.state.group_proposals_cache.remove(group_id).is_some() {
            changes.push(CacheEvent::group_proposals(group_id));
        }
        if changes.is_empty() {
            return Ok(false);
        }
        self.commit(changes).await
    }

    /// Reset to empty; persisting an empty state deletes the durable entry.
    pub async fn clear(&mut self) -> SyncResult<bool> {
        let was_empty = self.state.is_empty();
        self.state = CacheState::default();
        self.publish(vec![CacheEvent::Cleared]);
        self.persist().await?;
        Ok(!was_empty)
    }

    pub async fn apply(&mut self, mutation: CacheMutation) -> SyncResult<bool> {
        match mutation {
            CacheMutation::SetUser(user) => self.set_user(user).await,
            CacheMutation::SetEvents(events) => self.set_events(events).await,
            CacheMutation::UpsertEvent(event) => self.upsert_event(event).await,
            CacheMutation::RemoveEvent(event_id) => self.remove_event(&event_id).await,
            CacheMutation::SetGroups(groups) => self.set_groups(groups).await,
            CacheMutation::RemoveGroup(group_id) => self.remove_group(&group_id).await,
            CacheMutation::SetGroupEvents { group_id, events } => {
                self.set_group_events(&group_id, events).await
            }
            CacheMutation::SetGroupProposals {
                group_id,
                proposals,
            } => self.set_group_proposals(&group_id, proposals).await,
            CacheMutation::Clear => self.clear().await,
        }
    }

    /// Write the full state under the fixed key, or delete the key when empty.
    pub async fn persist(&self) -> SyncResult<()> {
        match CacheSnapshot::capture(&self.state) {
            Some(snapshot) => {
                let value = serde_json::to_value(&snapshot)?;
                self.storage.write(&[self.key.as_str()], &value).await
            }
            None => self.storage.delete(&[self.key.as_str()]).await,
        }
    }

    /// The in-memory change stands even if persisting fails.
    async fn commit(&mut self, changes: Vec<CacheEvent>) -> SyncResult<bool> {
        self.publish(changes);
        self.persist().await?;
        Ok(true)
    }

    fn publish(&self, changes: Vec<CacheEvent>) {
        self.published.send_replace(Arc::new(self.state.clone()));
        for change in changes {
            self.bus.publish(change);
        }
    }
}
