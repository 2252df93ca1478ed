//! Everything that lives for one signed-in user on this device.
//!
//! A [`Session`] is opened after sign-in and consumed by [`Session::sign_out`].
//! It owns the cache actor, the subscription actor and the write-side
//! coordinators, and exposes the user-facing operations.


use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value;

use crate::bus::Bus;
use crate::cache::{spawn_cache, CacheHandle, CacheState, LocalCache};
use crate::config::SyncConfig;
use crate::consensus::ProposalConsensus;
use crate::error::{SyncError, SyncResult};
use crate::mirror::{FanOutReport, MirrorCoordinator};
use crate::model::{Event, Group, Proposal, Record, User};
use crate::recurrence::RecurrenceEvaluator;
use crate::remote::{CollectionPath, DocumentPath, FieldUpdate, SharedRemote};
use crate::storage::SharedStorage;
use crate::subscription::{spawn_subscriptions, SubscriptionManager};

/// The authentication black box.
pub trait AuthProvider: Send + Sync {
    fn current_user_id(&self) -> Option<String>;
}

/// An [`AuthProvider`] with a fixed answer.
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
    user_id: Option<String>,
}

impl StaticAuth {
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }
}

impl AuthProvider for StaticAuth {
    fn current_user_id(&self) -> Option<String> {
        self.user_id.clone()
    }
}

pub struct Session {
    user_id: String,
    remote: SharedRemote,
    cache: CacheHandle,
    subscriptions: SubscriptionManager,
    mirror: MirrorCoordinator,
    consensus: ProposalConsensus,
    evaluator: RecurrenceEvaluator,
}

impl Session {
    /// Restore the cache and spawn the actors. Syncing starts with
    /// [`Session::start_sync`].
    pub async fn open(
        auth: &dyn AuthProvider,
        remote: SharedRemote,
        storage: SharedStorage,
        config: SyncConfig,
    ) -> SyncResult<Self> {
        Self::open_with_evaluator(auth, remote, storage, config, RecurrenceEvaluator::current())
            .await
    }

    pub async fn open_with_evaluator(
        auth: &dyn AuthProvider,
        remote: SharedRemote,
        storage: SharedStorage,
        config: SyncConfig,
        evaluator: RecurrenceEvaluator,
    ) -> SyncResult<Self> {
        let user_id = auth.current_user_id().ok_or(SyncError::NotSignedIn)?;
        let config = config.normalized();
        let bus = Bus::new(config.bus_capacity);
        let mut cache = LocalCache::load(storage, &config.cache_key, bus).await?;
        if let Some(cached) = cache.state().user_id() {
            if cached != user_id {
                tracing::info!("discarding cached state of previous user {}", cached);
                cache.clear().await?;
            }
        }
        let cache = spawn_cache(cache);
        let subscriptions = spawn_subscriptions(remote.clone(), cache.clone(), config);
        tracing::info!("session opened for {}", user_id);

        Ok(Self {
            user_id,
            mirror: MirrorCoordinator::new(remote.clone()),
            consensus: ProposalConsensus::new(remote.clone(), evaluator),
            remote,
            cache,
            subscriptions,
            evaluator,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn cache(&self) -> &CacheHandle {
        &self.cache
    }

    pub fn state(&self) -> Arc<CacheState> {
        self.cache.state()
    }

    pub fn bus(&self) -> &Bus {
        self.cache.bus()
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    pub fn evaluator(&self) -> &RecurrenceEvaluator {
        &self.evaluator
    }

    /// Write the profile of a newly registered user.
    pub async fn register_profile(&self, email: &str, name: &str) -> SyncResult<User> {
        let user = User::new(self.user_id.clone(), email, name);
        self.remote
            .set(&DocumentPath::user(&self.user_id), user.to_fields()?)
            .await?;
        self.cache.set_user(Some(user.clone())).await?;
        Ok(user)
    }

    pub async fn start_sync(&self) -> SyncResult<()> {
        self.subscriptions
            .start_after_authentication(&self.user_id)
            .await
    }

    /// Store a personal event, then mirror it into every cached group.
    ///
    /// Only the personal write can fail the call; mirror failures are in the
    /// report.
    pub async fn create_event(&self, mut event: Event) -> SyncResult<(Event, FanOutReport)> {
        event.validate()?;
        if event.name.is_none() {
            event.name = Some(self.display_name());
        }
        let calendar = CollectionPath::user_calendar(&self.user_id);
        let id = self.remote.allocate_id(&calendar);
        event.set_id(id.clone());
        self.remote
            .set(&calendar.doc(&id), event.to_fields()?)
            .await?;
        self.cache.upsert_event(event.clone()).await?;

        let group_ids = self.state().group_ids();
        let report = self
            .mirror
            .on_personal_event_created(&self.user_id, &mut event, &group_ids)
            .await?;
        Ok((event, report))
    }

    pub async fn update_event(&self, event: Event) -> SyncResult<FanOutReport> {
        event.validate()?;
        let id = event
            .id
            .clone()
            .ok_or_else(|| SyncError::InvalidInput("event has no id".to_string()))?;
        self.remote
            .set(
                &CollectionPath::user_calendar(&self.user_id).doc(&id),
                event.to_fields()?,
            )
            .await?;
        self.cache.upsert_event(event.clone()).await?;

        let group_ids = self.state().group_ids();
        self.mirror
            .on_personal_event_updated(&event, &group_ids)
            .await
    }

    pub async fn delete_event(&self, event_id: &str) -> SyncResult<FanOutReport> {
        self.remote
            .delete(&CollectionPath::user_calendar(&self.user_id).doc(event_id))
            .await?;
        self.cache.remove_event(event_id).await?;

        let group_ids = self.state().group_ids();
        Ok(self
            .mirror
            .on_personal_event_deleted(event_id, &group_ids)
            .await)
    }

    /// Create a group with this user as its only member.
    pub async fn create_group(&self, name: &str) -> SyncResult<Group> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SyncError::InvalidInput("group name is empty".to_string()));
        }
        let mut group = Group::new(name, self.user_id.clone());
        let group_id = self
            .remote
            .add(&CollectionPath::groups(), group.to_fields()?)
            .await?;
        group.set_id(group_id.clone());
        tracing::info!("created group {} ({})", group.name, group_id);

        self.enroll(&group_id, true).await?;
        Ok(group)
    }

    pub async fn join_group(&self, group_id: &str) -> SyncResult<Group> {
        let group_id = group_id.trim();
        let document = self
            .remote
            .get(&DocumentPath::group(group_id))
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("group {group_id}")))?;
        let mut group = Group::from_document(&document)?;
        let already_member = group.has_member(&self.user_id);
        if !already_member {
            self.remote
                .update(
                    &DocumentPath::group(group_id),
                    vec![FieldUpdate::array_union(
                        "members",
                        vec![Value::String(self.user_id.clone())],
                    )],
                )
                .await?;
            group.members.push(self.user_id.clone());
        }

        self.enroll(group_id, !already_member).await?;
        Ok(group)
    }

    /// Leave a group. The last member out deletes the group and its
    /// calendar and proposals.
    pub async fn leave_group(&self, group_id: &str) -> SyncResult<()> {
        let group_path = DocumentPath::group(group_id);
        match self.remote.get(&group_path).await? {
            Some(document) => {
                let group = Group::from_document(&document)?;
                let last_member = group.members.iter().all(|member| *member == self.user_id);
                if last_member {
                    self.delete_collection(&CollectionPath::group_calendar(group_id))
                        .await?;
                    self.delete_collection(&CollectionPath::group_proposals(group_id))
                        .await?;
                    self.remote.delete(&group_path).await?;
                    tracing::info!("deleted group {} after its last member left", group_id);
                } else {
                    self.remote
                        .update(
                            &group_path,
                            vec![FieldUpdate::array_remove(
                                "members",
                                vec![Value::String(self.user_id.clone())],
                            )],
                        )
                        .await?;
                }
            }
            None => tracing::debug!("group {} already gone", group_id),
        }

        self.remote
            .update(
                &DocumentPath::user(&self.user_id),
                vec![FieldUpdate::array_remove(
                    "groups",
                    vec![Value::String(group_id.to_string())],
                )],
            )
            .await?;
        // once refreshed, no subscription can deliver for this group again
        self.refresh_groups().await;
        self.cache.remove_group(group_id).await?;
        Ok(())
    }

    pub async fn propose_event(&self, group_id: &str, mut proposal: Proposal) -> SyncResult<Proposal> {
        if proposal.name.is_none() {
            proposal.name = Some(self.display_name());
        }
        self.consensus.propose(group_id, proposal).await
    }

    pub async fn accept_proposal(&self, group_id: &str, proposal_id: &str) -> SyncResult<()> {
        self.consensus
            .accept(group_id, proposal_id, &self.user_id, &self.display_name())
            .await
    }

    pub async fn decline_proposal(&self, group_id: &str, proposal_id: &str) -> SyncResult<()> {
        self.consensus
            .decline(group_id, proposal_id, &self.user_id, &self.display_name())
            .await
    }

    /// Copy a proposal into the personal calendar as a new event.
    pub async fn add_proposal_to_calendar(
        &self,
        proposal: &Proposal,
    ) -> SyncResult<(Event, FanOutReport)> {
        let mut event = proposal.as_event();
        event.name = None;
        self.create_event(event).await
    }

    pub fn events_on(&self, date: NaiveDate) -> Vec<Event> {
        let state = self.state();
        self.evaluator
            .filter(date, &state.events)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn group_events_on(&self, group_id: &str, date: NaiveDate) -> Vec<Event> {
        let state = self.state();
        self.evaluator
            .filter(date, state.group_events(group_id))
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn proposals_on(&self, group_id: &str, date: NaiveDate) -> Vec<Proposal> {
        let state = self.state();
        self.consensus
            .proposals_on(date, state.group_proposals(group_id))
            .into_iter()
            .cloned()
            .collect()
    }

    /// Stop syncing and forget everything cached for this user.
    pub async fn sign_out(self) -> SyncResult<()> {
        self.subscriptions.stop_all().await?;
        self.subscriptions.shutdown();
        self.cache.clear().await?;
        tracing::info!("session closed for {}", self.user_id);
        Ok(())
    }

    /// Link the user to a group on the profile side, copy the personal
    /// calendar into it, and re-resolve the group list.
    async fn enroll(&self, group_id: &str, backfill: bool) -> SyncResult<()> {
        self.remote
            .update(
                &DocumentPath::user(&self.user_id),
                vec![FieldUpdate::array_union(
                    "groups",
                    vec![Value::String(group_id.to_string())],
                )],
            )
            .await?;
        if backfill {
            if let Err(error) = self
                .mirror
                .backfill_on_group_join_or_create(&self.user_id, group_id, &self.display_name())
                .await
            {
                tracing::warn!("backfill into group {} failed: {}", group_id, error);
            }
        }
        self.refresh_groups().await;
        Ok(())
    }

    async fn refresh_groups(&self) {
        if let Err(error) = self.subscriptions.refresh_groups().await {
            tracing::warn!("group refresh failed: {}", error);
        }
    }

    async fn delete_collection(&self, collection: &CollectionPath) -> SyncResult<()> {
        for document in self.remote.list(collection).await? {
            self.remote.delete(&collection.doc(&document.id)).await?;
        }
        Ok(())
    }

    fn display_name(&self) -> String {
        match self.state().user.as_ref() {
            Some(user) => user.name.clone(),
            None => self.user_id.clone(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.subscriptions.shutdown();
    }
}
