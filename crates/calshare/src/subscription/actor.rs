#[cfg(test)]
mod tests;

use std::collections::{BTreeSet, HashMap};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheHandle;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::model::{decode_all, Event, Group, Proposal, Record, User};
use crate::remote::{CollectionPath, DocumentPath, Query, SharedRemote, Snapshot};
use crate::subscription::batch::{batch_ids, GroupListMerger};
use crate::subscription::key::SubscriptionKey;
use crate::subscription::protocol::{Delivery, SyncCommand};
use crate::subscription::pump::spawn_pump;

/// Owns every live subscription and applies their snapshots to the cache.
pub(crate) struct SubscriptionActor {
    remote: SharedRemote,
    cache: CacheHandle,
    config: SyncConfig,
    command_tx: mpsc::UnboundedSender<SyncCommand>,
    command_rx: mpsc::UnboundedReceiver<SyncCommand>,
    user_id: Option<String>,
    started: bool,
    active: HashMap<SubscriptionKey, ActiveSubscription>,
    next_generation: u64,
    batches: Vec<Vec<String>>,
    merger: GroupListMerger,
}

struct ActiveSubscription {
    generation: u64,
    cancel_token: CancellationToken,
}

impl SubscriptionActor {
    pub(crate) fn new(
        remote: SharedRemote,
        cache: CacheHandle,
        config: SyncConfig,
        command_tx: mpsc::UnboundedSender<SyncCommand>,
        command_rx: mpsc::UnboundedReceiver<SyncCommand>,
    ) -> Self {
        Self {
            remote,
            cache,
            config: config.normalized(),
            command_tx,
            command_rx,
            user_id: None,
            started: false,
            active: HashMap::new(),
            next_generation: 0,
            batches: Vec::new(),
            merger: GroupListMerger::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        while let Some(command) = self.command_rx.recv().await {
            let result = match command {
                SyncCommand::StartAfterAuthentication { user_id, reply } => {
                    let result = self.start_after_authentication(user_id).await;
                    let _ = reply.send(result);
                    Ok(())
                }
                SyncCommand::Start { key, reply } => {
                    let result = self.start(key).await;
                    let _ = reply.send(result);
                    Ok(())
                }
                SyncCommand::Stop { key, reply } => {
                    let _ = reply.send(self.stop(&key));
                    Ok(())
                }
                SyncCommand::RefreshGroups { reply } => {
                    let result = self.refresh_groups().await;
                    let _ = reply.send(result);
                    Ok(())
                }
                SyncCommand::ResolveGroups { group_ids, reply } => {
                    let result = self.resolve_groups(&group_ids).await;
                    let _ = reply.send(result);
                    Ok(())
                }
                SyncCommand::ActiveKeys { reply } => {
                    let _ = reply.send(self.active_keys());
                    Ok(())
                }
                SyncCommand::StopAll { reply } => {
                    self.stop_all();
                    let _ = reply.send(());
                    Ok(())
                }
                SyncCommand::Shutdown => {
                    self.stop_all();
                    break;
                }
                SyncCommand::Delivery(delivery) => self.handle_delivery(delivery).await,
            };

            if let Err(error) = result {
                tracing::warn!("subscription actor command failed: {}", error);
            }
        }
        tracing::debug!("subscription actor stopped");
    }

    async fn start_after_authentication(&mut self, user_id: String) -> SyncResult<()> {
        if self.user_id.as_deref() != Some(user_id.as_str()) {
            if self.user_id.is_some() {
                tracing::info!("switching sync from {:?} to {}", self.user_id, user_id);
                self.stop_all();
            }
            self.user_id = Some(user_id);
        } else if self.started {
            tracing::debug!("sync already started; skipping");
            return Ok(());
        }

        // both steps are idempotent, so a failed attempt can simply be retried
        self.start(SubscriptionKey::PersonalEvents).await?;
        self.refresh_groups().await?;
        self.started = true;
        Ok(())
    }

    /// `Ok(false)` when the key is already live.
    async fn start(&mut self, key: SubscriptionKey) -> SyncResult<bool> {
        if self.active.contains_key(&key) {
            return Ok(false);
        }
        let query = self.query_for(&key)?;
        let stream = self.remote.subscribe(query).await?;

        self.next_generation += 1;
        let generation = self.next_generation;
        let cancel_token = CancellationToken::new();
        spawn_pump(
            key.clone(),
            generation,
            stream,
            cancel_token.clone(),
            self.command_tx.clone(),
        );
        tracing::debug!("subscription {} started (generation {})", key, generation);
        self.active.insert(
            key,
            ActiveSubscription {
                generation,
                cancel_token,
            },
        );
        Ok(true)
    }

    fn stop(&mut self, key: &SubscriptionKey) -> bool {
        match self.active.remove(key) {
            Some(subscription) => {
                subscription.cancel_token.cancel();
                tracing::debug!("subscription {} stopped", key);
                true
            }
            None => false,
        }
    }

    fn stop_all(&mut self) {
        for (_, subscription) in self.active.drain() {
            subscription.cancel_token.cancel();
        }
        self.batches.clear();
        self.merger.clear();
        self.user_id = None;
        self.started = false;
    }

    fn active_keys(&self) -> Vec<SubscriptionKey> {
        let mut keys: Vec<SubscriptionKey> = self.active.keys().cloned().collect();
        keys.sort();
        keys
    }

    async fn refresh_groups(&mut self) -> SyncResult<()> {
        let user_id = self.user_id.clone().ok_or(SyncError::NotSignedIn)?;
        let Some(document) = self.remote.get(&DocumentPath::user(&user_id)).await? else {
            tracing::debug!("no profile for {}; group list left as is", user_id);
            return Ok(());
        };
        let user = User::from_document(&document)?;
        let group_ids = user.groups.clone();
        self.cache.set_user(Some(user)).await?;
        self.resolve_groups(&group_ids).await
    }

    async fn resolve_groups(&mut self, group_ids: &[String]) -> SyncResult<()> {
        let next = batch_ids(group_ids, self.config.membership_batch_size);
        for index in 0..self.batches.len().max(next.len()) {
            if self.batches.get(index) != next.get(index) {
                self.stop(&SubscriptionKey::GroupBatch(index));
            }
        }
        // groups still listed keep their last copy until their batch redelivers
        let dropped = self.merger.rebatch(&next);
        self.batches = next;
        for index in 0..self.batches.len() {
            self.start(SubscriptionKey::GroupBatch(index)).await?;
        }
        if self.batches.is_empty() || dropped {
            let merged = self.merger.merged();
            self.publish_groups(merged).await?;
        }
        Ok(())
    }

    async fn handle_delivery(&mut self, delivery: Delivery) -> SyncResult<()> {
        let Delivery {
            key,
            generation,
            result,
        } = delivery;
        let live = self
            .active
            .get(&key)
            .is_some_and(|subscription| subscription.generation == generation);
        if !live {
            tracing::debug!(
                "ignoring delivery for {} from inactive generation {}",
                key,
                generation
            );
            return Ok(());
        }
        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(error) => {
                tracing::warn!("subscription {} failed: {}", key, error);
                return Ok(());
            }
        };
        self.apply_snapshot(&key, snapshot).await
    }

    async fn apply_snapshot(&mut self, key: &SubscriptionKey, snapshot: Snapshot) -> SyncResult<()> {
        let collection = self.collection_label(key);
        match key {
            SubscriptionKey::PersonalEvents => {
                let events = decode_all::<Event>(&collection, &snapshot.documents);
                self.cache.set_events(events).await?;
            }
            SubscriptionKey::GroupBatch(index) => {
                let groups = decode_all::<Group>(&collection, &snapshot.documents);
                let merged = self.merger.apply_batch(*index, groups);
                self.publish_groups(merged).await?;
            }
            SubscriptionKey::GroupEvents(group_id) => {
                let events = decode_all::<Event>(&collection, &snapshot.documents);
                self.cache.set_group_events(group_id, events).await?;
            }
            SubscriptionKey::GroupProposals(group_id) => {
                let proposals = decode_all::<Proposal>(&collection, &snapshot.documents);
                self.cache.set_group_proposals(group_id, proposals).await?;
            }
        }
        Ok(())
    }

    async fn publish_groups(&mut self, groups: Vec<Group>) -> SyncResult<()> {
        let group_ids: BTreeSet<String> =
            groups.iter().filter_map(|group| group.id.clone()).collect();
        if self.cache.set_groups(groups).await? {
            tracing::debug!("group list now has {} groups", group_ids.len());
        }
        if self.config.follow_group_calendars {
            self.follow_group_calendars(&group_ids).await;
        }
        Ok(())
    }

    /// Keep one events and one proposals subscription per listed group.
    /// Cached calendars of groups that left the list are dropped with them.
    async fn follow_group_calendars(&mut self, group_ids: &BTreeSet<String>) {
        let stale: Vec<SubscriptionKey> = self
            .active
            .keys()
            .filter(|key| key.group_id().is_some_and(|id| !group_ids.contains(id)))
            .cloned()
            .collect();
        let mut departed = BTreeSet::new();
        for key in stale {
            if let Some(group_id) = key.group_id() {
                departed.insert(group_id.to_string());
            }
            self.stop(&key);
        }
        for group_id in departed {
            if let Err(error) = self.cache.remove_group(&group_id).await {
                tracing::warn!("failed to drop cached group {}: {}", group_id, error);
            }
        }
        for group_id in group_ids {
            for key in [
                SubscriptionKey::GroupEvents(group_id.clone()),
                SubscriptionKey::GroupProposals(group_id.clone()),
            ] {
                if let Err(error) = self.start(key.clone()).await {
                    tracing::warn!("failed to start subscription {}: {}", key, error);
                }
            }
        }
    }

    fn query_for(&self, key: &SubscriptionKey) -> SyncResult<Query> {
        match key {
            SubscriptionKey::PersonalEvents => {
                let user_id = self.user_id.as_deref().ok_or(SyncError::NotSignedIn)?;
                Ok(Query::collection(CollectionPath::user_calendar(user_id)))
            }
            SubscriptionKey::GroupBatch(index) => {
                let batch = self.batches.get(*index).ok_or_else(|| {
                    SyncError::InvalidInput(format!("no membership batch {index}"))
                })?;
                Query::ids_in(CollectionPath::groups(), batch.iter().cloned())
            }
            SubscriptionKey::GroupEvents(group_id) => {
                Ok(Query::collection(CollectionPath::group_calendar(group_id)))
            }
            SubscriptionKey::GroupProposals(group_id) => {
                Ok(Query::collection(CollectionPath::group_proposals(group_id)))
            }
        }
    }

    fn collection_label(&self, key: &SubscriptionKey) -> String {
        match self.query_for(key) {
            Ok(query) => query.target().to_string(),
            Err(_) => key.to_string(),
        }
    }
}
