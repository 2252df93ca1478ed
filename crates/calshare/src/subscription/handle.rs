use tokio::sync::{mpsc, oneshot};

use crate::cache::CacheHandle;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::remote::SharedRemote;
use crate::subscription::actor::SubscriptionActor;
use crate::subscription::key::SubscriptionKey;
use crate::subscription::protocol::SyncCommand;

#[derive(Clone)]
pub struct SubscriptionManager {
    command_tx: mpsc::UnboundedSender<SyncCommand>,
}

impl SubscriptionManager {
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    /// Start the personal-events subscription and resolve the group list.
    ///
    /// Safe to call again: live keys are left alone.
    pub async fn start_after_authentication(&self, user_id: &str) -> SyncResult<()> {
        let user_id = user_id.to_string();
        self.request(|reply| SyncCommand::StartAfterAuthentication { user_id, reply })
            .await?
    }

    /// `Ok(false)` if the key was already live.
    pub async fn start(&self, key: SubscriptionKey) -> SyncResult<bool> {
        self.request(|reply| SyncCommand::Start { key, reply }).await?
    }

    /// `Ok(false)` if the key was not live.
    pub async fn stop(&self, key: SubscriptionKey) -> SyncResult<bool> {
        self.request(|reply| SyncCommand::Stop { key, reply }).await
    }

    pub async fn refresh_groups(&self) -> SyncResult<()> {
        self.request(|reply| SyncCommand::RefreshGroups { reply })
            .await?
    }

    pub async fn resolve_groups(&self, group_ids: Vec<String>) -> SyncResult<()> {
        self.request(|reply| SyncCommand::ResolveGroups { group_ids, reply })
            .await?
    }

    /// Live keys, sorted.
    pub async fn active_keys(&self) -> SyncResult<Vec<SubscriptionKey>> {
        self.request(|reply| SyncCommand::ActiveKeys { reply }).await
    }

    pub async fn stop_all(&self) -> SyncResult<()> {
        self.request(|reply| SyncCommand::StopAll { reply }).await
    }

    /// Stop everything and end the actor.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(SyncCommand::Shutdown);
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SyncCommand,
    ) -> SyncResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(command(reply_tx))
            .map_err(|_| SyncError::Internal("subscription actor stopped".to_string()))?;
        reply_rx
            .await
            .map_err(|_| SyncError::Internal("subscription actor dropped response".to_string()))
    }
}

pub fn spawn_subscriptions(
    remote: SharedRemote,
    cache: CacheHandle,
    config: SyncConfig,
) -> SubscriptionManager {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let actor = SubscriptionActor::new(remote, cache, config, command_tx.clone(), command_rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    SubscriptionManager { command_tx }
}
