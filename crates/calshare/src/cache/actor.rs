use tokio::sync::{mpsc, oneshot};

use crate::cache::store::{CacheMutation, LocalCache};
use crate::error::SyncResult;

pub enum CacheCommand {
    Apply {
        mutation: CacheMutation,
        reply: Option<oneshot::Sender<SyncResult<bool>>>,
    },
}

/// Sole writer of the local cache.
pub(crate) struct CacheActor {
    cache: LocalCache,
    command_rx: mpsc::UnboundedReceiver<CacheCommand>,
}

impl CacheActor {
    pub(crate) fn new(cache: LocalCache, command_rx: mpsc::UnboundedReceiver<CacheCommand>) -> Self {
        Self { cache, command_rx }
    }

    pub(crate) async fn run(mut self) {
        while let Some(command) = self.command_rx.recv().await {
            match command {
                CacheCommand::Apply { mutation, reply } => {
                    let label = mutation_label(&mutation);
                    let result = self.cache.apply(mutation).await;
                    if let Err(error) = &result {
                        tracing::warn!("cache {} failed: {}", label, error);
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                }
            }
        }
        tracing::debug!("cache actor stopped");
    }
}

fn mutation_label(mutation: &CacheMutation) -> &'static str {
    match mutation {
        CacheMutation::SetUser(_) => "set_user",
        CacheMutation::SetEvents(_) => "set_events",
        CacheMutation::UpsertEvent(_) => "upsert_event",
        CacheMutation::RemoveEvent(_) => "remove_event",
        CacheMutation::SetGroups(_) => "set_groups",
        CacheMutation::RemoveGroup(_) => "remove_group",
        CacheMutation::SetGroupEvents { .. } => "set_group_events",
        CacheMutation::SetGroupProposals { .. } => "set_group_proposals",
        CacheMutation::Clear => "clear",
    }
}
