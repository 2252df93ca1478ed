use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::remote::SnapshotStream;
use crate::subscription::key::SubscriptionKey;
use crate::subscription::protocol::{Delivery, SyncCommand};

/// Forward every item of `stream` to the actor until cancelled.
pub(crate) fn spawn_pump(
    key: SubscriptionKey,
    generation: u64,
    mut stream: SnapshotStream,
    cancel_token: CancellationToken,
    command_tx: mpsc::UnboundedSender<SyncCommand>,
) {
    tokio::spawn(async move {
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => break,
                item = stream.next() => item,
            };
            let Some(result) = item else {
                tracing::debug!("subscription {} stream ended", key);
                break;
            };
            let delivery = Delivery {
                key: key.clone(),
                generation,
                result,
            };
            if command_tx.send(SyncCommand::Delivery(delivery)).is_err() {
                break;
            }
        }
    });
}
