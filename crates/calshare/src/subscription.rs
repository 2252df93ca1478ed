//! Live remote subscriptions feeding the local cache.
//!
//! One [`actor::SubscriptionActor`] task owns the subscription registry. Each
//! live key runs a pump task that forwards snapshots back to the actor tagged
//! with the key's generation. Snapshots from a stopped or replaced generation
//! are dropped, so nothing lands after `stop`.

mod actor;
pub mod batch;
pub mod handle;
pub mod key;
pub mod protocol;
mod pump;

pub use batch::{batch_ids, GroupListMerger};
pub use handle::{spawn_subscriptions, SubscriptionManager};
pub use key::SubscriptionKey;
