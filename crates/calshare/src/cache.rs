//! Local cache of the signed-in user's data.
//!
//! [`LocalCache`] holds the state and its persisted snapshot. It is owned by a
//! single [`actor::CacheActor`]; everything else writes through a
//! [`CacheHandle`] and reads published `Arc<CacheState>` values.

pub mod actor;
pub mod handle;
pub mod state;
pub mod store;

pub use handle::{spawn_cache, CacheHandle};
pub use state::{CacheSnapshot, CacheState};
pub use store::{CacheMutation, LocalCache};
