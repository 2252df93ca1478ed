pub mod error;
pub mod config;
pub mod model;
pub mod recurrence;

pub mod bus;
pub mod event;
pub mod storage;
pub mod cache;
pub mod remote;

pub mod subscription;
pub mod mirror;
pub mod consensus;
pub mod session;

pub use crate::cache::{CacheHandle, CacheState};
pub use crate::config::SyncConfig;
pub use crate::error::{SyncError, SyncResult};
pub use crate::model::{Event, Group, Occurrence, Proposal, User};
pub use crate::recurrence::RecurrenceEvaluator;
pub use crate::session::{AuthProvider, Session, StaticAuth};
