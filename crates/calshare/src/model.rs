//! Calendar data model shared by the cache, the remote store and the sync actors.

pub mod document;
pub mod event;
pub mod group;
pub mod occurrence;
pub mod proposal;
pub mod user;

pub use document::{decode_all, Document, Record};
pub use event::{Event, LAST_MINUTE};
pub use group::Group;
pub use occurrence::{Occurrence, OccurrenceKind};
pub use proposal::Proposal;
pub use user::User;
