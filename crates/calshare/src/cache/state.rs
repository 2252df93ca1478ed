use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{Event, Group, Proposal, User};

pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything the device knows about the signed-in user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheState {
    pub user: Option<User>,
    pub events: Vec<Event>,
    pub groups: Vec<Group>,
    pub group_events_cache: BTreeMap<String, Vec<Event>>,
    pub group_proposals_cache: BTreeMap<String, Vec<Proposal>>,
}

impl CacheState {
    pub fn is_empty(&self) -> bool {
        self.user.is_none()
            && self.events.is_empty()
            && self.groups.is_empty()
            && self.group_events_cache.is_empty()
            && self.group_proposals_cache.is_empty()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().and_then(|user| user.id.as_deref())
    }

    /// Ids of the groups currently in the cached list.
    pub fn group_ids(&self) -> Vec<String> {
        self.groups
            .iter()
            .filter_map(|group| group.id.clone())
            .collect()
    }

    pub fn group_events(&self, group_id: &str) -> &[Event] {
        self.group_events_cache
            .get(group_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn group_proposals(&self, group_id: &str) -> &[Proposal] {
        self.group_proposals_cache
            .get(group_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Durable form of a non-empty [`CacheState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub version: u32,
    #[serde(flatten)]
    pub state: CacheState,
}

impl CacheSnapshot {
    /// `None` for an empty state: empty is represented by absence.
    pub fn capture(state: &CacheState) -> Option<Self> {
        if state.is_empty() {
            return None;
        }
        Some(Self {
            version: SNAPSHOT_VERSION,
            state: state.clone(),
        })
    }

    pub fn into_state(self) -> CacheState {
        self.state
    }
}
