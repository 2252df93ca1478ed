use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::model::document::Record;
use crate::model::event::{validate_minutes, Event};
use crate::model::occurrence::Occurrence;

/// A candidate shared event inside a group, with per-member votes.
///
/// A member id is in at most one of `accepted` / `declined`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub occurrence: Occurrence,
    pub time_start: u16,
    pub time_end: u16,
    #[serde(default)]
    pub accepted: BTreeMap<String, String>,
    #[serde(default)]
    pub declined: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Proposal {
    pub fn new(title: impl Into<String>, occurrence: Occurrence, time_start: u16, time_end: u16) -> Self {
        Self {
            id: None,
            title: title.into(),
            occurrence,
            time_start,
            time_end,
            accepted: BTreeMap::new(),
            declined: BTreeMap::new(),
            name: None,
        }
    }

    /// Project onto an event so the recurrence rules apply unchanged.
    pub fn as_event(&self) -> Event {
        Event {
            id: None,
            title: self.title.clone(),
            occurrence: self.occurrence.clone(),
            time_start: self.time_start,
            time_end: self.time_end,
            name: self.name.clone(),
        }
    }
}

impl Record for Proposal {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn validate(&self) -> SyncResult<()> {
        validate_minutes(self.time_start, self.time_end)?;
        if let Some(member) = self.accepted.keys().find(|id| self.declined.contains_key(*id)) {
            return Err(SyncError::Decode(format!(
                "member {member} both accepted and declined"
            )));
        }
        Ok(())
    }
}
