use serde::Serialize;

/// Cache change notifications, one per replaced field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum CacheEvent {
    UserChanged,
    EventsChanged,
    GroupsChanged,
    GroupEventsChanged(GroupChangedPayload),
    GroupProposalsChanged(GroupChangedPayload),
    Cleared,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupChangedPayload {
    pub group_id: String,
}

impl CacheEvent {
    pub fn group_events(group_id: &str) -> Self {
        CacheEvent::GroupEventsChanged(GroupChangedPayload {
            group_id: group_id.to_string(),
        })
    }

    pub fn group_proposals(group_id: &str) -> Self {
        CacheEvent::GroupProposalsChanged(GroupChangedPayload {
            group_id: group_id.to_string(),
        })
    }
}
