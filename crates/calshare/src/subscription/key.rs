use std::fmt;

/// One logical remote stream. At most one subscription per key is live.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubscriptionKey {
    PersonalEvents,
    /// The i-th membership batch of the user's group ids.
    GroupBatch(usize),
    GroupEvents(String),
    GroupProposals(String),
}

impl SubscriptionKey {
    pub fn group_id(&self) -> Option<&str> {
        match self {
            SubscriptionKey::GroupEvents(group_id) | SubscriptionKey::GroupProposals(group_id) => {
                Some(group_id)
            }
            SubscriptionKey::PersonalEvents | SubscriptionKey::GroupBatch(_) => None,
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionKey::PersonalEvents => f.write_str("personal-events"),
            SubscriptionKey::GroupBatch(index) => write!(f, "group-list-batch[{index}]"),
            SubscriptionKey::GroupEvents(group_id) => write!(f, "group-events[{group_id}]"),
            SubscriptionKey::GroupProposals(group_id) => write!(f, "group-proposals[{group_id}]"),
        }
    }
}
