use std::fmt;

/// A collection in the remote schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn users() -> Self {
        Self("users".to_string())
    }

    /// `users/{uid}/calendar`
    pub fn user_calendar(user_id: &str) -> Self {
        Self(format!("users/{user_id}/calendar"))
    }

    pub fn groups() -> Self {
        Self("groups".to_string())
    }

    /// `groups/{gid}/calendar`, the mirrored events.
    pub fn group_calendar(group_id: &str) -> Self {
        Self(format!("groups/{group_id}/calendar"))
    }

    /// `groups/{gid}/proposals`
    pub fn group_proposals(group_id: &str) -> Self {
        Self(format!("groups/{group_id}/proposals"))
    }

    pub fn doc(&self, id: &str) -> DocumentPath {
        DocumentPath {
            collection: self.clone(),
            id: id.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath {
    collection: CollectionPath,
    id: String,
}

impl DocumentPath {
    /// `users/{uid}`
    pub fn user(user_id: &str) -> Self {
        CollectionPath::users().doc(user_id)
    }

    /// `groups/{gid}`
    pub fn group(group_id: &str) -> Self {
        CollectionPath::groups().doc(group_id)
    }

    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}
