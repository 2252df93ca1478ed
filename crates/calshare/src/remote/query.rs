use std::collections::BTreeSet;

use crate::error::{SyncError, SyncResult};
use crate::remote::path::{CollectionPath, DocumentPath};

/// Hard ceiling of ids in one "document id in set" query.
pub const MAX_QUERY_IDS: usize = 10;

/// A whole collection, or the documents of a collection whose id is in a set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    collection: CollectionPath,
    ids: Option<BTreeSet<String>>,
}

impl Query {
    pub fn collection(collection: CollectionPath) -> Self {
        Self {
            collection,
            ids: None,
        }
    }

    pub fn ids_in<I, S>(collection: CollectionPath, ids: I) -> SyncResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: BTreeSet<String> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            return Err(SyncError::InvalidInput(format!(
                "membership query on {collection} needs at least one id"
            )));
        }
        if ids.len() > MAX_QUERY_IDS {
            return Err(SyncError::InvalidInput(format!(
                "membership query on {collection} has {} ids, limit is {MAX_QUERY_IDS}",
                ids.len()
            )));
        }
        Ok(Self {
            collection,
            ids: Some(ids),
        })
    }

    pub fn target(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn ids(&self) -> Option<&BTreeSet<String>> {
        self.ids.as_ref()
    }

    pub fn matches(&self, path: &DocumentPath) -> bool {
        if path.collection() != &self.collection {
            return false;
        }
        match &self.ids {
            Some(ids) => ids.contains(path.id()),
            None => true,
        }
    }
}
