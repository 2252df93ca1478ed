//! Membership batching and the merge of per-batch group lists.

use std::collections::{BTreeMap, HashSet};

use crate::model::Group;

/// Split ids into consecutive batches of at most `size`, dropping repeats.
pub fn batch_ids(ids: &[String], size: usize) -> Vec<Vec<String>> {
    let mut seen = HashSet::new();
    let unique: Vec<String> = ids
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect();
    unique
        .chunks(size.max(1))
        .map(<[String]>::to_vec)
        .collect()
}

/// Latest partial result of every batch.
///
/// A delivery replaces its batch's list wholesale. A stale delivery for a
/// batch can therefore bring back a group that a newer one had dropped, until
/// that batch delivers again.
///
/// Rebatching never drops a group that is still listed: its last known copy
/// stays in the merged list until the batch that now covers it delivers.
#[derive(Debug, Default)]
pub struct GroupListMerger {
    batches: BTreeMap<usize, Vec<Group>>,
    batch_ids: Vec<Vec<String>>,
    carried: Vec<Group>,
}

impl GroupListMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a batch delivery and return the merged list.
    pub fn apply_batch(&mut self, index: usize, groups: Vec<Group>) -> Vec<Group> {
        if let Some(ids) = self.batch_ids.get(index) {
            self.carried
                .retain(|group| group.id.as_ref().is_some_and(|id| !ids.contains(id)));
        }
        self.batches.insert(index, groups);
        self.merged()
    }

    /// Switch to a new batching of the membership list.
    ///
    /// Partial results are trimmed to the ids still listed. Results of
    /// batch indexes past the new count are carried over until a live batch
    /// reports those groups. Returns `true` if a listed group was dropped.
    pub fn rebatch(&mut self, batches: &[Vec<String>]) -> bool {
        let before = self.merged().len();
        let listed: HashSet<&str> = batches.iter().flatten().map(String::as_str).collect();
        let orphaned = self.batches.split_off(&batches.len());
        self.carried.extend(orphaned.into_values().flatten());

        let still_listed =
            |group: &Group| group.id.as_deref().is_some_and(|id| listed.contains(id));
        for groups in self.batches.values_mut() {
            groups.retain(still_listed);
        }
        self.carried.retain(still_listed);
        self.batch_ids = batches.to_vec();
        self.merged().len() != before
    }

    pub fn clear(&mut self) {
        self.batches.clear();
        self.batch_ids.clear();
        self.carried.clear();
    }

    /// All known groups, unique by id, sorted by name then id. Live batch
    /// results win over carried copies.
    pub fn merged(&self) -> Vec<Group> {
        let mut seen = HashSet::new();
        let mut groups: Vec<Group> = self
            .batches
            .values()
            .flatten()
            .chain(self.carried.iter())
            .filter(|group| match group.id.as_deref() {
                Some(id) => seen.insert(id.to_string()),
                None => true,
            })
            .cloned()
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        groups
    }
}
