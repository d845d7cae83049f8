//! Change sets produced by native change tracking
//!
//! An [`IndexSet`] stores positions as sorted, non-adjacent inclusive
//! ranges. A [`CollectionChangeSet`] groups the positions touched by one
//! notification cycle.

use serde::{Deserialize, Serialize};

/// Sorted set of collection positions stored as coalesced ranges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSet {
    ranges: Vec<(usize, usize)>,
}

impl IndexSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single position
    pub fn add(&mut self, index: usize) {
        self.insert(index, index);
    }

    /// Add every position in `start..end`
    pub fn add_range(&mut self, start: usize, end: usize) {
        if start < end {
            self.insert(start, end - 1);
        }
    }

    fn insert(&mut self, first: usize, last: usize) {
        // First range that overlaps or directly precedes `first`.
        let pos = self
            .ranges
            .partition_point(|&(_, l)| first > 0 && l < first - 1);
        let mut end = pos;
        let mut merged = (first, last);
        while end < self.ranges.len() && self.ranges[end].0 <= merged.1.saturating_add(1) {
            merged.0 = merged.0.min(self.ranges[end].0);
            merged.1 = merged.1.max(self.ranges[end].1);
            end += 1;
        }
        self.ranges.splice(pos..end, std::iter::once(merged));
    }

    pub fn contains(&self, index: usize) -> bool {
        let pos = self.ranges.partition_point(|&(_, l)| l < index);
        self.ranges.get(pos).is_some_and(|&(f, _)| f <= index)
    }

    /// Number of positions in the set
    pub fn count(&self) -> usize {
        self.ranges
            .iter()
            .fold(0usize, |n, &(f, l)| n.saturating_add(l - f).saturating_add(1))
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Underlying `(first, last)` ranges, inclusive and ascending
    pub fn ranges(&self) -> &[(usize, usize)] {
        &self.ranges
    }

    /// Every position, ascending
    pub fn as_indexes(&self) -> impl Iterator<Item = usize> + '_ {
        self.ranges.iter().flat_map(|&(f, l)| f..=l)
    }
}

impl FromIterator<usize> for IndexSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = IndexSet::new();
        for index in iter {
            set.add(index);
        }
        set
    }
}

impl<const N: usize> From<[usize; N]> for IndexSet {
    fn from(indices: [usize; N]) -> Self {
        indices.into_iter().collect()
    }
}

/// Positions affected by one change to a collection
///
/// `deletions` and `modifications` are positions before the change;
/// `insertions` and `modifications_new` are positions after it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionChangeSet {
    pub deletions: IndexSet,
    pub insertions: IndexSet,
    pub modifications: IndexSet,
    pub modifications_new: IndexSet,
}

impl CollectionChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deletions(mut self, deletions: impl Into<IndexSet>) -> Self {
        self.deletions = deletions.into();
        self
    }

    pub fn with_insertions(mut self, insertions: impl Into<IndexSet>) -> Self {
        self.insertions = insertions.into();
        self
    }

    /// Modified positions; the same positions are used before and after the change
    pub fn with_modifications(mut self, modifications: impl Into<IndexSet>) -> Self {
        let modifications = modifications.into();
        self.modifications_new = modifications.clone();
        self.modifications = modifications;
        self
    }

    /// Modified positions that moved: `before` pre-change, `after` post-change
    pub fn with_moved_modifications(
        mut self,
        before: impl Into<IndexSet>,
        after: impl Into<IndexSet>,
    ) -> Self {
        self.modifications = before.into();
        self.modifications_new = after.into();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty()
            && self.insertions.is_empty()
            && self.modifications.is_empty()
            && self.modifications_new.is_empty()
    }
}
