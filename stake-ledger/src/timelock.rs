//! Per-account timelock store
//!
//! An unordered set of [`TimelockEntry`] backed by a `Vec`. Removal is
//! swap-with-last, so positions of the remaining entries are not stable and
//! callers must never hold indices across a mutation.

use crate::types::{Amount, RankId, TimelockEntry, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Amounts removed from the store, grouped by rank
pub type RankTotals = BTreeMap<RankId, Amount>;

/// Unordered collection of live timelock entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimelockStore {
    entries: Vec<TimelockEntry>,
}

impl TimelockStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No live entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live entries, in no particular order
    pub fn entries(&self) -> &[TimelockEntry] {
        &self.entries
    }

    /// Iterate live entries
    pub fn iter(&self) -> impl Iterator<Item = &TimelockEntry> {
        self.entries.iter()
    }

    /// Add an entry
    pub fn push(&mut self, entry: TimelockEntry) {
        self.entries.push(entry);
    }

    /// Remove every entry matching `pred`, returning removed amounts per rank.
    ///
    /// Single pass. After a swap-remove the slot at `i` holds the former last
    /// entry, which has not been visited yet, so the index only advances on a
    /// miss. Every entry is examined exactly once.
    pub fn remove_where<F>(&mut self, mut pred: F) -> RankTotals
    where
        F: FnMut(&TimelockEntry) -> bool,
    {
        let mut totals = RankTotals::new();
        let mut i = 0;

        while i < self.entries.len() {
            if pred(&self.entries[i]) {
                let removed = self.entries.swap_remove(i);
                *totals.entry(removed.rank_id).or_default() += removed.amount;
            } else {
                i += 1;
            }
        }

        totals
    }

    /// Remove every entry that has matured at `now`
    pub fn remove_expired(&mut self, now: Timestamp) -> RankTotals {
        self.remove_where(|entry| entry.is_expired(now))
    }

    /// Remove every entry in a rank strictly below `rank_id`
    pub fn remove_below(&mut self, rank_id: RankId) -> RankTotals {
        self.remove_where(|entry| entry.rank_id < rank_id)
    }

    /// Sum of amounts matching `pred` (read-only)
    pub fn sum_where<F>(&self, pred: F) -> Amount
    where
        F: Fn(&TimelockEntry) -> bool,
    {
        self.entries
            .iter()
            .filter(|entry| pred(entry))
            .map(|entry| entry.amount)
            .sum()
    }

    /// Sum of matured amounts in `rank_id` at `now`
    pub fn expired_in_rank(&self, rank_id: RankId, now: Timestamp) -> Amount {
        self.sum_where(|entry| entry.rank_id == rank_id && entry.is_expired(now))
    }

    /// Sum of all amounts per rank
    pub fn totals(&self) -> RankTotals {
        let mut totals = RankTotals::new();
        for entry in &self.entries {
            *totals.entry(entry.rank_id).or_default() += entry.amount;
        }
        totals
    }

    /// Drop every entry regardless of expiry
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
