//! The segment to ledger-set index.

use crate::types::{LedgerId, SegmentId};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// Maps each scanned segment to the set of ledgers with entries in it.
///
/// Sealed segments are folded in by the recovery scanner; the active
/// segment is deliberately absent until it rolls. The garbage collector
/// is the only mutator after a segment has been installed: it prunes dead
/// ledgers from each set and removes the segment once its set is empty.
#[derive(Debug, Default)]
pub struct SegmentLedgerMap {
    map: RwLock<HashMap<SegmentId, HashSet<LedgerId>>>,
}

impl SegmentLedgerMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether a segment has been scanned and installed.
    #[must_use]
    pub fn contains(&self, segment_id: SegmentId) -> bool {
        self.map.read().contains_key(&segment_id)
    }

    /// Returns whether no segment is installed at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Installs the ledger set for a segment.
    pub fn install(&self, segment_id: SegmentId, ledgers: HashSet<LedgerId>) {
        self.map.write().insert(segment_id, ledgers);
    }

    /// Removes a segment from the index.
    pub fn remove(&self, segment_id: SegmentId) {
        self.map.write().remove(&segment_id);
    }

    /// Returns the installed segment IDs, in ascending order.
    #[must_use]
    pub fn segment_ids(&self) -> Vec<SegmentId> {
        let mut ids: Vec<_> = self.map.read().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Returns a snapshot of a segment's ledger set.
    #[must_use]
    pub fn ledgers(&self, segment_id: SegmentId) -> Option<HashSet<LedgerId>> {
        self.map.read().get(&segment_id).cloned()
    }

    /// Drops every ledger in a segment's set for which `keep` is false.
    ///
    /// Returns the number of ledgers remaining, or `None` if the segment
    /// is not installed.
    pub fn retain_ledgers<F>(&self, segment_id: SegmentId, mut keep: F) -> Option<usize>
    where
        F: FnMut(LedgerId) -> bool,
    {
        let mut map = self.map.write();
        let ledgers = map.get_mut(&segment_id)?;
        ledgers.retain(|&ledger| keep(ledger));
        Some(ledgers.len())
    }
}
