//! Redelivery bookkeeping.
//!
//! [`RedeliverySet`] holds the positions of entries the dispatcher refused
//! to send (permit exhaustion, join barrier, negative acknowledgement). It
//! is an ordered set: replay reads drain it from the lowest position so
//! per-key order survives the detour. Mutated only under the dispatcher
//! lock.
//!
//! [`RedeliveryTracker`] counts delivery attempts per position. It is shared
//! with consumer transports, which stamp the attempt count on outgoing
//! messages, so it is concurrent where the set is not.

use dashmap::DashMap;
use std::collections::BTreeSet;

use crate::types::Position;

/// Ordered set of positions awaiting re-dispatch.
///
/// Duplicates collapse; iteration is in position order.
#[derive(Debug, Default)]
pub struct RedeliverySet {
    positions: BTreeSet<Position>,
}

impl RedeliverySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a position for redelivery. Returns false if it was already
    /// present.
    pub fn add(&mut self, position: Position) -> bool {
        self.positions.insert(position)
    }

    /// Remove a position (it was successfully dispatched or deleted).
    pub fn remove(&mut self, position: &Position) -> bool {
        self.positions.remove(position)
    }

    /// Whether the position is parked here.
    pub fn contains(&self, position: &Position) -> bool {
        self.positions.contains(position)
    }

    /// Number of parked positions.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether nothing is parked.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Up to `max` positions in position order.
    pub fn first_n(&self, max: usize) -> BTreeSet<Position> {
        self.positions.iter().take(max).copied().collect()
    }

    /// Drop every position at or below `mark_delete`.
    ///
    /// Acknowledged positions must never be replayed; the dispatcher prunes
    /// before every replay read.
    pub fn prune_up_to(&mut self, mark_delete: Position) -> usize {
        let keep = self.positions.split_off(&mark_delete.next());
        let pruned = self.positions.len();
        self.positions = keep;
        pruned
    }

    /// Remove every position in `positions`.
    pub fn remove_all(&mut self, positions: &BTreeSet<Position>) {
        for position in positions {
            self.positions.remove(position);
        }
    }

    /// Iterate parked positions in order.
    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter()
    }
}

/// Concurrent per-position delivery-attempt counter.
#[derive(Debug, Default)]
pub struct RedeliveryTracker {
    counts: DashMap<Position, u32>,
}

impl RedeliveryTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bump and return the attempt count for a position.
    pub fn increment(&self, position: Position) -> u32 {
        let mut count = self.counts.entry(position).or_insert(0);
        *count += 1;
        *count
    }

    /// Attempt count for a position; zero if never redelivered.
    pub fn count(&self, position: &Position) -> u32 {
        self.counts.get(position).map(|c| *c).unwrap_or(0)
    }

    /// Forget a position (it was acknowledged).
    pub fn remove(&self, position: &Position) {
        self.counts.remove(position);
    }

    /// Forget every position at or below `mark_delete`.
    pub fn prune_up_to(&self, mark_delete: Position) {
        self.counts.retain(|position, _| *position > mark_delete);
    }
}
