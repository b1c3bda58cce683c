//! Sticky-key consumer selection.
//!
//! The selector maps a routing key to the live consumer that currently owns
//! its hash slot. The dispatcher treats it as a pure function of current
//! membership: selections are never cached across entries, and membership
//! reshaping happens under the dispatcher lock.
//!
//! [`ConsistentHashSelector`] is the production implementation, built on the
//! `conhash` ring with [`VIRTUAL_NODES_PER_CONSUMER`] points per consumer.
//! Consistent hashing keeps a membership change local: only keys owned by
//! the added or removed consumer move; every other key keeps its owner.

use conhash::{ConsistentHash, Node};
use std::collections::HashMap;

use crate::constants::VIRTUAL_NODES_PER_CONSUMER;
use crate::types::ConsumerId;

/// Maps sticky keys to live consumers.
///
/// Callers serialize `add_consumer`/`remove_consumer` with dispatch (the
/// dispatcher lock); `select` is read-only.
pub trait StickyKeySelector: Send {
    /// The consumer owning `key`'s hash slot, if any consumer is registered.
    fn select(&self, key: &[u8]) -> Option<ConsumerId>;

    /// Add a consumer's points to the ring.
    fn add_consumer(&mut self, id: ConsumerId, name: &str);

    /// Remove a consumer's points from the ring.
    fn remove_consumer(&mut self, id: ConsumerId);

    /// Number of registered consumers.
    fn consumer_count(&self) -> usize;

    /// Whether no consumer is registered.
    fn is_empty(&self) -> bool {
        self.consumer_count() == 0
    }
}

/// One consumer's presence on the hash ring.
///
/// The ring name embeds the consumer id so two consumers with the same
/// display name occupy distinct ring points.
#[derive(Debug, Clone)]
struct RingMember {
    id: ConsumerId,
    label: String,
}

impl Node for RingMember {
    fn name(&self) -> String {
        format!("{}-{}", self.label, self.id)
    }
}

/// Consistent-hash ring selector.
pub struct ConsistentHashSelector {
    ring: ConsistentHash<RingMember>,
    members: HashMap<ConsumerId, RingMember>,
    points_per_consumer: usize,
}

impl ConsistentHashSelector {
    /// Create a selector with the default ring density.
    pub fn new() -> Self {
        Self::with_points(VIRTUAL_NODES_PER_CONSUMER)
    }

    /// Create a selector with `points_per_consumer` ring points per member.
    pub fn with_points(points_per_consumer: usize) -> Self {
        Self {
            ring: ConsistentHash::new(),
            members: HashMap::new(),
            points_per_consumer: points_per_consumer.max(1),
        }
    }
}

impl Default for ConsistentHashSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl StickyKeySelector for ConsistentHashSelector {
    fn select(&self, key: &[u8]) -> Option<ConsumerId> {
        self.ring.get(key).map(|member| member.id)
    }

    fn add_consumer(&mut self, id: ConsumerId, name: &str) {
        let member = RingMember {
            id,
            label: name.to_string(),
        };
        self.ring.add(&member, self.points_per_consumer);
        self.members.insert(id, member);
    }

    fn remove_consumer(&mut self, id: ConsumerId) {
        if let Some(member) = self.members.remove(&id) {
            self.ring.remove(&member);
        }
    }

    fn consumer_count(&self) -> usize {
        self.members.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector_with(names: &[&str]) -> (ConsistentHashSelector, Vec<ConsumerId>) {
        let mut selector = ConsistentHashSelector::new();
        let ids: Vec<ConsumerId> = names
            .iter()
            .map(|name| {
                let id = ConsumerId::allocate();
                selector.add_consumer(id, name);
                id
            })
            .collect();
        (selector, ids)
    }

    #[test]
    fn test_empty_ring_selects_nothing() {
        let selector = ConsistentHashSelector::new();
        assert!(selector.is_empty());
        assert_eq!(selector.select(b"any-key"), None);
    }

    #[test]
    fn test_single_consumer_owns_every_key() {
        let (selector, ids) = selector_with(&["only"]);
        for key in [b"a".as_ref(), b"b", b"c", b"\x00\xff"] {
            assert_eq!(selector.select(key), Some(ids[0]));
        }
    }

    #[test]
    fn test_selection_is_deterministic() {
        let (selector, _) = selector_with(&["a", "b", "c"]);
        for key in 0..50u32 {
            let key = key.to_be_bytes();
            assert_eq!(selector.select(&key), selector.select(&key));
        }
    }

    #[test]
    fn test_removal_only_moves_removed_consumers_keys() {
        let (mut selector, ids) = selector_with(&["a", "b", "c"]);

        let keys: Vec<Vec<u8>> = (0..200u32).map(|k| k.to_be_bytes().to_vec()).collect();
        let before: Vec<ConsumerId> = keys
            .iter()
            .map(|k| selector.select(k).unwrap())
            .collect();

        selector.remove_consumer(ids[2]);

        for (key, owner) in keys.iter().zip(before.iter()) {
            let after = selector.select(key).unwrap();
            if *owner == ids[2] {
                // Orphaned keys must land on a surviving consumer.
                assert_ne!(after, ids[2]);
            } else {
                // Keys the removed consumer never owned must not move.
                assert_eq!(after, *owner);
            }
        }
    }

    #[test]
    fn test_same_name_consumers_are_distinct_members() {
        let (mut selector, ids) = selector_with(&["worker", "worker"]);
        assert_eq!(selector.consumer_count(), 2);
        selector.remove_consumer(ids[0]);
        assert_eq!(selector.consumer_count(), 1);
        assert_eq!(selector.select(b"key"), Some(ids[1]));
    }

    #[test]
    fn test_distribution_is_roughly_even() {
        let (selector, ids) = selector_with(&["a", "b", "c", "d"]);
        let mut counts: HashMap<ConsumerId, usize> = HashMap::new();
        for key in 0..1000u32 {
            let owner = selector.select(&key.to_be_bytes()).unwrap();
            *counts.entry(owner).or_insert(0) += 1;
        }
        for id in &ids {
            let share = counts.get(id).copied().unwrap_or(0);
            // Each of 4 consumers should get a meaningful share of 1000 keys.
            assert!(share > 100, "consumer {} got {} of 1000 keys", id, share);
        }
    }
}
