//! Tests for consistent-hash consumer selection.

use keyshared::dispatch::{ConsistentHashSelector, StickyKeySelector};
use keyshared::types::ConsumerId;
use std::collections::HashMap;

fn build(names: &[&str]) -> (ConsistentHashSelector, Vec<ConsumerId>) {
    let mut selector = ConsistentHashSelector::new();
    let ids = names
        .iter()
        .map(|name| {
            let id = ConsumerId::allocate();
            selector.add_consumer(id, name);
            id
        })
        .collect();
    (selector, ids)
}

fn keys(n: u32) -> Vec<Vec<u8>> {
    (0..n).map(|k| format!("key-{}", k).into_bytes()).collect()
}

#[test]
fn test_selection_deterministic_for_fixed_membership() {
    let (selector, _) = build(&["a", "b", "c"]);
    for key in keys(100) {
        assert_eq!(selector.select(&key), selector.select(&key));
    }
}

#[test]
fn test_two_rings_with_same_membership_agree() {
    // Determinism must hold across selector instances, not just calls:
    // a restarted broker rebuilds the ring and must route keys the same way.
    let mut first = ConsistentHashSelector::new();
    let mut second = ConsistentHashSelector::new();
    let ids: Vec<ConsumerId> = (0..3).map(|_| ConsumerId::allocate()).collect();
    for (index, id) in ids.iter().enumerate() {
        let name = format!("consumer-{}", index);
        first.add_consumer(*id, &name);
        second.add_consumer(*id, &name);
    }

    for key in keys(200) {
        assert_eq!(first.select(&key), second.select(&key));
    }
}

#[test]
fn test_adding_consumer_only_claims_keys() {
    let (mut selector, _ids) = build(&["a", "b"]);
    let keys = keys(300);
    let before: Vec<ConsumerId> = keys.iter().map(|k| selector.select(k).unwrap()).collect();

    let newcomer = ConsumerId::allocate();
    selector.add_consumer(newcomer, "c");

    for (key, owner) in keys.iter().zip(before.iter()) {
        let after = selector.select(key).unwrap();
        // A key either stays put or moves to the newcomer; it never
        // migrates between survivors.
        assert!(after == *owner || after == newcomer);
    }
}

#[test]
fn test_removing_consumer_only_orphans_its_keys() {
    let (mut selector, ids) = build(&["a", "b", "c"]);
    let keys = keys(300);
    let before: Vec<ConsumerId> = keys.iter().map(|k| selector.select(k).unwrap()).collect();

    selector.remove_consumer(ids[1]);

    for (key, owner) in keys.iter().zip(before.iter()) {
        let after = selector.select(key).unwrap();
        if *owner == ids[1] {
            assert_ne!(after, ids[1]);
        } else {
            assert_eq!(after, *owner);
        }
    }
}

#[test]
fn test_distribution_across_consumers() {
    let (selector, ids) = build(&["a", "b", "c"]);
    let mut counts: HashMap<ConsumerId, usize> = HashMap::new();
    for key in keys(3000) {
        *counts.entry(selector.select(&key).unwrap()).or_insert(0) += 1;
    }

    for id in &ids {
        let share = counts.get(id).copied().unwrap_or(0);
        assert!(
            share > 300,
            "consumer {} owns only {} of 3000 keys",
            id,
            share
        );
    }
}

#[test]
fn test_empty_selector_routes_nothing() {
    let (mut selector, ids) = build(&["a"]);
    selector.remove_consumer(ids[0]);
    assert!(selector.is_empty());
    assert_eq!(selector.select(b"key"), None);
}

#[test]
fn test_membership_count_tracks_changes() {
    let (mut selector, ids) = build(&["a", "b"]);
    assert_eq!(selector.consumer_count(), 2);
    selector.remove_consumer(ids[0]);
    assert_eq!(selector.consumer_count(), 1);
    // Removing twice is a no-op.
    selector.remove_consumer(ids[0]);
    assert_eq!(selector.consumer_count(), 1);
}
