//! Eviction ordering shared by variants and producer entries
//!
//! Both eviction levels remove the least valuable items first: lowest access
//! count, then oldest creation time, then lowest insertion sequence. The
//! sequence number makes the order total even when two items were created
//! within the same clock tick.
//!
//! Victim selection rebuilds a min-heap from a full scan on every eviction.
//! Capacities are small, so the O(n log n) cost per eviction is acceptable.

use chrono::{DateTime, Utc};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;

/// Composite rank used to decide which item is evicted first.
///
/// Lower ranks are evicted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionRank {
    /// Number of recorded accesses
    pub access_count: u64,
    /// Creation time of the item
    pub created_at: DateTime<Utc>,
    /// Per-index insertion sequence number
    pub sequence: u64,
}

impl Ord for EvictionRank {
    fn cmp(&self, other: &Self) -> Ordering {
        self.access_count
            .cmp(&other.access_count)
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for EvictionRank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Anything that can be ranked for eviction.
pub trait Evictable {
    /// Current eviction rank of this item
    fn eviction_rank(&self) -> EvictionRank;
}

/// Pick the `count` lowest-ranked keys of `items`, lowest first.
///
/// Requesting more victims than there are items is a logic error: the caller
/// computes `count` from a capacity that validation guarantees is non-zero.
pub fn select_victims<K, V>(items: &HashMap<K, V>, count: usize) -> Vec<K>
where
    K: Clone + Eq + Hash + Ord,
    V: Evictable,
{
    debug_assert!(
        count <= items.len(),
        "eviction requested {count} victims from {} items",
        items.len()
    );

    let mut heap: BinaryHeap<Reverse<(EvictionRank, &K)>> = items
        .iter()
        .map(|(key, item)| Reverse((item.eviction_rank(), key)))
        .collect();

    let mut victims = Vec::with_capacity(count);
    while victims.len() < count {
        let Some(Reverse((_, key))) = heap.pop() else {
            break;
        };
        victims.push(key.clone());
    }
    victims
}
