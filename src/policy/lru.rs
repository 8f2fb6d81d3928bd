//! LRU (Least Recently Used) cache replacement policy.
//!
//! Evicts the entry with the smallest access stamp when the owning cache is
//! at capacity. This is the default policy for workloads with temporal
//! locality.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                         LruCore<V> Layout                          │
//! │                                                                    │
//! │   map: FxHashMap<CacheKey, Slot>         recency: BTreeMap         │
//! │        key → (value, stamp)                   stamp → key          │
//! │                                                                    │
//! │   ┌──────────┬───────────────┐          ┌─────────┬─────────┐     │
//! │   │   Key    │ (Arc<V>, s)   │          │  stamp  │   key   │     │
//! │   ├──────────┼───────────────┤          ├─────────┼─────────┤     │
//! │   │  k_a     │ (v, 4)        │          │  2      │  k_b    │ ◄── │
//! │   │  k_b     │ (v, 2)        │          │  3      │  k_c    │ LRU │
//! │   │  k_c     │ (v, 3)        │          │  4      │  k_a    │ MRU │
//! │   └──────────┴───────────────┘          └─────────┴─────────┘     │
//! │                                                                    │
//! │   get(k_b): remove stamp 2 from index, restamp with 5, reinsert    │
//! │   pop_victim(): pop the smallest stamp (first entry)               │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stamps are unique per core, so recency order is total and eviction is
//! deterministic. Entries loaded from an archive take stamps below every
//! access stamp (see [`StampClock`](super::StampClock)) and are therefore
//! the first victims.
//!
//! | Operation     | Complexity | Notes                                |
//! |---------------|------------|--------------------------------------|
//! | `insert`      | O(log n)   | map insert + index insert            |
//! | `get`         | O(log n)   | restamp moves entry to MRU           |
//! | `peek`        | O(1)       | no restamp                           |
//! | `pop_victim`  | O(log n)   | first index entry                    |
//! | `remove`      | O(log n)   | map remove + index remove            |

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::key::CacheKey;
use crate::traits::{CacheMap, EvictingCache};

use super::StampClock;

#[derive(Debug)]
struct Slot<V> {
    value: Arc<V>,
    stamp: u64,
}

/// Single-threaded LRU core; thread safety is provided by the owning cache's
/// mutex.
#[derive(Debug)]
pub struct LruCore<V> {
    map: FxHashMap<CacheKey, Slot<V>>,
    recency: BTreeMap<u64, CacheKey>,
    clock: StampClock,
}

impl<V> LruCore<V> {
    /// Creates an empty core, pre-sizing the map for `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        LruCore {
            map: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            recency: BTreeMap::new(),
            clock: StampClock::new(),
        }
    }

    fn restamp(&mut self, key: &CacheKey) {
        if let Some(slot) = self.map.get_mut(key) {
            self.recency.remove(&slot.stamp);
            slot.stamp = self.clock.next();
            self.recency.insert(slot.stamp, key.clone());
        }
    }

    fn insert_with_stamp(&mut self, key: CacheKey, value: Arc<V>, stamp: u64) -> Option<Arc<V>> {
        match self.map.get_mut(&key) {
            Some(slot) => {
                let previous = std::mem::replace(&mut slot.value, value);
                self.recency.remove(&slot.stamp);
                slot.stamp = stamp;
                self.recency.insert(stamp, key);
                Some(previous)
            }
            None => {
                self.recency.insert(stamp, key.clone());
                self.map.insert(key, Slot { value, stamp });
                None
            }
        }
    }

    /// Validate internal invariants (debug builds only).
    fn validate_invariants(&self) {
        #[cfg(debug_assertions)]
        {
            debug_assert_eq!(self.map.len(), self.recency.len());
            for (stamp, key) in &self.recency {
                let slot = self.map.get(key);
                debug_assert!(slot.is_some_and(|s| s.stamp == *stamp));
            }
        }
    }
}

impl<V> CacheMap<V> for LruCore<V> {
    fn insert(&mut self, key: CacheKey, value: Arc<V>) -> Option<Arc<V>> {
        let stamp = self.clock.next();
        let previous = self.insert_with_stamp(key, value, stamp);
        self.validate_invariants();
        previous
    }

    fn get(&mut self, key: &CacheKey) -> Option<Arc<V>> {
        if !self.map.contains_key(key) {
            return None;
        }
        self.restamp(key);
        self.validate_invariants();
        self.map.get(key).map(|slot| Arc::clone(&slot.value))
    }

    fn peek(&self, key: &CacheKey) -> Option<Arc<V>> {
        self.map.get(key).map(|slot| Arc::clone(&slot.value))
    }

    fn remove(&mut self, key: &CacheKey) -> Option<Arc<V>> {
        let slot = self.map.remove(key)?;
        self.recency.remove(&slot.stamp);
        self.validate_invariants();
        Some(slot.value)
    }

    fn contains(&self, key: &CacheKey) -> bool {
        self.map.contains_key(key)
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn keys(&self) -> Vec<CacheKey> {
        self.map.keys().cloned().collect()
    }

    fn clear(&mut self) {
        self.map.clear();
        self.recency.clear();
    }
}

impl<V> EvictingCache<V> for LruCore<V> {
    fn insert_cold(&mut self, key: CacheKey, value: Arc<V>) -> Option<Arc<V>> {
        // A resident key keeps its standing; only the value is refreshed.
        if let Some(slot) = self.map.get_mut(&key) {
            return Some(std::mem::replace(&mut slot.value, value));
        }
        let stamp = self.clock.next_cold();
        let previous = self.insert_with_stamp(key, value, stamp);
        self.validate_invariants();
        previous
    }

    fn pop_victim(&mut self) -> Option<(CacheKey, Arc<V>)> {
        let (_, key) = self.recency.pop_first()?;
        let slot = self.map.remove(&key)?;
        self.validate_invariants();
        Some((key, slot.value))
    }

    fn peek_victim(&self) -> Option<(&CacheKey, &Arc<V>)> {
        let (_, key) = self.recency.first_key_value()?;
        let slot = self.map.get(key)?;
        Some((key, &slot.value))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
