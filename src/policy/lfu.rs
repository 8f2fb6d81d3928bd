//! LFU (Least Frequently Used) cache replacement policy.
//!
//! Evicts the entry with the smallest access count; ties fall back to LRU
//! order, which itself resolves to insertion order because stamps are
//! unique. Best for workloads with stable hot spots.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                         LfuCore<V> Layout                          │
//! │                                                                    │
//! │   map: FxHashMap<CacheKey, Slot>      order: BTreeMap              │
//! │        key → (value, count, stamp)      (count, stamp) → key       │
//! │                                                                    │
//! │   ┌────────┬──────────────────┐       ┌──────────────┬───────┐    │
//! │   │  Key   │ (v, count, s)    │       │ (count, s)   │  key  │    │
//! │   ├────────┼──────────────────┤       ├──────────────┼───────┤    │
//! │   │  k_a   │ (v, 3, 6)        │       │ (1, 5)       │  k_b  │◄LFU│
//! │   │  k_b   │ (v, 1, 5)        │       │ (3, 6)       │  k_a  │    │
//! │   └────────┴──────────────────┘       └──────────────┴───────┘    │
//! │                                                                    │
//! │   get(k_b): remove (1,5), bump to count 2, restamp, reinsert       │
//! │   pop_victim(): pop the smallest (count, stamp) pair               │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Counts initialize to 1 on insert and bump on every `get` hit. Entries
//! loaded from an archive start at count 0 with a below-base stamp, so the
//! re-hydrated portion of the cache always loses to the touched portion.

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::key::CacheKey;
use crate::traits::{CacheMap, EvictingCache};

use super::StampClock;

#[derive(Debug)]
struct Slot<V> {
    value: Arc<V>,
    count: u64,
    stamp: u64,
}

/// Single-threaded LFU core; thread safety is provided by the owning cache's
/// mutex.
#[derive(Debug)]
pub struct LfuCore<V> {
    map: FxHashMap<CacheKey, Slot<V>>,
    order: BTreeMap<(u64, u64), CacheKey>,
    clock: StampClock,
}

impl<V> LfuCore<V> {
    /// Creates an empty core, pre-sizing the map for `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        LfuCore {
            map: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            order: BTreeMap::new(),
            clock: StampClock::new(),
        }
    }

    /// Access count for a key, if present. Exposed for diagnostics and
    /// tests.
    pub fn frequency(&self, key: &CacheKey) -> Option<u64> {
        self.map.get(key).map(|slot| slot.count)
    }

    fn insert_full(
        &mut self,
        key: CacheKey,
        value: Arc<V>,
        count: u64,
        stamp: u64,
    ) -> Option<Arc<V>> {
        match self.map.get_mut(&key) {
            Some(slot) => {
                let previous = std::mem::replace(&mut slot.value, value);
                self.order.remove(&(slot.count, slot.stamp));
                slot.count = count;
                slot.stamp = stamp;
                self.order.insert((count, stamp), key);
                Some(previous)
            }
            None => {
                self.order.insert((count, stamp), key.clone());
                self.map.insert(key, Slot { value, count, stamp });
                None
            }
        }
    }
}

impl<V> CacheMap<V> for LfuCore<V> {
    fn insert(&mut self, key: CacheKey, value: Arc<V>) -> Option<Arc<V>> {
        let stamp = self.clock.next();
        // Re-inserting an existing key resets its frequency to 1, the same
        // standing a brand-new entry gets.
        self.insert_full(key, value, 1, stamp)
    }

    fn get(&mut self, key: &CacheKey) -> Option<Arc<V>> {
        let stamp = self.clock.next();
        let slot = self.map.get_mut(key)?;
        self.order.remove(&(slot.count, slot.stamp));
        slot.count += 1;
        slot.stamp = stamp;
        self.order.insert((slot.count, slot.stamp), key.clone());
        Some(Arc::clone(&slot.value))
    }

    fn peek(&self, key: &CacheKey) -> Option<Arc<V>> {
        self.map.get(key).map(|slot| Arc::clone(&slot.value))
    }

    fn remove(&mut self, key: &CacheKey) -> Option<Arc<V>> {
        let slot = self.map.remove(key)?;
        self.order.remove(&(slot.count, slot.stamp));
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
        self.order.clear();
    }
}

impl<V> EvictingCache<V> for LfuCore<V> {
    fn insert_cold(&mut self, key: CacheKey, value: Arc<V>) -> Option<Arc<V>> {
        // A resident key keeps its standing; only the value is refreshed.
        if let Some(slot) = self.map.get_mut(&key) {
            return Some(std::mem::replace(&mut slot.value, value));
        }
        let stamp = self.clock.next_cold();
        self.insert_full(key, value, 0, stamp)
    }

    fn pop_victim(&mut self) -> Option<(CacheKey, Arc<V>)> {
        let (_, key) = self.order.pop_first()?;
        let slot = self.map.remove(&key)?;
        Some((key, slot.value))
    }

    fn peek_victim(&self) -> Option<(&CacheKey, &Arc<V>)> {
        let (_, key) = self.order.first_key_value()?;
        let slot = self.map.get(key)?;
        Some((key, &slot.value))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: i64) -> CacheKey {
        CacheKey::Raw(crate::value::ArgValue::Int(n))
    }

    #[test]
    fn victim_is_lowest_count() {
        let mut core = LfuCore::new(4);
        for v in [1i64, 2, 3] {
            core.insert(key(v), Arc::new(v));
        }
        core.get(&key(1));
        core.get(&key(1));
        core.get(&key(3));
        // counts: 1 → 3, 2 → 1, 3 → 2
        let (k, _) = core.pop_victim().unwrap();
        assert_eq!(k, key(2));
    }

    #[test]
    fn count_tie_breaks_by_recency_then_insertion() {
        let mut core = LfuCore::new(4);
        for v in [1i64, 2, 3] {
            core.insert(key(v), Arc::new(v));
        }
        // All counts equal; insertion order decides.
        let (k, _) = core.pop_victim().unwrap();
        assert_eq!(k, key(1));
    }

    #[test]
    fn frequency_initializes_to_one_and_bumps_on_hit() {
        let mut core = LfuCore::new(4);
        core.insert(key(1), Arc::new(1i64));
        assert_eq!(core.frequency(&key(1)), Some(1));
        core.get(&key(1));
        assert_eq!(core.frequency(&key(1)), Some(2));
        core.peek(&key(1));
        assert_eq!(core.frequency(&key(1)), Some(2));
    }

    #[test]
    fn cold_entries_lose_to_all_touched_entries() {
        let mut core = LfuCore::new(4);
        core.insert(key(1), Arc::new(1i64));
        core.insert_cold(key(2), Arc::new(2i64));
        assert_eq!(core.frequency(&key(2)), Some(0));
        let (k, _) = core.pop_victim().unwrap();
        assert_eq!(k, key(2));
    }

    #[test]
    fn reinsert_resets_frequency() {
        let mut core = LfuCore::new(4);
        core.insert(key(1), Arc::new(1i64));
        core.get(&key(1));
        core.get(&key(1));
        assert_eq!(core.frequency(&key(1)), Some(3));
        core.insert(key(1), Arc::new(10i64));
        assert_eq!(core.frequency(&key(1)), Some(1));
    }
}
