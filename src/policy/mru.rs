//! MRU (Most Recently Used) cache replacement policy.
//!
//! Evicts the entry with the **largest** access stamp, the opposite of LRU.
//! Useful for cyclic scans where the entry just touched is the one least
//! likely to be needed again soon.
//!
//! Storage is identical to [`LruCore`](super::lru::LruCore) (hash map plus
//! stamp index); only the victim end of the index differs, so see that
//! module for the layout diagram. Entries loaded from an archive still sort
//! below all touched entries; for MRU that makes them the *last* victims,
//! which keeps a freshly re-hydrated working set resident while the scan
//! churns above it.

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

/// Single-threaded MRU core; thread safety is provided by the owning cache's
/// mutex.
#[derive(Debug)]
pub struct MruCore<V> {
    map: FxHashMap<CacheKey, Slot<V>>,
    recency: BTreeMap<u64, CacheKey>,
    clock: StampClock,
}

impl<V> MruCore<V> {
    /// Creates an empty core, pre-sizing the map for `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        MruCore {
            map: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            recency: BTreeMap::new(),
            clock: StampClock::new(),
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
}

impl<V> CacheMap<V> for MruCore<V> {
    fn insert(&mut self, key: CacheKey, value: Arc<V>) -> Option<Arc<V>> {
        let stamp = self.clock.next();
        self.insert_with_stamp(key, value, stamp)
    }

    fn get(&mut self, key: &CacheKey) -> Option<Arc<V>> {
        if !self.map.contains_key(key) {
            return None;
        }
        if let Some(slot) = self.map.get_mut(key) {
            self.recency.remove(&slot.stamp);
            slot.stamp = self.clock.next();
            self.recency.insert(slot.stamp, key.clone());
        }
        self.map.get(key).map(|slot| Arc::clone(&slot.value))
    }

    fn peek(&self, key: &CacheKey) -> Option<Arc<V>> {
        self.map.get(key).map(|slot| Arc::clone(&slot.value))
    }

    fn remove(&mut self, key: &CacheKey) -> Option<Arc<V>> {
        let slot = self.map.remove(key)?;
        self.recency.remove(&slot.stamp);
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

impl<V> EvictingCache<V> for MruCore<V> {
    fn insert_cold(&mut self, key: CacheKey, value: Arc<V>) -> Option<Arc<V>> {
        // A resident key keeps its standing; only the value is refreshed.
        if let Some(slot) = self.map.get_mut(&key) {
            return Some(std::mem::replace(&mut slot.value, value));
        }
        let stamp = self.clock.next_cold();
        self.insert_with_stamp(key, value, stamp)
    }

    fn pop_victim(&mut self) -> Option<(CacheKey, Arc<V>)> {
        let (_, key) = self.recency.pop_last()?;
        let slot = self.map.remove(&key)?;
        Some((key, slot.value))
    }

    fn peek_victim(&self) -> Option<(&CacheKey, &Arc<V>)> {
        let (_, key) = self.recency.last_key_value()?;
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
    fn victim_is_most_recently_inserted() {
        let mut core = MruCore::new(4);
        for v in [1i64, 2, 3] {
            core.insert(key(v), Arc::new(v));
        }
        let (k, _) = core.pop_victim().unwrap();
        assert_eq!(k, key(3));
    }

    #[test]
    fn get_marks_entry_as_next_victim() {
        let mut core = MruCore::new(4);
        for v in [1i64, 2, 3] {
            core.insert(key(v), Arc::new(v));
        }
        core.get(&key(1));
        let (k, _) = core.pop_victim().unwrap();
        assert_eq!(k, key(1));
    }

    #[test]
    fn cold_entries_are_evicted_last() {
        let mut core = MruCore::new(4);
        core.insert(key(1), Arc::new(1i64));
        core.insert_cold(key(2), Arc::new(2i64));
        let (k, _) = core.pop_victim().unwrap();
        assert_eq!(k, key(1));
        let (k, _) = core.pop_victim().unwrap();
        assert_eq!(k, key(2));
    }
}
