//! Unbounded (INF) cache policy.
//!
//! Grows without bound and never selects a victim. No per-entry metadata.
//! To keep memory in check, callers dump and drop the working set
//! periodically through the owning cache's archive protocol.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::key::CacheKey;
use crate::traits::{CacheMap, EvictingCache};

/// Hash-map core with no eviction.
#[derive(Debug, Default)]
pub struct UnboundedCore<V> {
    map: FxHashMap<CacheKey, Arc<V>>,
}

impl<V> UnboundedCore<V> {
    /// Creates an empty core.
    pub fn new() -> Self {
        UnboundedCore {
            map: FxHashMap::default(),
        }
    }
}

impl<V> CacheMap<V> for UnboundedCore<V> {
    fn insert(&mut self, key: CacheKey, value: Arc<V>) -> Option<Arc<V>> {
        self.map.insert(key, value)
    }

    fn get(&mut self, key: &CacheKey) -> Option<Arc<V>> {
        self.map.get(key).map(Arc::clone)
    }

    fn peek(&self, key: &CacheKey) -> Option<Arc<V>> {
        self.map.get(key).map(Arc::clone)
    }

    fn remove(&mut self, key: &CacheKey) -> Option<Arc<V>> {
        self.map.remove(key)
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
    }
}

impl<V> EvictingCache<V> for UnboundedCore<V> {
    fn insert_cold(&mut self, key: CacheKey, value: Arc<V>) -> Option<Arc<V>> {
        self.insert(key, value)
    }

    fn pop_victim(&mut self) -> Option<(CacheKey, Arc<V>)> {
        None
    }

    fn peek_victim(&self) -> Option<(&CacheKey, &Arc<V>)> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: i64) -> CacheKey {
        CacheKey::Raw(crate::value::ArgValue::Int(n))
    }

    #[test]
    fn never_selects_a_victim() {
        let mut core = UnboundedCore::new();
        for v in 0..100i64 {
            core.insert(key(v), Arc::new(v));
        }
        assert_eq!(core.len(), 100);
        assert!(core.pop_victim().is_none());
        assert!(core.peek_victim().is_none());
    }

    #[test]
    fn basic_map_operations() {
        let mut core = UnboundedCore::new();
        assert_eq!(core.insert(key(1), Arc::new(1i64)), None);
        assert_eq!(core.insert(key(1), Arc::new(2i64)), Some(Arc::new(1i64)));
        assert_eq!(core.get(&key(1)), Some(Arc::new(2i64)));
        assert_eq!(core.remove(&key(1)), Some(Arc::new(2i64)));
        assert!(core.is_empty());
    }
}
