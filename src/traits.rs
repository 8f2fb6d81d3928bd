//! # Cache Trait Hierarchy
//!
//! This module defines the capability traits shared by all in-memory policy
//! cores, so that generic code can work over any eviction policy while the
//! unified [`Cache`](crate::cache::Cache) dispatches over a closed tagged
//! enum for speed.
//!
//! ```text
//!                 ┌─────────────────────────────────────────┐
//!                 │             CacheMap<V>                 │
//!                 │                                         │
//!                 │  insert(&mut, CacheKey, Arc<V>)         │
//!                 │  get(&mut, &CacheKey) → Option<Arc<V>>  │
//!                 │  peek(&, &CacheKey) → Option<Arc<V>>    │
//!                 │  remove / contains / len / keys / clear │
//!                 └────────────────────┬────────────────────┘
//!                                      │
//!                                      ▼
//!                 ┌─────────────────────────────────────────┐
//!                 │           EvictingCache<V>              │
//!                 │                                         │
//!                 │  insert_cold(&mut, CacheKey, Arc<V>)    │
//!                 │  pop_victim() → (CacheKey, Arc<V>)      │
//!                 │  peek_victim() → (&CacheKey, &Arc<V>)   │
//!                 └─────────────────────────────────────────┘
//! ```
//!
//! ## Division of responsibility
//!
//! Policy cores order entries and select victims; they never evict on their
//! own. The owning [`Cache`](crate::cache::Cache) enforces capacity, because
//! eviction may involve demoting the victim to a durable archive, and that
//! transfer belongs above the policy layer. `insert` therefore grows the
//! core unconditionally; callers pop a victim first when at capacity.
//!
//! `insert_cold` is the archive-load path: the entry is placed *below* all
//! existing entries in eviction order (and with a zero access count where
//! counts exist), so freshly re-hydrated entries are the first to go when
//! memory pressure returns.
//!
//! ## Writer semantics
//!
//! `get` updates policy metadata (recency stamps, access counts) and is a
//! writer in the concurrency sense; `peek` never touches metadata. There is
//! no reader/writer distinction at the lock above this layer.

use std::sync::Arc;

use crate::key::CacheKey;

/// Core mapping operations shared by every policy core.
pub trait CacheMap<V> {
    /// Inserts an entry, returning the previous value if the key existed.
    ///
    /// Never evicts; the caller enforces capacity (see module docs).
    fn insert(&mut self, key: CacheKey, value: Arc<V>) -> Option<Arc<V>>;

    /// Looks up a value and records the access in policy metadata.
    fn get(&mut self, key: &CacheKey) -> Option<Arc<V>>;

    /// Looks up a value without touching policy metadata.
    fn peek(&self, key: &CacheKey) -> Option<Arc<V>>;

    /// Removes an entry by key.
    fn remove(&mut self, key: &CacheKey) -> Option<Arc<V>>;

    /// Checks key presence without touching policy metadata.
    fn contains(&self, key: &CacheKey) -> bool;

    /// Number of resident entries.
    fn len(&self) -> usize;

    /// `true` when no entries are resident.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the resident keys, in no particular order.
    fn keys(&self) -> Vec<CacheKey>;

    /// Removes all entries.
    fn clear(&mut self);
}

/// Victim selection and cold insertion, for policies that evict.
pub trait EvictingCache<V>: CacheMap<V> {
    /// Inserts an entry at the bottom of the eviction order.
    ///
    /// Used when re-hydrating from an archive: loaded entries must not
    /// displace the working set's standing.
    fn insert_cold(&mut self, key: CacheKey, value: Arc<V>) -> Option<Arc<V>>;

    /// Removes and returns the policy's current victim.
    ///
    /// Returns `None` when the core is empty (or, for unbounded cores,
    /// always).
    fn pop_victim(&mut self) -> Option<(CacheKey, Arc<V>)>;

    /// The entry `pop_victim` would remove, without removing it.
    fn peek_victim(&self) -> Option<(&CacheKey, &Arc<V>)>;
}
