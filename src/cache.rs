//! # Unified cache
//!
//! [`Cache`] wraps one policy core behind a consistent API, enforces the
//! capacity bound, and owns the optional archive binding. Policy dispatch
//! is a closed tagged enum rather than virtual indirection: the policy set
//! is fixed, and matching is cheaper and clearer than a vtable.
//!
//! ```text
//!                       ┌─────────────────────────┐
//!                       │        Cache<V>         │
//!                       │  capacity · policy tag  │
//!                       └───────────┬─────────────┘
//!             ┌─────────┬───────────┼───────────┬─────────────┐
//!             ▼         ▼           ▼           ▼             ▼
//!          LruCore   LfuCore     MruCore    RandomCore  UnboundedCore
//!                                                      (PassThrough has
//!                                                       no core at all)
//!                       │
//!                       ▼  demote on eviction / promote on miss
//!               ┌──────────────────┐
//!               │  Arc<dyn Archive>│  (null archive when detached)
//!               └──────────────────┘
//! ```
//!
//! ## Capacity and eviction
//!
//! Size never exceeds capacity after any mutation: `put` pops the policy's
//! victim first when a new key would overflow. If an archive is attached,
//! the victim is written there (demotion) *after* being unlinked from
//! memory; a failed demotion completes the eviction and the insert, and the
//! error surfaces to the caller — the cache stays correct even when the
//! archive is transiently down.
//!
//! ## Pass-through (capacity 0)
//!
//! [`CachePolicy::PassThrough`] keeps nothing in memory: every `put`
//! writes straight to the archive (or discards when detached), every read
//! goes to the archive, and `len()` is always zero.
//!
//! ## Archive protocol
//!
//! | Operation              | Effect                                         |
//! |------------------------|------------------------------------------------|
//! | [`Cache::load`]        | pull archive entries into memory, *cold*       |
//! | [`Cache::dump`]        | push resident entries to the archive           |
//! | [`Cache::sync`]        | align both sides; the cache's values win       |
//! | [`Cache::drop_working_set`] | forget memory, leave the archive alone    |
//! | [`Cache::promote`]     | archive → memory for one key (decorator miss)  |
//!
//! Loaded entries enter at the bottom of the eviction order, so a bulk
//! `load` cannot flush the hot working set.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::archive::{Archive, NullArchive};
use crate::encode::Encoder;
use crate::error::{Error, Result};
use crate::key::CacheKey;
use crate::policy::{LfuCore, LruCore, MruCore, RandomCore, UnboundedCore};
use crate::traits::{CacheMap, EvictingCache};

/// Eviction policy tags accepted by [`Cache::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Evict the least recently used entry.
    Lru,
    /// Evict the least frequently used entry (ties fall back to LRU).
    Lfu,
    /// Evict the most recently used entry.
    Mru,
    /// Evict a uniformly random entry.
    Rr,
    /// Never evict; capacity is ignored.
    Unbounded,
    /// Keep nothing; reads and writes go to the archive.
    PassThrough,
}

impl CachePolicy {
    /// Short tag used in diagnostics and stats displays.
    pub fn tag(&self) -> &'static str {
        match self {
            CachePolicy::Lru => "lru",
            CachePolicy::Lfu => "lfu",
            CachePolicy::Mru => "mru",
            CachePolicy::Rr => "rr",
            CachePolicy::Unbounded => "inf",
            CachePolicy::PassThrough => "no",
        }
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

enum CacheInner<V> {
    Lru(LruCore<V>),
    Lfu(LfuCore<V>),
    Mru(MruCore<V>),
    Rr(RandomCore<V>),
    Unbounded(UnboundedCore<V>),
    PassThrough,
}

/// Outcome of a tracked lookup, distinguishing memory hits from archive
/// promotions so the decorator can count them separately.
#[derive(Debug)]
pub enum Lookup<V> {
    /// Found in memory.
    Hit(Arc<V>),
    /// Found in the archive and promoted.
    Loaded(Arc<V>),
    /// Absent from both.
    Miss,
}

/// A bounded in-memory mapping with an eviction policy and an optional
/// durable archive.
pub struct Cache<V> {
    inner: CacheInner<V>,
    policy: CachePolicy,
    capacity: Option<usize>,
    archive: Arc<dyn Archive>,
    encoder: Encoder,
}

impl<V> Cache<V> {
    /// Creates a cache with the given policy and capacity.
    ///
    /// `capacity` is ignored by [`CachePolicy::Unbounded`] and forced to
    /// zero by [`CachePolicy::PassThrough`]; every other policy requires a
    /// nonzero bound.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when a bounded policy is given capacity zero (use
    /// `PassThrough` for a cacheless front).
    pub fn new(policy: CachePolicy, capacity: usize) -> Result<Self> {
        let (inner, capacity) = match policy {
            CachePolicy::Unbounded => (CacheInner::Unbounded(UnboundedCore::new()), None),
            CachePolicy::PassThrough => (CacheInner::PassThrough, Some(0)),
            bounded => {
                if capacity == 0 {
                    return Err(Error::Config(format!(
                        "policy '{bounded}' requires a nonzero capacity; use PassThrough for capacity 0"
                    )));
                }
                let inner = match bounded {
                    CachePolicy::Lru => CacheInner::Lru(LruCore::new(capacity)),
                    CachePolicy::Lfu => CacheInner::Lfu(LfuCore::new(capacity)),
                    CachePolicy::Mru => CacheInner::Mru(MruCore::new(capacity)),
                    CachePolicy::Rr => CacheInner::Rr(RandomCore::new(capacity)),
                    // Handled above; repeated here to keep the match total.
                    CachePolicy::Unbounded => CacheInner::Unbounded(UnboundedCore::new()),
                    CachePolicy::PassThrough => CacheInner::PassThrough,
                };
                (inner, Some(capacity))
            }
        };
        Ok(Cache {
            inner,
            policy,
            capacity,
            archive: Arc::new(NullArchive),
            encoder: Encoder::default(),
        })
    }

    /// Attaches an archive, returning the cache for chaining.
    pub fn with_archive(mut self, archive: Arc<dyn Archive>) -> Self {
        self.archive = archive;
        self
    }

    /// Replaces the attached archive.
    pub fn attach(&mut self, archive: Arc<dyn Archive>) {
        self.archive = archive;
    }

    /// Detaches the archive, leaving the null archive in its place, and
    /// returns the previous handle.
    pub fn detach(&mut self) -> Arc<dyn Archive> {
        std::mem::replace(&mut self.archive, Arc::new(NullArchive))
    }

    /// `true` when a non-null archive is attached.
    pub fn archived(&self) -> bool {
        !self.archive.is_null()
    }

    /// Shared handle to the attached archive.
    pub fn archive(&self) -> Arc<dyn Archive> {
        Arc::clone(&self.archive)
    }

    /// This cache's policy tag.
    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Capacity bound; `None` means unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Number of resident entries (always zero for pass-through).
    pub fn len(&self) -> usize {
        match &self.inner {
            CacheInner::Lru(core) => core.len(),
            CacheInner::Lfu(core) => core.len(),
            CacheInner::Mru(core) => core.len(),
            CacheInner::Rr(core) => core.len(),
            CacheInner::Unbounded(core) => core.len(),
            CacheInner::PassThrough => 0,
        }
    }

    /// `true` when no entries are resident.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks residency without touching policy metadata or the archive.
    pub fn contains(&self, key: &CacheKey) -> bool {
        match &self.inner {
            CacheInner::Lru(core) => core.contains(key),
            CacheInner::Lfu(core) => core.contains(key),
            CacheInner::Mru(core) => core.contains(key),
            CacheInner::Rr(core) => core.contains(key),
            CacheInner::Unbounded(core) => core.contains(key),
            CacheInner::PassThrough => false,
        }
    }

    /// Snapshot of the resident keys.
    pub fn keys(&self) -> Vec<CacheKey> {
        match &self.inner {
            CacheInner::Lru(core) => core.keys(),
            CacheInner::Lfu(core) => core.keys(),
            CacheInner::Mru(core) => core.keys(),
            CacheInner::Rr(core) => core.keys(),
            CacheInner::Unbounded(core) => core.keys(),
            CacheInner::PassThrough => Vec::new(),
        }
    }

    /// Reads a resident value without updating policy metadata.
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<V>> {
        match &self.inner {
            CacheInner::Lru(core) => core.peek(key),
            CacheInner::Lfu(core) => core.peek(key),
            CacheInner::Mru(core) => core.peek(key),
            CacheInner::Rr(core) => core.peek(key),
            CacheInner::Unbounded(core) => core.peek(key),
            CacheInner::PassThrough => None,
        }
    }

    /// Removes a resident entry. The archive is untouched.
    pub fn delete(&mut self, key: &CacheKey) -> Option<Arc<V>> {
        match &mut self.inner {
            CacheInner::Lru(core) => core.remove(key),
            CacheInner::Lfu(core) => core.remove(key),
            CacheInner::Mru(core) => core.remove(key),
            CacheInner::Rr(core) => core.remove(key),
            CacheInner::Unbounded(core) => core.remove(key),
            CacheInner::PassThrough => None,
        }
    }

    /// Snapshot iterator over resident entries, in no particular order.
    ///
    /// Does not touch policy metadata.
    pub fn iter(&self) -> impl Iterator<Item = (CacheKey, Arc<V>)> + '_ {
        self.keys()
            .into_iter()
            .filter_map(|key| self.peek(&key).map(|value| (key, value)))
    }

    /// Removes all resident entries. Alias of [`Cache::drop_working_set`];
    /// the archive is untouched either way.
    pub fn clear(&mut self) {
        self.drop_working_set();
    }

    /// Discards the in-memory working set. The archive is untouched.
    pub fn drop_working_set(&mut self) {
        match &mut self.inner {
            CacheInner::Lru(core) => core.clear(),
            CacheInner::Lfu(core) => core.clear(),
            CacheInner::Mru(core) => core.clear(),
            CacheInner::Rr(core) => core.clear(),
            CacheInner::Unbounded(core) => core.clear(),
            CacheInner::PassThrough => {}
        }
    }

    fn core_get(&mut self, key: &CacheKey) -> Option<Arc<V>> {
        match &mut self.inner {
            CacheInner::Lru(core) => core.get(key),
            CacheInner::Lfu(core) => core.get(key),
            CacheInner::Mru(core) => core.get(key),
            CacheInner::Rr(core) => core.get(key),
            CacheInner::Unbounded(core) => core.get(key),
            CacheInner::PassThrough => None,
        }
    }

    fn core_insert(&mut self, key: CacheKey, value: Arc<V>) -> Option<Arc<V>> {
        match &mut self.inner {
            CacheInner::Lru(core) => core.insert(key, value),
            CacheInner::Lfu(core) => core.insert(key, value),
            CacheInner::Mru(core) => core.insert(key, value),
            CacheInner::Rr(core) => core.insert(key, value),
            CacheInner::Unbounded(core) => core.insert(key, value),
            CacheInner::PassThrough => None,
        }
    }

    fn core_insert_cold(&mut self, key: CacheKey, value: Arc<V>) -> Option<Arc<V>> {
        match &mut self.inner {
            CacheInner::Lru(core) => core.insert_cold(key, value),
            CacheInner::Lfu(core) => core.insert_cold(key, value),
            CacheInner::Mru(core) => core.insert_cold(key, value),
            CacheInner::Rr(core) => core.insert_cold(key, value),
            CacheInner::Unbounded(core) => core.insert_cold(key, value),
            CacheInner::PassThrough => None,
        }
    }

    fn pop_victim(&mut self) -> Option<(CacheKey, Arc<V>)> {
        match &mut self.inner {
            CacheInner::Lru(core) => core.pop_victim(),
            CacheInner::Lfu(core) => core.pop_victim(),
            CacheInner::Mru(core) => core.pop_victim(),
            CacheInner::Rr(core) => core.pop_victim(),
            CacheInner::Unbounded(core) => core.pop_victim(),
            CacheInner::PassThrough => None,
        }
    }

    fn at_capacity(&self) -> bool {
        match self.capacity {
            Some(cap) => self.len() >= cap,
            None => false,
        }
    }
}

impl<V> Cache<V>
where
    V: Serialize + DeserializeOwned,
{
    /// Looks up a key.
    ///
    /// For in-memory policies this touches only the working set and updates
    /// policy metadata on a hit. For pass-through caches the read goes to
    /// the archive.
    pub fn get(&mut self, key: &CacheKey) -> Result<Option<Arc<V>>> {
        if matches!(self.inner, CacheInner::PassThrough) {
            return Ok(self.read_archive(key)?.map(Arc::new));
        }
        Ok(self.core_get(key))
    }

    /// Inserts an entry, evicting (and demoting) a victim first when the
    /// cache is at capacity.
    ///
    /// # Errors
    ///
    /// [`Error::Archive`] when a demotion write fails. The eviction and the
    /// insert still complete; only the victim's value is lost (it may
    /// already exist in the archive from an earlier dump). See the module
    /// docs.
    pub fn put(&mut self, key: CacheKey, value: Arc<V>) -> Result<()> {
        if matches!(self.inner, CacheInner::PassThrough) {
            let bytes = self.encoder.encode(value.as_ref())?;
            return self.archive.put(&key, &bytes);
        }

        let mut demotion_failure = None;
        if self.at_capacity() && !self.contains(&key) {
            if let Some((victim_key, victim_value)) = self.pop_victim() {
                if let Err(err) = self.demote(&victim_key, victim_value.as_ref()) {
                    tracing::warn!(
                        key = %victim_key,
                        error = %err,
                        "demotion failed; evicted entry lost from memory"
                    );
                    demotion_failure = Some(err);
                }
            }
        }
        self.core_insert(key, value);

        match demotion_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Reads a key from the archive and inserts it into memory with normal
    /// (touched) standing, returning the value.
    ///
    /// This is the decorator's miss path; returns `Ok(None)` when the
    /// archive misses too, without touching memory.
    pub fn promote(&mut self, key: &CacheKey) -> Result<Option<Arc<V>>> {
        let Some(value) = self.read_archive(key)? else {
            return Ok(None);
        };
        let value = Arc::new(value);
        if !matches!(self.inner, CacheInner::PassThrough) {
            self.put(key.clone(), Arc::clone(&value))?;
        }
        Ok(Some(value))
    }

    /// Tracked lookup for the decorator: memory hit, archive promotion, or
    /// double miss, as one observation.
    pub fn lookup(&mut self, key: &CacheKey) -> Result<Lookup<V>> {
        if !matches!(self.inner, CacheInner::PassThrough) {
            if let Some(value) = self.core_get(key) {
                return Ok(Lookup::Hit(value));
            }
        }
        match self.promote(key)? {
            Some(value) => Ok(Lookup::Loaded(value)),
            None => Ok(Lookup::Miss),
        }
    }

    /// Pulls archive entries into memory at cold standing.
    ///
    /// With `keys = None` every archived key is loaded. Resident keys are
    /// overwritten with the archive's values. Returns the number of entries
    /// loaded. No-op for pass-through caches.
    pub fn load(&mut self, keys: Option<&[CacheKey]>) -> Result<usize> {
        if matches!(self.inner, CacheInner::PassThrough) || !self.archived() {
            return Ok(0);
        }
        let keyset: Vec<CacheKey> = match keys {
            Some(keys) => keys.to_vec(),
            None => self.archive.keys()?,
        };
        let mut loaded = 0;
        for key in keyset {
            let Some(value) = self.read_archive(&key)? else {
                continue;
            };
            if self.at_capacity() && !self.contains(&key) {
                if let Some((victim_key, victim_value)) = self.pop_victim() {
                    self.demote(&victim_key, victim_value.as_ref())?;
                }
            }
            self.core_insert_cold(key, Arc::new(value));
            loaded += 1;
        }
        tracing::debug!(loaded, "archive load complete");
        Ok(loaded)
    }

    /// Pushes resident entries to the archive.
    ///
    /// With `keys = None` every resident entry is dumped; otherwise only
    /// the intersection of `keys` with the working set. Returns the number
    /// of entries written.
    pub fn dump(&self, keys: Option<&[CacheKey]>) -> Result<usize> {
        if !self.archived() {
            return Ok(0);
        }
        let keyset: Vec<CacheKey> = match keys {
            Some(keys) => keys.to_vec(),
            None => self.keys(),
        };
        let mut entries = Vec::with_capacity(keyset.len());
        for key in keyset {
            if let Some(value) = self.peek(&key) {
                entries.push((key, self.encoder.encode(value.as_ref())?));
            }
        }
        let written = entries.len();
        self.archive.put_many(&entries)?;
        tracing::debug!(written, "archive dump complete");
        Ok(written)
    }

    /// Aligns memory and archive: dump first, then load, so colliding keys
    /// end with the cache's value on both sides.
    pub fn sync(&mut self) -> Result<()> {
        self.dump(None)?;
        self.load(None)?;
        Ok(())
    }

    fn demote(&self, key: &CacheKey, value: &V) -> Result<()> {
        let bytes = self.encoder.encode(value)?;
        self.archive.put(key, &bytes)
    }

    fn read_archive(&self, key: &CacheKey) -> Result<Option<V>> {
        match self.archive.get(key)? {
            Some(bytes) => Ok(Some(self.encoder.decode(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl<V> fmt::Debug for Cache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("policy", &self.policy.tag())
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("archive", &self.archive.backend_name())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
