//! # Memoized callables
//!
//! [`Memo`] binds a callable to a cache + keymap + archive triple. Each
//! call becomes a key lookup; misses invoke the wrapped function and insert
//! its result, so a later process (or the same one after a
//! [`Memo::clear`]) can re-hydrate results from the archive instead of
//! recomputing them.
//!
//! ```text
//!   call(args) ── keymap ──► key ── cache.get ──► hit? ── return
//!                                      │
//!                                 archive.get ──► load? ─ promote ─ return
//!                                      │
//!                                   f(args) ── cache.put ──► return
//! ```
//!
//! ## Building
//!
//! [`MemoBuilder`] carries the policy family as shorthand constructors:
//!
//! | Constructor                | Policy        | Working set            |
//! |----------------------------|---------------|------------------------|
//! | [`MemoBuilder::lru`]       | LRU           | bounded                |
//! | [`MemoBuilder::lfu`]       | LFU           | bounded                |
//! | [`MemoBuilder::mru`]       | MRU           | bounded                |
//! | [`MemoBuilder::rr`]        | random        | bounded                |
//! | [`MemoBuilder::inf`]       | unbounded     | grows without bound    |
//! | [`MemoBuilder::no_cache`]  | pass-through  | archive only           |
//!
//! ```
//! use memokit::memo::MemoBuilder;
//!
//! let square = MemoBuilder::lru(64)
//!     .build(|&(x,): &(i64,)| x * x)
//!     .unwrap();
//!
//! assert_eq!(*square.call(&(4,)).unwrap(), 16);
//! assert_eq!(*square.call(&(4,)).unwrap(), 16);
//! assert_eq!(square.info().hits, 1);
//! assert_eq!(square.info().misses, 1);
//! ```
//!
//! ## Safe mode
//!
//! With [`MemoBuilder::safe`], arguments that cannot be keyed bypass the
//! cache entirely: the function is invoked, its result returned, and the
//! `errors` counter incremented. Safe mode only widens the set of accepted
//! inputs; failures raised by the wrapped function itself always propagate.
//!
//! ## Locking
//!
//! All cache state sits behind one mutex per memo. The wrapped function
//! runs *outside* the critical section, so a slow computation does not
//! serialize unrelated calls; two threads racing on the same key may both
//! compute it, and the later insert wins.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::archive::{Archive, NullArchive};
use crate::cache::{Cache, CachePolicy, Lookup};
use crate::encode::Encoder;
use crate::error::Result;
use crate::key::CacheKey;
use crate::keymap::{bind_free, BoundArgs, Ignore, Keymap, Signature, ToCallArgs};

/// Cache statistics snapshot.
///
/// `loads` counts results supplied by the archive rather than recomputed;
/// `errors` counts safe-mode cache bypasses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheInfo {
    /// Calls answered from memory.
    pub hits: u64,
    /// Calls that invoked the wrapped function.
    pub misses: u64,
    /// Calls answered from the archive.
    pub loads: u64,
    /// Safe-mode bypasses (unkeyable arguments).
    pub errors: u64,
    /// Capacity bound; `None` when unbounded.
    pub maxsize: Option<usize>,
    /// Resident entries at snapshot time.
    pub size: usize,
}

impl fmt::Display for CacheInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheInfo(hit={}, miss={}, load={}, error={}, maxsize={}, size={})",
            self.hits,
            self.misses,
            self.loads,
            self.errors,
            match self.maxsize {
                Some(n) => n.to_string(),
                None => "inf".to_string(),
            },
            self.size
        )
    }
}

struct MemoState<R> {
    cache: Cache<R>,
    hits: u64,
    misses: u64,
    loads: u64,
    errors: u64,
}

/// Configuration for a [`Memo`].
pub struct MemoBuilder {
    name: String,
    policy: CachePolicy,
    capacity: usize,
    keymap: Keymap,
    typed: Option<bool>,
    ignore: Vec<Ignore>,
    signature: Option<Signature>,
    archive: Arc<dyn Archive>,
    safe: bool,
    tolerant_reads: bool,
}

impl Default for MemoBuilder {
    fn default() -> Self {
        MemoBuilder {
            name: "memo".to_owned(),
            policy: CachePolicy::Lru,
            capacity: 100,
            keymap: Keymap::default(),
            typed: None,
            ignore: Vec::new(),
            signature: None,
            archive: Arc::new(NullArchive),
            safe: false,
            tolerant_reads: false,
        }
    }
}

impl MemoBuilder {
    /// Starts from the defaults: LRU, capacity 100, flat untyped hash
    /// keymap, no archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// LRU-bounded memo with the given capacity.
    pub fn lru(capacity: usize) -> Self {
        Self::new().policy(CachePolicy::Lru).capacity(capacity)
    }

    /// LFU-bounded memo with the given capacity.
    pub fn lfu(capacity: usize) -> Self {
        Self::new().policy(CachePolicy::Lfu).capacity(capacity)
    }

    /// MRU-bounded memo with the given capacity.
    pub fn mru(capacity: usize) -> Self {
        Self::new().policy(CachePolicy::Mru).capacity(capacity)
    }

    /// Random-replacement memo with the given capacity.
    pub fn rr(capacity: usize) -> Self {
        Self::new().policy(CachePolicy::Rr).capacity(capacity)
    }

    /// Unbounded memo; dump and clear periodically to keep memory in check.
    pub fn inf() -> Self {
        Self::new().policy(CachePolicy::Unbounded)
    }

    /// Cacheless memo: every result goes straight to the archive and every
    /// lookup reads it back.
    pub fn no_cache() -> Self {
        Self::new().policy(CachePolicy::PassThrough).capacity(0)
    }

    /// Names the memo (used for diagnostics and display).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Selects the eviction policy.
    pub fn policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the capacity bound for bounded policies.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Replaces the keymap.
    pub fn keymap(mut self, keymap: Keymap) -> Self {
        self.keymap = keymap;
        self
    }

    /// Overrides the keymap's typing flag.
    pub fn typed(mut self, typed: bool) -> Self {
        self.typed = Some(typed);
        self
    }

    /// Masks arguments out of key formation.
    pub fn ignore(mut self, ignore: impl IntoIterator<Item = Ignore>) -> Self {
        self.ignore.extend(ignore);
        self
    }

    /// Declares the callable's signature for named-argument binding and
    /// defaults.
    pub fn signature(mut self, signature: Signature) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Attaches a durable archive.
    pub fn archive(mut self, archive: Arc<dyn Archive>) -> Self {
        self.archive = archive;
        self
    }

    /// Tolerates unkeyable arguments by bypassing the cache (see module
    /// docs).
    pub fn safe(mut self, safe: bool) -> Self {
        self.safe = safe;
        self
    }

    /// Treats archive read failures as misses instead of propagating them.
    pub fn tolerant_reads(mut self, tolerant: bool) -> Self {
        self.tolerant_reads = tolerant;
        self
    }

    /// Binds the configuration to a callable.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Config`] for invalid policy/capacity combinations.
    pub fn build<A, R, F>(self, func: F) -> Result<Memo<A, R, F>>
    where
        A: ToCallArgs,
        R: Serialize + DeserializeOwned,
        F: Fn(&A) -> R,
    {
        let keymap = match self.typed {
            Some(typed) => self.keymap.typed(typed),
            None => self.keymap,
        };
        let cache = Cache::new(self.policy, self.capacity)?.with_archive(self.archive);
        Ok(Memo {
            func,
            name: self.name,
            keymap,
            ignore: self.ignore,
            signature: self.signature,
            safe: self.safe,
            tolerant_reads: self.tolerant_reads,
            state: Mutex::new(MemoState {
                cache,
                hits: 0,
                misses: 0,
                loads: 0,
                errors: 0,
            }),
            _shape: PhantomData,
        })
    }
}

/// A callable bound to a cache, keymap, and archive.
///
/// See the module docs for the call path and an example.
pub struct Memo<A, R, F> {
    func: F,
    name: String,
    keymap: Keymap,
    ignore: Vec<Ignore>,
    signature: Option<Signature>,
    safe: bool,
    tolerant_reads: bool,
    state: Mutex<MemoState<R>>,
    _shape: PhantomData<fn(&A) -> R>,
}

impl<A, R, F> Memo<A, R, F>
where
    A: ToCallArgs,
    R: Serialize + DeserializeOwned,
    F: Fn(&A) -> R,
{
    /// Calls through the cache.
    ///
    /// Hit → cached value; archive hit → promoted value; double miss →
    /// invoke, insert, return. Results come back `Arc`-wrapped so repeated
    /// hits never clone the payload.
    pub fn call(&self, args: &A) -> Result<Arc<R>> {
        let key = match self.make_key(args) {
            Ok(key) => key,
            Err(err) if self.safe && err.is_key_encoding() => {
                self.state.lock().errors += 1;
                tracing::debug!(
                    memo = %self.name,
                    error = %err,
                    "unkeyable arguments; invoking without caching"
                );
                return Ok(Arc::new((self.func)(args)));
            }
            Err(err) => return Err(err),
        };

        {
            let mut state = self.state.lock();
            match state.cache.lookup(&key) {
                Ok(Lookup::Hit(value)) => {
                    state.hits += 1;
                    return Ok(value);
                }
                Ok(Lookup::Loaded(value)) => {
                    state.loads += 1;
                    return Ok(value);
                }
                Ok(Lookup::Miss) => {}
                Err(err) if self.tolerant_reads && err.is_archive() => {
                    tracing::warn!(memo = %self.name, error = %err, "archive read failed; treating as miss");
                }
                Err(err) => return Err(err),
            }
        }

        // Compute outside the lock: a slow call must not serialize others.
        let value = Arc::new((self.func)(args));

        let mut state = self.state.lock();
        state.misses += 1;
        if let Err(err) = state.cache.put(key, Arc::clone(&value)) {
            // The result is correct regardless; surface the archive trouble
            // in the log and keep the call semantics intact.
            tracing::warn!(memo = %self.name, error = %err, "insert surfaced an archive error");
        }
        Ok(value)
    }

    /// Previews the key a call would use, without calling.
    pub fn key(&self, args: &A) -> Result<CacheKey> {
        self.make_key(args)
    }

    /// Probes for a stored result without ever invoking the function.
    ///
    /// Checks memory first (without disturbing eviction order), then the
    /// archive (without promoting). Statistics are unaffected.
    pub fn lookup(&self, args: &A) -> Result<Option<Arc<R>>> {
        let key = self.make_key(args)?;
        let archive = {
            let state = self.state.lock();
            if let Some(value) = state.cache.peek(&key) {
                return Ok(Some(value));
            }
            state.cache.archive()
        };
        match archive.get(&key)? {
            Some(bytes) => Ok(Some(Arc::new(Encoder::default().decode(&bytes)?))),
            None => Ok(None),
        }
    }

    fn make_key(&self, args: &A) -> Result<CacheKey> {
        let call = args.to_call_args()?;
        let bound: BoundArgs = match &self.signature {
            Some(signature) => signature.bind(&call, &self.ignore)?,
            None => bind_free(&call, &self.ignore)?,
        };
        if self.safe {
            self.keymap.key_with_fallback(&bound)
        } else {
            self.keymap.key(&bound)
        }
    }
}

impl<A, R, F> Memo<A, R, F> {
    /// The memo's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Statistics snapshot.
    pub fn info(&self) -> CacheInfo {
        let state = self.state.lock();
        CacheInfo {
            hits: state.hits,
            misses: state.misses,
            loads: state.loads,
            errors: state.errors,
            maxsize: state.cache.capacity(),
            size: state.cache.len(),
        }
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.state.lock().cache.len()
    }

    /// `true` when no entries are resident.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity bound; `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.state.lock().cache.capacity()
    }

    /// The eviction policy tag.
    pub fn policy(&self) -> CachePolicy {
        self.state.lock().cache.policy()
    }

    /// Snapshot of the resident keys.
    pub fn cached_keys(&self) -> Vec<CacheKey> {
        self.state.lock().cache.keys()
    }

    /// Shared handle to the attached archive.
    pub fn archive(&self) -> Arc<dyn Archive> {
        self.state.lock().cache.archive()
    }

    /// `true` when a non-null archive is attached.
    pub fn archived(&self) -> bool {
        self.state.lock().cache.archived()
    }

    /// Replaces the attached archive.
    pub fn attach_archive(&self, archive: Arc<dyn Archive>) {
        self.state.lock().cache.attach(archive);
    }

    /// Detaches the archive, returning the previous handle.
    pub fn detach_archive(&self) -> Arc<dyn Archive> {
        self.state.lock().cache.detach()
    }

    /// Discards the working set; statistics survive when `keep_stats`.
    pub fn clear(&self, keep_stats: bool) {
        let mut state = self.state.lock();
        state.cache.drop_working_set();
        if !keep_stats {
            state.hits = 0;
            state.misses = 0;
            state.loads = 0;
            state.errors = 0;
        }
    }
}

impl<A, R, F> Memo<A, R, F>
where
    R: Serialize + DeserializeOwned,
{
    /// Pulls every archived entry into memory (cold). Returns the count.
    pub fn load(&self) -> Result<usize> {
        self.state.lock().cache.load(None)
    }

    /// Pulls only the given keys from the archive. Returns the count.
    pub fn load_keys(&self, keys: &[CacheKey]) -> Result<usize> {
        self.state.lock().cache.load(Some(keys))
    }

    /// Pushes every resident entry to the archive. Returns the count.
    pub fn dump(&self) -> Result<usize> {
        self.state.lock().cache.dump(None)
    }

    /// Pushes only the given resident keys to the archive. Returns the
    /// count.
    pub fn dump_keys(&self, keys: &[CacheKey]) -> Result<usize> {
        self.state.lock().cache.dump(Some(keys))
    }

    /// Aligns memory and archive; the cache's values win collisions.
    pub fn sync(&self) -> Result<()> {
        self.state.lock().cache.sync()
    }
}

impl<A, R, F> fmt::Debug for Memo<A, R, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Memo")
            .field("name", &self.name)
            .field("policy", &state.cache.policy().tag())
            .field("len", &state.cache.len())
            .field("archived", &state.cache.archived())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;
    use crate::archive::MemoryArchive;
    use crate::keymap::CallArgs;

    #[test]
    fn memoizes_and_counts() {
        let calls = AtomicU64::new(0);
        let memo = MemoBuilder::lru(16)
            .build(|&(x,): &(i64,)| {
                calls.fetch_add(1, Ordering::SeqCst);
                x * x
            })
            .unwrap();

        assert_eq!(*memo.call(&(3,)).unwrap(), 9);
        assert_eq!(*memo.call(&(3,)).unwrap(), 9);
        assert_eq!(*memo.call(&(4,)).unwrap(), 16);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let info = memo.info();
        assert_eq!(info.hits, 1);
        assert_eq!(info.misses, 2);
        assert_eq!(info.size, 2);
        assert_eq!(info.maxsize, Some(16));
    }

    #[test]
    fn key_preview_matches_call_key() {
        let memo = MemoBuilder::lru(4).build(|&(x,): &(i64,)| x).unwrap();
        let preview = memo.key(&(7,)).unwrap();
        memo.call(&(7,)).unwrap();
        assert_eq!(memo.cached_keys(), vec![preview]);
    }

    #[test]
    fn lookup_never_computes() {
        let calls = AtomicU64::new(0);
        let memo = MemoBuilder::lru(4)
            .build(|&(x,): &(i64,)| {
                calls.fetch_add(1, Ordering::SeqCst);
                x
            })
            .unwrap();
        assert!(memo.lookup(&(5,)).unwrap().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        memo.call(&(5,)).unwrap();
        assert_eq!(*memo.lookup(&(5,)).unwrap().unwrap(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ignore_collapses_masked_named_arg() {
        let memo = MemoBuilder::lru(8)
            .signature(Signature::new(["x", "verbose"]).default("verbose", &false).unwrap())
            .ignore([Ignore::name("verbose")])
            .build(|args: &CallArgs| args.positional().len() as i64)
            .unwrap();

        let loud = CallArgs::new()
            .arg(&1i64)
            .unwrap()
            .named("verbose", &true)
            .unwrap();
        let quiet = CallArgs::new()
            .arg(&1i64)
            .unwrap()
            .named("verbose", &false)
            .unwrap();

        memo.call(&loud).unwrap();
        memo.call(&quiet).unwrap();
        assert_eq!(memo.len(), 1);
        let info = memo.info();
        assert_eq!(info.misses, 1);
        assert_eq!(info.hits, 1);
    }

    #[test]
    fn safe_mode_bypasses_on_unkeyable_argument() {
        struct Unkeyable;
        impl Serialize for Unkeyable {
            fn serialize<S: serde::Serializer>(
                &self,
                _s: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("deliberately unserializable"))
            }
        }

        let calls = AtomicU64::new(0);
        let memo = MemoBuilder::lru(8)
            .safe(true)
            .build(|_: &(Unkeyable,)| {
                calls.fetch_add(1, Ordering::SeqCst);
                42i64
            })
            .unwrap();

        assert_eq!(*memo.call(&(Unkeyable,)).unwrap(), 42);
        assert_eq!(*memo.call(&(Unkeyable,)).unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let info = memo.info();
        assert_eq!(info.errors, 2);
        assert_eq!(info.hits, 0);
        assert_eq!(info.misses, 0);
        assert_eq!(info.size, 0);
    }

    #[test]
    fn unsafe_mode_propagates_key_errors() {
        struct Unkeyable;
        impl Serialize for Unkeyable {
            fn serialize<S: serde::Serializer>(
                &self,
                _s: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("deliberately unserializable"))
            }
        }
        let memo = MemoBuilder::lru(8).build(|_: &(Unkeyable,)| 0i64).unwrap();
        assert!(memo.call(&(Unkeyable,)).unwrap_err().is_key_encoding());
    }

    #[test]
    fn archive_promotion_counts_as_load() {
        let archive = Arc::new(MemoryArchive::new());
        let memo = MemoBuilder::lru(2)
            .archive(archive)
            .build(|&(x,): &(i64,)| x * 10)
            .unwrap();

        memo.call(&(1,)).unwrap();
        memo.dump().unwrap();
        memo.clear(false);

        assert_eq!(*memo.call(&(1,)).unwrap(), 10);
        let info = memo.info();
        assert_eq!(info.loads, 1);
        assert_eq!(info.misses, 0);
    }

    #[test]
    fn clear_keep_stats_flag() {
        let memo = MemoBuilder::lru(4).build(|&(x,): &(i64,)| x).unwrap();
        memo.call(&(1,)).unwrap();
        memo.clear(true);
        assert_eq!(memo.info().misses, 1);
        assert_eq!(memo.len(), 0);
        memo.clear(false);
        assert_eq!(memo.info().misses, 0);
    }

    #[test]
    fn typed_flag_overrides_keymap() {
        let memo = MemoBuilder::lru(8)
            .typed(true)
            .build(|_: &CallArgs| 0i64)
            .unwrap();
        let int_key = memo
            .key(&CallArgs::new().arg(&1i64).unwrap())
            .unwrap();
        let float_key = memo
            .key(&CallArgs::new().arg(&1.0f64).unwrap())
            .unwrap();
        assert_ne!(int_key, float_key);
    }

    #[test]
    fn info_display_format() {
        let memo = MemoBuilder::inf().build(|&(x,): &(i64,)| x).unwrap();
        memo.call(&(1,)).unwrap();
        let rendered = memo.info().to_string();
        assert_eq!(
            rendered,
            "CacheInfo(hit=0, miss=1, load=0, error=0, maxsize=inf, size=1)"
        );
    }

    #[test]
    fn no_cache_keeps_nothing_resident() {
        let archive = Arc::new(MemoryArchive::new());
        let memo = MemoBuilder::no_cache()
            .archive(archive.clone())
            .build(|&(x,): &(i64,)| x + 1)
            .unwrap();
        memo.call(&(1,)).unwrap();
        memo.call(&(2,)).unwrap();
        assert_eq!(memo.len(), 0);
        assert_eq!(archive.len().unwrap(), 2);
        // Second call for the same key is answered by the archive.
        memo.call(&(1,)).unwrap();
        let info = memo.info();
        assert_eq!(info.loads, 1);
        assert_eq!(info.misses, 2);
    }
}
