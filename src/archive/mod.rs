//! # Archives
//!
//! An archive is a durable mapping from [`CacheKey`] to encoded value
//! bytes: the cache interface minus eviction and capacity. A
//! [`Cache`](crate::cache::Cache) may front one archive, demoting evicted
//! entries into it and promoting archived entries back on miss; callers may
//! also read and write an archive directly.
//!
//! ```text
//!                       ┌──────────────────┐
//!                       │   dyn Archive    │  ← uniform mapping contract
//!                       └────────┬─────────┘
//!          ┌──────────┬──────────┼───────────┬─────────────┐
//!          ▼          ▼          ▼           ▼             ▼
//!     ┌────────┐ ┌────────┐ ┌────────┐ ┌──────────┐ ┌───────────┐
//!     │  null  │ │ memory │ │  file  │ │   dir    │ │ sql / ds  │
//!     └────────┘ └────────┘ └────────┘ └──────────┘ └───────────┘
//! ```
//!
//! | Backend                | Granularity      | Multi-process writers     |
//! |------------------------|------------------|---------------------------|
//! | [`NullArchive`]        | —                | trivially safe            |
//! | [`MemoryArchive`]      | per key          | in-process only           |
//! | [`FileArchive`]        | whole map        | **not safe**              |
//! | [`DirArchive`]         | per key (atomic) | safe per key              |
//! | [`SqlArchive`]         | per statement    | safe (SQLite)             |
//! | [`DatasetArchive`]     | per transaction  | safe (LMDB)               |
//! | [`DatasetDirArchive`]  | per transaction  | safe (LMDB), env per group|
//!
//! Archives store *bytes*; the owning cache encodes and decodes values at
//! the boundary. Keys persist in their tagged serialized form
//! ([`CacheKey::to_bytes`]), so any key variant round-trips through any
//! backend.
//!
//! [`ArchiveConfig`] plus [`open_archive`] construct backends from
//! configuration, and [`ArchiveRegistry`] shares opened archives by name so
//! several memoized callables can rendezvous on one store.

mod dataset;
mod dir;
mod file;
mod sql;

pub use dataset::{DatasetArchive, DatasetDirArchive};
pub use dir::{DirArchive, KeyNaming};
pub use file::FileArchive;
pub use sql::SqlArchive;

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::key::CacheKey;

/// Durable mapping contract shared by every backend.
///
/// All methods take `&self`; implementations use interior mutability so an
/// archive handle can be shared between a cache and direct readers.
pub trait Archive: Send + Sync {
    /// Static tag naming the backend kind, e.g. `"file"`, `"sql"`.
    fn backend_name(&self) -> &'static str;

    /// Logical name of this store (table, group, or file stem); empty when
    /// the backend has no naming concept.
    fn name(&self) -> &str {
        ""
    }

    /// Reads the stored bytes for a key.
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>>;

    /// Stores bytes under a key, replacing any previous value.
    fn put(&self, key: &CacheKey, value: &[u8]) -> Result<()>;

    /// Stores many entries; backends with transactions batch this.
    fn put_many(&self, entries: &[(CacheKey, Vec<u8>)]) -> Result<()> {
        for (key, value) in entries {
            self.put(key, value)?;
        }
        Ok(())
    }

    /// Removes a key, reporting whether it was present.
    fn delete(&self, key: &CacheKey) -> Result<bool>;

    /// Checks presence without reading the value.
    fn contains(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Enumerates every stored key.
    fn keys(&self) -> Result<Vec<CacheKey>>;

    /// Number of stored entries.
    fn len(&self) -> Result<usize>;

    /// `true` when no entries are stored.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Removes every entry.
    fn clear(&self) -> Result<()>;

    /// `true` only for the null archive; lets a cache answer "am I
    /// archived?" without downcasting.
    fn is_null(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Null
// ---------------------------------------------------------------------------

/// Archive that discards writes and misses every read.
///
/// Attached by default so the archive code path is uniform whether or not a
/// cache is actually archived.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullArchive;

impl Archive for NullArchive {
    fn backend_name(&self) -> &'static str {
        "null"
    }

    fn get(&self, _key: &CacheKey) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn put(&self, _key: &CacheKey, _value: &[u8]) -> Result<()> {
        Ok(())
    }

    fn delete(&self, _key: &CacheKey) -> Result<bool> {
        Ok(false)
    }

    fn keys(&self) -> Result<Vec<CacheKey>> {
        Ok(Vec::new())
    }

    fn len(&self) -> Result<usize> {
        Ok(0)
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }

    fn is_null(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// In-process map exposing the archive interface.
///
/// Exists for uniformity and testing: anything that accepts a
/// `dyn Archive` can run against memory without touching disk.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    entries: Mutex<FxHashMap<CacheKey, Vec<u8>>>,
}

impl MemoryArchive {
    /// Creates an empty in-memory archive.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Archive for MemoryArchive {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &CacheKey, value: &[u8]) -> Result<()> {
        self.entries.lock().insert(key.clone(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }

    fn contains(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.entries.lock().contains_key(key))
    }

    fn keys(&self) -> Result<Vec<CacheKey>> {
        Ok(self.entries.lock().keys().cloned().collect())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.entries.lock().len())
    }

    fn clear(&self) -> Result<()> {
        self.entries.lock().clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Declarative backend selection for [`open_archive`].
#[derive(Debug, Clone)]
pub enum ArchiveConfig {
    /// Discard writes, miss reads.
    Null,
    /// In-process map.
    Memory,
    /// Single serialized map at a file path.
    File {
        /// Blob location; created on first dump.
        path: PathBuf,
    },
    /// One file per key inside a directory.
    Dir {
        /// Directory; created on demand.
        path: PathBuf,
        /// Filename scheme for keys.
        naming: KeyNaming,
    },
    /// SQLite table. Several caches may share one database with distinct
    /// tables.
    Sql {
        /// Database path, `":memory:"`, or a `sqlite://` URI.
        database: String,
        /// Table name; must be a plain identifier.
        table: String,
    },
    /// LMDB environment with one named group per cache.
    Dataset {
        /// Environment directory; created on demand.
        path: PathBuf,
        /// Group (named database) inside the environment.
        group: String,
    },
    /// Directory of LMDB environments, one per group.
    DatasetDir {
        /// Root directory; created on demand.
        root: PathBuf,
        /// Group, which becomes the environment subdirectory.
        group: String,
    },
}

/// Opens the backend described by `config`.
///
/// # Example
///
/// ```
/// use memokit::archive::{open_archive, Archive, ArchiveConfig};
///
/// let archive = open_archive(&ArchiveConfig::Memory).unwrap();
/// assert_eq!(archive.backend_name(), "memory");
/// ```
pub fn open_archive(config: &ArchiveConfig) -> Result<Arc<dyn Archive>> {
    Ok(match config {
        ArchiveConfig::Null => Arc::new(NullArchive),
        ArchiveConfig::Memory => Arc::new(MemoryArchive::new()),
        ArchiveConfig::File { path } => Arc::new(FileArchive::new(path)),
        ArchiveConfig::Dir { path, naming } => Arc::new(DirArchive::with_naming(path, *naming)?),
        ArchiveConfig::Sql { database, table } => Arc::new(SqlArchive::open(database, table)?),
        ArchiveConfig::Dataset { path, group } => Arc::new(DatasetArchive::open(path, group)?),
        ArchiveConfig::DatasetDir { root, group } => {
            Arc::new(DatasetDirArchive::open(root, group)?)
        }
    })
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// By-name sharing of opened archives.
///
/// Decorated callables that should rendezvous on one durable store register
/// it here once and look it up by name afterwards. This is deliberately an
/// explicit object passed around by the caller, not process-wide state.
#[derive(Default)]
pub struct ArchiveRegistry {
    entries: Mutex<FxHashMap<String, Arc<dyn Archive>>>,
}

impl ArchiveRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a previously registered archive.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Archive>> {
        self.entries.lock().get(name).cloned()
    }

    /// Registers an archive under a name, replacing any previous holder.
    pub fn insert(&self, name: impl Into<String>, archive: Arc<dyn Archive>) {
        self.entries.lock().insert(name.into(), archive);
    }

    /// Returns the archive registered under `name`, opening and registering
    /// it from `config` on first use.
    pub fn get_or_open(&self, name: &str, config: &ArchiveConfig) -> Result<Arc<dyn Archive>> {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(name) {
            return Ok(Arc::clone(existing));
        }
        let opened = open_archive(config)?;
        entries.insert(name.to_owned(), Arc::clone(&opened));
        Ok(opened)
    }

    /// Names currently registered.
    pub fn names(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
