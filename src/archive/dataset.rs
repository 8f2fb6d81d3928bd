//! Hierarchical dataset archives (LMDB via `heed`).
//!
//! A dataset is an LMDB environment; groups are named databases inside it,
//! keys become entries under their group, and values are stored as encoded
//! byte arrays. Concurrent reader/writer semantics defer entirely to LMDB:
//! readers never block, one writer commits at a time, and every key write
//! is transactional.
//!
//! Two layouts:
//!
//! - [`DatasetArchive`] — one environment at a path, any number of groups
//!   inside it ([`DatasetArchive::group`] opens siblings sharing the
//!   environment handle, which is required because LMDB forbids opening one
//!   environment twice in a process).
//! - [`DatasetDirArchive`] — a root directory holding one environment per
//!   group, so groups can be copied, deleted, and written independently.

use std::path::{Path, PathBuf};

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use super::Archive;
use crate::error::{Error, Result};
use crate::key::CacheKey;

const BACKEND: &str = "dataset";
const DIR_BACKEND: &str = "dataset-dir";

/// Default LMDB map size: plenty for a memoization store, resizable by
/// choosing [`DatasetArchive::open_sized`].
const DEFAULT_MAP_SIZE: usize = 256 * 1024 * 1024;

const MAX_GROUPS: u32 = 128;

/// Archive storing one group inside an LMDB environment.
pub struct DatasetArchive {
    env: Env,
    db: Database<Bytes, Bytes>,
    group: String,
}

impl DatasetArchive {
    /// Opens (creating on demand) the environment at `path` and the named
    /// group inside it, with the default map size.
    pub fn open(path: impl AsRef<Path>, group: &str) -> Result<Self> {
        Self::open_sized(path, group, DEFAULT_MAP_SIZE)
    }

    /// Opens with an explicit map size in bytes.
    pub fn open_sized(path: impl AsRef<Path>, group: &str, map_size: usize) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(|e| Error::archive(BACKEND, e))?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(MAX_GROUPS)
                .open(path)
        }
        .map_err(|e| Error::archive(BACKEND, e))?;

        let db = Self::open_group_db(&env, group)?;
        tracing::debug!(path = %path.display(), group, "dataset archive opened");
        Ok(DatasetArchive {
            env,
            db,
            group: group.to_owned(),
        })
    }

    /// Opens a sibling group sharing this archive's environment.
    ///
    /// LMDB forbids opening one environment twice within a process, so all
    /// groups of one dataset must go through a shared handle.
    pub fn group(&self, group: &str) -> Result<DatasetArchive> {
        let db = Self::open_group_db(&self.env, group)?;
        Ok(DatasetArchive {
            env: self.env.clone(),
            db,
            group: group.to_owned(),
        })
    }

    fn open_group_db(env: &Env, group: &str) -> Result<Database<Bytes, Bytes>> {
        let mut wtxn = env.write_txn().map_err(|e| Error::archive(BACKEND, e))?;
        let db = env
            .create_database::<Bytes, Bytes>(&mut wtxn, Some(group))
            .map_err(|e| Error::archive(BACKEND, e))?;
        wtxn.commit().map_err(|e| Error::archive(BACKEND, e))?;
        Ok(db)
    }

    fn backend(&self) -> &'static str {
        BACKEND
    }
}

impl Archive for DatasetArchive {
    fn backend_name(&self) -> &'static str {
        self.backend()
    }

    fn name(&self) -> &str {
        &self.group
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let rtxn = self.env.read_txn().map_err(|e| Error::archive(BACKEND, e))?;
        let found = self
            .db
            .get(&rtxn, &key.to_bytes()?)
            .map_err(|e| Error::archive(BACKEND, e))?;
        Ok(found.map(<[u8]>::to_vec))
    }

    fn put(&self, key: &CacheKey, value: &[u8]) -> Result<()> {
        let mut wtxn = self.env.write_txn().map_err(|e| Error::archive(BACKEND, e))?;
        self.db
            .put(&mut wtxn, &key.to_bytes()?, value)
            .map_err(|e| Error::archive(BACKEND, e))?;
        wtxn.commit().map_err(|e| Error::archive(BACKEND, e))
    }

    fn put_many(&self, entries: &[(CacheKey, Vec<u8>)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut wtxn = self.env.write_txn().map_err(|e| Error::archive(BACKEND, e))?;
        for (key, value) in entries {
            self.db
                .put(&mut wtxn, &key.to_bytes()?, value)
                .map_err(|e| Error::archive(BACKEND, e))?;
        }
        wtxn.commit().map_err(|e| Error::archive(BACKEND, e))
    }

    fn delete(&self, key: &CacheKey) -> Result<bool> {
        let mut wtxn = self.env.write_txn().map_err(|e| Error::archive(BACKEND, e))?;
        let removed = self
            .db
            .delete(&mut wtxn, &key.to_bytes()?)
            .map_err(|e| Error::archive(BACKEND, e))?;
        wtxn.commit().map_err(|e| Error::archive(BACKEND, e))?;
        Ok(removed)
    }

    fn keys(&self) -> Result<Vec<CacheKey>> {
        let rtxn = self.env.read_txn().map_err(|e| Error::archive(BACKEND, e))?;
        let iter = self.db.iter(&rtxn).map_err(|e| Error::archive(BACKEND, e))?;
        let mut keys = Vec::new();
        for item in iter {
            let (key_bytes, _) = item.map_err(|e| Error::archive(BACKEND, e))?;
            keys.push(CacheKey::from_bytes(key_bytes)?);
        }
        Ok(keys)
    }

    fn len(&self) -> Result<usize> {
        let rtxn = self.env.read_txn().map_err(|e| Error::archive(BACKEND, e))?;
        let len = self.db.len(&rtxn).map_err(|e| Error::archive(BACKEND, e))?;
        Ok(len as usize)
    }

    fn clear(&self) -> Result<()> {
        let mut wtxn = self.env.write_txn().map_err(|e| Error::archive(BACKEND, e))?;
        self.db
            .clear(&mut wtxn)
            .map_err(|e| Error::archive(BACKEND, e))?;
        wtxn.commit().map_err(|e| Error::archive(BACKEND, e))
    }
}

/// Archive storing one LMDB environment per group under a root directory.
///
/// Compared to [`DatasetArchive`], groups here are independent files on
/// disk: they can be copied or removed individually and writers to
/// different groups never contend on one environment's write lock. (The
/// original per-key file layout this replaces bought per-key atomicity,
/// which LMDB transactions already provide.)
pub struct DatasetDirArchive {
    inner: DatasetArchive,
    root: PathBuf,
}

impl DatasetDirArchive {
    /// Opens (creating on demand) the group environment `root/group`.
    pub fn open(root: impl AsRef<Path>, group: &str) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let inner = DatasetArchive::open(root.join(group), group)?;
        Ok(DatasetDirArchive { inner, root })
    }

    /// The root directory holding the group environments.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Archive for DatasetDirArchive {
    fn backend_name(&self) -> &'static str {
        DIR_BACKEND
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn put(&self, key: &CacheKey, value: &[u8]) -> Result<()> {
        self.inner.put(key, value)
    }

    fn put_many(&self, entries: &[(CacheKey, Vec<u8>)]) -> Result<()> {
        self.inner.put_many(entries)
    }

    fn delete(&self, key: &CacheKey) -> Result<bool> {
        self.inner.delete(key)
    }

    fn keys(&self) -> Result<Vec<CacheKey>> {
        self.inner.keys()
    }

    fn len(&self) -> Result<usize> {
        self.inner.len()
    }

    fn clear(&self) -> Result<()> {
        self.inner.clear()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ArgValue;
    use tempfile::TempDir;

    fn key(n: i64) -> CacheKey {
        CacheKey::Raw(ArgValue::Int(n))
    }

    #[test]
    fn roundtrip_single_group() {
        let dir = TempDir::new().unwrap();
        let archive = DatasetArchive::open(dir.path().join("ds"), "results").unwrap();
        archive.put(&key(1), b"one").unwrap();
        assert_eq!(archive.get(&key(1)).unwrap(), Some(b"one".to_vec()));
        assert_eq!(archive.len().unwrap(), 1);
        assert_eq!(archive.name(), "results");
    }

    #[test]
    fn groups_are_isolated_within_one_environment() {
        let dir = TempDir::new().unwrap();
        let a = DatasetArchive::open(dir.path().join("ds"), "group_a").unwrap();
        let b = a.group("group_b").unwrap();

        a.put(&key(1), b"from_a").unwrap();
        b.put(&key(1), b"from_b").unwrap();

        assert_eq!(a.get(&key(1)).unwrap(), Some(b"from_a".to_vec()));
        assert_eq!(b.get(&key(1)).unwrap(), Some(b"from_b".to_vec()));
        assert_eq!(a.len().unwrap(), 1);
    }

    #[test]
    fn keys_and_delete() {
        let dir = TempDir::new().unwrap();
        let archive = DatasetArchive::open(dir.path().join("ds"), "g").unwrap();
        archive.put(&key(1), b"a").unwrap();
        archive.put(&key(2), b"b").unwrap();
        let keys = archive.keys().unwrap();
        assert_eq!(keys.len(), 2);
        assert!(archive.delete(&key(1)).unwrap());
        assert!(!archive.delete(&key(1)).unwrap());
        assert_eq!(archive.len().unwrap(), 1);
    }

    #[test]
    fn put_many_commits_atomically() {
        let dir = TempDir::new().unwrap();
        let archive = DatasetArchive::open(dir.path().join("ds"), "g").unwrap();
        let entries: Vec<(CacheKey, Vec<u8>)> =
            (0..20i64).map(|n| (key(n), vec![n as u8])).collect();
        archive.put_many(&entries).unwrap();
        assert_eq!(archive.len().unwrap(), 20);
    }

    #[test]
    fn survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ds");
        {
            let archive = DatasetArchive::open(&path, "g").unwrap();
            archive.put(&key(1), b"kept").unwrap();
        }
        let reopened = DatasetArchive::open(&path, "g").unwrap();
        assert_eq!(reopened.get(&key(1)).unwrap(), Some(b"kept".to_vec()));
    }

    #[test]
    fn dataset_dir_layout_one_env_per_group() {
        let dir = TempDir::new().unwrap();
        let a = DatasetDirArchive::open(dir.path(), "alpha").unwrap();
        let b = DatasetDirArchive::open(dir.path(), "beta").unwrap();

        a.put(&key(1), b"alpha").unwrap();
        b.put(&key(1), b"beta").unwrap();

        assert_eq!(a.get(&key(1)).unwrap(), Some(b"alpha".to_vec()));
        assert_eq!(b.get(&key(1)).unwrap(), Some(b"beta".to_vec()));
        assert!(dir.path().join("alpha").is_dir());
        assert!(dir.path().join("beta").is_dir());
    }

    #[test]
    fn clear_empties_only_this_group() {
        let dir = TempDir::new().unwrap();
        let a = DatasetArchive::open(dir.path().join("ds"), "a").unwrap();
        let b = a.group("b").unwrap();
        a.put(&key(1), b"x").unwrap();
        b.put(&key(2), b"y").unwrap();
        a.clear().unwrap();
        assert!(a.is_empty().unwrap());
        assert_eq!(b.len().unwrap(), 1);
    }
}
