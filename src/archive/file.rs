//! Single-file blob archive.
//!
//! The whole mapping lives in one file: a version byte followed by the
//! serialized entry list. Every operation reads the file, mutates the map
//! in memory, and writes it back through a temp-file + rename, so readers
//! observe either the old or the new state, never a partial write.
//!
//! Concurrent writers from multiple processes are **not** safe without
//! external locking; the per-handle mutex only serializes threads sharing
//! one handle. Use [`DirArchive`](super::DirArchive) or the SQL/dataset
//! backends when several processes write.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::Archive;
use crate::encode::Encoder;
use crate::error::{Error, Result};
use crate::key::CacheKey;

const BACKEND: &str = "file";

/// Layout version written at offset 0. Bump on any change to the body
/// encoding; readers reject versions they do not understand.
const FORMAT_VERSION: u8 = 0x01;

/// Archive storing one serialized mapping at a file path.
pub struct FileArchive {
    path: PathBuf,
    encoder: Encoder,
    /// Serializes read-modify-write cycles between threads sharing this
    /// handle.
    guard: Mutex<()>,
}

impl FileArchive {
    /// Creates a handle for the blob at `path`.
    ///
    /// The file itself is created lazily on the first write; a missing file
    /// reads as an empty archive.
    pub fn new(path: impl AsRef<Path>) -> Self {
        FileArchive {
            path: path.as_ref().to_path_buf(),
            encoder: Encoder::default(),
            guard: Mutex::new(()),
        }
    }

    /// The blob location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<FxHashMap<CacheKey, Vec<u8>>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(FxHashMap::default()),
            Err(err) => return Err(Error::archive(BACKEND, err)),
        };
        let Some((&version, body)) = bytes.split_first() else {
            // Zero-length file: treat as empty, e.g. a crashed first dump.
            return Ok(FxHashMap::default());
        };
        if version != FORMAT_VERSION {
            return Err(Error::archive(
                BACKEND,
                format!("unsupported blob version {version:#04x} at {}", self.path.display()),
            ));
        }
        let entries: Vec<(CacheKey, Vec<u8>)> = self.encoder.decode(body)?;
        Ok(entries.into_iter().collect())
    }

    fn write_map(&self, map: &FxHashMap<CacheKey, Vec<u8>>) -> Result<()> {
        let entries: Vec<(&CacheKey, &Vec<u8>)> = map.iter().collect();
        let body = self.encoder.encode(&entries)?;
        let mut bytes = Vec::with_capacity(1 + body.len());
        bytes.push(FORMAT_VERSION);
        bytes.extend_from_slice(&body);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| Error::archive(BACKEND, e))?;
            }
        }
        let tmp = self.path.with_extension(format!("tmp.{}", std::process::id()));
        fs::write(&tmp, &bytes).map_err(|e| Error::archive(BACKEND, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| Error::archive(BACKEND, e))?;
        tracing::debug!(path = %self.path.display(), entries = map.len(), "blob rewritten");
        Ok(())
    }
}

impl Archive for FileArchive {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn name(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let _lock = self.guard.lock();
        Ok(self.read_map()?.remove(key))
    }

    fn put(&self, key: &CacheKey, value: &[u8]) -> Result<()> {
        let _lock = self.guard.lock();
        let mut map = self.read_map()?;
        map.insert(key.clone(), value.to_vec());
        self.write_map(&map)
    }

    fn put_many(&self, entries: &[(CacheKey, Vec<u8>)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let _lock = self.guard.lock();
        let mut map = self.read_map()?;
        for (key, value) in entries {
            map.insert(key.clone(), value.clone());
        }
        self.write_map(&map)
    }

    fn delete(&self, key: &CacheKey) -> Result<bool> {
        let _lock = self.guard.lock();
        let mut map = self.read_map()?;
        let removed = map.remove(key).is_some();
        if removed {
            self.write_map(&map)?;
        }
        Ok(removed)
    }

    fn contains(&self, key: &CacheKey) -> Result<bool> {
        let _lock = self.guard.lock();
        Ok(self.read_map()?.contains_key(key))
    }

    fn keys(&self) -> Result<Vec<CacheKey>> {
        let _lock = self.guard.lock();
        Ok(self.read_map()?.into_keys().collect())
    }

    fn len(&self) -> Result<usize> {
        let _lock = self.guard.lock();
        Ok(self.read_map()?.len())
    }

    fn clear(&self) -> Result<()> {
        let _lock = self.guard.lock();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::archive(BACKEND, err)),
        }
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

    fn fixture() -> (FileArchive, TempDir) {
        let dir = TempDir::new().unwrap();
        let archive = FileArchive::new(dir.path().join("store.blob"));
        (archive, dir)
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let (archive, _dir) = fixture();
        assert_eq!(archive.len().unwrap(), 0);
        assert_eq!(archive.get(&key(1)).unwrap(), None);
    }

    #[test]
    fn put_get_roundtrip() {
        let (archive, _dir) = fixture();
        archive.put(&key(1), b"one").unwrap();
        archive.put(&key(2), b"two").unwrap();
        assert_eq!(archive.get(&key(1)).unwrap(), Some(b"one".to_vec()));
        assert_eq!(archive.get(&key(2)).unwrap(), Some(b"two".to_vec()));
        assert_eq!(archive.len().unwrap(), 2);
    }

    #[test]
    fn survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.blob");
        FileArchive::new(&path).put(&key(1), b"persisted").unwrap();

        let reopened = FileArchive::new(&path);
        assert_eq!(reopened.get(&key(1)).unwrap(), Some(b"persisted".to_vec()));
    }

    #[test]
    fn version_byte_is_checked() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.blob");
        fs::write(&path, [0x7f, 1, 2, 3]).unwrap();
        let err = FileArchive::new(&path).len().unwrap_err();
        assert!(err.is_archive());
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn version_byte_leads_the_file() {
        let (archive, dir) = fixture();
        archive.put(&key(1), b"x").unwrap();
        let bytes = fs::read(dir.path().join("store.blob")).unwrap();
        assert_eq!(bytes[0], FORMAT_VERSION);
    }

    #[test]
    fn delete_and_clear() {
        let (archive, _dir) = fixture();
        archive.put(&key(1), b"x").unwrap();
        assert!(archive.delete(&key(1)).unwrap());
        assert!(!archive.delete(&key(1)).unwrap());
        archive.put(&key(2), b"y").unwrap();
        archive.clear().unwrap();
        assert!(archive.is_empty().unwrap());
        // Clearing an absent file is idempotent.
        archive.clear().unwrap();
    }

    #[test]
    fn put_many_is_one_rewrite() {
        let (archive, _dir) = fixture();
        archive
            .put_many(&[(key(1), b"a".to_vec()), (key(2), b"b".to_vec())])
            .unwrap();
        assert_eq!(archive.len().unwrap(), 2);
    }

    #[test]
    fn keys_enumerate_all_entries() {
        let (archive, _dir) = fixture();
        archive.put(&key(1), b"a").unwrap();
        archive.put(&key(2), b"b").unwrap();
        let mut keys = archive.keys().unwrap();
        keys.sort_by_key(|k| k.to_bytes().unwrap());
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&key(1)));
        assert!(keys.contains(&key(2)));
    }
}
