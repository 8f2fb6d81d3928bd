//! Directory archive: one file per key.
//!
//! Each key maps to a single file inside the archive directory; the file
//! content is the encoded value. Writes go through a temp sibling and an
//! atomic rename, so the directory is safe for concurrent multi-process
//! access at single-key granularity: readers observe only committed values.
//!
//! ## Filename schemes
//!
//! | [`KeyNaming`]  | Filename                     | Enumeration               |
//! |----------------|------------------------------|---------------------------|
//! | `Encoded`      | URL-safe base64 of the key   | decode the filenames      |
//! | `Fingerprint`  | hex SHA-256 of the key       | `.index` sidecar          |
//!
//! Fingerprint names are fixed-width (useful when encoded keys would exceed
//! filesystem name limits) but not reversible, so a sidecar `.index` file
//! caches the serialized keys. The sidecar is *not* authoritative: key
//! enumeration intersects it with the actual directory listing, and a stale
//! or missing sidecar only degrades enumeration, never reads or writes.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::Archive;
use crate::encode::Encoder;
use crate::error::{Error, Result};
use crate::key::CacheKey;

const BACKEND: &str = "dir";
const INDEX_FILE: &str = ".index";

/// Filename scheme for keys in a [`DirArchive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyNaming {
    /// Reversible URL-safe encoding of the serialized key (default).
    #[default]
    Encoded,
    /// Fixed-width hex fingerprint; keys enumerate via the `.index` sidecar.
    Fingerprint,
}

/// Archive keeping one value file per key inside a directory.
pub struct DirArchive {
    dir: PathBuf,
    naming: KeyNaming,
    encoder: Encoder,
    /// Serializes sidecar read-modify-write between threads on this handle.
    index_guard: Mutex<()>,
}

impl DirArchive {
    /// Opens (creating on demand) a directory archive with reversible
    /// filenames.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        Self::with_naming(dir, KeyNaming::Encoded)
    }

    /// Opens (creating on demand) a directory archive with the given
    /// filename scheme.
    pub fn with_naming(dir: impl AsRef<Path>, naming: KeyNaming) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| Error::archive(BACKEND, e))?;
        Ok(DirArchive {
            dir,
            naming,
            encoder: Encoder::default(),
            index_guard: Mutex::new(()),
        })
    }

    /// The archive directory.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &CacheKey) -> Result<PathBuf> {
        let name = match self.naming {
            KeyNaming::Encoded => key.filename()?,
            KeyNaming::Fingerprint => key.fingerprint_hex()?,
        };
        Ok(self.dir.join(name))
    }

    fn is_entry_name(name: &str) -> bool {
        name != INDEX_FILE && !name.contains(".tmp.")
    }

    fn list_entry_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let entries = fs::read_dir(&self.dir).map_err(|e| Error::archive(BACKEND, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::archive(BACKEND, e))?;
            if let Some(name) = entry.file_name().to_str() {
                if Self::is_entry_name(name) {
                    names.push(name.to_owned());
                }
            }
        }
        Ok(names)
    }

    fn read_index(&self) -> Vec<CacheKey> {
        match fs::read(self.dir.join(INDEX_FILE)) {
            Ok(bytes) => self.encoder.decode(&bytes).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    fn write_index(&self, keys: &[CacheKey]) -> Result<()> {
        let bytes = self.encoder.encode(&keys)?;
        let tmp = self
            .dir
            .join(format!("{INDEX_FILE}.tmp.{}", std::process::id()));
        fs::write(&tmp, &bytes).map_err(|e| Error::archive(BACKEND, e))?;
        fs::rename(&tmp, self.dir.join(INDEX_FILE)).map_err(|e| Error::archive(BACKEND, e))?;
        Ok(())
    }

    fn index_add(&self, key: &CacheKey) -> Result<()> {
        let _lock = self.index_guard.lock();
        let mut keys = self.read_index();
        if !keys.contains(key) {
            keys.push(key.clone());
            self.write_index(&keys)?;
        }
        Ok(())
    }

    fn index_remove(&self, key: &CacheKey) -> Result<()> {
        let _lock = self.index_guard.lock();
        let mut keys = self.read_index();
        let before = keys.len();
        keys.retain(|k| k != key);
        if keys.len() != before {
            self.write_index(&keys)?;
        }
        Ok(())
    }
}

impl Archive for DirArchive {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn name(&self) -> &str {
        self.dir
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("")
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        match fs::read(self.entry_path(key)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::archive(BACKEND, err)),
        }
    }

    fn put(&self, key: &CacheKey, value: &[u8]) -> Result<()> {
        let path = self.entry_path(key)?;
        // Unique per process so concurrent writers never share a temp file;
        // rename makes the commit atomic at key granularity.
        let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
        fs::write(&tmp, value).map_err(|e| Error::archive(BACKEND, e))?;
        fs::rename(&tmp, &path).map_err(|e| Error::archive(BACKEND, e))?;
        if self.naming == KeyNaming::Fingerprint {
            self.index_add(key)?;
        }
        Ok(())
    }

    fn delete(&self, key: &CacheKey) -> Result<bool> {
        let removed = match fs::remove_file(self.entry_path(key)?) {
            Ok(()) => true,
            Err(err) if err.kind() == ErrorKind::NotFound => false,
            Err(err) => return Err(Error::archive(BACKEND, err)),
        };
        if removed && self.naming == KeyNaming::Fingerprint {
            self.index_remove(key)?;
        }
        Ok(removed)
    }

    fn contains(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.entry_path(key)?.exists())
    }

    fn keys(&self) -> Result<Vec<CacheKey>> {
        match self.naming {
            KeyNaming::Encoded => {
                let mut keys = Vec::new();
                for name in self.list_entry_names()? {
                    // Foreign files in the directory are skipped rather than
                    // treated as corruption.
                    if let Ok(key) = CacheKey::from_filename(&name) {
                        keys.push(key);
                    }
                }
                Ok(keys)
            }
            KeyNaming::Fingerprint => {
                let names = self.list_entry_names()?;
                let mut keys = Vec::new();
                for key in self.read_index() {
                    if names.iter().any(|n| {
                        key.fingerprint_hex()
                            .map(|fp| fp == *n)
                            .unwrap_or(false)
                    }) {
                        keys.push(key);
                    }
                }
                Ok(keys)
            }
        }
    }

    fn len(&self) -> Result<usize> {
        Ok(self.list_entry_names()?.len())
    }

    fn clear(&self) -> Result<()> {
        for name in self.list_entry_names()? {
            let path = self.dir.join(name);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(Error::archive(BACKEND, err)),
            }
        }
        match fs::remove_file(self.dir.join(INDEX_FILE)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::archive(BACKEND, err)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
