//! Error types for the memokit library.
//!
//! ## Key Components
//!
//! - [`Error`]: the crate-wide error enum. Variants correspond to the
//!   failure domains of the library: key encoding, value encoding, archive
//!   backends, configuration, and internal invariants.
//! - [`Result`]: alias used throughout the crate.
//!
//! Backend errors (I/O, SQLite, LMDB, serialization) are mapped into
//! [`Error::Archive`] or [`Error::ValueEncoding`] at the boundary where they
//! occur, tagged with the backend name so failures can be attributed without
//! carrying backend types in the public API.

use thiserror::Error;

/// Result type for memokit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by caches, keymaps, archives, and memoized callables.
#[derive(Debug, Error)]
pub enum Error {
    /// A call signature could not be canonicalized into a cache key.
    ///
    /// The safe decorator path catches this variant and invokes the wrapped
    /// function directly; the default path propagates it to the caller.
    #[error("key encoding failed: {0}")]
    KeyEncoding(String),

    /// A value could not be serialized or deserialized.
    ///
    /// The cache state is unchanged when this is returned.
    #[error("value encoding failed: {0}")]
    ValueEncoding(String),

    /// An archive backend failed an I/O or protocol operation.
    #[error("{backend} archive error: {message}")]
    Archive {
        /// Backend tag, e.g. `"file"`, `"dir"`, `"sql"`, `"dataset"`.
        backend: &'static str,
        /// Human-readable description of the failure.
        message: String,
    },

    /// A cache, keymap, or archive was configured with invalid parameters.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An internal data-structure invariant was violated.
    ///
    /// Indicates a bug in the library; never caught by the safe path.
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

impl Error {
    /// Creates a [`Error::KeyEncoding`] from any displayable cause.
    pub fn key_encoding(msg: impl std::fmt::Display) -> Self {
        Error::KeyEncoding(msg.to_string())
    }

    /// Creates a [`Error::ValueEncoding`] from any displayable cause.
    pub fn value_encoding(msg: impl std::fmt::Display) -> Self {
        Error::ValueEncoding(msg.to_string())
    }

    /// Creates an [`Error::Archive`] tagged with the given backend name.
    pub fn archive(backend: &'static str, msg: impl std::fmt::Display) -> Self {
        Error::Archive {
            backend,
            message: msg.to_string(),
        }
    }

    /// Returns `true` if this is a key-encoding failure.
    #[inline]
    pub fn is_key_encoding(&self) -> bool {
        matches!(self, Error::KeyEncoding(_))
    }

    /// Returns `true` if this is an archive-backend failure.
    #[inline]
    pub fn is_archive(&self) -> bool {
        matches!(self, Error::Archive { .. })
    }
}

impl serde::ser::Error for Error {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        Error::KeyEncoding(msg.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_backend_tag() {
        let err = Error::archive("sql", "table missing");
        assert_eq!(err.to_string(), "sql archive error: table missing");
    }

    #[test]
    fn key_encoding_predicate() {
        assert!(Error::key_encoding("bad arg").is_key_encoding());
        assert!(!Error::key_encoding("bad arg").is_archive());
    }

    #[test]
    fn archive_predicate() {
        assert!(Error::archive("dir", "io").is_archive());
        assert!(!Error::archive("dir", "io").is_key_encoding());
    }

    #[test]
    fn implements_std_error() {
        fn assert_error<T: std::error::Error>() {}
        assert_error::<Error>();
    }
}
