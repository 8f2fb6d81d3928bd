//! Cache keys.
//!
//! A [`CacheKey`] is the canonical representation of one call signature. The
//! concrete shape depends on which keymap variant produced it:
//!
//! | Variant  | Produced by      | Form                                     |
//! |----------|------------------|------------------------------------------|
//! | `Raw`    | raw keymap       | the canonical argument tree itself       |
//! | `Digest` | hash keymap      | fixed-width SHA-256 of the canonical form|
//! | `Text`   | string keymap    | stable printable form                    |
//! | `Bytes`  | serial keymap    | serialized canonical form (injective)    |
//!
//! Keys cross three boundaries, each with its own encoding:
//!
//! - **archives** store the tagged serialized form ([`CacheKey::to_bytes`]),
//!   which round-trips losslessly via [`CacheKey::from_bytes`];
//! - **directory archives** name files with a URL-safe form
//!   ([`CacheKey::filename`]) or with [`CacheKey::fingerprint_hex`];
//! - **humans** see the `Display` form.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::encode::Encoder;
use crate::error::{Error, Result};
use crate::value::ArgValue;

/// A canonical cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheKey {
    /// The canonical argument tree, kept as-is. Lossless and comparable.
    Raw(ArgValue),
    /// A fixed-width digest of the canonical form. Short, not reversible.
    Digest([u8; 32]),
    /// A printable textual form, for stores that want string keys.
    Text(String),
    /// The serialized canonical form. Injective for any encodable arguments.
    Bytes(Vec<u8>),
}

impl CacheKey {
    /// Serializes the key (including its variant tag) to a stable byte form.
    ///
    /// This is the representation archives persist; [`CacheKey::from_bytes`]
    /// inverts it.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(Error::key_encoding)
    }

    /// Recovers a key from its [`CacheKey::to_bytes`] form.
    pub fn from_bytes(bytes: &[u8]) -> Result<CacheKey> {
        bincode::deserialize(bytes).map_err(Error::key_encoding)
    }

    /// URL-safe filename encoding of the serialized key.
    ///
    /// The output alphabet is `[A-Za-z0-9_-]`, safe for any filesystem, and
    /// reversible via [`CacheKey::from_filename`].
    pub fn filename(&self) -> Result<String> {
        Ok(URL_SAFE_NO_PAD.encode(self.to_bytes()?))
    }

    /// Recovers a key from its [`CacheKey::filename`] encoding.
    pub fn from_filename(name: &str) -> Result<CacheKey> {
        let bytes = URL_SAFE_NO_PAD
            .decode(name)
            .map_err(Error::key_encoding)?;
        CacheKey::from_bytes(&bytes)
    }

    /// Hex SHA-256 fingerprint of the serialized key.
    ///
    /// Fixed-width and filesystem-safe, but not reversible; directory
    /// archives using fingerprint naming keep a sidecar index to enumerate
    /// keys.
    pub fn fingerprint_hex(&self) -> Result<String> {
        let digest = Encoder::default().fingerprint(&self.to_bytes()?);
        Ok(hex_string(&digest))
    }

    /// Converts the key into the argument-tree form used when keymap stages
    /// are chained: the output of one stage becomes the input of the next.
    pub(crate) fn into_arg_value(self) -> ArgValue {
        match self {
            CacheKey::Raw(v) => v,
            CacheKey::Digest(d) => ArgValue::Bytes(d.to_vec()),
            CacheKey::Text(s) => ArgValue::Str(s),
            CacheKey::Bytes(b) => ArgValue::Bytes(b),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Raw(v) => write!(f, "{}", Encoder::default().stringify(v)),
            CacheKey::Digest(d) => f.write_str(&hex_string(d)),
            CacheKey::Text(s) => f.write_str(s),
            CacheKey::Bytes(b) => f.write_str(&URL_SAFE_NO_PAD.encode(b)),
        }
    }
}

fn hex_string(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        // infallible for String
        let _ = write!(out, "{b:02x}");
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
