//! Value and key encoding.
//!
//! The [`Encoder`] is the single seam between in-memory values and their
//! durable forms:
//!
//! - [`Encoder::encode`] / [`Encoder::decode`] — opaque byte serialization
//!   for any `serde` value (used for archived values, raw keys, and the
//!   serial keymap).
//! - [`Encoder::fingerprint`] — fixed-width SHA-256 content hash (used for
//!   digest keys and fingerprint-named archive files).
//! - [`Encoder::stringify`] — stable, unambiguous textual rendering of a
//!   canonical argument tree (used for text keys).
//!
//! All three are deterministic within and across processes for the same
//! input; NaN canonicalization happens earlier, at [`ArgValue`]
//! construction, so no non-determinism reaches this layer.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::value::ArgValue;

/// Deterministic serializer/hasher handle.
///
/// Stateless; exists as a type so callers hold a single capability for all
/// encoding concerns and so the concrete codec stays swappable behind it.
#[derive(Debug, Default, Clone, Copy)]
pub struct Encoder;

impl Encoder {
    /// Serializes a value to bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use memokit::encode::Encoder;
    ///
    /// let bytes = Encoder::default().encode(&42u32).unwrap();
    /// let back: u32 = Encoder::default().decode(&bytes).unwrap();
    /// assert_eq!(back, 42);
    /// ```
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(Error::value_encoding)
    }

    /// Deserializes a value from its [`Encoder::encode`] form.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes).map_err(Error::value_encoding)
    }

    /// Fixed-width content hash of a byte string.
    pub fn fingerprint(&self, bytes: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hasher.finalize().into()
    }

    /// Stable textual rendering of a canonical argument tree.
    ///
    /// The grammar is unambiguous: strings are quoted and escaped, bytes are
    /// prefixed base64, unsigned integers that survived typed keying carry a
    /// `u` suffix, sequences use parentheses and maps use braces.
    ///
    /// # Example
    ///
    /// ```
    /// use memokit::encode::Encoder;
    /// use memokit::value::ArgValue;
    ///
    /// let v = ArgValue::Seq(vec![ArgValue::Int(1), ArgValue::Str("a b".into())]);
    /// assert_eq!(Encoder::default().stringify(&v), "(1, \"a b\")");
    /// ```
    pub fn stringify(&self, value: &ArgValue) -> String {
        let mut out = String::new();
        render(value, &mut out);
        out
    }
}

fn render(value: &ArgValue, out: &mut String) {
    use std::fmt::Write;
    match value {
        ArgValue::Unit => out.push_str("null"),
        ArgValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        ArgValue::Int(i) => {
            let _ = write!(out, "{i}");
        }
        ArgValue::Uint(u) => {
            let _ = write!(out, "{u}u");
        }
        ArgValue::Float(f) => {
            // Debug formatting of f64 is shortest-roundtrip, so it is both
            // stable and unambiguous ("1.0" never collides with Int "1").
            let _ = write!(out, "{f:?}");
        }
        ArgValue::Str(s) => render_str(s, out),
        ArgValue::Bytes(b) => {
            use base64::engine::general_purpose::URL_SAFE_NO_PAD;
            use base64::Engine;
            out.push_str("b64:");
            out.push_str(&URL_SAFE_NO_PAD.encode(b));
        }
        ArgValue::Seq(items) => {
            out.push('(');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render(item, out);
            }
            out.push(')');
        }
        ArgValue::Map(pairs) => {
            out.push('{');
            for (i, (k, v)) in pairs.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render(k, out);
                out.push_str(": ");
                render(v, out);
            }
            out.push('}');
        }
    }
}

fn render_str(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                use std::fmt::Write;
                let _ = write!(out, "\\u{{{:04x}}}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
