//! # Keymaps
//!
//! A keymap collapses one bound call into a single [`CacheKey`] under a
//! selected encoding strategy.
//!
//! ```text
//!   (positional, named)                         canonical tree
//!   ─────────────────────  bind (signature.rs)  ──────────────────┐
//!                                                                 ▼
//!            ┌──────────────────────────────────────────────────────┐
//!            │  canonicalize: fold numerics (untyped) │ kind tags   │
//!            │  (typed) │ flatten or pair │ optional sentinel       │
//!            └───────────────────────────┬──────────────────────────┘
//!                                        ▼
//!              stage 1 ─► stage 2 ─► … ─► CacheKey
//!              (Raw)      (Hash)          (last stage decides form)
//! ```
//!
//! ## Variants
//!
//! | Style    | Key form            | Properties                           |
//! |----------|---------------------|--------------------------------------|
//! | `Raw`    | canonical tree      | lossless, comparable, largest        |
//! | `Hash`   | 32-byte digest      | fixed width; collisions negligible   |
//! | `String` | printable text      | human-readable; for string stores    |
//! | `Serial` | serialized bytes    | injective for any encodable call     |
//!
//! Stages chain left-to-right ([`Keymap::then`]); the canonical use is
//! raw → hash, which first canonicalizes arguments and then digests them.
//!
//! ## Configuration
//!
//! - **typed** — keep a type discriminant per argument, so `1` and `1.0`
//!   map to distinct keys. Untyped keymaps fold numerically equal values
//!   together instead.
//! - **flat** — merge positional and named arguments into one ordered
//!   sequence; non-flat keeps the `(positional, named)` pair structure.
//! - **sentinel** — optional marker inserted between the argument sections
//!   of a flattened key.
//!
//! ## Safe mode
//!
//! [`Keymap::key_with_fallback`] retries a failed encoding with the string
//! variant; if that also fails the call is uncacheable and the decorator
//! invokes the wrapped function without touching the cache.
//!
//! ```
//! use memokit::keymap::{bind_free, CallArgs, Keymap};
//!
//! let call = CallArgs::new().arg(&1i32).unwrap().arg(&2i32).unwrap();
//! let bound = bind_free(&call, &[]).unwrap();
//!
//! let typed = Keymap::hash().typed(true);
//! let untyped = Keymap::hash();
//! assert_ne!(typed.key(&bound).unwrap(), untyped.key(&bound).unwrap());
//! ```

mod signature;

pub use signature::{bind_free, BoundArgs, CallArgs, Ignore, Signature, ToCallArgs};

use crate::encode::Encoder;
use crate::error::{Error, Result};
use crate::key::CacheKey;
use crate::value::ArgValue;

/// One encoding stage of a keymap chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStyle {
    /// Keep the canonical argument tree as the key.
    Raw,
    /// Digest the serialized canonical form to a fixed-width key.
    Hash,
    /// Render the canonical form as stable text.
    String,
    /// Serialize the canonical form to bytes (injective).
    Serial,
}

impl KeyStyle {
    fn apply(self, value: ArgValue, enc: &Encoder) -> Result<CacheKey> {
        match self {
            KeyStyle::Raw => Ok(CacheKey::Raw(value)),
            KeyStyle::Hash => {
                let bytes = encode_for_key(enc, &value)?;
                Ok(CacheKey::Digest(enc.fingerprint(&bytes)))
            }
            KeyStyle::String => Ok(CacheKey::Text(enc.stringify(&value))),
            KeyStyle::Serial => Ok(CacheKey::Bytes(encode_for_key(enc, &value)?)),
        }
    }
}

fn encode_for_key(enc: &Encoder, value: &ArgValue) -> Result<Vec<u8>> {
    enc.encode(value).map_err(Error::key_encoding)
}

/// Converts bound calls into cache keys.
///
/// A keymap is a pure function: identical bound arguments always produce
/// byte-identical keys. See the module docs for the configuration knobs.
#[derive(Debug, Clone)]
pub struct Keymap {
    styles: Vec<KeyStyle>,
    typed: bool,
    flat: bool,
    sentinel: Option<ArgValue>,
    encoder: Encoder,
}

impl Default for Keymap {
    /// The default keymap: flat, untyped, hash-keyed.
    fn default() -> Self {
        Keymap::hash()
    }
}

impl Keymap {
    fn with_style(style: KeyStyle) -> Self {
        Keymap {
            styles: vec![style],
            typed: false,
            flat: true,
            sentinel: None,
            encoder: Encoder::default(),
        }
    }

    /// A keymap whose keys are the canonical argument trees themselves.
    pub fn raw() -> Self {
        Self::with_style(KeyStyle::Raw)
    }

    /// A keymap producing fixed-width digest keys.
    pub fn hash() -> Self {
        Self::with_style(KeyStyle::Hash)
    }

    /// A keymap producing printable string keys.
    pub fn string() -> Self {
        Self::with_style(KeyStyle::String)
    }

    /// A keymap producing serialized byte keys.
    pub fn serial() -> Self {
        Self::with_style(KeyStyle::Serial)
    }

    /// Keep type discriminants, so `1` and `1.0` key differently.
    pub fn typed(mut self, typed: bool) -> Self {
        self.typed = typed;
        self
    }

    /// Flatten positional and named arguments into one sequence (`true`,
    /// the default) or keep them as a pair (`false`).
    pub fn flat(mut self, flat: bool) -> Self {
        self.flat = flat;
        self
    }

    /// Insert a marker between the sections of a flattened key.
    pub fn sentinel<T: serde::Serialize + ?Sized>(mut self, marker: &T) -> Result<Self> {
        self.sentinel = Some(crate::value::to_arg_value(marker)?);
        Ok(self)
    }

    /// Appends another encoding stage; the previous stage's key becomes
    /// this stage's input.
    pub fn then(mut self, style: KeyStyle) -> Self {
        self.styles.push(style);
        self
    }

    /// Whether this keymap keeps type discriminants.
    pub fn is_typed(&self) -> bool {
        self.typed
    }

    /// Whether this keymap flattens arguments.
    pub fn is_flat(&self) -> bool {
        self.flat
    }

    /// Produces the key for one bound call.
    pub fn key(&self, bound: &BoundArgs) -> Result<CacheKey> {
        let canonical = self.canonical(bound);
        let mut stages = self.styles.iter();
        let first = stages
            .next()
            .ok_or_else(|| Error::Invariant("keymap with no encoding stages".into()))?;
        let mut key = first.apply(canonical, &self.encoder)?;
        for style in stages {
            key = style.apply(key.into_arg_value(), &self.encoder)?;
        }
        Ok(key)
    }

    /// Produces the key, degrading to the string variant on failure.
    ///
    /// Returns the original error only when the string fallback also fails,
    /// in which case the call is uncacheable.
    pub fn key_with_fallback(&self, bound: &BoundArgs) -> Result<CacheKey> {
        match self.key(bound) {
            Ok(key) => Ok(key),
            Err(primary) => {
                let fallback = Keymap {
                    styles: vec![KeyStyle::String],
                    typed: self.typed,
                    flat: self.flat,
                    sentinel: self.sentinel.clone(),
                    encoder: self.encoder,
                };
                fallback.key(bound).map_err(|_| primary)
            }
        }
    }

    /// Builds the canonical tree for a bound call under this keymap's
    /// typing and flattening policy.
    fn canonical(&self, bound: &BoundArgs) -> ArgValue {
        let fold = !self.typed;
        let normalize = |v: &ArgValue| if fold { v.fold_numeric() } else { v.clone() };

        let pos: Vec<ArgValue> = bound.positional().iter().map(normalize).collect();
        let named: Vec<(String, ArgValue)> = bound
            .named()
            .iter()
            .map(|(n, v)| (n.clone(), normalize(v)))
            .collect();

        if self.flat {
            let mut parts = pos.clone();
            if !named.is_empty() {
                if let Some(mark) = &self.sentinel {
                    parts.push(mark.clone());
                }
                for (name, value) in &named {
                    parts.push(ArgValue::Str(name.clone()));
                    parts.push(value.clone());
                }
            }
            if self.typed {
                if let Some(mark) = &self.sentinel {
                    parts.push(mark.clone());
                }
                parts.extend(pos.iter().map(|v| ArgValue::Str(v.kind().to_owned())));
                if !named.is_empty() {
                    if let Some(mark) = &self.sentinel {
                        parts.push(mark.clone());
                    }
                    parts.extend(named.iter().map(|(_, v)| ArgValue::Str(v.kind().to_owned())));
                }
                ArgValue::Seq(parts)
            } else if parts.len() == 1 && parts[0].is_fast_leaf() {
                match parts.pop() {
                    Some(leaf) => leaf,
                    None => ArgValue::Seq(Vec::new()),
                }
            } else {
                ArgValue::Seq(parts)
            }
        } else {
            let pos_part = ArgValue::Seq(pos.clone());
            let named_part = ArgValue::Map(
                named
                    .iter()
                    .map(|(n, v)| (ArgValue::Str(n.clone()), v.clone()))
                    .collect(),
            );
            if self.typed {
                ArgValue::Seq(vec![
                    pos_part,
                    named_part,
                    ArgValue::Seq(
                        pos.iter()
                            .map(|v| ArgValue::Str(v.kind().to_owned()))
                            .collect(),
                    ),
                    ArgValue::Seq(
                        named
                            .iter()
                            .map(|(_, v)| ArgValue::Str(v.kind().to_owned()))
                            .collect(),
                    ),
                ])
            } else {
                ArgValue::Seq(vec![pos_part, named_part])
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn bound(call: CallArgs) -> BoundArgs {
        bind_free(&call, &[]).unwrap()
    }

    fn two_ints() -> BoundArgs {
        bound(CallArgs::new().arg(&1i64).unwrap().arg(&2i64).unwrap())
    }

    #[test]
    fn identical_calls_produce_byte_identical_keys() {
        let map = Keymap::hash();
        let a = map.key(&two_ints()).unwrap();
        let b = map.key(&two_ints()).unwrap();
        assert_eq!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
    }

    #[test]
    fn typed_distinguishes_int_from_float() {
        let int_call = bound(CallArgs::new().arg(&1i64).unwrap().arg(&2i64).unwrap());
        let float_call = bound(CallArgs::new().arg(&1.0f64).unwrap().arg(&2i64).unwrap());

        let typed = Keymap::hash().typed(true);
        assert_ne!(
            typed.key(&int_call).unwrap(),
            typed.key(&float_call).unwrap()
        );

        let untyped = Keymap::hash();
        assert_eq!(
            untyped.key(&int_call).unwrap(),
            untyped.key(&float_call).unwrap()
        );
    }

    #[test]
    fn flat_and_pair_forms_differ() {
        let call = CallArgs::new()
            .arg(&1i64)
            .unwrap()
            .named("y", &2i64)
            .unwrap();
        let b = bound(call);
        let flat = Keymap::raw().key(&b).unwrap();
        let pair = Keymap::raw().flat(false).key(&b).unwrap();
        assert_ne!(flat, pair);
    }

    #[test]
    fn sentinel_separates_sections() {
        let call = CallArgs::new()
            .arg(&1i64)
            .unwrap()
            .named("y", &2i64)
            .unwrap();
        let b = bound(call);
        let plain = Keymap::raw().key(&b).unwrap();
        let marked = Keymap::raw().sentinel("|").unwrap().key(&b).unwrap();
        assert_ne!(plain, marked);
    }

    #[test]
    fn single_fast_leaf_collapses() {
        let b = bound(CallArgs::new().arg(&7i64).unwrap());
        match Keymap::raw().key(&b).unwrap() {
            CacheKey::Raw(ArgValue::Int(7)) => {}
            other => panic!("expected collapsed leaf, got {other:?}"),
        }
    }

    #[test]
    fn typed_single_leaf_does_not_collapse() {
        let b = bound(CallArgs::new().arg(&7i64).unwrap());
        match Keymap::raw().typed(true).key(&b).unwrap() {
            CacheKey::Raw(ArgValue::Seq(_)) => {}
            other => panic!("expected sequence, got {other:?}"),
        }
    }

    #[test]
    fn raw_then_hash_equals_hash() {
        let b = two_ints();
        let chained = Keymap::raw().then(KeyStyle::Hash).key(&b).unwrap();
        let direct = Keymap::hash().key(&b).unwrap();
        assert_eq!(chained, direct);
    }

    #[test]
    fn string_keys_are_printable() {
        let b = two_ints();
        match Keymap::string().key(&b).unwrap() {
            CacheKey::Text(s) => assert_eq!(s, "(1, 2)"),
            other => panic!("expected text key, got {other:?}"),
        }
    }

    #[test]
    fn serial_keys_roundtrip_to_canonical_form() {
        let b = two_ints();
        match Keymap::serial().key(&b).unwrap() {
            CacheKey::Bytes(bytes) => {
                let tree: ArgValue = Encoder::default().decode(&bytes).unwrap();
                assert_eq!(
                    tree,
                    ArgValue::Seq(vec![ArgValue::Int(1), ArgValue::Int(2)])
                );
            }
            other => panic!("expected byte key, got {other:?}"),
        }
    }

    #[test]
    fn named_args_key_independently_of_call_order() {
        let ab = bound(
            CallArgs::new()
                .named("a", &1i64)
                .unwrap()
                .named("b", &2i64)
                .unwrap(),
        );
        let ba = bound(
            CallArgs::new()
                .named("b", &2i64)
                .unwrap()
                .named("a", &1i64)
                .unwrap(),
        );
        let map = Keymap::hash();
        assert_eq!(map.key(&ab).unwrap(), map.key(&ba).unwrap());
    }
}
