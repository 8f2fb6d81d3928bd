//! Canonical argument values.
//!
//! Every argument to a memoized callable is reduced to an [`ArgValue`] before
//! key formation. The tree is self-describing, ordered, and hashable, which
//! gives the key-mapping subsystem three properties the raw user types cannot:
//!
//! - **Determinism**: identical inputs produce structurally identical trees,
//!   including map entries (sorted by key) and floats (canonical NaN bit
//!   pattern, `-0.0` normalized to `0.0`).
//! - **Comparability**: `ArgValue` is `Eq + Ord + Hash`, so any tree can act
//!   as a raw cache key or be sorted into a canonical sequence.
//! - **Serializability**: trees round-trip through `serde`, so raw keys can
//!   live in durable archives.
//!
//! Conversion from user types happens through [`to_arg_value`], a custom
//! `serde::Serializer` that maps the serde data model onto the tree:
//!
//! | serde form                  | tree form                                |
//! |-----------------------------|------------------------------------------|
//! | unit, none, unit struct     | `Unit`                                   |
//! | bool                        | `Bool`                                   |
//! | i8..i64                     | `Int`                                    |
//! | u8..u64                     | `Uint`                                   |
//! | f32/f64                     | `Float` (canonicalized)                  |
//! | char, str                   | `Str`                                    |
//! | bytes                       | `Bytes`                                  |
//! | seq, tuple, tuple struct    | `Seq`                                    |
//! | map                         | `Map` (entries sorted by key)            |
//! | struct                      | `Map` of `(field name, value)`           |
//! | unit variant                | `Str("Type::Variant")`                   |
//! | newtype/tuple/struct variant| `Map` of `(variant name, payload)`       |

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use serde::ser::{self, Serialize};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Canonical bit pattern used for every NaN.
///
/// NaN never compares equal to itself, so keys formed from NaN-carrying
/// arguments would never hit. All NaNs collapse to this quiet-NaN payload
/// before they enter a key.
const CANONICAL_NAN_BITS: u64 = 0x7ff8_0000_0000_0000;

/// A canonical, comparable, serializable argument value.
///
/// See the module docs for how user types map onto this tree.
#[derive(Debug, Clone, serde::Serialize, Deserialize)]
pub enum ArgValue {
    /// Unit, `None`, and unit structs.
    Unit,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer that may exceed `i64::MAX`.
    Uint(u64),
    /// Floating point, canonicalized (single NaN pattern, no `-0.0`).
    Float(f64),
    /// Text.
    Str(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Ordered sequence.
    Seq(Vec<ArgValue>),
    /// Key-value pairs; map entries are sorted by key, struct fields keep
    /// declaration order.
    Map(Vec<(ArgValue, ArgValue)>),
}

impl ArgValue {
    /// Builds a `Float` with the canonical bit representation.
    #[inline]
    pub fn float(f: f64) -> Self {
        ArgValue::Float(canonical_f64(f))
    }

    /// Short tag naming the variant, used as the type discriminant by
    /// typed keymaps.
    pub fn kind(&self) -> &'static str {
        match self {
            ArgValue::Unit => "unit",
            ArgValue::Bool(_) => "bool",
            ArgValue::Int(_) => "int",
            ArgValue::Uint(_) => "uint",
            ArgValue::Float(_) => "float",
            ArgValue::Str(_) => "str",
            ArgValue::Bytes(_) => "bytes",
            ArgValue::Seq(_) => "seq",
            ArgValue::Map(_) => "map",
        }
    }

    /// Returns `true` for leaves that may stand alone as a fast-path key.
    ///
    /// Mirrors the single-argument fast path of flat keymaps: a lone leaf of
    /// one of these kinds is used directly instead of being wrapped in a
    /// one-element sequence.
    pub fn is_fast_leaf(&self) -> bool {
        matches!(
            self,
            ArgValue::Unit
                | ArgValue::Bool(_)
                | ArgValue::Int(_)
                | ArgValue::Uint(_)
                | ArgValue::Str(_)
                | ArgValue::Bytes(_)
        )
    }

    /// Folds numerically equal leaves together: `Uint` that fits in `i64`
    /// becomes `Int`, and integral finite `Float` becomes `Int`.
    ///
    /// Untyped keymaps apply this so that e.g. `1u8`, `1i32`, and `1.0f64`
    /// all produce the same key. Typed keymaps skip it.
    pub fn fold_numeric(&self) -> ArgValue {
        match self {
            ArgValue::Uint(u) => {
                if let Ok(i) = i64::try_from(*u) {
                    ArgValue::Int(i)
                } else {
                    ArgValue::Uint(*u)
                }
            }
            ArgValue::Float(f) => {
                let f = canonical_f64(*f);
                // Strict upper bound: 2^63 as f64 is exact but saturates the
                // cast, which would alias Float(2^63) with Int(i64::MAX).
                if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64
                {
                    ArgValue::Int(f as i64)
                } else {
                    ArgValue::Float(f)
                }
            }
            ArgValue::Seq(items) => ArgValue::Seq(items.iter().map(Self::fold_numeric).collect()),
            ArgValue::Map(pairs) => ArgValue::Map(
                pairs
                    .iter()
                    .map(|(k, v)| (k.fold_numeric(), v.fold_numeric()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn variant_rank(&self) -> u8 {
        match self {
            ArgValue::Unit => 0,
            ArgValue::Bool(_) => 1,
            ArgValue::Int(_) => 2,
            ArgValue::Uint(_) => 3,
            ArgValue::Float(_) => 4,
            ArgValue::Str(_) => 5,
            ArgValue::Bytes(_) => 6,
            ArgValue::Seq(_) => 7,
            ArgValue::Map(_) => 8,
        }
    }
}

#[inline]
fn canonical_f64(f: f64) -> f64 {
    if f.is_nan() {
        f64::from_bits(CANONICAL_NAN_BITS)
    } else if f == 0.0 {
        0.0
    } else {
        f
    }
}

// Equality, ordering, and hashing are all defined over the canonical form so
// that Float participates safely. Two trees compare equal iff their canonical
// encodings are byte-identical.

impl PartialEq for ArgValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ArgValue {}

impl Ord for ArgValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use ArgValue::*;
        match (self, other) {
            (Unit, Unit) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Uint(a), Uint(b)) => a.cmp(b),
            (Float(a), Float(b)) => canonical_f64(*a).total_cmp(&canonical_f64(*b)),
            (Str(a), Str(b)) => a.cmp(b),
            (Bytes(a), Bytes(b)) => a.cmp(b),
            (Seq(a), Seq(b)) => a.cmp(b),
            (Map(a), Map(b)) => a.cmp(b),
            (a, b) => a.variant_rank().cmp(&b.variant_rank()),
        }
    }
}

impl PartialOrd for ArgValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for ArgValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u8(self.variant_rank());
        match self {
            ArgValue::Unit => {}
            ArgValue::Bool(b) => b.hash(state),
            ArgValue::Int(i) => i.hash(state),
            ArgValue::Uint(u) => u.hash(state),
            ArgValue::Float(f) => canonical_f64(*f).to_bits().hash(state),
            ArgValue::Str(s) => s.hash(state),
            ArgValue::Bytes(b) => b.hash(state),
            ArgValue::Seq(items) => {
                state.write_usize(items.len());
                for item in items {
                    item.hash(state);
                }
            }
            ArgValue::Map(pairs) => {
                state.write_usize(pairs.len());
                for (k, v) in pairs {
                    k.hash(state);
                    v.hash(state);
                }
            }
        }
    }
}

/// Reduces any serializable value to its canonical [`ArgValue`] tree.
///
/// # Errors
///
/// Returns [`Error::KeyEncoding`] when the value's `Serialize` implementation
/// fails or produces a form the tree cannot represent (128-bit integers).
///
/// # Example
///
/// ```
/// use memokit::value::{to_arg_value, ArgValue};
///
/// let v = to_arg_value(&(1, "two")).unwrap();
/// assert_eq!(
///     v,
///     ArgValue::Seq(vec![ArgValue::Int(1), ArgValue::Str("two".into())])
/// );
/// ```
pub fn to_arg_value<T>(value: &T) -> Result<ArgValue>
where
    T: Serialize + ?Sized,
{
    value.serialize(ValueSerializer)
}

// ---------------------------------------------------------------------------
// serde bridge
// ---------------------------------------------------------------------------

/// Serializer that produces [`ArgValue`] trees instead of an output stream.
struct ValueSerializer;

impl ser::Serializer for ValueSerializer {
    type Ok = ArgValue;
    type Error = Error;

    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = VariantSeqBuilder;
    type SerializeMap = MapBuilder;
    type SerializeStruct = StructBuilder;
    type SerializeStructVariant = VariantStructBuilder;

    fn serialize_bool(self, v: bool) -> Result<ArgValue> {
        Ok(ArgValue::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<ArgValue> {
        Ok(ArgValue::Int(v as i64))
    }

    fn serialize_i16(self, v: i16) -> Result<ArgValue> {
        Ok(ArgValue::Int(v as i64))
    }

    fn serialize_i32(self, v: i32) -> Result<ArgValue> {
        Ok(ArgValue::Int(v as i64))
    }

    fn serialize_i64(self, v: i64) -> Result<ArgValue> {
        Ok(ArgValue::Int(v))
    }

    fn serialize_u8(self, v: u8) -> Result<ArgValue> {
        Ok(ArgValue::Uint(v as u64))
    }

    fn serialize_u16(self, v: u16) -> Result<ArgValue> {
        Ok(ArgValue::Uint(v as u64))
    }

    fn serialize_u32(self, v: u32) -> Result<ArgValue> {
        Ok(ArgValue::Uint(v as u64))
    }

    fn serialize_u64(self, v: u64) -> Result<ArgValue> {
        Ok(ArgValue::Uint(v))
    }

    fn serialize_f32(self, v: f32) -> Result<ArgValue> {
        Ok(ArgValue::float(v as f64))
    }

    fn serialize_f64(self, v: f64) -> Result<ArgValue> {
        Ok(ArgValue::float(v))
    }

    fn serialize_char(self, v: char) -> Result<ArgValue> {
        Ok(ArgValue::Str(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<ArgValue> {
        Ok(ArgValue::Str(v.to_owned()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<ArgValue> {
        Ok(ArgValue::Bytes(v.to_vec()))
    }

    fn serialize_none(self) -> Result<ArgValue> {
        Ok(ArgValue::Unit)
    }

    fn serialize_some<T>(self, value: &T) -> Result<ArgValue>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(ValueSerializer)
    }

    fn serialize_unit(self) -> Result<ArgValue> {
        Ok(ArgValue::Unit)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<ArgValue> {
        Ok(ArgValue::Unit)
    }

    fn serialize_unit_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<ArgValue> {
        Ok(ArgValue::Str(format!("{name}::{variant}")))
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<ArgValue>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(ValueSerializer)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<ArgValue>
    where
        T: Serialize + ?Sized,
    {
        let inner = value.serialize(ValueSerializer)?;
        Ok(ArgValue::Map(vec![(
            ArgValue::Str(variant.to_owned()),
            inner,
        )]))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqBuilder> {
        Ok(SeqBuilder {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqBuilder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<SeqBuilder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantSeqBuilder> {
        Ok(VariantSeqBuilder {
            variant,
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, len: Option<usize>) -> Result<MapBuilder> {
        Ok(MapBuilder {
            pairs: Vec::with_capacity(len.unwrap_or(0)),
            pending_key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<StructBuilder> {
        Ok(StructBuilder {
            fields: Vec::with_capacity(len),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantStructBuilder> {
        Ok(VariantStructBuilder {
            variant,
            fields: Vec::with_capacity(len),
        })
    }
}

struct SeqBuilder {
    items: Vec<ArgValue>,
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = ArgValue;
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.items.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<ArgValue> {
        Ok(ArgValue::Seq(self.items))
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Ok = ArgValue;
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<ArgValue> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqBuilder {
    type Ok = ArgValue;
    type Error = Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<ArgValue> {
        ser::SerializeSeq::end(self)
    }
}

struct VariantSeqBuilder {
    variant: &'static str,
    items: Vec<ArgValue>,
}

impl ser::SerializeTupleVariant for VariantSeqBuilder {
    type Ok = ArgValue;
    type Error = Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.items.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<ArgValue> {
        Ok(ArgValue::Map(vec![(
            ArgValue::Str(self.variant.to_owned()),
            ArgValue::Seq(self.items),
        )]))
    }
}

struct MapBuilder {
    pairs: Vec<(ArgValue, ArgValue)>,
    pending_key: Option<ArgValue>,
}

impl ser::SerializeMap for MapBuilder {
    type Ok = ArgValue;
    type Error = Error;

    fn serialize_key<T>(&mut self, key: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.pending_key = Some(key.serialize(ValueSerializer)?);
        Ok(())
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| Error::key_encoding("map value serialized before its key"))?;
        self.pairs.push((key, value.serialize(ValueSerializer)?));
        Ok(())
    }

    fn end(mut self) -> Result<ArgValue> {
        // Hash maps iterate in arbitrary order; sorting restores determinism.
        self.pairs.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(ArgValue::Map(self.pairs))
    }
}

struct StructBuilder {
    fields: Vec<(ArgValue, ArgValue)>,
}

impl ser::SerializeStruct for StructBuilder {
    type Ok = ArgValue;
    type Error = Error;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.fields.push((
            ArgValue::Str(key.to_owned()),
            value.serialize(ValueSerializer)?,
        ));
        Ok(())
    }

    fn end(self) -> Result<ArgValue> {
        Ok(ArgValue::Map(self.fields))
    }
}

struct VariantStructBuilder {
    variant: &'static str,
    fields: Vec<(ArgValue, ArgValue)>,
}

impl ser::SerializeStructVariant for VariantStructBuilder {
    type Ok = ArgValue;
    type Error = Error;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.fields.push((
            ArgValue::Str(key.to_owned()),
            value.serialize(ValueSerializer)?,
        ));
        Ok(())
    }

    fn end(self) -> Result<ArgValue> {
        Ok(ArgValue::Map(vec![(
            ArgValue::Str(self.variant.to_owned()),
            ArgValue::Map(self.fields),
        )]))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
