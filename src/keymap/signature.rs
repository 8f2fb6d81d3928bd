//! Call signatures and argument binding.
//!
//! Rust has no reflective argument inspection, so the information a dynamic
//! runtime would recover from a function object is declared explicitly here:
//!
//! - [`CallArgs`] carries one concrete call: positional values plus named
//!   values, already reduced to canonical [`ArgValue`] trees.
//! - [`Signature`] declares a callable's parameters (names, defaults,
//!   variadic tails) and [`Signature::bind`] reconstructs the full argument
//!   vector for a call: defaults applied, named arguments matched to their
//!   declared positions, variadics collapsed.
//! - [`Ignore`] masks arguments out of key formation, by declared name, by
//!   positional index, or wholesale for variadic tails.
//!
//! Binding produces [`BoundArgs`], the canonical pair the keymap encodes:
//! declared-plus-vararg positions in order, leftover named arguments sorted
//! by name.
//!
//! ```
//! use memokit::keymap::{CallArgs, Signature};
//!
//! let sig = Signature::new(["x", "verbose"])
//!     .default("verbose", &false)
//!     .unwrap();
//!
//! // h(1) and h(1, verbose=false) bind identically: the default fills in.
//! let a = sig.bind(&CallArgs::new().arg(&1).unwrap(), &[]).unwrap();
//! let b = sig
//!     .bind(
//!         &CallArgs::new().arg(&1).unwrap().named("verbose", &false).unwrap(),
//!         &[],
//!     )
//!     .unwrap();
//! assert_eq!(a, b);
//! ```

use serde::Serialize;

use crate::error::{Error, Result};
use crate::value::{to_arg_value, ArgValue};

/// One concrete call: positional and named argument values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallArgs {
    positional: Vec<ArgValue>,
    named: Vec<(String, ArgValue)>,
}

impl CallArgs {
    /// Creates an empty call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    ///
    /// # Errors
    ///
    /// [`Error::KeyEncoding`] if the value cannot be reduced to a canonical
    /// tree. The safe decorator path turns that into a cache bypass.
    pub fn arg<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        self.positional.push(to_arg_value(value)?);
        Ok(self)
    }

    /// Appends a named argument.
    pub fn named<T: Serialize + ?Sized>(mut self, name: &str, value: &T) -> Result<Self> {
        self.named.push((name.to_owned(), to_arg_value(value)?));
        Ok(self)
    }

    /// The positional values, in call order.
    pub fn positional(&self) -> &[ArgValue] {
        &self.positional
    }

    /// The named values, in call order (unsorted).
    pub fn named_args(&self) -> &[(String, ArgValue)] {
        &self.named
    }

    /// Total number of arguments.
    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    /// `true` when the call carries no arguments.
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

/// Conversion from plain Rust argument shapes into a [`CallArgs`].
///
/// Implemented for `CallArgs` itself (identity) and for tuples of up to
/// eight `Serialize` values, which become purely positional calls. This is
/// how `memo.call(&(1, 2))` reaches the keymap.
pub trait ToCallArgs {
    /// Reduces the receiver to canonical call arguments.
    fn to_call_args(&self) -> Result<CallArgs>;
}

impl ToCallArgs for CallArgs {
    fn to_call_args(&self) -> Result<CallArgs> {
        Ok(self.clone())
    }
}

impl ToCallArgs for () {
    fn to_call_args(&self) -> Result<CallArgs> {
        Ok(CallArgs::new())
    }
}

macro_rules! impl_to_call_args {
    ($(($($name:ident : $idx:tt),+))+) => {
        $(
            impl<$($name: Serialize),+> ToCallArgs for ($($name,)+) {
                fn to_call_args(&self) -> Result<CallArgs> {
                    Ok(CallArgs {
                        positional: vec![$(to_arg_value(&self.$idx)?),+],
                        named: Vec::new(),
                    })
                }
            }
        )+
    };
}

impl_to_call_args! {
    (A0: 0)
    (A0: 0, A1: 1)
    (A0: 0, A1: 1, A2: 2)
    (A0: 0, A1: 1, A2: 2, A3: 3)
    (A0: 0, A1: 1, A2: 2, A3: 3, A4: 4)
    (A0: 0, A1: 1, A2: 2, A3: 3, A4: 4, A5: 5)
    (A0: 0, A1: 1, A2: 2, A3: 3, A4: 4, A5: 5, A6: 6)
    (A0: 0, A1: 1, A2: 2, A3: 3, A4: 4, A5: 5, A6: 6, A7: 7)
}

/// An argument masked out of key formation.
///
/// Ignored arguments never trigger recomputation; calls differing only in
/// ignored arguments share one cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ignore {
    /// Mask a parameter by declared (or keyword) name.
    Name(String),
    /// Mask a parameter by position in the bound argument vector.
    Position(usize),
    /// Mask the entire variadic positional tail.
    VarArgs,
    /// Mask all leftover named arguments.
    VarKwargs,
}

impl Ignore {
    /// Convenience constructor for [`Ignore::Name`].
    pub fn name(name: impl Into<String>) -> Self {
        Ignore::Name(name.into())
    }
}

fn ignores_name(ignore: &[Ignore], name: &str) -> bool {
    ignore
        .iter()
        .any(|i| matches!(i, Ignore::Name(n) if n == name))
}

fn ignores_position(ignore: &[Ignore], idx: usize) -> bool {
    ignore
        .iter()
        .any(|i| matches!(i, Ignore::Position(p) if *p == idx))
}

fn ignores_varargs(ignore: &[Ignore]) -> bool {
    ignore.iter().any(|i| matches!(i, Ignore::VarArgs))
}

fn ignores_varkwargs(ignore: &[Ignore]) -> bool {
    ignore.iter().any(|i| matches!(i, Ignore::VarKwargs))
}

/// One declared parameter.
#[derive(Debug, Clone)]
struct Param {
    name: String,
    default: Option<ArgValue>,
}

/// A callable's declared parameters.
///
/// Declaration order is the canonical argument order. Parameters may carry
/// defaults; the signature may additionally accept a variadic positional
/// tail and/or arbitrary extra named arguments.
#[derive(Debug, Clone)]
pub struct Signature {
    params: Vec<Param>,
    varargs: bool,
    varkwargs: bool,
}

impl Signature {
    /// Declares parameters by name, in order, without defaults.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Signature {
            params: names
                .into_iter()
                .map(|n| Param {
                    name: n.into(),
                    default: None,
                })
                .collect(),
            varargs: false,
            varkwargs: false,
        }
    }

    /// Attaches a default value to a declared parameter.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if no parameter with that name was declared;
    /// [`Error::KeyEncoding`] if the default cannot be canonicalized.
    pub fn default<T: Serialize + ?Sized>(mut self, name: &str, value: &T) -> Result<Self> {
        let value = to_arg_value(value)?;
        match self.params.iter_mut().find(|p| p.name == name) {
            Some(param) => {
                param.default = Some(value);
                Ok(self)
            }
            None => Err(Error::Config(format!(
                "no parameter named '{name}' to attach a default to"
            ))),
        }
    }

    /// Accepts a variadic positional tail beyond the declared parameters.
    pub fn varargs(mut self) -> Self {
        self.varargs = true;
        self
    }

    /// Accepts arbitrary extra named arguments.
    pub fn varkwargs(mut self) -> Self {
        self.varkwargs = true;
        self
    }

    /// Number of declared parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Reconstructs the full canonical argument vector for a call.
    ///
    /// Positional values fill declared slots in order, overflow goes to the
    /// variadic tail; named values fill their declared slots or the named
    /// overflow; unfilled slots take their defaults. The ignore list is then
    /// applied. See the module docs for an example.
    ///
    /// # Errors
    ///
    /// [`Error::KeyEncoding`] on arity mismatch, unknown or duplicate named
    /// arguments, or a missing argument without a default.
    pub fn bind(&self, call: &CallArgs, ignore: &[Ignore]) -> Result<BoundArgs> {
        let mut slots: Vec<Option<ArgValue>> = vec![None; self.params.len()];
        let mut tail: Vec<ArgValue> = Vec::new();

        for (idx, value) in call.positional().iter().enumerate() {
            if idx < slots.len() {
                slots[idx] = Some(value.clone());
            } else if self.varargs {
                tail.push(value.clone());
            } else {
                return Err(Error::key_encoding(format!(
                    "too many positional arguments: expected at most {}, got {}",
                    self.params.len(),
                    call.positional().len()
                )));
            }
        }

        let mut extra_named: Vec<(String, ArgValue)> = Vec::new();
        for (name, value) in call.named_args() {
            match self.params.iter().position(|p| &p.name == name) {
                Some(idx) => {
                    if slots[idx].is_some() {
                        return Err(Error::key_encoding(format!(
                            "argument '{name}' given more than once"
                        )));
                    }
                    slots[idx] = Some(value.clone());
                }
                None if self.varkwargs => {
                    if extra_named.iter().any(|(n, _)| n == name) {
                        return Err(Error::key_encoding(format!(
                            "named argument '{name}' given more than once"
                        )));
                    }
                    extra_named.push((name.clone(), value.clone()));
                }
                None => {
                    return Err(Error::key_encoding(format!(
                        "unexpected named argument '{name}'"
                    )));
                }
            }
        }

        let mut positional = Vec::with_capacity(slots.len() + tail.len());
        for (idx, (slot, param)) in slots.into_iter().zip(&self.params).enumerate() {
            let value = match slot.or_else(|| param.default.clone()) {
                Some(v) => v,
                None => {
                    return Err(Error::key_encoding(format!(
                        "missing argument '{}'",
                        param.name
                    )));
                }
            };
            if ignores_name(ignore, &param.name) || ignores_position(ignore, idx) {
                continue;
            }
            positional.push(value);
        }

        if !ignores_varargs(ignore) {
            let base = self.params.len();
            for (offset, value) in tail.into_iter().enumerate() {
                if !ignores_position(ignore, base + offset) {
                    positional.push(value);
                }
            }
        }

        let named = if ignores_varkwargs(ignore) {
            Vec::new()
        } else {
            let mut named: Vec<(String, ArgValue)> = extra_named
                .into_iter()
                .filter(|(name, _)| !ignores_name(ignore, name))
                .collect();
            named.sort_by(|(a, _), (b, _)| a.cmp(b));
            named
        };

        Ok(BoundArgs { positional, named })
    }
}

/// Binds a call without a declared signature.
///
/// Positional values are taken in call order (all treated as a variadic
/// tail for [`Ignore::VarArgs`] purposes); named values are sorted by name.
/// Duplicate named arguments are rejected.
pub fn bind_free(call: &CallArgs, ignore: &[Ignore]) -> Result<BoundArgs> {
    let positional = if ignores_varargs(ignore) {
        Vec::new()
    } else {
        call.positional()
            .iter()
            .enumerate()
            .filter(|(idx, _)| !ignores_position(ignore, *idx))
            .map(|(_, v)| v.clone())
            .collect()
    };

    let named = if ignores_varkwargs(ignore) {
        Vec::new()
    } else {
        let mut named: Vec<(String, ArgValue)> = Vec::new();
        for (name, value) in call.named_args() {
            if named.iter().any(|(n, _)| n == name) {
                return Err(Error::key_encoding(format!(
                    "named argument '{name}' given more than once"
                )));
            }
            if !ignores_name(ignore, name) {
                named.push((name.clone(), value.clone()));
            }
        }
        named.sort_by(|(a, _), (b, _)| a.cmp(b));
        named
    };

    Ok(BoundArgs { positional, named })
}

/// The canonical bound form of one call: positional values in declaration
/// order, leftover named values sorted by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundArgs {
    pub(crate) positional: Vec<ArgValue>,
    pub(crate) named: Vec<(String, ArgValue)>,
}

impl BoundArgs {
    /// Positional values, declaration order.
    pub fn positional(&self) -> &[ArgValue] {
        &self.positional
    }

    /// Leftover named values, sorted by name.
    pub fn named(&self) -> &[(String, ArgValue)] {
        &self.named
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
