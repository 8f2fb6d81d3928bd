//! memokit: persistent memoization — policy-bounded in-memory caches backed
//! by durable archives.
//!
//! The programming model is `y = f(x)`: a call's arguments canonicalize
//! into a cache key ([`keymap`]), results live in a bounded in-memory
//! mapping with an eviction policy ([`cache`], [`policy`]), evicted entries
//! demote to a durable store and archived entries promote back on miss
//! ([`archive`]), and [`memo`] glues the triple onto a callable.
//!
//! ```
//! use memokit::prelude::*;
//!
//! let archive = open_archive(&ArchiveConfig::Memory).unwrap();
//! let square = MemoBuilder::lru(128)
//!     .archive(archive)
//!     .build(|&(x,): &(i64,)| x * x)
//!     .unwrap();
//!
//! assert_eq!(*square.call(&(12,)).unwrap(), 144);
//! ```

pub mod archive;
pub mod cache;
pub mod encode;
pub mod error;
pub mod key;
pub mod keymap;
pub mod memo;
pub mod policy;
pub mod prelude;
pub mod traits;
pub mod value;

pub use error::{Error, Result};
