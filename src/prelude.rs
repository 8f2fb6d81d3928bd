//! Convenience re-exports for the common path.

pub use crate::archive::{
    open_archive, Archive, ArchiveConfig, ArchiveRegistry, DatasetArchive, DatasetDirArchive,
    DirArchive, FileArchive, KeyNaming, MemoryArchive, NullArchive, SqlArchive,
};
pub use crate::cache::{Cache, CachePolicy, Lookup};
pub use crate::encode::Encoder;
pub use crate::error::{Error, Result};
pub use crate::key::CacheKey;
pub use crate::keymap::{CallArgs, Ignore, KeyStyle, Keymap, Signature, ToCallArgs};
pub use crate::memo::{CacheInfo, Memo, MemoBuilder};
pub use crate::value::{to_arg_value, ArgValue};
