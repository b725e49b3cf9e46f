//! Updatable on-disk value index for the xylem document database.
//!
//! Maps value keys (text-node contents or attribute values) to sorted
//! record-id posting lists, kept on disk and updated in place. Each index
//! owns three files (prefix `txt` or `atv` by [`ValueKind`]):
//!
//! ```text
//! <prefix>.xyl    heap: bytes 0-3 hold the key count (big-endian), the
//!                 rest is posting lists `len, id0, delta1, ...` in the
//!                 shared number encoding (format::num)
//! <prefix>r.xyl   directory: packed 5-byte little-endian heap offsets,
//!                 one per key slot, slots sorted by key
//! <prefix>l.xyl   key slots: paged table of key-record offsets plus the
//!                 length-prefixed key bytes themselves
//! ```
//!
//! Updates keep the slot arrays sorted and the posting lists strictly
//! ascending. Rewritten lists never outgrow the region they replace (a
//! list that would grow is appended instead and the directory repointed),
//! so readers holding old offsets keep decoding valid data. Dead heap
//! bytes accumulate until the enclosing engine rebuilds the index through
//! [`ValueIndexBuilder`].

pub mod builder;
pub mod error;
pub mod format;
pub mod index;

mod cache;
mod directory;
mod heap;
mod io;
mod keys;

pub use builder::ValueIndexBuilder;
pub use error::{Result, ValueIndexError};
pub use format::ValueKind;
pub use index::{
    Postings, UpdatableValueIndex, UpdateBatch, ValueIndexOptions, ValueIndexStats,
};
