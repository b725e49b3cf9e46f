//! On-disk layout shared by the three index files.

pub mod num;

use std::path::{Path, PathBuf};

/// Extension shared by all xylem database files.
pub const FILE_EXT: &str = "xyl";

/// Length of the heap-file header holding the key count.
pub const HEAP_HEADER_LEN: u64 = 4;

/// Value class an index covers; selects the on-disk file prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Text-node contents.
    Text,
    /// Attribute values.
    Attribute,
}

impl ValueKind {
    /// File-name prefix for this kind.
    pub fn prefix(self) -> &'static str {
        match self {
            ValueKind::Text => "txt",
            ValueKind::Attribute => "atv",
        }
    }
}

/// Path of the heap file (posting lists) for `kind` under `dir`.
pub fn heap_path(dir: &Path, kind: ValueKind) -> PathBuf {
    dir.join(format!("{}.{FILE_EXT}", kind.prefix()))
}

/// Path of the directory file (slot offsets).
pub fn directory_path(dir: &Path, kind: ValueKind) -> PathBuf {
    dir.join(format!("{}r.{FILE_EXT}", kind.prefix()))
}

/// Path of the key-slot file.
pub fn keys_path(dir: &Path, kind: ValueKind) -> PathBuf {
    dir.join(format!("{}l.{FILE_EXT}", kind.prefix()))
}
