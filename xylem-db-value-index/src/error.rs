//! Error types for value index operations.

use std::io;
use thiserror::Error;
use xylem_db_core::Interrupted;

#[derive(Error, Debug)]
pub enum ValueIndexError {
    /// The index was closed; no further operations are served.
    #[error("value index is closed")]
    Closed,

    /// An on-disk invariant was breached mid-operation. Fatal to the
    /// current batch; the index should be rebuilt, never auto-repaired.
    #[error("value index corrupted: {0}")]
    Corrupt(String),

    /// A delete named a key the index does not hold.
    #[error("missing index key: {0}")]
    MissingKey(String),

    /// A batch operation stopped at a cooperative checkpoint.
    #[error(transparent)]
    Interrupted(#[from] Interrupted),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ValueIndexError>;
