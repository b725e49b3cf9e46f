//! Identifier types shared across the engine.

/// Identifier of a record (node) in the document store.
///
/// Ids are assigned once and stay stable while the document is updated;
/// on-disk structures reference nodes by id for exactly that reason.
pub type RecordId = u32;

/// Position of a node in document order.
///
/// Pre values shift as the tree is updated; the document store maps ids to
/// their current positions (see [`crate::store::DocStore::pre`]).
pub type PreValue = u32;
