//! Bulk construction of a fresh, compact index.
//!
//! The update path never reclaims dead heap bytes. When the live ratio
//! reported by [`UpdatableValueIndex::stats`] falls below the engine's
//! rebuild threshold, the engine feeds the old index (or a fresh scan of
//! the documents) through a builder into a new directory and swaps the
//! files in.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;
use xylem_db_core::RecordId;

use crate::directory::DirectoryFile;
use crate::error::Result;
use crate::format::{self, ValueKind};
use crate::heap::HeapFile;
use crate::index::UpdatableValueIndex;
use crate::keys::KeySlotFile;

/// Accumulates `key → ids` postings and writes the three index files in
/// one sorted pass, with no dead bytes.
#[derive(Debug, Default)]
pub struct ValueIndexBuilder {
    entries: BTreeMap<Box<[u8]>, Vec<RecordId>>,
}

impl ValueIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence of `key` at `id`.
    pub fn insert(&mut self, key: &[u8], id: RecordId) {
        self.entries.entry(key.into()).or_default().push(id);
    }

    /// Seed a builder with the live contents of an existing index.
    pub fn from_index(index: &UpdatableValueIndex) -> Result<Self> {
        let mut builder = Self::new();
        for (key, ids) in index.entries()? {
            builder.entries.insert(key, ids);
        }
        Ok(builder)
    }

    /// Number of distinct keys collected so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write a fresh index for `kind` under `dir`, truncating any existing
    /// files there. Keys come out in byte order; ids are sorted, deduped
    /// and delta-encoded.
    pub fn build(self, dir: &Path, kind: ValueKind) -> Result<()> {
        let mut heap = HeapFile::create(&format::heap_path(dir, kind))?;
        let mut directory = DirectoryFile::create(&format::directory_path(dir, kind))?;
        let mut keys = KeySlotFile::create(&format::keys_path(dir, kind))?;

        let mut slot = 0usize;
        for (key, mut ids) in self.entries {
            ids.sort_unstable();
            ids.dedup();
            if ids.is_empty() {
                continue;
            }
            for i in (1..ids.len()).rev() {
                ids[i] -= ids[i - 1];
            }
            let off = heap.append_nums(&ids)?;
            directory.set_offset(slot, off)?;
            keys.set_key(slot, &key)?;
            slot += 1;
        }
        heap.write_size(slot)?;
        heap.sync()?;
        directory.sync()?;
        keys.sync()?;
        debug!(?kind, keys = slot, "value index built");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ValueIndexOptions;

    #[test]
    fn test_build_and_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = ValueIndexBuilder::new();
        builder.insert(b"beta", 10);
        builder.insert(b"alpha", 7);
        builder.insert(b"alpha", 5);
        builder.insert(b"alpha", 7); // duplicate collapses
        assert_eq!(builder.len(), 2);
        builder.build(dir.path(), ValueKind::Attribute).unwrap();

        let index = UpdatableValueIndex::open(
            dir.path(),
            ValueKind::Attribute,
            ValueIndexOptions::default(),
        )
        .unwrap();
        assert_eq!(index.size().unwrap(), 2);
        let ids: Vec<u32> = index.lookup(b"alpha").unwrap().collect();
        assert_eq!(ids, vec![5, 7]);
        let ids: Vec<u32> = index.lookup(b"beta").unwrap().collect();
        assert_eq!(ids, vec![10]);
    }

    #[test]
    fn test_fresh_build_has_no_dead_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = ValueIndexBuilder::new();
        for i in 0..100u32 {
            builder.insert(format!("key{i:03}").as_bytes(), i * 3);
            builder.insert(format!("key{i:03}").as_bytes(), i * 3 + 1);
        }
        builder.build(dir.path(), ValueKind::Text).unwrap();

        let index =
            UpdatableValueIndex::open(dir.path(), ValueKind::Text, ValueIndexOptions::default())
                .unwrap();
        let stats = index.stats().unwrap();
        assert_eq!(stats.keys, 100);
        assert_eq!(stats.live_bytes, stats.heap_bytes);
    }

    #[test]
    fn test_rebuild_from_fragmented_index() {
        let dir = tempfile::tempdir().unwrap();
        let index =
            UpdatableValueIndex::open(dir.path(), ValueKind::Text, ValueIndexOptions::default())
                .unwrap();

        let mut batch = crate::index::UpdateBatch::new();
        batch.insert(b"a".as_slice().into(), vec![1, 2, 3]);
        batch.insert(b"b".as_slice().into(), vec![4]);
        index.add(&batch).unwrap();
        let mut more = crate::index::UpdateBatch::new();
        more.insert(b"a".as_slice().into(), vec![9]);
        index.add(&more).unwrap();
        assert!(index.stats().unwrap().live_ratio() < 1.0);

        let rebuilt_dir = tempfile::tempdir().unwrap();
        ValueIndexBuilder::from_index(&index)
            .unwrap()
            .build(rebuilt_dir.path(), ValueKind::Text)
            .unwrap();

        let rebuilt = UpdatableValueIndex::open(
            rebuilt_dir.path(),
            ValueKind::Text,
            ValueIndexOptions::default(),
        )
        .unwrap();
        assert_eq!(rebuilt.entries().unwrap(), index.entries().unwrap());
        let stats = rebuilt.stats().unwrap();
        assert_eq!(stats.live_bytes, stats.heap_bytes);
    }
}
