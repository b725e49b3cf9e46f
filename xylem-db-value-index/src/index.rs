//! The updatable value index.
//!
//! Three parallel structures (heap, directory, key slots; see the crate
//! docs for the byte layouts) indexed by a dense, key-sorted slot number.
//! This module owns the update protocol that keeps them aligned:
//!
//! - `add` walks the batch in key order, appends ids to existing keys,
//!   then inserts the collected new keys from the largest down so every
//!   right-shifted slot is read and written exactly once;
//! - `delete` drops ids in place (rewritten lists never outgrow their
//!   region) and compacts the slot arrays leftward once per batch;
//! - `replace` moves a single id between two keys.
//!
//! All operations are serialized on the instance monitor. Bulk calls poll
//! the interrupt flag between whole-key iterations only, so an interrupted
//! batch is partially applied but structurally consistent.

use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::Mutex;
use tracing::debug;

use xylem_db_core::{InterruptFlag, RecordId};

use crate::cache::LookupCache;
use crate::directory::DirectoryFile;
use crate::error::{Result, ValueIndexError};
use crate::format::{self, num, ValueKind};
use crate::heap::HeapFile;
use crate::keys::KeySlotFile;

/// One update transaction's worth of per-key record ids, keyed in byte
/// order. Values are raw id lists as collected by the writer; the index
/// sorts and delta-encodes them itself.
pub type UpdateBatch = BTreeMap<Box<[u8]>, Vec<RecordId>>;

const DEFAULT_CACHE_ENTRIES: usize = 4096;

/// Tuning knobs for an open index.
#[derive(Debug, Clone, Default)]
pub struct ValueIndexOptions {
    /// Lookup cache capacity in entries; 0 selects the default (4096).
    pub cache_entries: usize,
    /// Cooperative stop flag polled between key iterations of bulk calls.
    pub interrupt: Option<InterruptFlag>,
}

/// Counters the enclosing engine reads to decide on a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueIndexStats {
    /// Number of distinct keys.
    pub keys: usize,
    /// Total heap file length in bytes.
    pub heap_bytes: u64,
    /// Header plus every live posting-list encoding.
    pub live_bytes: u64,
}

impl ValueIndexStats {
    /// Share of the heap file still referenced by the directory. The
    /// engine rebuilds when this falls below its configured threshold.
    pub fn live_ratio(&self) -> f64 {
        if self.heap_bytes == 0 {
            1.0
        } else {
            self.live_bytes as f64 / self.heap_bytes as f64
        }
    }
}

/// Ascending record ids for one key, decoded at lookup time. Finite and
/// not restartable; call [`UpdatableValueIndex::lookup`] again for a fresh
/// pass.
#[derive(Debug)]
pub struct Postings {
    ids: std::vec::IntoIter<RecordId>,
}

impl Iterator for Postings {
    type Item = RecordId;

    fn next(&mut self) -> Option<RecordId> {
        self.ids.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

impl ExactSizeIterator for Postings {}

/// Disk-backed map from value keys to ascending record-id lists,
/// updatable in place.
///
/// One instance owns its three files exclusively. Every operation locks
/// the instance monitor; the enclosing engine serializes writers across
/// indexes.
#[derive(Debug)]
pub struct UpdatableValueIndex {
    kind: ValueKind,
    state: Mutex<State>,
}

impl UpdatableValueIndex {
    /// Open the index for `kind` under `dir`, creating empty files when
    /// none exist. The key count is read from the heap header.
    pub fn open(dir: &Path, kind: ValueKind, options: ValueIndexOptions) -> Result<Self> {
        let mut heap = HeapFile::open(&format::heap_path(dir, kind))?;
        let directory = DirectoryFile::open(&format::directory_path(dir, kind))?;
        let keys = KeySlotFile::open(&format::keys_path(dir, kind))?;
        let size = heap.read_size()?;
        let cache_entries = if options.cache_entries == 0 {
            DEFAULT_CACHE_ENTRIES
        } else {
            options.cache_entries
        };
        debug!(?kind, size, "value index opened");
        Ok(Self {
            kind,
            state: Mutex::new(State {
                heap,
                directory,
                keys,
                cache: LookupCache::new(cache_entries),
                size,
                open: true,
                interrupt: options.interrupt,
            }),
        })
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Number of distinct keys.
    pub fn size(&self) -> Result<usize> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.size)
    }

    /// Ids holding `key`, ascending. An unknown key yields an empty
    /// iterator.
    pub fn lookup(&self, key: &[u8]) -> Result<Postings> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        let ids = state.lookup_ids(key)?;
        Ok(Postings {
            ids: ids.into_iter(),
        })
    }

    /// Bulk-insert a batch of `key → ids`.
    ///
    /// New ids of a key already in the index must all be larger than that
    /// key's current maximum; the index delta-encodes on that assumption
    /// and does not verify it.
    pub fn add(&self, batch: &UpdateBatch) -> Result<()> {
        self.state.lock().add(batch)
    }

    /// Bulk-remove ids from their keys. Every key in the batch must be
    /// present; a key whose last id is removed disappears from the index.
    pub fn delete(&self, batch: &UpdateBatch) -> Result<()> {
        self.state.lock().delete(batch)
    }

    /// Move `id` from `old_key` to `new_key`.
    ///
    /// Quirks kept from the established on-disk behavior: a missing
    /// `old_key` skips the delete half but still inserts, and so does an
    /// `old_key` that does not hold `id`. Neither case is an error.
    pub fn replace(&self, old_key: &[u8], new_key: &[u8], id: RecordId) -> Result<()> {
        self.state.lock().replace(old_key, new_key, id)
    }

    /// Snapshot of every key with its absolute ids, in slot order.
    pub fn entries(&self) -> Result<Vec<(Box<[u8]>, Vec<RecordId>)>> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        let mut out = Vec::with_capacity(state.size);
        for slot in 0..state.size {
            let key = state.keys.key(slot)?;
            let off = state.directory.offset(slot)?;
            let count = state.heap.read_num_at(off)? as usize;
            let first_id_off = state.heap.cursor();
            let ids = state.read_ids_at(first_id_off, count)?;
            out.push((key.into_boxed_slice(), ids));
        }
        Ok(out)
    }

    /// Heap usage counters; see [`ValueIndexStats::live_ratio`].
    pub fn stats(&self) -> Result<ValueIndexStats> {
        self.state.lock().stats()
    }

    /// Push all three files to stable storage.
    pub fn flush(&self) -> Result<()> {
        self.state.lock().flush()
    }

    /// Flush, drop the cache and refuse further operations.
    pub fn close(&self) -> Result<()> {
        self.state.lock().close()
    }
}

#[derive(Debug)]
struct State {
    heap: HeapFile,
    directory: DirectoryFile,
    keys: KeySlotFile,
    cache: LookupCache,
    size: usize,
    open: bool,
    interrupt: Option<InterruptFlag>,
}

impl State {
    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(ValueIndexError::Closed)
        }
    }

    fn check_interrupt(&self) -> Result<()> {
        if let Some(flag) = &self.interrupt {
            flag.check()?;
        }
        Ok(())
    }

    fn lookup_ids(&mut self, key: &[u8]) -> Result<Vec<RecordId>> {
        if let Some(hit) = self.cache.get(key) {
            return self.read_ids_at(hit.first_id_off, hit.count);
        }
        match self.keys.binary_search(key, 0, self.size)? {
            Ok(slot) => {
                let off = self.directory.offset(slot)?;
                let count = self.heap.read_num_at(off)? as usize;
                let first_id_off = self.heap.cursor();
                let ids = self.read_ids_at(first_id_off, count)?;
                self.cache.put(key, count, first_id_off);
                Ok(ids)
            }
            Err(_) => Ok(Vec::new()),
        }
    }

    /// Decode `count` ids starting at `off`, absolutizing deltas.
    fn read_ids_at(&mut self, off: u64, count: usize) -> Result<Vec<RecordId>> {
        self.heap.seek(off);
        let mut ids = Vec::with_capacity(count);
        let mut cur = 0u32;
        for _ in 0..count {
            cur = cur.wrapping_add(self.heap.read_num()?);
            ids.push(cur);
        }
        Ok(ids)
    }

    fn add(&mut self, batch: &UpdateBatch) -> Result<()> {
        self.ensure_open()?;
        let s = self.size;

        // partition: append to existing keys now, collect the rest. The
        // batch walks in key order, so the search window only moves right.
        let mut new_keys: Vec<(&[u8], Vec<u32>)> = Vec::new();
        let mut p = 0usize;
        for (key, ids) in batch {
            self.check_interrupt()?;
            let nids = diffs(ids);
            if nids.is_empty() {
                continue;
            }
            match self.keys.binary_search(key.as_ref(), p, s)? {
                Ok(slot) => {
                    self.append_ids(slot, key.as_ref(), nids)?;
                    p = slot + 1;
                }
                Err(ins) => {
                    p = ins;
                    new_keys.push((key.as_ref(), nids));
                }
            }
        }

        // insert new keys from the largest down: the right-shift then
        // reads every source slot once and writes every target slot once
        let mut src = s as isize - 1;
        let mut dst = (s + new_keys.len()) as isize - 1;
        for (placed, (key, nids)) in new_keys.iter().rev().enumerate() {
            if let Err(stop) = self.check_interrupt() {
                // stopping here must leave the slot arrays dense and
                // sorted: the keys already placed sit past the gap still
                // reserved for the rest, so close that gap and keep them
                let mut to = (src + 1) as usize;
                for from in (dst + 1) as usize..s + new_keys.len() {
                    self.directory.copy_slot(from, to)?;
                    self.keys.copy_slot(from, to)?;
                    to += 1;
                }
                self.set_size(s + placed)?;
                return Err(stop);
            }
            let ins = match self.keys.binary_search(key, 0, (src + 1) as usize)? {
                Err(ins) => ins as isize,
                Ok(_) => {
                    return Err(ValueIndexError::Corrupt(format!(
                        "key '{}' resurfaced while inserting",
                        String::from_utf8_lossy(key)
                    )))
                }
            };
            while src >= ins {
                self.directory.copy_slot(src as usize, dst as usize)?;
                self.keys.copy_slot(src as usize, dst as usize)?;
                dst -= 1;
                src -= 1;
            }
            let off = self.heap.append_nums(nids)?;
            self.directory.set_offset(dst as usize, off)?;
            self.keys.set_key(dst as usize, key)?;
            dst -= 1;
        }

        self.set_size(s + new_keys.len())?;
        debug!(
            appended = batch.len() - new_keys.len(),
            inserted = new_keys.len(),
            size = self.size,
            "bulk add applied"
        );
        Ok(())
    }

    /// Append ids to the key at `slot`. `nids` is in delta form and every
    /// new id is larger than the key's current maximum.
    fn append_ids(&mut self, slot: usize, key: &[u8], mut nids: Vec<u32>) -> Result<()> {
        let old_off = self.directory.offset(slot)?;
        let old_count = self.heap.read_num_at(old_off)? as usize;

        let mut combined = Vec::with_capacity(old_count + nids.len());
        let mut last = 0u32;
        for _ in 0..old_count {
            let delta = self.heap.read_num()?;
            last = last.wrapping_add(delta);
            combined.push(delta);
        }
        // the first new id becomes a delta against the last stored one
        debug_assert!(nids[0] > last, "new ids must exceed the stored maximum");
        nids[0] = nids[0].wrapping_sub(last);
        combined.extend_from_slice(&nids);

        let new_off = self.heap.append_nums(&combined)?;
        self.directory.set_offset(slot, new_off)?;
        self.cache.put(
            key,
            combined.len(),
            new_off + num::len_of(combined.len() as u32) as u64,
        );
        Ok(())
    }

    fn delete(&mut self, batch: &UpdateBatch) -> Result<()> {
        self.ensure_open()?;
        let s = self.size;

        // drop ids key by key; slots whose lists empty are collected in
        // ascending order and compacted away in one pass afterwards
        let mut empty: Vec<usize> = Vec::new();
        let mut p = 0usize;
        for (key, ids) in batch {
            self.check_interrupt()?;
            let slot = match self.keys.binary_search(key.as_ref(), p, s)? {
                Ok(slot) => slot,
                Err(_) => {
                    return Err(ValueIndexError::MissingKey(
                        String::from_utf8_lossy(key).into_owned(),
                    ))
                }
            };
            p = slot + 1;
            let mut sorted = ids.clone();
            sorted.sort_unstable();
            if self.delete_ids(slot, key.as_ref(), &sorted)? == 0 {
                empty.push(slot);
            }
        }
        if !empty.is_empty() {
            self.delete_keys(&empty)?;
        }
        debug!(
            keys = batch.len(),
            removed_slots = empty.len(),
            size = self.size,
            "bulk delete applied"
        );
        Ok(())
    }

    /// Remove `ids` (sorted ascending) from the list at `slot`. Returns
    /// the number of ids remaining; 0 means the caller removes the slot.
    /// Requested ids the list does not hold are skipped.
    fn delete_ids(&mut self, slot: usize, key: &[u8], ids: &[u32]) -> Result<usize> {
        let off = self.directory.offset(slot)?;
        let old_count = self.heap.read_num_at(off)? as usize;

        let mut survivors: Vec<u32> = Vec::with_capacity(old_count.saturating_sub(ids.len()));
        let mut cur = 0u32; // current absolute id
        let mut prev = 0u32; // previous surviving absolute id
        let mut j = 0usize;
        for _ in 0..old_count {
            cur = cur.wrapping_add(self.heap.read_num()?);
            while j < ids.len() && ids[j] < cur {
                j += 1;
            }
            if j < ids.len() && ids[j] == cur {
                j += 1;
            } else {
                survivors.push(cur - prev);
                prev = cur;
            }
        }

        if survivors.is_empty() {
            // the slot itself goes away
            self.cache.remove(key);
            return Ok(0);
        }
        if survivors.len() == old_count {
            // nothing matched; the stored list is already right
            return Ok(old_count);
        }

        let new_off = self.heap.write_nums(off, &survivors)?;
        if new_off != off {
            self.directory.set_offset(slot, new_off)?;
        }
        self.cache.put(
            key,
            survivors.len(),
            new_off + num::len_of(survivors.len() as u32) as u64,
        );
        Ok(survivors.len())
    }

    /// Drop the slots listed in `empty` (ascending) by compacting both
    /// slot arrays leftward in a single pass, then shrink the size.
    fn delete_keys(&mut self, empty: &[usize]) -> Result<()> {
        let s = self.size;
        let mut j = 1usize;
        let mut dst = empty[0];
        for src in empty[0] + 1..s {
            if j < empty.len() && src == empty[j] {
                j += 1;
            } else {
                self.directory.copy_slot(src, dst)?;
                self.keys.copy_slot(src, dst)?;
                dst += 1;
            }
        }
        self.set_size(s - j)
    }

    fn replace(&mut self, old_key: &[u8], new_key: &[u8], id: RecordId) -> Result<()> {
        self.ensure_open()?;
        if let Ok(slot) = self.keys.binary_search(old_key, 0, self.size)? {
            if self.delete_ids(slot, old_key, &[id])? == 0 {
                self.delete_keys(&[slot])?;
            }
        }
        self.insert_id(new_key, id)?;
        debug!(id, "id moved between keys");
        Ok(())
    }

    /// Insert a single id into `key`, creating the key when absent. An id
    /// the key already holds is left as is.
    fn insert_id(&mut self, key: &[u8], id: RecordId) -> Result<()> {
        let s = self.size;
        match self.keys.binary_search(key, 0, s)? {
            Err(ins) => {
                // shift bigger keys one slot right, top down
                let mut slot = s;
                while slot > ins {
                    self.directory.copy_slot(slot - 1, slot)?;
                    self.keys.copy_slot(slot - 1, slot)?;
                    slot -= 1;
                }
                let off = self.heap.append_nums(&[id])?;
                self.directory.set_offset(ins, off)?;
                self.keys.set_key(ins, key)?;
                self.set_size(s + 1)?;
            }
            Ok(slot) => {
                let off = self.directory.offset(slot)?;
                let count = self.heap.read_num_at(off)? as usize;
                let first_id_off = self.heap.cursor();
                let mut ids = self.read_ids_at(first_id_off, count)?;
                let Err(at) = ids.binary_search(&id) else {
                    return Ok(());
                };
                ids.insert(at, id);

                let deltas = to_deltas(&ids);
                let new_off = self.heap.append_nums(&deltas)?;
                self.directory.set_offset(slot, new_off)?;
                self.cache.put(
                    key,
                    ids.len(),
                    new_off + num::len_of(ids.len() as u32) as u64,
                );
            }
        }
        Ok(())
    }

    fn stats(&mut self) -> Result<ValueIndexStats> {
        self.ensure_open()?;
        let mut live = format::HEAP_HEADER_LEN;
        for slot in 0..self.size {
            let off = self.directory.offset(slot)?;
            let count = self.heap.read_num_at(off)?;
            for _ in 0..count {
                self.heap.read_num()?;
            }
            live += self.heap.cursor() - off;
        }
        Ok(ValueIndexStats {
            keys: self.size,
            heap_bytes: self.heap.len(),
            live_bytes: live,
        })
    }

    /// Persist the key count; the last write of every mutating batch.
    fn set_size(&mut self, size: usize) -> Result<()> {
        self.size = size;
        self.heap.write_size(size)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.heap.sync()?;
        self.directory.sync()?;
        self.keys.sync()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.flush()?;
        self.cache.clear();
        self.open = false;
        Ok(())
    }
}

/// Sort `ids` and rewrite them as first-absolute-then-deltas, the form
/// posting lists take on disk.
fn diffs(ids: &[RecordId]) -> Vec<u32> {
    let mut out = ids.to_vec();
    out.sort_unstable();
    delta_in_place(&mut out);
    out
}

/// Delta form of an already ascending id list.
fn to_deltas(ids: &[u32]) -> Vec<u32> {
    let mut out = ids.to_vec();
    delta_in_place(&mut out);
    out
}

fn delta_in_place(ids: &mut [u32]) {
    for i in (1..ids.len()).rev() {
        ids[i] -= ids[i - 1];
    }
}
