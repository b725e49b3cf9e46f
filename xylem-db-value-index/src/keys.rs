//! Key-slot file: the key bytes behind every directory slot.
//!
//! The file interleaves two record kinds:
//!
//! - fixed 4096-byte **table pages**: `[next_page: u64 LE]` followed by 817
//!   packed 5-byte little-endian key-record offsets. Slots are numbered
//!   across the page chain; page 0 starts at byte 0, further pages are
//!   appended at the end of the file and linked. The chain is walked once
//!   at open and kept in memory.
//! - **key records**: `len` in the shared number encoding, then the key
//!   bytes, appended wherever the end of the file happens to be.
//!
//! Rewriting a slot appends a fresh record and repoints the table entry;
//! abandoned records are dead bytes until the engine rebuilds the index.
//! Offset 0 sits inside page 0's header, so it doubles as the empty marker.

use std::cmp::Ordering;
use std::io;
use std::path::Path;

use crate::error::{Result, ValueIndexError};
use crate::format::num;
use crate::io::IndexFile;

/// Table page size in bytes.
const PAGE_LEN: usize = 4096;
/// Bytes reserved at the head of each table page for the next-page link.
const PAGE_HEADER_LEN: u64 = 8;
/// Width of one table entry.
const ENTRY_LEN: u64 = 5;
/// Key slots per table page: (4096 - 8) / 5.
pub(crate) const SLOTS_PER_PAGE: usize = (PAGE_LEN - PAGE_HEADER_LEN as usize) / ENTRY_LEN as usize;

#[derive(Debug)]
pub(crate) struct KeySlotFile {
    file: IndexFile,
    /// Offsets of the table pages, in chain order.
    pages: Vec<u64>,
}

impl KeySlotFile {
    /// Open or create; walks the table-page chain once.
    pub fn open(path: &Path) -> io::Result<Self> {
        Self::init(IndexFile::open(path)?)
    }

    /// Create, truncating any existing contents.
    pub fn create(path: &Path) -> io::Result<Self> {
        Self::init(IndexFile::create(path)?)
    }

    fn init(mut file: IndexFile) -> io::Result<Self> {
        if file.len() == 0 {
            file.write_all_at(0, &[0u8; PAGE_LEN])?;
        }
        let mut pages = vec![0u64];
        loop {
            let mut link = [0u8; 8];
            file.read_exact_at(*pages.last().unwrap(), &mut link)?;
            let next = u64::from_le_bytes(link);
            if next == 0 {
                break;
            }
            pages.push(next);
        }
        Ok(Self { file, pages })
    }

    /// Table position of `slot`, or `None` past the allocated chain.
    fn entry_pos(&self, slot: usize) -> Option<u64> {
        let page = slot / SLOTS_PER_PAGE;
        let within = (slot % SLOTS_PER_PAGE) as u64;
        self.pages
            .get(page)
            .map(|&p| p + PAGE_HEADER_LEN + within * ENTRY_LEN)
    }

    /// Table position of `slot`, allocating and linking pages as needed.
    fn entry_pos_mut(&mut self, slot: usize) -> io::Result<u64> {
        let page = slot / SLOTS_PER_PAGE;
        while self.pages.len() <= page {
            let new_page = self.file.append(&[0u8; PAGE_LEN])?;
            let last = *self.pages.last().unwrap();
            self.file.write_all_at(last, &new_page.to_le_bytes())?;
            self.pages.push(new_page);
        }
        let within = (slot % SLOTS_PER_PAGE) as u64;
        Ok(self.pages[page] + PAGE_HEADER_LEN + within * ENTRY_LEN)
    }

    fn record_offset(&mut self, slot: usize) -> io::Result<u64> {
        let Some(pos) = self.entry_pos(slot) else {
            return Ok(0);
        };
        let mut b = [0u8; 8];
        self.file.read_exact_at(pos, &mut b[..5])?;
        Ok(u64::from_le_bytes(b))
    }

    /// Key bytes stored at `slot`. An unwritten slot inside the live range
    /// is a breach of the slot-array invariants, not an I/O failure.
    pub fn key(&mut self, slot: usize) -> Result<Vec<u8>> {
        let off = self.record_offset(slot)?;
        if off == 0 {
            return Err(ValueIndexError::Corrupt(format!(
                "key slot {slot} is empty"
            )));
        }
        let first = self.file.read_u8_at(off)?;
        let n = num::len_at(first);
        let mut prefix = [0u8; 5];
        prefix[0] = first;
        if n > 1 {
            self.file.read_exact_at(off + 1, &mut prefix[1..n])?;
        }
        let (len, _) = num::decode_at(&prefix[..n], 0);
        let mut key = vec![0u8; len as usize];
        self.file.read_exact_at(off + n as u64, &mut key)?;
        Ok(key)
    }

    /// Store `key` at `slot`: appends a record and repoints the table entry.
    pub fn set_key(&mut self, slot: usize, key: &[u8]) -> io::Result<()> {
        let mut rec = Vec::with_capacity(key.len() + 2);
        num::encode_into(&mut rec, key.len() as u32);
        rec.extend_from_slice(key);
        let off = self.file.append(&rec)?;
        debug_assert!(off < 1 << 40, "key record offset exceeds 40 bits");
        let pos = self.entry_pos_mut(slot)?;
        self.file.write_all_at(pos, &off.to_le_bytes()[..5])
    }

    /// Copy the table entry from `src` to `dst` without touching key bytes.
    pub fn copy_slot(&mut self, src: usize, dst: usize) -> Result<()> {
        let from = self
            .entry_pos(src)
            .ok_or_else(|| ValueIndexError::Corrupt(format!("key slot {src} out of range")))?;
        let mut b = [0u8; 5];
        self.file.read_exact_at(from, &mut b)?;
        let to = self.entry_pos_mut(dst)?;
        self.file.write_all_at(to, &b)?;
        Ok(())
    }

    /// Binary search for `key` over slots `lo..hi` in unsigned byte order.
    /// `Ok` carries the matching slot, `Err` the insertion point.
    pub fn binary_search(
        &mut self,
        key: &[u8],
        lo: usize,
        hi: usize,
    ) -> Result<std::result::Result<usize, usize>> {
        let (mut lo, mut hi) = (lo, hi);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.key(mid)?.as_slice().cmp(key) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(Ok(mid)),
            }
        }
        Ok(Err(lo))
    }

    pub fn sync(&mut self) -> io::Result<()> {
        self.file.sync()
    }
}
