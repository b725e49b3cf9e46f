//! Directory file: one packed 5-byte heap offset per key slot.
//!
//! Slot `i` lives at byte `i * 5`, little-endian, and points at the length
//! prefix of that key's posting list in the heap file. The key count in
//! the heap header is authoritative; slot bytes past it are stale.

use std::io;
use std::path::Path;

use crate::io::IndexFile;

/// Width of one directory slot.
const SLOT_LEN: u64 = 5;

#[derive(Debug)]
pub(crate) struct DirectoryFile {
    file: IndexFile,
}

impl DirectoryFile {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            file: IndexFile::open(path)?,
        })
    }

    /// Open, truncating any existing contents.
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self {
            file: IndexFile::create(path)?,
        })
    }

    /// Heap offset stored in `slot`.
    pub fn offset(&mut self, slot: usize) -> io::Result<u64> {
        let mut b = [0u8; 8];
        self.file.read_exact_at(slot as u64 * SLOT_LEN, &mut b[..5])?;
        Ok(u64::from_le_bytes(b))
    }

    /// Store the 40-bit `off` in `slot`.
    pub fn set_offset(&mut self, slot: usize, off: u64) -> io::Result<()> {
        debug_assert!(off < 1 << 40, "heap offset exceeds 40 bits");
        self.file
            .write_all_at(slot as u64 * SLOT_LEN, &off.to_le_bytes()[..5])
    }

    /// Copy the raw slot bytes from `src` to `dst`. Shifts go through this
    /// so offsets are moved without a decode/encode round per slot.
    pub fn copy_slot(&mut self, src: usize, dst: usize) -> io::Result<()> {
        let mut b = [0u8; 5];
        self.file.read_exact_at(src as u64 * SLOT_LEN, &mut b)?;
        self.file.write_all_at(dst as u64 * SLOT_LEN, &b)
    }

    pub fn sync(&mut self) -> io::Result<()> {
        self.file.sync()
    }
}
