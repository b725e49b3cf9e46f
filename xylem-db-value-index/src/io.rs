//! Random-access file substrate for the index files.
//!
//! All three index files read and write by byte offset through this
//! wrapper. It tracks the physical cursor so a sequential read following a
//! positioned one skips the redundant seek.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

#[derive(Debug)]
pub(crate) struct IndexFile {
    file: File,
    /// Physical file length.
    len: u64,
    /// Current cursor position.
    pos: u64,
}

impl IndexFile {
    /// Open `path` read-write, creating it when absent.
    pub fn open(path: &Path) -> io::Result<Self> {
        Self::open_with(path, false)
    }

    /// Open `path` read-write, truncating any existing contents.
    pub fn create(path: &Path) -> io::Result<Self> {
        Self::open_with(path, true)
    }

    fn open_with(path: &Path, truncate: bool) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(truncate)
            .open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, len, pos: 0 })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    fn seek_to(&mut self, off: u64) -> io::Result<()> {
        if self.pos != off {
            self.file.seek(SeekFrom::Start(off))?;
            self.pos = off;
        }
        Ok(())
    }

    /// Read exactly `buf.len()` bytes starting at `off`.
    pub fn read_exact_at(&mut self, off: u64, buf: &mut [u8]) -> io::Result<()> {
        self.seek_to(off)?;
        match self.file.read_exact(buf) {
            Ok(()) => {
                self.pos += buf.len() as u64;
                Ok(())
            }
            Err(e) => {
                // stream position is unspecified after a failed read
                self.pos = u64::MAX;
                Err(e)
            }
        }
    }

    /// Read the single byte at `off`.
    pub fn read_u8_at(&mut self, off: u64) -> io::Result<u8> {
        let mut b = [0u8; 1];
        self.read_exact_at(off, &mut b)?;
        Ok(b[0])
    }

    /// Write `buf` at `off`, extending the file when the range passes the
    /// current end.
    pub fn write_all_at(&mut self, off: u64, buf: &[u8]) -> io::Result<()> {
        self.seek_to(off)?;
        match self.file.write_all(buf) {
            Ok(()) => {
                self.pos += buf.len() as u64;
                self.len = self.len.max(self.pos);
                Ok(())
            }
            Err(e) => {
                self.pos = u64::MAX;
                Err(e)
            }
        }
    }

    /// Append `buf` at the end of the file; returns the offset it landed at.
    pub fn append(&mut self, buf: &[u8]) -> io::Result<u64> {
        let off = self.len;
        self.write_all_at(off, buf)?;
        Ok(off)
    }

    /// Push written bytes and metadata to stable storage.
    pub fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }
}
