//! Heap data file: length-prefixed posting lists behind the key-count
//! header.
//!
//! Layout: bytes 0-3 hold the live key count big-endian; everything after
//! is a stream of posting lists, each `len, id0, delta1, ...` in the
//! encoding of [`crate::format::num`]. Lists are appended, never moved. An
//! overwrite that would outgrow its region appends instead and the caller
//! repoints the directory. Dead regions stay until the engine rebuilds the
//! index.

use std::io;
use std::path::Path;

use crate::format::num;
use crate::format::HEAP_HEADER_LEN;
use crate::io::IndexFile;

#[derive(Debug)]
pub(crate) struct HeapFile {
    file: IndexFile,
    /// Position of the streaming `read_num` cursor.
    cursor: u64,
}

impl HeapFile {
    /// Open or create; a fresh file gets a zeroed header.
    pub fn open(path: &Path) -> io::Result<Self> {
        Self::init(IndexFile::open(path)?)
    }

    /// Create, truncating any existing contents.
    pub fn create(path: &Path) -> io::Result<Self> {
        Self::init(IndexFile::create(path)?)
    }

    fn init(mut file: IndexFile) -> io::Result<Self> {
        if file.len() < HEAP_HEADER_LEN {
            file.write_all_at(0, &0u32.to_be_bytes())?;
        }
        Ok(Self {
            file,
            cursor: HEAP_HEADER_LEN,
        })
    }

    /// Key count from the header word.
    pub fn read_size(&mut self) -> io::Result<usize> {
        let mut b = [0u8; 4];
        self.file.read_exact_at(0, &mut b)?;
        Ok(u32::from_be_bytes(b) as usize)
    }

    /// Persist the key count into the header word.
    pub fn write_size(&mut self, size: usize) -> io::Result<()> {
        self.file.write_all_at(0, &(size as u32).to_be_bytes())
    }

    /// Total file length in bytes, header included.
    pub fn len(&self) -> u64 {
        self.file.len()
    }

    /// Park the streaming cursor at `off`.
    pub fn seek(&mut self, off: u64) {
        self.cursor = off;
    }

    /// Offset the streaming cursor is parked on.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Read the number at `off` and park the cursor just past it.
    pub fn read_num_at(&mut self, off: u64) -> io::Result<u32> {
        self.seek(off);
        self.read_num()
    }

    /// Read the number under the cursor and advance past it.
    pub fn read_num(&mut self) -> io::Result<u32> {
        let first = self.file.read_u8_at(self.cursor)?;
        let len = num::len_at(first);
        let mut buf = [0u8; 5];
        buf[0] = first;
        if len > 1 {
            self.file.read_exact_at(self.cursor + 1, &mut buf[1..len])?;
        }
        let (v, _) = num::decode_at(&buf[..len], 0);
        self.cursor += len as u64;
        Ok(v)
    }

    /// Append `len(nums), nums...` at the end of the file; returns the
    /// offset of the length prefix.
    pub fn append_nums(&mut self, nums: &[u32]) -> io::Result<u64> {
        self.file.append(&encode_list(nums))
    }

    /// Overwrite the list at `off` when the new encoding fits inside the
    /// old one's bytes (lists are self-delimiting, so unused trailing bytes
    /// are never decoded); otherwise append and return the new offset. The
    /// caller repoints the directory when the returned offset differs.
    pub fn write_nums(&mut self, off: u64, nums: &[u32]) -> io::Result<u64> {
        let old_len = self.encoded_len_at(off)?;
        let bytes = encode_list(nums);
        if bytes.len() as u64 <= old_len {
            self.file.write_all_at(off, &bytes)?;
            Ok(off)
        } else {
            self.file.append(&bytes)
        }
    }

    /// Encoded byte length of the whole list at `off`, prefix included.
    fn encoded_len_at(&mut self, off: u64) -> io::Result<u64> {
        let count = self.read_num_at(off)?;
        for _ in 0..count {
            self.read_num()?;
        }
        Ok(self.cursor - off)
    }

    pub fn sync(&mut self) -> io::Result<()> {
        self.file.sync()
    }
}

fn encode_list(nums: &[u32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + nums.len() * 2);
    num::encode_into(&mut buf, nums.len() as u32);
    for &n in nums {
        num::encode_into(&mut buf, n);
    }
    buf
}
