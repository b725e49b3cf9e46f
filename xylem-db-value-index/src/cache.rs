//! Bounded lookup cache: key → posting-list shape.
//!
//! An entry remembers how many ids a key holds and where its first id byte
//! sits in the heap, which is all a lookup needs to decode without probing
//! the slot arrays. The cache is owned and guarded by the index monitor,
//! so it carries no lock of its own. Mutating operations write through;
//! deleting a key evicts its entry.

use lru::LruCache;
use std::fmt;
use std::num::NonZeroUsize;

/// Shape of one key's stored posting list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CachedPostings {
    /// Number of ids in the list.
    pub count: usize,
    /// Heap offset of the first id, just past the length prefix.
    pub first_id_off: u64,
}

pub(crate) struct LookupCache {
    inner: LruCache<Box<[u8]>, CachedPostings>,
}

impl LookupCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            inner: LruCache::new(cap),
        }
    }

    pub fn get(&mut self, key: &[u8]) -> Option<CachedPostings> {
        self.inner.get(key).copied()
    }

    pub fn put(&mut self, key: &[u8], count: usize, first_id_off: u64) {
        self.inner.put(
            key.into(),
            CachedPostings {
                count,
                first_id_off,
            },
        );
    }

    pub fn remove(&mut self, key: &[u8]) {
        self.inner.pop(key);
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl fmt::Debug for LookupCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookupCache")
            .field("entries", &self.inner.len())
            .field("capacity", &self.inner.cap())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_remove() {
        let mut cache = LookupCache::new(8);
        assert!(cache.get(b"k").is_none());

        cache.put(b"k", 3, 42);
        assert_eq!(
            cache.get(b"k"),
            Some(CachedPostings {
                count: 3,
                first_id_off: 42
            })
        );

        cache.remove(b"k");
        assert!(cache.get(b"k").is_none());
    }

    #[test]
    fn test_put_overwrites() {
        let mut cache = LookupCache::new(8);
        cache.put(b"k", 3, 42);
        cache.put(b"k", 4, 99);
        assert_eq!(
            cache.get(b"k"),
            Some(CachedPostings {
                count: 4,
                first_id_off: 99
            })
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_lru() {
        let mut cache = LookupCache::new(2);
        cache.put(b"a", 1, 1);
        cache.put(b"b", 2, 2);
        cache.get(b"a");
        cache.put(b"c", 3, 3);

        assert!(cache.get(b"a").is_some());
        assert!(cache.get(b"b").is_none());
        assert!(cache.get(b"c").is_some());
    }
}
