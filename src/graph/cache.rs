//! Resolved-path memoization.
//!
//! Keyed on the dynamic (most-derived) id and the byte displacement of the
//! static pointer inside the dynamic object, not just the static pair:
//! under multiple or virtual inheritance the same static/target pair can
//! sit at different byte offsets in different concrete layouts, so a path
//! cached for one layout is not valid for another.
//!
//! The cache has no locking of its own; it is only touched under the
//! cast graph's lock.

use hashbrown::HashMap;

use crate::identity::ClassId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    pub src: ClassId,
    pub target: ClassId,
    pub dynamic_id: ClassId,
    /// `dynamic_ptr - p`: where the static pointer sits in the object.
    pub object_offset: isize,
}

/// A finished resolution. "Not yet computed" is an absent key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheEntry {
    /// Byte adjustment from the queried pointer, plus hop distance.
    Path { offset: isize, hops: u32 },
    /// The search completed and found nothing; memoized so repeat queries
    /// for unrelated types stay O(1).
    NoPath,
}

#[derive(Default)]
pub(crate) struct PathCache {
    entries: HashMap<CacheKey, CacheEntry>,
}

impl PathCache {
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.get(key).copied()
    }

    pub fn put(&mut self, key: CacheKey, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    /// Drop every entry. Called whenever a new edge lands in the graph,
    /// since a shorter path may now exist for any cached key.
    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn key(src: u64, target: u64, dynamic: u64, off: isize) -> CacheKey {
        CacheKey {
            src: ClassId(src),
            target: ClassId(target),
            dynamic_id: ClassId(dynamic),
            object_offset: off,
        }
    }

    #[test]
    fn test_absent_key_is_uncomputed() {
        let cache = PathCache::default();
        assert_eq!(cache.get(&key(0, 1, 0, 0)), None);
    }

    #[test]
    fn test_put_get() {
        let mut cache = PathCache::default();
        cache.put(key(0, 1, 0, 0), CacheEntry::Path { offset: 8, hops: 2 });
        cache.put(key(0, 2, 0, 0), CacheEntry::NoPath);

        assert_eq!(
            cache.get(&key(0, 1, 0, 0)),
            Some(CacheEntry::Path { offset: 8, hops: 2 })
        );
        assert_eq!(cache.get(&key(0, 2, 0, 0)), Some(CacheEntry::NoPath));
    }

    #[test]
    fn test_dynamic_layout_keys_are_distinct() {
        let mut cache = PathCache::default();
        // Same static pair, two concrete layouts.
        cache.put(key(0, 1, 5, 0), CacheEntry::Path { offset: 0, hops: 1 });
        cache.put(key(0, 1, 6, -16), CacheEntry::Path { offset: 16, hops: 2 });

        assert_eq!(
            cache.get(&key(0, 1, 5, 0)),
            Some(CacheEntry::Path { offset: 0, hops: 1 })
        );
        assert_eq!(
            cache.get(&key(0, 1, 6, -16)),
            Some(CacheEntry::Path { offset: 16, hops: 2 })
        );
        assert_eq!(cache.get(&key(0, 1, 7, 0)), None);
    }

    #[test]
    fn test_invalidate_clears_everything() {
        let mut cache = PathCache::default();
        cache.put(key(0, 1, 0, 0), CacheEntry::NoPath);
        cache.put(key(1, 2, 1, 4), CacheEntry::Path { offset: 4, hops: 1 });
        assert_eq!(cache.len(), 2);

        cache.invalidate();
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.get(&key(0, 1, 0, 0)), None);
    }
}
