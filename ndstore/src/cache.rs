//! Handle registry and descriptor cache.
//!
//! The cache is the sole owner of [`DatasetDescriptor`] values: callers hold
//! a handle string and borrow a descriptor for at most the duration of one
//! call. Capacity is bounded, and the only eviction signal is "is the
//! backing file open right now" — closed descriptors are removed in a single
//! explicit pass, open ones are never removed regardless of age or access
//! pattern. There is no LRU and no timer.
//!
//! # Thread Safety
//!
//! The cache is designed for single-threaded access patterns. External
//! synchronization must be provided if used across multiple threads.

use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use crate::dataset::DatasetDescriptor;
use crate::error::{Result, StorageError};

/// Default maximum number of cached descriptors.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Maximum accepted handle length in bytes.
///
/// Handles cross a bounded-length string boundary at the host shell; a
/// longer token is rejected at creation time instead of being truncated.
pub const MAX_HANDLE_LEN: usize = 1024;

/// How the cache treats its capacity bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Capacity is advisory: a full cache triggers one eviction pass, after
    /// which insertion proceeds even if the cache is still full.
    #[default]
    SoftLimit,
    /// Capacity is enforced: if the eviction pass frees no room, insertion
    /// fails with [`StorageError::OutOfCapacity`].
    HardLimit,
}

/// Bounded registry mapping opaque handles to dataset descriptors.
#[derive(Debug)]
pub struct DescriptorCache {
    /// Registered descriptors by handle.
    entries: HashMap<String, DatasetDescriptor>,
    /// Configured capacity bound.
    capacity: usize,
    /// Soft or hard capacity enforcement.
    policy: CachePolicy,
}

impl Default for DescriptorCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorCache {
    /// Creates a cache with the default capacity and the soft-limit policy.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CAPACITY, CachePolicy::default())
    }

    /// Creates a cache with an explicit capacity bound and policy.
    pub fn with_limits(capacity: usize, policy: CachePolicy) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
            policy,
        }
    }

    /// Makes room for one insertion, evicting closed entries if needed.
    ///
    /// At capacity, runs a single [`evict_closed`](Self::evict_closed) pass.
    /// Under [`CachePolicy::HardLimit`] a still-full cache is an error;
    /// under [`CachePolicy::SoftLimit`] the bound is advisory.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::OutOfCapacity`] if the cache remains full
    /// under the hard-limit policy.
    pub fn ensure_capacity(&mut self) -> Result<()> {
        if self.entries.len() >= self.capacity {
            let evicted = self.evict_closed();
            debug!(evicted, remaining = self.entries.len(), "cache eviction pass");
            if self.policy == CachePolicy::HardLimit && self.entries.len() >= self.capacity {
                return Err(StorageError::OutOfCapacity {
                    reason: format!("descriptor cache full ({} entries)", self.capacity),
                });
            }
        }
        Ok(())
    }

    /// Registers a descriptor under a freshly generated handle.
    ///
    /// Handles are uuid-v4 string tokens, globally unique per process and
    /// never reused, even after the entry is evicted or removed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::OutOfCapacity`] per
    /// [`ensure_capacity`](Self::ensure_capacity), or
    /// [`StorageError::Internal`] if the generated handle violates internal
    /// limits.
    pub fn insert(&mut self, descriptor: DatasetDescriptor) -> Result<String> {
        self.ensure_capacity()?;

        let handle = Uuid::new_v4().to_string();
        if handle.len() > MAX_HANDLE_LEN {
            return Err(StorageError::internal(format!(
                "generated handle exceeds {MAX_HANDLE_LEN} bytes"
            )));
        }
        if self.entries.contains_key(&handle) {
            return Err(StorageError::internal("handle collision"));
        }
        self.entries.insert(handle.clone(), descriptor);
        Ok(handle)
    }

    /// Removes every closed entry and returns how many were evicted.
    ///
    /// Open entries are never touched.
    pub fn evict_closed(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, descriptor| descriptor.is_open());
        before - self.entries.len()
    }

    /// Looks up a descriptor by handle.
    pub fn get(&self, handle: &str) -> Option<&DatasetDescriptor> {
        self.entries.get(handle)
    }

    /// Looks up a descriptor by handle for mutation.
    pub fn get_mut(&mut self, handle: &str) -> Option<&mut DatasetDescriptor> {
        self.entries.get_mut(handle)
    }

    /// Unconditionally removes an entry, returning its descriptor.
    pub fn remove(&mut self, handle: &str) -> Option<DatasetDescriptor> {
        self.entries.remove(handle)
    }

    /// Empties the cache, returning every descriptor (used by shutdown).
    pub(crate) fn take_all(&mut self) -> Vec<DatasetDescriptor> {
        self.entries.drain().map(|(_, descriptor)| descriptor).collect()
    }

    /// Returns the number of registered descriptors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no descriptors are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the configured capacity bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the configured capacity policy.
    pub fn policy(&self) -> CachePolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{DatasetFile, DatasetHeader, FrameTags};
    use std::io;
    use std::path::Path;

    /// Codec resource stub; cache tests only care about open vs. closed.
    struct StubFile;

    impl DatasetFile for StubFile {
        fn write_header(&mut self, _header: &DatasetHeader) -> io::Result<()> {
            Ok(())
        }
        fn header(&self) -> Option<&DatasetHeader> {
            None
        }
        fn append_frame(&mut self, _pixels: &[u8], _tags: &FrameTags) -> io::Result<u32> {
            Ok(0)
        }
        fn read_frame(&mut self, _slot: u32) -> io::Result<Vec<u8>> {
            Ok(Vec::new())
        }
        fn frames(&self) -> &[FrameTags] {
            &[]
        }
        fn close(self: Box<Self>) -> io::Result<()> {
            Ok(())
        }
    }

    fn closed_descriptor(n: usize) -> DatasetDescriptor {
        DatasetDescriptor::new(Path::new(&format!("/data/set{n}.tif")), "set", &[2], "")
    }

    fn open_descriptor(n: usize) -> DatasetDescriptor {
        let mut descriptor = closed_descriptor(n);
        descriptor.set_open(Box::new(StubFile));
        descriptor
    }

    #[test]
    fn test_handles_are_unique() {
        let mut cache = DescriptorCache::new();
        let a = cache.insert(closed_descriptor(0)).unwrap();
        let b = cache.insert(closed_descriptor(1)).unwrap();
        assert_ne!(a, b);
        assert!(a.len() <= MAX_HANDLE_LEN);
        assert!(cache.get(&a).is_some());
        assert!(cache.get(&b).is_some());
        assert!(cache.get("no-such-handle").is_none());
    }

    #[test]
    fn test_eviction_only_removes_closed() {
        let mut cache = DescriptorCache::new();
        let open = cache.insert(open_descriptor(0)).unwrap();
        let closed = cache.insert(closed_descriptor(1)).unwrap();

        assert_eq!(cache.evict_closed(), 1);
        assert!(cache.get(&open).is_some());
        assert!(cache.get(&closed).is_none());
    }

    #[test]
    fn test_soft_limit_inserts_past_capacity() {
        let mut cache = DescriptorCache::with_limits(1, CachePolicy::SoftLimit);
        let first = cache.insert(open_descriptor(0)).unwrap();
        // The open entry survives the eviction pass; insertion proceeds anyway.
        let second = cache.insert(open_descriptor(1)).unwrap();
        assert!(cache.get(&first).is_some());
        assert!(cache.get(&second).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_hard_limit_rejects_when_full_of_open_entries() {
        let mut cache = DescriptorCache::with_limits(1, CachePolicy::HardLimit);
        cache.insert(open_descriptor(0)).unwrap();

        let err = cache.insert(open_descriptor(1)).unwrap_err();
        assert!(matches!(err, StorageError::OutOfCapacity { .. }));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_hard_limit_inserts_after_eviction_frees_room() {
        let mut cache = DescriptorCache::with_limits(2, CachePolicy::HardLimit);
        cache.insert(closed_descriptor(0)).unwrap();
        cache.insert(closed_descriptor(1)).unwrap();

        // Both entries are closed, so the capacity pass clears them.
        let handle = cache.insert(open_descriptor(2)).unwrap();
        assert!(cache.get(&handle).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove_is_unconditional() {
        let mut cache = DescriptorCache::new();
        let handle = cache.insert(open_descriptor(0)).unwrap();
        assert!(cache.remove(&handle).is_some());
        assert!(cache.remove(&handle).is_none());
        assert!(cache.is_empty());
    }
}
