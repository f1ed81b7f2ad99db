use std::collections::HashSet;
use std::num::NonZeroUsize;

use lru::LruCache;
use thiserror::Error;

/// Failure reported by a dedup store's backing storage.
#[derive(Debug, Error)]
#[error("Dedup cache error: {0}")]
pub struct CacheError(pub String);

/// Record of item identities a feed worker has already seen.
///
/// Each [`FeedPoller`](super::FeedPoller) owns its cache outright, so
/// implementations need no interior locking.
pub trait DedupCache: Send + 'static {
    fn seen(&self, id: &str) -> bool;

    /// Records `id`. Adding an identity twice is the same as adding it once,
    /// except that bounded stores treat it as a fresh sighting.
    fn add(&mut self, id: &str) -> Result<(), CacheError>;

    fn remove(&mut self, id: &str) -> Result<(), CacheError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unbounded in-memory store. Entries live for the whole process.
#[derive(Debug, Default)]
pub struct MemoryCache {
    ids: HashSet<String>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DedupCache for MemoryCache {
    fn seen(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn add(&mut self, id: &str) -> Result<(), CacheError> {
        if !self.ids.contains(id) {
            self.ids.insert(id.to_string());
        }
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Result<(), CacheError> {
        self.ids.remove(id);
        Ok(())
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

/// In-memory store holding at most `capacity` identities.
///
/// The identity sighted longest ago is evicted first. Pick a capacity
/// above the number of items a feed lists at once, or evicted items will be
/// announced again when they reappear.
pub struct LruDedupCache {
    ids: LruCache<String, ()>,
}

impl LruDedupCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            ids: LruCache::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.ids.cap().get()
    }
}

impl DedupCache for LruDedupCache {
    fn seen(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn add(&mut self, id: &str) -> Result<(), CacheError> {
        // `get` refreshes a re-added identity so it is not the next eviction.
        if self.ids.get(id).is_none() {
            self.ids.put(id.to_string(), ());
        }
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Result<(), CacheError> {
        self.ids.pop(id);
        Ok(())
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}
