//! Process-wide thumbnail cache
//!
//! `ThumbnailCache` pairs the in-memory LRU with the codec settings, so that
//! callers ask for a path and get a thumbnail back whether or not it was
//! already cached. Nothing is persisted; the cache is rebuilt every run.

use crate::error::{ConfigError, ThumbnailError};
use crate::generate::{generate_thumbnail, CodecOptions, Thumbnail};
use crate::lru::LruCache;
use crate::ThumbnailConfig;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

type MemoryCache = LruCache<PathBuf, Arc<Thumbnail>>;

/// Main thumbnail cache manager
pub struct ThumbnailCache {
    options: CodecOptions,
    memory: RwLock<Arc<MemoryCache>>,
    hits: AtomicU64,
    misses: AtomicU64,
    failures: AtomicU64,
}

impl ThumbnailCache {
    /// Create a cache sized and configured from `config`
    pub fn new(config: &ThumbnailConfig) -> Result<Self, ThumbnailError> {
        Self::with_options(config.cache_capacity, config.codec_options())
    }

    pub fn with_options(capacity: usize, options: CodecOptions) -> Result<Self, ThumbnailError> {
        Ok(Self {
            options,
            memory: RwLock::new(Arc::new(LruCache::new(capacity)?)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        })
    }

    /// Current LRU. Held briefly so a concurrent `set_capacity` never waits on a decode.
    fn memory(&self) -> Arc<MemoryCache> {
        Arc::clone(&*self.memory.read())
    }

    pub fn options(&self) -> CodecOptions {
        self.options
    }

    /// Look up a cached thumbnail, marking it most recently used
    pub fn get(&self, path: &Path) -> Option<Arc<Thumbnail>> {
        self.memory().get(path)
    }

    /// Store a thumbnail under its own path
    pub fn insert(&self, thumbnail: Arc<Thumbnail>) {
        let key = thumbnail.path.clone();
        if let Some((evicted, _)) = self.memory().put(key, thumbnail) {
            debug!(path = %evicted.display(), "Evicted thumbnail");
        }
    }

    /// Get a thumbnail, generating and caching it on a miss.
    ///
    /// Failed files are not cached, so a later call retries them.
    pub fn get_or_generate(&self, path: &Path) -> Result<Arc<Thumbnail>, ThumbnailError> {
        if let Some(thumbnail) = self.get(path) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(thumbnail);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let thumbnail = match generate_thumbnail(path, &self.options) {
            Ok(thumbnail) => Arc::new(thumbnail),
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                return Err(err);
            }
        };
        self.insert(Arc::clone(&thumbnail));
        Ok(thumbnail)
    }

    /// Drop one cached thumbnail, e.g. after the file changed on disk
    pub fn invalidate(&self, path: &Path) -> bool {
        self.memory().remove(path).is_some()
    }

    /// Replace the LRU with an empty one of the given capacity
    pub fn set_capacity(&self, capacity: usize) -> Result<(), ConfigError> {
        let fresh = Arc::new(LruCache::new(capacity)?);
        *self.memory.write() = fresh;
        info!(capacity, "Thumbnail cache rebuilt");
        Ok(())
    }

    pub fn clear(&self) {
        self.memory().clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        let memory = self.memory();
        CacheStats {
            items: memory.len(),
            capacity: memory.capacity(),
            evictions: memory.evictions(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics for monitoring and debugging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub items: usize,
    pub capacity: usize,
    pub evictions: u64,
    pub hits: u64,
    pub misses: u64,
    pub failures: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}
