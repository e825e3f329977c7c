//! Read-endpoint cache with clock-judged expiry
//!
//! Backed by a moka concurrent cache bounded by capacity. Entries carry a
//! weak ETag and an absolute expiry read from the injected [`Clock`], so TTL
//! behaviour is deterministic under a manual clock. Expired entries are
//! evicted lazily by the read that discovers them.

use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use canvas_model::{Clock, ContentHash, SystemClock};
use moka::future::Cache;
use serde::Serialize;

/// Default time-to-live for read entries
pub const DEFAULT_TTL_MS: i64 = 60_000;

/// Default maximum entry count
pub const DEFAULT_CAPACITY: u64 = 1_024;

/// A cached payload with its validator and expiry
#[derive(Debug)]
pub struct CacheEntry<T> {
    /// Weak ETag over the payload's canonical JSON
    pub etag: String,
    /// Shared payload
    pub payload: Arc<T>,
    /// Absolute expiry, epoch milliseconds
    pub expires_at_ms: i64,
}

impl<T> CacheEntry<T> {
    /// Whether the entry is still servable at `now_ms`
    #[inline]
    #[must_use]
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at_ms
    }
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Live entries
    pub entry_count: u64,
    /// Fresh hits
    pub hits: u64,
    /// Misses, including expired entries
    pub misses: u64,
}

/// Process-wide read cache keyed by request identity
#[derive(Debug, Clone)]
pub struct ReadCache {
    inner: Cache<String, Arc<dyn Any + Send + Sync>>,
    clock: Arc<dyn Clock>,
    ttl_ms: i64,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl ReadCache {
    /// Cache with the given TTL and the system clock
    #[must_use]
    pub fn new(ttl_ms: i64) -> Self {
        Self::with_clock(ttl_ms, Arc::new(SystemClock))
    }

    /// Cache judging expiry against `clock`
    #[must_use]
    pub fn with_clock(ttl_ms: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Cache::new(DEFAULT_CAPACITY),
            clock,
            ttl_ms,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Configured TTL
    #[must_use]
    pub fn ttl_ms(&self) -> i64 {
        self.ttl_ms
    }

    /// Fresh entry for `key`, if any
    pub async fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<CacheEntry<T>>> {
        let found = self
            .inner
            .get(key)
            .await
            .and_then(|erased| erased.downcast::<CacheEntry<T>>().ok());
        match found {
            Some(entry) if entry.is_fresh(self.clock.now_ms()) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry)
            }
            Some(_) => {
                self.inner.invalidate(key).await;
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key, "read cache entry expired");
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `payload` under `key`, expiring one TTL from now
    pub async fn insert<T>(&self, key: &str, payload: Arc<T>) -> Arc<CacheEntry<T>>
    where
        T: Serialize + Send + Sync + 'static,
    {
        let etag = ContentHash::of_json(payload.as_ref())
            .map(|hash| hash.weak_etag())
            .unwrap_or_default();
        let entry = Arc::new(CacheEntry {
            etag,
            payload,
            expires_at_ms: self.clock.now_ms() + self.ttl_ms,
        });
        let erased: Arc<dyn Any + Send + Sync> = entry.clone();
        self.inner.insert(key.to_string(), erased).await;
        entry
    }

    /// Fresh entry, or compute and store one
    ///
    /// # Errors
    /// Returns the loader's error; failures are not cached
    pub async fn get_or_try_insert_with<T, E, F, Fut>(
        &self,
        key: &str,
        load: F,
    ) -> Result<Arc<CacheEntry<T>>, E>
    where
        T: Serialize + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(entry) = self.get::<T>(key).await {
            return Ok(entry);
        }
        let payload = load().await?;
        Ok(self.insert(key, Arc::new(payload)).await)
    }

    /// Drop one entry
    pub async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    /// Drop every entry
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Counters
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.inner.entry_count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for ReadCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_MS)
    }
}
