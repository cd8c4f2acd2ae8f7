//! In-memory LRU result cache with TTL, consulted before the provider chain.
//! Key: blake3 hash of (src_lang | tgt_lang | provider_text).

use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;

/// Payload worth replaying for an identical (src, tgt, text) triple.
#[derive(Debug, Clone)]
pub struct CachedResult {
    pub text: String,
    pub provider: String,
    pub confidence: f32,
}

struct CacheEntry {
    result: CachedResult,
    inserted_at: Instant,
}

pub struct ResultCache {
    inner: Mutex<LruCache<[u8; 32], CacheEntry>>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1"),
            )),
            ttl,
        }
    }

    /// Compute the cache key from translation parameters.
    pub fn compute_key(src: &str, tgt: &str, text: &str) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(src.as_bytes());
        hasher.update(b"|");
        hasher.update(tgt.as_bytes());
        hasher.update(b"|");
        hasher.update(text.as_bytes());
        *hasher.finalize().as_bytes()
    }

    /// Look up a cached result. Returns None if absent or expired.
    pub fn get(&self, key: &[u8; 32]) -> Option<CachedResult> {
        let mut cache = self.inner.lock();
        if let Some(entry) = cache.get(key) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.result.clone());
            }
            cache.pop(key);
        }
        None
    }

    pub fn insert(&self, key: [u8; 32], result: CachedResult) {
        let mut cache = self.inner.lock();
        cache.put(
            key,
            CacheEntry {
                result,
                inserted_at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cached(text: &str) -> CachedResult {
        CachedResult {
            text: text.to_string(),
            provider: "static".to_string(),
            confidence: 0.9,
        }
    }

    #[tokio::test]
    async fn hit_and_miss() {
        let cache = ResultCache::new(4, Duration::from_secs(60));
        let key = ResultCache::compute_key("en", "de", "hello");
        assert!(cache.get(&key).is_none());
        cache.insert(key, cached("hallo"));
        assert_eq!(cache.get(&key).unwrap().text, "hallo");

        let other = ResultCache::compute_key("en", "fr", "hello");
        assert!(cache.get(&other).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_evicted_on_read() {
        let cache = ResultCache::new(4, Duration::from_millis(100));
        let key = ResultCache::compute_key("en", "de", "hello");
        cache.insert(key, cached("hallo"));
        tokio::time::advance(Duration::from_millis(150)).await;
        assert!(cache.get(&key).is_none());
    }

    #[tokio::test]
    async fn capacity_is_bounded() {
        let cache = ResultCache::new(2, Duration::from_secs(60));
        let k1 = ResultCache::compute_key("en", "de", "one");
        let k2 = ResultCache::compute_key("en", "de", "two");
        let k3 = ResultCache::compute_key("en", "de", "three");
        cache.insert(k1, cached("eins"));
        cache.insert(k2, cached("zwei"));
        cache.insert(k3, cached("drei"));
        assert!(cache.get(&k1).is_none());
        assert!(cache.get(&k3).is_some());
    }
}
