use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::config::CacheConfig;
use crate::db::{CacheTier, StorageKey};
use crate::error::CacheError;

#[derive(Debug)]
struct CacheState {
    entries: LruCache<String, Arc<str>>,
    total_bytes: usize,
}

impl CacheState {
    fn forget(&mut self, key: &str) {
        if let Some(old) = self.entries.pop(key) {
            self.total_bytes -= old.len();
        }
    }
}

/// Byte-bounded LRU cache tier.
///
/// Mirrors a browser-style synchronous store: a per-value ceiling on the
/// serialized string and a total quota. A write beyond either limit fails
/// and leaves no stale entry behind for that key.
#[derive(Debug)]
pub struct LruCacheTier {
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl LruCacheTier {
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                total_bytes: 0,
            }),
        }
    }

    /// Entry count and total bytes currently held.
    pub fn usage(&self) -> (usize, usize) {
        match self.state.lock() {
            Ok(state) => (state.entries.len(), state.total_bytes),
            Err(_) => (0, 0),
        }
    }
}

impl CacheTier for LruCacheTier {
    fn get(&self, key: &StorageKey) -> Option<Arc<str>> {
        let mut state = match self.state.lock() {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Cache tier lock poisoned: {}", e);
                return None;
            }
        };
        state.entries.get(key.to_string().as_str()).cloned()
    }

    fn set(&self, key: &StorageKey, value: Arc<str>) -> Result<(), CacheError> {
        let key = key.to_string();
        let bytes = value.len();
        let mut state = self
            .state
            .lock()
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        state.forget(&key);

        if bytes > self.config.max_value_bytes {
            return Err(CacheError::ValueTooLarge {
                key,
                bytes,
                limit: self.config.max_value_bytes,
            });
        }
        if bytes > self.config.max_total_bytes {
            return Err(CacheError::QuotaExceeded {
                key,
                bytes,
                quota: self.config.max_total_bytes,
            });
        }

        while state.total_bytes + bytes > self.config.max_total_bytes {
            match state.entries.pop_lru() {
                Some((_, evicted)) => state.total_bytes -= evicted.len(),
                None => break,
            }
        }

        if let Some((_, evicted)) = state.entries.push(key, value) {
            state.total_bytes -= evicted.len();
        }
        state.total_bytes += bytes;
        Ok(())
    }

    fn remove(&self, key: &StorageKey) {
        if let Ok(mut state) = self.state.lock() {
            state.forget(&key.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::config::CacheConfig;
    use crate::db::{CacheTier, StorageKey};
    use crate::error::CacheError;
    use crate::ids::WorkspaceId;

    use super::LruCacheTier;

    fn key(collection: &'static str) -> StorageKey {
        StorageKey::new(&WorkspaceId::new("ws").expect("workspace"), collection)
    }

    fn tier(max_entries: usize, max_value_bytes: usize, max_total_bytes: usize) -> LruCacheTier {
        LruCacheTier::new(CacheConfig {
            max_entries,
            max_value_bytes,
            max_total_bytes,
        })
    }

    #[test]
    fn oversized_value_is_rejected_and_evicts_stale_copy() {
        let cache = tier(4, 8, 64);
        cache.set(&key("docs"), Arc::from("small")).expect("fits");

        let err = cache
            .set(&key("docs"), Arc::from("definitely too large"))
            .expect_err("over ceiling");
        assert!(matches!(err, CacheError::ValueTooLarge { limit: 8, .. }));
        assert!(cache.get(&key("docs")).is_none());
        assert_eq!(cache.usage(), (0, 0));
    }

    #[test]
    fn quota_evicts_least_recently_used_entries() {
        let cache = tier(8, 4, 8);
        cache.set(&key("a"), Arc::from("aaaa")).expect("a");
        cache.set(&key("b"), Arc::from("bbbb")).expect("b");
        // Touch `a` so `b` is the eviction candidate.
        assert!(cache.get(&key("a")).is_some());
        cache.set(&key("c"), Arc::from("cccc")).expect("c");

        assert!(cache.get(&key("a")).is_some());
        assert!(cache.get(&key("b")).is_none());
        assert!(cache.get(&key("c")).is_some());
        assert_eq!(cache.usage(), (2, 8));
    }

    #[test]
    fn entry_capacity_evicts_and_tracks_bytes() {
        let cache = tier(1, 16, 64);
        cache.set(&key("a"), Arc::from("12345")).expect("a");
        cache.set(&key("b"), Arc::from("123")).expect("b");
        assert!(cache.get(&key("a")).is_none());
        assert_eq!(cache.usage(), (1, 3));
    }

    #[test]
    fn overwrite_replaces_byte_accounting() {
        let cache = tier(4, 16, 64);
        cache.set(&key("a"), Arc::from("1234567890")).expect("a");
        cache.set(&key("a"), Arc::from("12")).expect("a again");
        assert_eq!(cache.usage(), (1, 2));
        cache.remove(&key("a"));
        assert_eq!(cache.usage(), (0, 0));
    }
}
