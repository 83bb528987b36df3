use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio_stream::Stream;
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::WatchStream;

use crate::db::{CacheTier, DurableTier, StorageKey};
use crate::error::StoreError;

/// Boxed change stream returned by every `watch`.
pub type Watch<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

type Published = Option<Arc<str>>;

#[derive(Debug, Default)]
struct TierCounters {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_write_failures: AtomicU64,
    repopulate_failures: AtomicU64,
    cache_decode_failures: AtomicU64,
}

/// Snapshot of tier counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Cache writes that failed and fell through to the durable tier only.
    pub cache_write_failures: u64,
    /// Cache repopulations after a durable read that failed.
    pub repopulate_failures: u64,
    pub cache_decode_failures: u64,
}

struct TieredInner {
    cache: Arc<dyn CacheTier>,
    durable: Arc<dyn DurableTier>,
    watchers: Mutex<HashMap<String, watch::Sender<Published>>>,
    counters: TierCounters,
}

/// Cache-first reads, durable-always writes, per-key change notification.
///
/// The cache is best-effort: a rejected cache write is logged and counted,
/// and the durable write still happens. The durable tier is never skipped
/// and its errors propagate.
///
/// There is no locking across a read-modify-write. Callers must keep a single
/// writer per workspace.
#[derive(Clone)]
pub struct TieredStore {
    inner: Arc<TieredInner>,
}

impl TieredStore {
    pub fn new(cache: Arc<dyn CacheTier>, durable: Arc<dyn DurableTier>) -> Self {
        Self {
            inner: Arc::new(TieredInner {
                cache,
                durable,
                watchers: Mutex::new(HashMap::new()),
                counters: TierCounters::default(),
            }),
        }
    }

    pub fn stats(&self) -> TierStats {
        let c = &self.inner.counters;
        TierStats {
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            cache_misses: c.cache_misses.load(Ordering::Relaxed),
            cache_write_failures: c.cache_write_failures.load(Ordering::Relaxed),
            repopulate_failures: c.repopulate_failures.load(Ordering::Relaxed),
            cache_decode_failures: c.cache_decode_failures.load(Ordering::Relaxed),
        }
    }

    pub fn cache(&self) -> &Arc<dyn CacheTier> {
        &self.inner.cache
    }

    pub fn durable(&self) -> &Arc<dyn DurableTier> {
        &self.inner.durable
    }

    /// Raw read: cache, then durable with cache repopulation.
    pub async fn get(&self, key: &StorageKey) -> Result<Option<Arc<str>>, StoreError> {
        if let Some(hit) = self.inner.cache.get(key) {
            self.inner.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(hit));
        }
        self.inner
            .counters
            .cache_misses
            .fetch_add(1, Ordering::Relaxed);
        self.read_durable(key).await
    }

    async fn read_durable(&self, key: &StorageKey) -> Result<Option<Arc<str>>, StoreError> {
        let Some(raw) = self.inner.durable.get(key).await? else {
            return Ok(None);
        };
        let raw: Arc<str> = Arc::from(raw);
        if let Err(e) = self.inner.cache.set(key, raw.clone()) {
            self.inner
                .counters
                .repopulate_failures
                .fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, error = %e, "Cache repopulation skipped");
        }
        Ok(Some(raw))
    }

    /// Raw write: cache first (best-effort), then durable.
    pub async fn set(&self, key: &StorageKey, value: String) -> Result<(), StoreError> {
        let value: Arc<str> = Arc::from(value);

        if let Err(e) = self.inner.cache.set(key, value.clone()) {
            self.inner
                .counters
                .cache_write_failures
                .fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                key = %key,
                bytes = value.len(),
                error = %e,
                "Cache tier rejected write; durable tier remains the write of record"
            );
            self.inner.cache.remove(key);
        }

        if let Err(e) = self.inner.durable.set(key, &value).await {
            // Never let the cache serve a value the durable tier does not hold.
            self.inner.cache.remove(key);
            return Err(e);
        }

        self.publish(key, Some(value));
        Ok(())
    }

    pub async fn remove(&self, key: &StorageKey) -> Result<bool, StoreError> {
        self.inner.cache.remove(key);
        let existed = self.inner.durable.remove(key).await?;
        if existed {
            self.publish(key, None);
        }
        Ok(existed)
    }

    /// Typed read. A cached value that no longer decodes is evicted and the
    /// durable copy is used instead.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        key: &StorageKey,
    ) -> Result<Option<T>, StoreError> {
        if let Some(hit) = self.inner.cache.get(key) {
            match serde_json::from_str(&hit) {
                Ok(value) => {
                    self.inner.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(value));
                }
                Err(e) => {
                    self.inner
                        .counters
                        .cache_decode_failures
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(key = %key, error = %e, "Evicting undecodable cache entry");
                    self.inner.cache.remove(key);
                }
            }
        } else {
            self.inner
                .counters
                .cache_misses
                .fetch_add(1, Ordering::Relaxed);
        }

        match self.read_durable(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Serialization {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &StorageKey,
        value: &T,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value).map_err(|e| StoreError::Serialization {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.set(key, raw).await
    }

    fn sender(&self, key: &StorageKey) -> Option<watch::Sender<Published>> {
        let mut watchers = match self.inner.watchers.lock() {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!("Watcher registry lock poisoned: {}", e);
                return None;
            }
        };
        watchers.retain(|_, sender| sender.receiver_count() > 0);
        Some(
            watchers
                .entry(key.to_string())
                .or_insert_with(|| watch::channel(None).0)
                .clone(),
        )
    }

    /// Notify live subscribers. Keys nobody watches any more are dropped
    /// from the registry.
    fn publish(&self, key: &StorageKey, value: Published) {
        let mut watchers = match self.inner.watchers.lock() {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!("Watcher registry lock poisoned: {}", e);
                return;
            }
        };
        let label = key.to_string();
        let Some(sender) = watchers.get(&label) else {
            return;
        };
        if sender.receiver_count() == 0 {
            watchers.remove(&label);
        } else {
            sender.send_replace(value);
        }
    }

    #[cfg(test)]
    fn watched_keys(&self) -> usize {
        self.inner.watchers.lock().map(|w| w.len()).unwrap_or_default()
    }

    /// Typed change stream for one key: yields `Some(value)` after every
    /// write and `None` after a removal. Values that fail to decode are
    /// skipped. Only changes made after subscription are yielded.
    pub fn changes<T>(&self, key: &StorageKey) -> Watch<Option<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let Some(sender) = self.sender(key) else {
            return Box::pin(tokio_stream::empty());
        };
        let key_label = key.to_string();
        let stream = WatchStream::from_changes(sender.subscribe()).filter_map(move |published| {
            match published {
                None => Some(None),
                Some(raw) => match serde_json::from_str::<T>(&raw) {
                    Ok(value) => Some(Some(value)),
                    Err(e) => {
                        tracing::warn!(key = %key_label, error = %e, "Skipping undecodable change");
                        None
                    }
                },
            }
        });
        Box::pin(stream)
    }
}
