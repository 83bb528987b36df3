//! Storage tiers.
//!
//! Every logical key is backed by two tiers:
//!
//! - a synchronous, low-capacity [`CacheTier`] that serves most reads and may
//!   refuse oversized writes;
//! - an asynchronous, higher-capacity [`DurableTier`] that is the source of
//!   truth.
//!
//! [`TieredStore`] combines them. Durable implementations live behind the
//! configured backend: in-memory, one-file-per-key on disk, or libSQL.

pub mod cache;
pub mod fs;
#[cfg(feature = "libsql")]
pub mod libsql;
pub mod memory;
pub mod tiered;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{CacheError, StoreError};
use crate::ids::WorkspaceId;

pub use cache::LruCacheTier;
pub use fs::FsDurableTier;
#[cfg(feature = "libsql")]
pub use libsql::LibSqlDurableTier;
pub use memory::MemoryDurableTier;
pub use tiered::{TierStats, TieredStore, Watch};

/// `(workspace, collection)` pair naming one stored value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
    pub workspace: WorkspaceId,
    pub collection: &'static str,
}

impl StorageKey {
    pub fn new(workspace: &WorkspaceId, collection: &'static str) -> Self {
        Self {
            workspace: workspace.clone(),
            collection,
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.workspace, self.collection)
    }
}

/// Fast synchronous tier. `set` may fail when a value exceeds its limits.
pub trait CacheTier: Send + Sync {
    fn get(&self, key: &StorageKey) -> Option<Arc<str>>;
    fn set(&self, key: &StorageKey, value: Arc<str>) -> Result<(), CacheError>;
    fn remove(&self, key: &StorageKey);
}

/// Authoritative asynchronous tier.
#[async_trait]
pub trait DurableTier: Send + Sync {
    async fn get(&self, key: &StorageKey) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &StorageKey, value: &str) -> Result<(), StoreError>;
    /// Returns whether a value was present.
    async fn remove(&self, key: &StorageKey) -> Result<bool, StoreError>;
}

/// Build the durable tier named by the configuration.
pub async fn connect_from_config(
    config: &StorageConfig,
) -> Result<Arc<dyn DurableTier>, StoreError> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryDurableTier::new())),
        StorageBackend::Fs => {
            let tier = FsDurableTier::open(&config.path).await?;
            Ok(Arc::new(tier))
        }
        #[cfg(feature = "libsql")]
        StorageBackend::LibSql => {
            let db_path = if config.path.extension().is_some() {
                config.path.clone()
            } else {
                config.path.join("store.db")
            };
            let tier = LibSqlDurableTier::new_local(&db_path).await?;
            Ok(Arc::new(tier))
        }
        #[cfg(not(feature = "libsql"))]
        StorageBackend::LibSql => Err(StoreError::Unavailable(
            "libsql backend requested but the 'libsql' feature is disabled".to_string(),
        )),
    }
}

/// Build the cache + durable pair named by the configuration.
pub async fn tiers_from_config(config: &StorageConfig) -> Result<TieredStore, StoreError> {
    let durable = connect_from_config(config).await?;
    let cache = Arc::new(LruCacheTier::new(config.cache));
    tracing::debug!(
        backend = config.backend.as_str(),
        path = %config.path.display(),
        "Opened storage tiers"
    );
    Ok(TieredStore::new(cache, durable))
}
