use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::db::{DurableTier, StorageKey};
use crate::error::StoreError;

/// Process-local durable tier. Data lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryDurableTier {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryDurableTier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableTier for MemoryDurableTier {
    async fn get(&self, key: &StorageKey) -> Result<Option<String>, StoreError> {
        Ok(self.values.read().await.get(&key.to_string()).cloned())
    }

    async fn set(&self, key: &StorageKey, value: &str) -> Result<(), StoreError> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &StorageKey) -> Result<bool, StoreError> {
        Ok(self.values.write().await.remove(&key.to_string()).is_some())
    }
}
