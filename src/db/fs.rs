use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::db::{DurableTier, StorageKey};
use crate::error::StoreError;

/// One JSON file per key: `<root>/<workspace>/<collection>.json`.
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// crash mid-write leaves the previous value intact.
#[derive(Debug, Clone)]
pub struct FsDurableTier {
    root: PathBuf,
}

impl FsDurableTier {
    pub async fn open(root: &Path) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|source| StoreError::Io {
                key: root.display().to_string(),
                source,
            })?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &StorageKey) -> PathBuf {
        self.root
            .join(key.workspace.as_str())
            .join(format!("{}.json", key.collection))
    }
}

fn io_error(key: &StorageKey, source: std::io::Error) -> StoreError {
    StoreError::Io {
        key: key.to_string(),
        source,
    }
}

#[async_trait]
impl DurableTier for FsDurableTier {
    async fn get(&self, key: &StorageKey) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(key, e)),
        }
    }

    async fn set(&self, key: &StorageKey, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(key, e))?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value.as_bytes())
            .await
            .map_err(|e| io_error(key, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(key, e))
    }

    async fn remove(&self, key: &StorageKey) -> Result<bool, StoreError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(key, e)),
        }
    }
}
