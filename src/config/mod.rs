pub(crate) mod helpers;
mod storage;

pub use storage::{
    CacheConfig, CollectionsConfig, LoggingConfig, StorageBackend, StorageConfig,
    default_storage_path,
};

use crate::error::ConfigError;
use crate::settings::Settings;

/// Fully resolved store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub storage: StorageConfig,
    pub collections: CollectionsConfig,
    pub logging: LoggingConfig,
}

impl StoreConfig {
    /// Resolve from settings, letting environment variables win.
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            storage: StorageConfig::resolve(settings)?,
            collections: CollectionsConfig::resolve(settings)?,
            logging: LoggingConfig::resolve(settings)?,
        })
    }

    /// Load `.env`, then the default settings file, then resolve.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let settings = match Settings::default_path() {
            Some(path) => Settings::load(&path)?,
            None => Settings::default(),
        };
        Self::resolve(&settings)
    }

    /// Memory-backed configuration with default policies.
    pub fn in_memory() -> Self {
        let defaults = Settings::default();
        Self {
            storage: StorageConfig::in_memory(),
            collections: CollectionsConfig::default(),
            logging: LoggingConfig {
                filter: defaults.logging.filter,
                json: defaults.logging.json,
            },
        }
    }
}
