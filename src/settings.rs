use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// `memory`, `fs` or `libsql`.
    pub backend: String,
    /// Directory (fs) or database file (libsql). Defaults under the user data dir.
    pub path: Option<PathBuf>,
    pub cache_max_entries: usize,
    pub cache_max_value_bytes: usize,
    pub cache_max_total_bytes: usize,
    pub text_field_budget: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: "fs".to_string(),
            path: None,
            cache_max_entries: 256,
            cache_max_value_bytes: 5 * 1024 * 1024,
            cache_max_total_bytes: 32 * 1024 * 1024,
            text_field_budget: 256 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionSettings {
    /// Seconds a job record is retained; `0` keeps jobs forever.
    pub job_ttl_secs: u64,
    pub job_max_items: usize,
    pub email_max_items: usize,
    pub audit_max_items: usize,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            job_ttl_secs: 7 * 24 * 60 * 60,
            job_max_items: 500,
            email_max_items: 1_000,
            audit_max_items: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "clawyer_store=info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageSettings,
    pub collections: CollectionSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Settings {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    /// Load settings from a TOML file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No settings file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Settings {
                    path: path.display().to_string(),
                    message: e.to_string(),
                });
            }
        };
        toml::from_str(&raw).map_err(|e| ConfigError::Settings {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// `<config dir>/clawyer/store.toml`, when a config dir exists.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("clawyer").join("store.toml"))
    }
}
