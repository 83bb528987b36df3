use std::path::PathBuf;
use std::time::Duration;

use crate::config::helpers::{
    optional_env, parse_bool_env, parse_optional_secs_env, parse_string_env, parse_usize_env,
};
use crate::error::ConfigError;
use crate::settings::Settings;

/// Which durable tier backs the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Fs,
    LibSql,
}

impl StorageBackend {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "fs" | "file" | "files" => Ok(Self::Fs),
            "libsql" | "sqlite" => Ok(Self::LibSql),
            other => Err(ConfigError::InvalidValue {
                key: "CLAWYER_STORAGE_BACKEND".to_string(),
                message: format!("unsupported backend '{other}'"),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Fs => "fs",
            Self::LibSql => "libsql",
        }
    }
}

/// Limits of the synchronous cache tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub max_entries: usize,
    /// Hard ceiling for a single serialized value.
    pub max_value_bytes: usize,
    pub max_total_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let settings = crate::settings::StorageSettings::default();
        Self {
            max_entries: settings.cache_max_entries,
            max_value_bytes: settings.cache_max_value_bytes,
            max_total_bytes: settings.cache_max_total_bytes,
        }
    }
}

/// Durable tier selection and the sanitization budget derived from the cache.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: PathBuf,
    pub cache: CacheConfig,
    pub text_field_budget: usize,
}

/// Retention policies for the flat collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionsConfig {
    pub job_ttl: Option<Duration>,
    pub job_max_items: Option<usize>,
    pub email_max_items: Option<usize>,
    pub audit_max_items: Option<usize>,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        let settings = crate::settings::CollectionSettings::default();
        Self {
            job_ttl: Some(Duration::from_secs(settings.job_ttl_secs)),
            job_max_items: Some(settings.job_max_items),
            email_max_items: Some(settings.email_max_items),
            audit_max_items: Some(settings.audit_max_items),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub filter: String,
    pub json: bool,
}

pub fn default_storage_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("clawyer").join("store"))
        .unwrap_or_else(|| PathBuf::from(".clawyer-store"))
}

fn limit_or_none(value: usize) -> Option<usize> {
    (value > 0).then_some(value)
}

/// The text budget has to leave room for the rest of a record inside the
/// cache tier's per-value ceiling, otherwise a single sanitized document can
/// still be rejected by the cache.
fn validate_budget(budget: usize, cache: &CacheConfig) -> Result<usize, ConfigError> {
    if budget == 0 {
        return Err(ConfigError::InvalidValue {
            key: "CLAWYER_TEXT_FIELD_BUDGET".to_string(),
            message: "text field budget must be greater than zero".to_string(),
        });
    }
    if budget >= cache.max_value_bytes {
        return Err(ConfigError::InvalidValue {
            key: "CLAWYER_TEXT_FIELD_BUDGET".to_string(),
            message: format!(
                "text field budget ({budget}) must be below the cache value ceiling ({})",
                cache.max_value_bytes
            ),
        });
    }
    Ok(budget)
}

fn validate_cache(cache: CacheConfig) -> Result<CacheConfig, ConfigError> {
    if cache.max_entries == 0 {
        return Err(ConfigError::InvalidValue {
            key: "CLAWYER_CACHE_MAX_ENTRIES".to_string(),
            message: "cache must hold at least one entry".to_string(),
        });
    }
    if cache.max_total_bytes < cache.max_value_bytes {
        return Err(ConfigError::InvalidValue {
            key: "CLAWYER_CACHE_MAX_TOTAL_BYTES".to_string(),
            message: "total cache quota must be at least the per-value ceiling".to_string(),
        });
    }
    Ok(cache)
}

impl StorageConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let backend_raw =
            parse_string_env("CLAWYER_STORAGE_BACKEND", settings.storage.backend.clone())?;
        let backend = StorageBackend::from_str(&backend_raw)?;

        let path = optional_env("CLAWYER_STORAGE_PATH")?
            .map(PathBuf::from)
            .or_else(|| settings.storage.path.clone())
            .unwrap_or_else(default_storage_path);

        let cache = validate_cache(CacheConfig {
            max_entries: parse_usize_env(
                "CLAWYER_CACHE_MAX_ENTRIES",
                settings.storage.cache_max_entries,
            )?,
            max_value_bytes: parse_usize_env(
                "CLAWYER_CACHE_MAX_VALUE_BYTES",
                settings.storage.cache_max_value_bytes,
            )?,
            max_total_bytes: parse_usize_env(
                "CLAWYER_CACHE_MAX_TOTAL_BYTES",
                settings.storage.cache_max_total_bytes,
            )?,
        })?;

        let text_field_budget = validate_budget(
            parse_usize_env(
                "CLAWYER_TEXT_FIELD_BUDGET",
                settings.storage.text_field_budget,
            )?,
            &cache,
        )?;

        Ok(Self {
            backend,
            path,
            cache,
            text_field_budget,
        })
    }

    /// In-memory configuration for tests and embedding.
    pub fn in_memory() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: PathBuf::new(),
            cache: CacheConfig::default(),
            text_field_budget: crate::settings::StorageSettings::default().text_field_budget,
        }
    }
}

impl CollectionsConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            job_ttl: parse_optional_secs_env(
                "CLAWYER_JOB_TTL_SECS",
                Some(settings.collections.job_ttl_secs),
            )?,
            job_max_items: limit_or_none(parse_usize_env(
                "CLAWYER_JOB_MAX_ITEMS",
                settings.collections.job_max_items,
            )?),
            email_max_items: limit_or_none(parse_usize_env(
                "CLAWYER_EMAIL_MAX_ITEMS",
                settings.collections.email_max_items,
            )?),
            audit_max_items: limit_or_none(parse_usize_env(
                "CLAWYER_AUDIT_MAX_ITEMS",
                settings.collections.audit_max_items,
            )?),
        })
    }
}

impl LoggingConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            filter: parse_string_env("CLAWYER_LOG_FILTER", settings.logging.filter.clone())?,
            json: parse_bool_env("CLAWYER_LOG_JSON", settings.logging.json)?,
        })
    }
}
