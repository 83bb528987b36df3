/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to read settings file {path}: {message}")]
    Settings { path: String, message: String },
}

/// Durable-tier and serialization errors.
///
/// These are the "genuinely unexpected" failures: they propagate to the
/// caller. Validation rejections and not-found results never use this type.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Durable tier unavailable: {0}")]
    Unavailable(String),

    #[error("Durable tier I/O failed for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Serialization error for '{key}': {message}")]
    Serialization { key: String, message: String },

    #[cfg(feature = "libsql")]
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),
}

/// Cache-tier write rejections. Always caught by the tiered store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("value for '{key}' is {bytes} bytes, above the {limit} byte ceiling")]
    ValueTooLarge {
        key: String,
        bytes: usize,
        limit: usize,
    },

    #[error("cache quota of {quota} bytes exceeded writing '{key}' ({bytes} bytes)")]
    QuotaExceeded {
        key: String,
        bytes: usize,
        quota: usize,
    },

    #[error("cache tier unavailable: {0}")]
    Unavailable(String),
}

/// Failures reported by a calendar collaborator.
#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("calendar event for {source_kind}/{source_id} rejected: {reason}")]
    Rejected {
        source_kind: String,
        source_id: String,
        reason: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
