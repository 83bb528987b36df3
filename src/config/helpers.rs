use std::time::Duration;

use crate::error::ConfigError;

/// Read an environment variable, treating unset and blank values as absent.
pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value is not valid UTF-8".to_string(),
        }),
    }
}

pub(crate) fn parse_bool_value(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}

pub(crate) fn parse_bool_env(key: &str, default: bool) -> Result<bool, ConfigError> {
    match optional_env(key)? {
        Some(raw) => parse_bool_value(key, &raw),
        None => Ok(default),
    }
}

pub(crate) fn parse_string_env(key: &str, default: String) -> Result<String, ConfigError> {
    Ok(optional_env(key)?.unwrap_or(default))
}

pub(crate) fn parse_usize_value(key: &str, raw: &str) -> Result<usize, ConfigError> {
    raw.trim()
        .parse::<usize>()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a non-negative integer: {e}"),
        })
}

pub(crate) fn parse_usize_env(key: &str, default: usize) -> Result<usize, ConfigError> {
    match optional_env(key)? {
        Some(raw) => parse_usize_value(key, &raw),
        None => Ok(default),
    }
}

/// Parse a duration in whole seconds. `0` disables the setting.
pub(crate) fn parse_optional_secs_env(
    key: &str,
    default: Option<u64>,
) -> Result<Option<Duration>, ConfigError> {
    let secs = match optional_env(key)? {
        Some(raw) => Some(raw.trim().parse::<u64>().map_err(|e| {
            ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected seconds as an integer: {e}"),
            }
        })?),
        None => default,
    };
    Ok(secs.filter(|s| *s > 0).map(Duration::from_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_values_accept_common_spellings() {
        assert!(parse_bool_value("K", "TRUE").expect("bool"));
        assert!(parse_bool_value("K", " on ").expect("bool"));
        assert!(!parse_bool_value("K", "0").expect("bool"));
        let err = parse_bool_value("K", "maybe").expect_err("must reject");
        let ConfigError::InvalidValue { key, message } = err else {
            panic!("expected InvalidValue");
        };
        assert_eq!(key, "K");
        assert!(message.contains("maybe"), "unexpected message: {message}");
    }

    #[test]
    fn usize_values_reject_negative_numbers() {
        assert_eq!(parse_usize_value("K", "42").expect("usize"), 42);
        assert!(parse_usize_value("K", "-1").is_err());
    }
}
