use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured filter. Calling this twice is harmless; the second call is
/// ignored.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter.as_str()));

    let result = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    };

    if let Err(e) = result {
        tracing::debug!("tracing subscriber already installed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::init;
    use crate::config::LoggingConfig;

    #[test]
    fn second_init_is_ignored() {
        let config = LoggingConfig {
            filter: "clawyer_store=debug".to_string(),
            json: true,
        };
        init(&config);
        init(&LoggingConfig {
            json: false,
            ..config
        });
        tracing::info!("subscriber installed");
    }
}
