use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{AppError, AppResult};

/// Builds the filter: `RUST_LOG` when set, the configured level otherwise.
pub fn env_filter(config: &LoggingConfig) -> AppResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            AppError::Configuration(format!("Invalid log level '{}': {}", config.level, e))
        }),
    }
}

/// Installs the global fmt subscriber. Logs go to stderr so command output
/// on stdout stays machine readable.
pub fn init_logging(config: &LoggingConfig) -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config)?)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| AppError::Internal(format!("Failed to install log subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_from_config() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig {
            level: "debug,sqlx=warn".to_string(),
        };
        assert!(env_filter(&config).is_ok());

        let invalid = LoggingConfig {
            level: "scim_bridge=verbose".to_string(),
        };
        assert!(matches!(env_filter(&invalid), Err(AppError::Configuration(_))));
    }
}
