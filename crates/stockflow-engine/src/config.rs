//! Worker configuration, assembled from environment variables.

use thiserror::Error;

use crate::db::DbConfig;
use crate::import::DEFAULT_BATCH_SIZE;
use crate::webhooks::DEFAULT_FAN_OUT_CONCURRENCY;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub batch_size: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub fan_out_concurrency: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            fan_out_concurrency: DEFAULT_FAN_OUT_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DbConfig,
    pub redis_url: String,
    pub import: ImportConfig,
    pub webhooks: WebhookConfig,
}

impl Config {
    /// Read everything from the environment. `DATABASE_URL` is required;
    /// all other settings have defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let database = DbConfig::from_env()?;

        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string());

        let batch_size = std::env::var("IMPORT_BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_BATCH_SIZE);

        let fan_out_concurrency = std::env::var("WEBHOOK_FAN_OUT_CONCURRENCY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_FAN_OUT_CONCURRENCY);

        let config = Self {
            database,
            redis_url,
            import: ImportConfig { batch_size },
            webhooks: WebhookConfig { fan_out_concurrency },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.import.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "IMPORT_BATCH_SIZE must be at least 1".to_string(),
            ));
        }
        if self.webhooks.fan_out_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "WEBHOOK_FAN_OUT_CONCURRENCY must be at least 1".to_string(),
            ));
        }
        if self.redis_url.is_empty() {
            return Err(ConfigError::Invalid("REDIS_URL must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config {
            database: DbConfig::default(),
            redis_url: DEFAULT_REDIS_URL.to_string(),
            import: ImportConfig::default(),
            webhooks: WebhookConfig::default(),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = Config {
            database: DbConfig::default(),
            redis_url: DEFAULT_REDIS_URL.to_string(),
            import: ImportConfig { batch_size: 0 },
            webhooks: WebhookConfig::default(),
        };
        assert!(config.validate().is_err());
    }
}
