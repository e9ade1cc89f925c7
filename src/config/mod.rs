//! Application configuration.
//!
//! Aggregates the broker connection, retry topic configurations and listener
//! settings into a single Config struct that can be loaded from YAML files
//! or environment variables.

use serde::Deserialize;

use crate::bus::KafkaConfig;
use crate::error::{Result, RetryTopicError};
use crate::retrytopic::{FailureLogLevel, RetryTopicConfiguration};
use crate::utils::retry::PublishRetryConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "retrytopic.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "RETRYTOPIC_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "RETRYTOPIC";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "RETRYTOPIC_LOG";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker connection.
    pub kafka: KafkaConfig,
    /// Retry topic configurations, checked in order.
    pub retry_topics: Vec<RetryTopicConfiguration>,
    /// Level of "record failed" log lines.
    pub failure_log_level: FailureLogLevel,
    /// Local retries when republishing to the next destination.
    pub publish_retry: PublishRetryConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `retrytopic.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config: Config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| RetryTopicError::configuration(format!("failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate every retry topic configuration.
    pub fn validate(&self) -> Result<()> {
        for (index, retry_topic) in self.retry_topics.iter().enumerate() {
            retry_topic.validate().map_err(|e| {
                RetryTopicError::configuration(format!("retry_topics[{}]: {}", index, e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
