//! Retry utilities: backoff builders for broker operations.
//!
//! Uses `backon` for exponential backoff with jitter. Republishing a failed
//! record must succeed (or run out of attempts) before the original offset is
//! committed, so these retries are bounded.

use std::time::Duration;

use backon::ExponentialBuilder;
use serde::Deserialize;

/// Bounded local retries for republishing a record to its next destination.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PublishRetryConfig {
    /// Retries after the first attempt.
    pub max_times: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for PublishRetryConfig {
    fn default() -> Self {
        Self {
            max_times: 3,
            min_delay_ms: 100,
            max_delay_ms: 2000,
            jitter: true,
        }
    }
}

/// Backoff for republishing failed records.
///
/// Defaults:
/// - Min delay: 100ms
/// - Max delay: 2s
/// - Max retries: 3
/// - Jitter enabled
pub fn publish_backoff(config: &PublishRetryConfig) -> ExponentialBuilder {
    let builder = ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(config.min_delay_ms))
        .with_max_delay(Duration::from_millis(config.max_delay_ms))
        .with_max_times(config.max_times);
    if config.jitter {
        builder.with_jitter()
    } else {
        builder
    }
}

/// Backoff for topic administration at startup.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Max attempts: 5
/// - Jitter enabled
pub fn admin_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(5)
        .with_jitter()
}
