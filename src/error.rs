//! Error taxonomy for retry-topic routing.
//!
//! - `Configuration`: malformed backoff, unknown topic, conflicting options.
//!   Raised while wiring listeners; aborts configuration.
//! - `RoutingDecision`: the resolver found the topology inconsistent at runtime.
//!   Surfaces to the listener container, which stops that consumer.
//! - `RetryableProcessing`: the handler threw a non-fatal failure. Recovered by
//!   forwarding to the next destination, never surfaced to the original producer.
//! - `FatalProcessing`: fatal failure with nowhere left to go (DLT failed with
//!   DLT retries disabled, or republishing exhausted its local retries).

use crate::bus::BusError;
use crate::retrytopic::ListenerFailure;

/// Result type for retry-topic operations.
pub type Result<T> = std::result::Result<T, RetryTopicError>;

/// Errors raised by the retry-topic subsystem.
#[derive(Debug, thiserror::Error)]
pub enum RetryTopicError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Routing decision failed: {0}")]
    RoutingDecision(String),

    #[error("Retryable failure on '{topic}': {failure}")]
    RetryableProcessing {
        topic: String,
        failure: ListenerFailure,
    },

    #[error("Fatal failure on '{topic}': {reason}")]
    FatalProcessing { topic: String, reason: String },

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
}

impl RetryTopicError {
    /// Shorthand for a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Shorthand for a routing decision error.
    pub fn routing(message: impl Into<String>) -> Self {
        Self::RoutingDecision(message.into())
    }

    /// Whether the listener container must stop consuming after this error.
    pub fn stops_consumer(&self) -> bool {
        !matches!(self, Self::RetryableProcessing { .. })
    }
}
