//! Next-destination resolution for failed records.

use std::sync::Arc;

use tracing::{debug, trace};

use super::destination::DestinationTopic;
use super::failure::ListenerFailure;
use super::processor::DestinationTopicRegistry;
use crate::error::{Result, RetryTopicError};

/// Decides where a failed record goes next.
///
/// Reads the registry's current snapshot on every call. No locks are held
/// while deciding.
#[derive(Debug, Clone)]
pub struct DestinationTopicResolver {
    registry: Arc<DestinationTopicRegistry>,
}

impl DestinationTopicResolver {
    pub fn new(registry: Arc<DestinationTopicRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve without timeout information.
    pub fn resolve_destination(
        &self,
        source_topic: &str,
        current_topic: &str,
        attempt: u32,
        failure: &ListenerFailure,
    ) -> Result<DestinationTopic> {
        self.resolve_destination_at(source_topic, current_topic, attempt, failure, None, 0)
    }

    /// Resolve the destination for a record that failed on `current_topic`.
    ///
    /// `attempt` is the 1-based number of the attempt that just failed at
    /// this node. Returning the current node means "retry here": in-process
    /// for a plain node, by republishing to the same topic for a reused one.
    /// `first_failure_ms` and `now_ms` drive the optional chain timeout.
    pub fn resolve_destination_at(
        &self,
        source_topic: &str,
        current_topic: &str,
        attempt: u32,
        failure: &ListenerFailure,
        first_failure_ms: Option<i64>,
        now_ms: i64,
    ) -> Result<DestinationTopic> {
        let chain = self.registry.chain(source_topic).ok_or_else(|| {
            RetryTopicError::configuration(format!(
                "no destination chain registered for topic '{}'",
                source_topic
            ))
        })?;

        let position = chain.position(current_topic).ok_or_else(|| {
            RetryTopicError::routing(format!(
                "topic '{}' is not part of the chain of '{}'",
                current_topic, source_topic
            ))
        })?;

        let destinations = chain.destinations();
        let current = &destinations[position];
        let policy = chain.policy();
        let fatal = policy.classifier.is_fatal(failure);

        if current.is_no_ops() {
            return Err(RetryTopicError::routing(format!(
                "records cannot fail on the no-ops node of '{}'",
                source_topic
            )));
        }

        if current.is_dlt() {
            if current.retries_on_dlt_enabled() && !fatal {
                debug!(topic = %current_topic, attempt, "DLT processing failed, sending back to DLT");
                return Ok(current.clone());
            }
            return Err(RetryTopicError::FatalProcessing {
                topic: current_topic.to_string(),
                reason: format!("DLT processing failed: {}", failure),
            });
        }

        if fatal {
            debug!(topic = %current_topic, kind = %failure.kind(), "Fatal failure, skipping retries");
            return Ok(chain.terminal().clone());
        }

        if let (Some(timeout), Some(first)) = (policy.timeout_ms, first_failure_ms) {
            if now_ms.saturating_sub(first) > timeout as i64 {
                debug!(topic = %current_topic, timeout_ms = timeout, "Retry timeout exceeded");
                return Ok(chain.terminal().clone());
            }
        }

        if attempt < current.max_attempts() && (current.is_reusable() || policy.blocks_on(failure)) {
            trace!(
                topic = %current_topic,
                attempt,
                max_attempts = current.max_attempts(),
                "Retrying at current level"
            );
            return Ok(current.clone());
        }

        let next = destinations.get(position + 1).ok_or_else(|| {
            RetryTopicError::routing(format!(
                "no destination after '{}' in the chain of '{}'",
                current_topic, source_topic
            ))
        })?;
        Ok(next.clone())
    }

    /// Terminal node (DLT or NO_OPS) of a source topic's chain.
    pub fn terminal(&self, source_topic: &str) -> Result<DestinationTopic> {
        self.registry
            .chain(source_topic)
            .map(|chain| chain.terminal().clone())
            .ok_or_else(|| {
                RetryTopicError::configuration(format!(
                    "no destination chain registered for topic '{}'",
                    source_topic
                ))
            })
    }

    /// Look up one node of a registered chain.
    pub fn destination(&self, source_topic: &str, destination_name: &str) -> Option<DestinationTopic> {
        self.registry
            .chain(source_topic)
            .and_then(|chain| chain.get(destination_name).cloned())
    }
}

#[cfg(test)]
mod tests;
