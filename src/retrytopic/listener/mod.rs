//! Record handlers and the retry error handler wrapped around them.
//!
//! A [`RetryTopicListener`] consumes one destination topic of a chain. On a
//! handler failure it asks the resolver where the record goes next and then
//! retries in-process, republishes (to a later level, to the same reused
//! topic, or to the DLT) or drops the record.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::{debug, warn};

use super::destination::DestinationTopic;
use super::failure::ListenerFailure;
use super::resolver::DestinationTopicResolver;
use crate::bus::headers::{
    ATTEMPTS, BACKOFF_DUE, EXCEPTION_FQCN, EXCEPTION_MESSAGE, EXCEPTION_STACKTRACE,
    ORIGINAL_OFFSET, ORIGINAL_PARTITION, ORIGINAL_TIMESTAMP, RETRY_TOPIC,
};
use crate::bus::{BusError, ConsumerRecord, Headers, ProducerRecord, RecordPublisher};
use crate::error::{Result, RetryTopicError};
use crate::utils::retry::{publish_backoff, PublishRetryConfig};

/// Processes records consumed from a destination topic.
pub trait RecordHandler: Send + Sync {
    fn handle(&self, record: Arc<ConsumerRecord>) -> BoxFuture<'static, std::result::Result<(), ListenerFailure>>;
}

struct FnHandler<F>(F);

impl<F, Fut> RecordHandler for FnHandler<F>
where
    F: Fn(Arc<ConsumerRecord>) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<(), ListenerFailure>> + Send + 'static,
{
    fn handle(&self, record: Arc<ConsumerRecord>) -> BoxFuture<'static, std::result::Result<(), ListenerFailure>> {
        Box::pin((self.0)(record))
    }
}

/// Wrap an async closure as a handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn RecordHandler>
where
    F: Fn(Arc<ConsumerRecord>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), ListenerFailure>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Level used for "record failed" and "record dropped" log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureLogLevel {
    #[default]
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            FailureLogLevel::Error => tracing::error!($($arg)+),
            FailureLogLevel::Warn => tracing::warn!($($arg)+),
            FailureLogLevel::Info => tracing::info!($($arg)+),
            FailureLogLevel::Debug => tracing::debug!($($arg)+),
            FailureLogLevel::Trace => tracing::trace!($($arg)+),
        }
    };
}

/// DLT handler used when none is configured: logs the record and its failure headers.
pub struct LoggingDltHandler {
    level: FailureLogLevel,
}

impl LoggingDltHandler {
    pub fn new(level: FailureLogLevel) -> Self {
        Self { level }
    }
}

impl RecordHandler for LoggingDltHandler {
    fn handle(&self, record: Arc<ConsumerRecord>) -> BoxFuture<'static, std::result::Result<(), ListenerFailure>> {
        let level = self.level;
        Box::pin(async move {
            log_at!(
                level,
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                original_topic = record.headers.get_str(RETRY_TOPIC).unwrap_or_default(),
                exception = record.headers.get_str(EXCEPTION_FQCN).unwrap_or_default(),
                message = record.headers.get_str(EXCEPTION_MESSAGE).unwrap_or_default(),
                "Received record in DLT"
            );
            Ok(())
        })
    }
}

/// What happened to a consumed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerOutcome {
    /// The handler succeeded.
    Processed,
    /// Republished to a retry topic (possibly the same reused topic).
    Forwarded { destination: String },
    /// Republished to the DLT.
    DeadLettered { destination: String },
    /// Dropped: NO_OPS destination, or a DLT failure with nowhere to go.
    Dropped,
}

/// Error-handling wrapper around the handler of one destination topic.
pub struct RetryTopicListener {
    destination: DestinationTopic,
    handler: Arc<dyn RecordHandler>,
    resolver: DestinationTopicResolver,
    publisher: Arc<dyn RecordPublisher>,
    blocking_interval: Duration,
    publish_retry: PublishRetryConfig,
    log_level: FailureLogLevel,
}

impl RetryTopicListener {
    pub fn new(
        destination: DestinationTopic,
        handler: Arc<dyn RecordHandler>,
        resolver: DestinationTopicResolver,
        publisher: Arc<dyn RecordPublisher>,
    ) -> Self {
        Self {
            destination,
            handler,
            resolver,
            publisher,
            blocking_interval: Duration::ZERO,
            publish_retry: PublishRetryConfig::default(),
            log_level: FailureLogLevel::default(),
        }
    }

    pub fn with_blocking_interval(mut self, interval: Duration) -> Self {
        self.blocking_interval = interval;
        self
    }

    pub fn with_publish_retry(mut self, publish_retry: PublishRetryConfig) -> Self {
        self.publish_retry = publish_retry;
        self
    }

    pub fn with_log_level(mut self, level: FailureLogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn destination(&self) -> &DestinationTopic {
        &self.destination
    }

    /// Handle one record. `Ok` means its offset may be committed.
    pub async fn process(&self, record: ConsumerRecord) -> Result<ListenerOutcome> {
        let record = Arc::new(record);
        let source_topic = self.destination.source_topic();
        let current_topic = self.destination.destination_name();

        // Reused topics and the DLT count attempts across deliveries.
        let mut attempt = if self.destination.is_reusable() || self.destination.is_dlt() {
            header_attempt(&record.headers)
        } else {
            1
        };

        loop {
            let failure = match self.handler.handle(record.clone()).await {
                Ok(()) => return Ok(ListenerOutcome::Processed),
                Err(failure) => failure,
            };

            let now = chrono::Utc::now().timestamp_millis();
            let first_failure = record.headers.get_i64(ORIGINAL_TIMESTAMP);
            let next = match self.resolver.resolve_destination_at(
                source_topic,
                current_topic,
                attempt,
                &failure,
                first_failure,
                now,
            ) {
                Ok(next) => next,
                Err(RetryTopicError::FatalProcessing { topic, reason }) => {
                    log_at!(
                        self.log_level,
                        topic = %topic,
                        offset = record.offset,
                        reason = %reason,
                        "Dropping record, no further destination"
                    );
                    return Ok(ListenerOutcome::Dropped);
                }
                Err(e) => return Err(e),
            };

            let same_topic = next.destination_name() == current_topic;
            if same_topic && !self.destination.is_reusable() && !self.destination.is_dlt() {
                debug!(
                    topic = %current_topic,
                    attempt,
                    max_attempts = self.destination.max_attempts(),
                    error = %failure,
                    "Retrying record in-process"
                );
                attempt += 1;
                if !self.blocking_interval.is_zero() {
                    tokio::time::sleep(self.blocking_interval).await;
                }
                continue;
            }

            log_at!(
                self.log_level,
                topic = %current_topic,
                offset = record.offset,
                attempt,
                error = %failure,
                next = %next.destination_name(),
                "Record processing failed"
            );

            if next.is_no_ops() {
                return Ok(ListenerOutcome::Dropped);
            }

            let next_attempt = if same_topic { attempt + 1 } else { 1 };
            let headers = self.republish_headers(&record, &failure, &next, next_attempt, now);
            self.republish(&record, &next, headers).await?;

            let destination = next.destination_name().to_string();
            return Ok(if next.is_dlt() {
                ListenerOutcome::DeadLettered { destination }
            } else {
                ListenerOutcome::Forwarded { destination }
            });
        }
    }

    fn republish_headers(
        &self,
        record: &ConsumerRecord,
        failure: &ListenerFailure,
        next: &DestinationTopic,
        next_attempt: u32,
        now: i64,
    ) -> Headers {
        let mut headers = record.headers.clone();
        headers.insert_if_absent(RETRY_TOPIC, self.destination.source_topic().to_string());
        headers.insert_if_absent(EXCEPTION_FQCN, failure.kind().to_string());
        headers.insert_if_absent(EXCEPTION_MESSAGE, failure.message().to_string());
        headers.insert_if_absent(EXCEPTION_STACKTRACE, failure.stack_summary());
        headers.insert_if_absent(ORIGINAL_TIMESTAMP, now.to_be_bytes().to_vec());
        headers.insert_if_absent(ORIGINAL_PARTITION, record.partition.to_be_bytes().to_vec());
        headers.insert_if_absent(ORIGINAL_OFFSET, record.offset.to_be_bytes().to_vec());
        headers.insert_i32(ATTEMPTS, i32::try_from(next_attempt).unwrap_or(i32::MAX));
        headers.insert_i64(BACKOFF_DUE, backoff_due(now, next.delay_ms()));
        headers
    }

    async fn republish(&self, record: &ConsumerRecord, next: &DestinationTopic, headers: Headers) -> Result<()> {
        let mut outgoing = ProducerRecord::new(next.destination_name()).with_headers(headers);
        outgoing.key = record.key.clone();
        outgoing.value = record.value.clone();

        let publisher = self.publisher.clone();
        (|| {
            let publisher = publisher.clone();
            let outgoing = outgoing.clone();
            async move { publisher.publish(outgoing).await }
        })
        .retry(publish_backoff(&self.publish_retry))
        .notify(|err: &BusError, dur: Duration| {
            warn!(topic = %next.destination_name(), error = %err, delay = ?dur, "Republish failed, retrying");
        })
        .await
        .map_err(|e| RetryTopicError::FatalProcessing {
            topic: self.destination.destination_name().to_string(),
            reason: format!("could not republish to '{}': {}", next.destination_name(), e),
        })
    }
}

/// Epoch millis at which a record republished at `now_ms` becomes due.
/// Saturates instead of wrapping for delays past the epoch range.
fn backoff_due(now_ms: i64, delay_ms: u64) -> i64 {
    i64::try_from(delay_ms)
        .map(|delay| now_ms.saturating_add(delay))
        .unwrap_or(i64::MAX)
}

/// Attempt count carried by the record, 1 when absent or malformed.
pub fn header_attempt(headers: &Headers) -> u32 {
    headers
        .get_i32(ATTEMPTS)
        .and_then(|a| u32::try_from(a).ok())
        .filter(|a| *a > 0)
        .unwrap_or(1)
}
