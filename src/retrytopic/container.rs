//! Listener containers: one consumer task per destination topic.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::listener::RetryTopicListener;
use super::scheduler::ActivationScheduler;
use crate::bus::headers::BACKOFF_DUE;
use crate::bus::{ConsumerRecord, RecordSource, RecordSourceFactory};
use crate::error::{Result, RetryTopicError};

/// Pause after a consumer error before polling again.
const SOURCE_ERROR_PAUSE: Duration = Duration::from_millis(100);

/// Consumes one destination topic and feeds its listener.
///
/// Records carrying a `retry-topic-backoff-due` header in the future are held
/// until the scheduler activates them. Offsets are committed only after the
/// listener returned `Ok`, which includes a successful republish.
pub struct ListenerContainer {
    topic: String,
    owner: String,
    token: CancellationToken,
    scheduler: Arc<ActivationScheduler>,
    task: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl ListenerContainer {
    /// Subscribe to the listener's topic and start consuming.
    pub async fn start(
        factory: &dyn RecordSourceFactory,
        listener: RetryTopicListener,
        scheduler: Arc<ActivationScheduler>,
        group_id: &str,
    ) -> Result<Self> {
        let topic = listener.destination().destination_name().to_string();
        let source = factory.subscribe(&topic, group_id).await?;
        let owner = format!("{}:{}", group_id, topic);
        let token = CancellationToken::new();

        let task = tokio::spawn(run(
            source,
            listener,
            scheduler.clone(),
            owner.clone(),
            token.clone(),
        ));

        info!(topic = %topic, group_id = %group_id, "Started listener container");
        Ok(Self {
            topic,
            owner,
            token,
            scheduler,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Whether the consumer task has ended (stopped or failed).
    pub async fn is_finished(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .map_or(true, |task| task.is_finished())
    }

    /// Stop consuming, cancel pending activations and wait for the task.
    ///
    /// Returns the error that stopped the consumer, if any.
    pub async fn stop(&self) -> Result<()> {
        self.token.cancel();
        self.scheduler.cancel_owner(&self.owner);

        let task = self.task.lock().await.take();
        match task {
            Some(task) => task.await.map_err(|e| RetryTopicError::FatalProcessing {
                topic: self.topic.clone(),
                reason: format!("listener task failed: {}", e),
            })?,
            None => Ok(()),
        }
    }
}

async fn run(
    mut source: Box<dyn RecordSource>,
    listener: RetryTopicListener,
    scheduler: Arc<ActivationScheduler>,
    owner: String,
    token: CancellationToken,
) -> Result<()> {
    let topic = listener.destination().destination_name().to_string();

    loop {
        let next = tokio::select! {
            _ = token.cancelled() => break,
            next = source.next() => next,
        };

        let record = match next {
            Some(Ok(record)) => record,
            Some(Err(e)) => {
                error!(topic = %topic, error = %e, "Consumer error, pausing before next poll");
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(SOURCE_ERROR_PAUSE) => continue,
                }
            }
            None => {
                debug!(topic = %topic, "Record source closed");
                break;
            }
        };

        if let Some(due) = record.headers.get_i64(BACKOFF_DUE) {
            let activation = scheduler.schedule_at_epoch_ms(due, &owner);
            let activated = tokio::select! {
                _ = token.cancelled() => false,
                fired = activation.wait() => fired,
            };
            if !activated {
                debug!(topic = %topic, offset = record.offset, "Delayed activation cancelled");
                break;
            }
        }

        match listener.process(record.clone()).await {
            Ok(outcome) => {
                debug!(topic = %topic, offset = record.offset, outcome = ?outcome, "Record handled");
                commit(source.as_mut(), &record, &topic).await;
            }
            Err(e) if e.stops_consumer() => {
                error!(topic = %topic, offset = record.offset, error = %e, "Stopping listener container");
                return Err(e);
            }
            Err(e) => {
                warn!(topic = %topic, offset = record.offset, error = %e, "Record handling failed");
                commit(source.as_mut(), &record, &topic).await;
            }
        }
    }

    info!(topic = %topic, "Listener container stopped");
    Ok(())
}

/// A failed commit is redelivered later, so consumption goes on.
async fn commit(source: &mut dyn RecordSource, record: &ConsumerRecord, topic: &str) {
    if let Err(e) = source.commit(record).await {
        error!(topic = %topic, offset = record.offset, error = %e, "Failed to commit offset");
    }
}
