//! In-memory broker for standalone mode and tests.
//!
//! Keeps an append-only log per topic and fans new records out to live
//! subscriptions through unbounded channels. Committed offsets are tracked per
//! consumer group, so a new subscription resumes after the last commit.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use super::{
    BusError, ConsumerRecord, NewTopic, ProducerRecord, RecordPublisher, RecordSource,
    RecordSourceFactory, Result, TopicAdmin, TopicDescription,
};

/// Layout used for topics created implicitly by publish or subscribe.
const IMPLICIT_TOPIC: TopicDescription = TopicDescription {
    partitions: 1,
    replication_factor: 1,
};

struct TopicLog {
    description: TopicDescription,
    records: Vec<ConsumerRecord>,
    subscribers: Vec<mpsc::UnboundedSender<ConsumerRecord>>,
}

impl TopicLog {
    fn new(description: TopicDescription) -> Self {
        Self {
            description,
            records: Vec::new(),
            subscribers: Vec::new(),
        }
    }
}

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, TopicLog>,
    /// (group, topic) -> next offset to consume.
    committed: HashMap<(String, String), i64>,
    failing_publishes: u32,
    /// Reject publishes to unknown topics instead of creating them.
    strict_topics: bool,
}

/// In-memory broker implementing every bus collaborator trait.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broker that refuses to publish to topics nobody created.
    pub fn strict() -> Self {
        let state = BrokerState {
            strict_topics: true,
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Make the next `count` publishes fail.
    pub async fn fail_next_publishes(&self, count: u32) {
        self.state.lock().await.failing_publishes = count;
    }

    /// Create a topic with an explicit layout (no-op if it exists).
    pub async fn create_topic(&self, name: &str, partitions: i32, replication_factor: i16) {
        let mut state = self.state.lock().await;
        state.topics.entry(name.to_string()).or_insert_with(|| {
            TopicLog::new(TopicDescription {
                partitions,
                replication_factor,
            })
        });
    }

    /// All records ever published to `topic`.
    pub async fn records(&self, topic: &str) -> Vec<ConsumerRecord> {
        self.state
            .lock()
            .await
            .topics
            .get(topic)
            .map(|log| log.records.clone())
            .unwrap_or_default()
    }

    /// Sorted names of every known topic.
    pub async fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().await.topics.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn committed_offset(&self, group_id: &str, topic: &str) -> Option<i64> {
        self.state
            .lock()
            .await
            .committed
            .get(&(group_id.to_string(), topic.to_string()))
            .copied()
    }
}

#[async_trait]
impl RecordPublisher for InMemoryBroker {
    async fn publish(&self, record: ProducerRecord) -> Result<()> {
        let mut state = self.state.lock().await;

        if state.failing_publishes > 0 {
            state.failing_publishes -= 1;
            return Err(BusError::Publish(format!(
                "Simulated publish failure to '{}'",
                record.topic
            )));
        }

        if state.strict_topics && !state.topics.contains_key(&record.topic) {
            return Err(BusError::Publish(format!("Unknown topic '{}'", record.topic)));
        }

        let log = state
            .topics
            .entry(record.topic.clone())
            .or_insert_with(|| TopicLog::new(IMPLICIT_TOPIC));

        let stored = ConsumerRecord {
            topic: record.topic,
            partition: record.partition.unwrap_or(0),
            offset: log.records.len() as i64,
            timestamp: chrono::Utc::now().timestamp_millis(),
            key: record.key,
            value: record.value,
            headers: record.headers,
        };

        debug!(
            topic = %stored.topic,
            offset = stored.offset,
            "Published record to in-memory broker"
        );

        log.subscribers
            .retain(|subscriber| subscriber.send(stored.clone()).is_ok());
        log.records.push(stored);
        Ok(())
    }
}

#[async_trait]
impl RecordSourceFactory for InMemoryBroker {
    async fn subscribe(&self, topic: &str, group_id: &str) -> Result<Box<dyn RecordSource>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.state.lock().await;

        let start = state
            .committed
            .get(&(group_id.to_string(), topic.to_string()))
            .copied()
            .unwrap_or(0);

        let log = state
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| TopicLog::new(IMPLICIT_TOPIC));

        for record in log.records.iter().filter(|r| r.offset >= start) {
            sender
                .send(record.clone())
                .map_err(|e| BusError::Subscribe(e.to_string()))?;
        }
        log.subscribers.push(sender);

        info!(topic = %topic, group_id = %group_id, from_offset = start, "Subscribed");

        Ok(Box::new(MemoryRecordSource {
            broker: self.clone(),
            topic: topic.to_string(),
            group_id: group_id.to_string(),
            receiver,
        }))
    }
}

#[async_trait]
impl TopicAdmin for InMemoryBroker {
    async fn describe_topic(&self, name: &str) -> Result<Option<TopicDescription>> {
        Ok(self
            .state
            .lock()
            .await
            .topics
            .get(name)
            .map(|log| log.description))
    }

    async fn create_topics_if_absent(&self, topics: &[NewTopic]) -> Result<()> {
        let mut state = self.state.lock().await;
        for topic in topics {
            if topic.partitions < 1 {
                return Err(BusError::Admin(format!(
                    "Topic '{}' needs at least one partition",
                    topic.name
                )));
            }
            state.topics.entry(topic.name.clone()).or_insert_with(|| {
                debug!(topic = %topic.name, partitions = topic.partitions, "Created topic");
                TopicLog::new(TopicDescription {
                    partitions: topic.partitions,
                    replication_factor: topic.replication_factor,
                })
            });
        }
        Ok(())
    }
}

/// Subscription to one topic of an [`InMemoryBroker`].
pub struct MemoryRecordSource {
    broker: InMemoryBroker,
    topic: String,
    group_id: String,
    receiver: mpsc::UnboundedReceiver<ConsumerRecord>,
}

#[async_trait]
impl RecordSource for MemoryRecordSource {
    async fn next(&mut self) -> Option<Result<ConsumerRecord>> {
        self.receiver.recv().await.map(Ok)
    }

    async fn commit(&mut self, record: &ConsumerRecord) -> Result<()> {
        if record.topic != self.topic {
            return Err(BusError::Commit(format!(
                "Record from '{}' committed on subscription to '{}'",
                record.topic, self.topic
            )));
        }
        let mut state = self.broker.state.lock().await;
        let next = record.offset + 1;
        let entry = state
            .committed
            .entry((self.group_id.clone(), self.topic.clone()))
            .or_insert(0);
        *entry = (*entry).max(next);
        Ok(())
    }
}
