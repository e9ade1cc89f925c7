//! Kafka bindings for the bus collaborator traits.
//!
//! One `FutureProducer` republishes failed records, one `AdminClient`
//! provisions retry and DLT topics, and every listener container gets its own
//! `StreamConsumer` subscribed to exactly one destination topic.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic as KafkaNewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Header, Headers as _, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tracing::{debug, info};

use super::{
    BusError, ConsumerRecord, Headers, KafkaConfig, NewTopic, ProducerRecord, RecordPublisher,
    RecordSource, RecordSourceFactory, Result, TopicAdmin, TopicDescription,
};

/// Metadata requests are blocking in librdkafka.
const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

/// Build a ClientConfig for producers.
fn build_producer_config(config: &KafkaConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client.set("bootstrap.servers", &config.bootstrap_servers);
    client.set("message.timeout.ms", config.send_timeout_ms.to_string());
    client.set("acks", "all");
    client.set("enable.idempotence", "true");

    apply_security_config(config, &mut client);
    client
}

/// Build a ClientConfig for consumers.
fn build_consumer_config(config: &KafkaConfig, group_id: &str) -> ClientConfig {
    let mut client = ClientConfig::new();
    client.set("bootstrap.servers", &config.bootstrap_servers);
    client.set("group.id", group_id);
    client.set("enable.auto.commit", "false");
    client.set("auto.offset.reset", "earliest");
    client.set("allow.auto.create.topics", "false");

    apply_security_config(config, &mut client);
    client
}

/// Apply security settings to a ClientConfig.
fn apply_security_config(config: &KafkaConfig, client: &mut ClientConfig) {
    if let Some(ref protocol) = config.security_protocol {
        client.set("security.protocol", protocol);
    }
    if let Some(ref mechanism) = config.sasl_mechanism {
        client.set("sasl.mechanism", mechanism);
    }
    if let Some(ref username) = config.sasl_username {
        client.set("sasl.username", username);
    }
    if let Some(ref password) = config.sasl_password {
        client.set("sasl.password", password);
    }
    if let Some(ref ca_location) = config.ssl_ca_location {
        client.set("ssl.ca.location", ca_location);
    }
}

fn to_owned_headers(headers: &Headers) -> OwnedHeaders {
    headers
        .iter()
        .fold(OwnedHeaders::new(), |acc, (key, value)| {
            acc.insert(Header {
                key,
                value: Some(&value[..]),
            })
        })
}

fn to_consumer_record(message: &BorrowedMessage<'_>) -> ConsumerRecord {
    let headers = message
        .headers()
        .map(|borrowed| {
            borrowed
                .iter()
                .map(|h| {
                    let value = h.value.map(Bytes::copy_from_slice).unwrap_or_default();
                    (h.key.to_string(), value)
                })
                .collect::<Headers>()
        })
        .unwrap_or_default();

    ConsumerRecord {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        timestamp: message.timestamp().to_millis().unwrap_or_default(),
        key: message.key().map(Bytes::copy_from_slice),
        value: message.payload().map(Bytes::copy_from_slice),
        headers,
    }
}

/// Kafka-backed publisher, admin and consumer factory.
pub struct KafkaBroker {
    producer: FutureProducer,
    admin: AdminClient<DefaultClientContext>,
    config: KafkaConfig,
}

impl KafkaBroker {
    pub fn new(config: KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = build_producer_config(&config)
            .create()
            .map_err(|e| BusError::Connection(format!("Failed to create Kafka producer: {}", e)))?;

        let admin: AdminClient<DefaultClientContext> = build_producer_config(&config)
            .create()
            .map_err(|e| BusError::Connection(format!("Failed to create Kafka admin: {}", e)))?;

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            "Connected to Kafka"
        );

        Ok(Self {
            producer,
            admin,
            config,
        })
    }
}

#[async_trait]
impl RecordPublisher for KafkaBroker {
    async fn publish(&self, record: ProducerRecord) -> Result<()> {
        let headers = to_owned_headers(&record.headers);
        let mut future_record: FutureRecord<'_, [u8], [u8]> =
            FutureRecord::to(&record.topic).headers(headers);

        if let Some(ref key) = record.key {
            future_record = future_record.key(&key[..]);
        }
        if let Some(ref value) = record.value {
            future_record = future_record.payload(&value[..]);
        }
        if let Some(partition) = record.partition {
            future_record = future_record.partition(partition);
        }

        self.producer
            .send(
                future_record,
                Duration::from_millis(self.config.send_timeout_ms),
            )
            .await
            .map_err(|(e, _)| BusError::Publish(format!("Failed to publish: {}", e)))?;

        debug!(topic = %record.topic, "Published record to Kafka");
        Ok(())
    }
}

#[async_trait]
impl TopicAdmin for KafkaBroker {
    async fn describe_topic(&self, name: &str) -> Result<Option<TopicDescription>> {
        let producer = self.producer.clone();
        let topic = name.to_string();

        let description = tokio::task::spawn_blocking(move || {
            let metadata = producer
                .client()
                .fetch_metadata(Some(&topic), METADATA_TIMEOUT)
                .map_err(|e| BusError::Admin(format!("Failed to fetch metadata: {}", e)))?;

            Ok::<_, BusError>(
                metadata
                    .topics()
                    .iter()
                    .find(|t| t.name() == topic && t.error().is_none())
                    .filter(|t| !t.partitions().is_empty())
                    .map(|t| TopicDescription {
                        partitions: t.partitions().len() as i32,
                        replication_factor: t.partitions()[0].replicas().len() as i16,
                    }),
            )
        })
        .await
        .map_err(|e| BusError::Admin(format!("Metadata task failed: {}", e)))??;

        Ok(description)
    }

    async fn create_topics_if_absent(&self, topics: &[NewTopic]) -> Result<()> {
        let new_topics: Vec<KafkaNewTopic<'_>> = topics
            .iter()
            .map(|t| {
                KafkaNewTopic::new(
                    &t.name,
                    t.partitions,
                    TopicReplication::Fixed(i32::from(t.replication_factor)),
                )
            })
            .collect();

        let results = self
            .admin
            .create_topics(&new_topics, &AdminOptions::new())
            .await
            .map_err(|e| BusError::Admin(format!("Failed to create topics: {}", e)))?;

        for result in results {
            match result {
                Ok(name) => info!(topic = %name, "Created topic"),
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    debug!(topic = %name, "Topic already exists")
                }
                Err((name, code)) => {
                    return Err(BusError::Admin(format!(
                        "Failed to create topic '{}': {}",
                        name, code
                    )))
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RecordSourceFactory for KafkaBroker {
    async fn subscribe(&self, topic: &str, group_id: &str) -> Result<Box<dyn RecordSource>> {
        let consumer: StreamConsumer = build_consumer_config(&self.config, group_id)
            .create()
            .map_err(|e| BusError::Connection(format!("Failed to create Kafka consumer: {}", e)))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| BusError::Subscribe(format!("Failed to subscribe to {}: {}", topic, e)))?;

        info!(topic = %topic, group_id = %group_id, "Subscribed to Kafka topic");
        Ok(Box::new(KafkaRecordSource { consumer }))
    }
}

/// Single-topic Kafka subscription.
pub struct KafkaRecordSource {
    consumer: StreamConsumer,
}

#[async_trait]
impl RecordSource for KafkaRecordSource {
    async fn next(&mut self) -> Option<Result<ConsumerRecord>> {
        Some(
            self.consumer
                .recv()
                .await
                .map(|message| to_consumer_record(&message))
                .map_err(|e| BusError::Subscribe(format!("Kafka consumer error: {}", e))),
        )
    }

    async fn commit(&mut self, record: &ConsumerRecord) -> Result<()> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&record.topic, record.partition, Offset::Offset(record.offset + 1))
            .map_err(|e| BusError::Commit(e.to_string()))?;
        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| BusError::Commit(e.to_string()))
    }
}

#[cfg(test)]
mod tests;
