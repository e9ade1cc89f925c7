//! Broker collaborators for retry-topic routing.
//!
//! This module contains:
//! - `RecordPublisher` trait: publish a record with headers to any topic
//! - `RecordSource` / `RecordSourceFactory` traits: lazily consume a topic
//! - `TopicAdmin` trait: describe topics and create them if absent
//! - Record types and the ordered `Headers` map
//! - Implementations: in-memory broker, Kafka (feature `kafka`)

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;

pub mod headers;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;

// Re-exports
pub use headers::Headers;
#[cfg(feature = "kafka")]
pub use kafka::{KafkaBroker, KafkaRecordSource};
pub use memory::InMemoryBroker;

// ============================================================================
// Traits
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("Topic administration failed: {0}")]
    Admin(String),
}

/// A record to be published.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProducerRecord {
    pub topic: String,
    pub partition: Option<i32>,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub headers: Headers,
}

impl ProducerRecord {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<Bytes>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }
}

/// A record received from a topic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumerRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Broker timestamp in epoch milliseconds.
    pub timestamp: i64,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub headers: Headers,
}

/// Topic creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTopic {
    pub name: String,
    pub partitions: i32,
    /// `-1` lets the broker apply its default.
    pub replication_factor: i16,
}

/// Partition layout of an existing topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicDescription {
    pub partitions: i32,
    pub replication_factor: i16,
}

/// Publishes records to arbitrary topics.
#[async_trait]
pub trait RecordPublisher: Send + Sync {
    /// Publish a record. Returns once the broker acknowledged it.
    async fn publish(&self, record: ProducerRecord) -> Result<()>;
}

/// A lazily consumed, non-restartable stream of records for one topic.
#[async_trait]
pub trait RecordSource: Send {
    /// Next record, or `None` once the source is closed.
    async fn next(&mut self) -> Option<Result<ConsumerRecord>>;

    /// Commit the offset following `record`.
    async fn commit(&mut self, record: &ConsumerRecord) -> Result<()>;
}

/// Creates record sources (one subscription per call).
#[async_trait]
pub trait RecordSourceFactory: Send + Sync {
    async fn subscribe(&self, topic: &str, group_id: &str) -> Result<Box<dyn RecordSource>>;
}

/// Topic administration needed for auto-provisioning.
#[async_trait]
pub trait TopicAdmin: Send + Sync {
    /// Describe a topic, `None` if it does not exist.
    async fn describe_topic(&self, name: &str) -> Result<Option<TopicDescription>>;

    /// Create every topic that does not exist yet. Existing topics are left alone.
    async fn create_topics_if_absent(&self, topics: &[NewTopic]) -> Result<()>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Kafka-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Kafka bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// Consumer group ID used by retry listener containers.
    pub group_id: String,
    /// Send timeout for republishing, in milliseconds.
    pub send_timeout_ms: u64,
    /// SASL username (optional, for authenticated clusters).
    pub sasl_username: Option<String>,
    /// SASL password (optional, for authenticated clusters).
    pub sasl_password: Option<String>,
    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512).
    pub sasl_mechanism: Option<String>,
    /// Security protocol (PLAINTEXT, SSL, SASL_PLAINTEXT, SASL_SSL).
    pub security_protocol: Option<String>,
    /// SSL CA certificate path (for SSL connections).
    pub ssl_ca_location: Option<String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            group_id: "retrytopic".to_string(),
            send_timeout_ms: 5000,
            sasl_username: None,
            sasl_password: None,
            sasl_mechanism: None,
            security_protocol: None,
            ssl_ca_location: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kafka_config_default() {
        let config = KafkaConfig::default();
        assert_eq!(config.bootstrap_servers, "localhost:9092");
        assert_eq!(config.group_id, "retrytopic");
        assert!(config.security_protocol.is_none());
    }

    #[test]
    fn test_producer_record_builder() {
        let record = ProducerRecord::new("orders")
            .with_key("k1")
            .with_value("payload");
        assert_eq!(record.topic, "orders");
        assert_eq!(record.key, Some(Bytes::from("k1")));
        assert_eq!(record.value, Some(Bytes::from("payload")));
        assert!(record.headers.is_empty());
    }
}
