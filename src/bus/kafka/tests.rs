use super::*;
use rdkafka::message::Headers as _;

#[test]
fn test_producer_config_defaults() {
    let config = KafkaConfig::default();
    let client = build_producer_config(&config);
    assert_eq!(client.get("bootstrap.servers"), Some("localhost:9092"));
    assert_eq!(client.get("acks"), Some("all"));
    assert_eq!(client.get("message.timeout.ms"), Some("5000"));
    assert_eq!(client.get("security.protocol"), None);
}

#[test]
fn test_consumer_config_disables_auto_commit() {
    let config = KafkaConfig::default();
    let client = build_consumer_config(&config, "orders-retry-group");
    assert_eq!(client.get("group.id"), Some("orders-retry-group"));
    assert_eq!(client.get("enable.auto.commit"), Some("false"));
    assert_eq!(client.get("allow.auto.create.topics"), Some("false"));
}

#[test]
fn test_security_config_applied() {
    let config = KafkaConfig {
        sasl_username: Some("user".to_string()),
        sasl_password: Some("pass".to_string()),
        sasl_mechanism: Some("SCRAM-SHA-256".to_string()),
        security_protocol: Some("SASL_SSL".to_string()),
        ssl_ca_location: Some("/path/to/ca.crt".to_string()),
        ..Default::default()
    };
    let client = build_consumer_config(&config, "g");
    assert_eq!(client.get("sasl.username"), Some("user"));
    assert_eq!(client.get("sasl.mechanism"), Some("SCRAM-SHA-256"));
    assert_eq!(client.get("security.protocol"), Some("SASL_SSL"));
    assert_eq!(client.get("ssl.ca.location"), Some("/path/to/ca.crt"));
}

#[test]
fn test_owned_headers_preserve_order() {
    let mut headers = Headers::new();
    headers.insert_str("retry-topic", "orders");
    headers.insert_i32("retry-topic-attempts", 2);

    let owned = to_owned_headers(&headers);
    assert_eq!(owned.count(), 2);
    let first = owned.get(0);
    assert_eq!(first.key, "retry-topic");
    assert_eq!(first.value, Some(&b"orders"[..]));
}
