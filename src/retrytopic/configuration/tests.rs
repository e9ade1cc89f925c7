use super::*;
use crate::retrytopic::failure::ListenerFailure;

#[test]
fn test_defaults() {
    let config = RetryTopicConfiguration::default();
    assert_eq!(config.max_attempts(), 3);
    assert_eq!(config.retry_topic_suffix, "-retry");
    assert_eq!(config.dlt_suffix, "-dlt");
    assert!(config.auto_create.enabled);
    assert!(config.retry_on_dlt_failure);
    assert!(config.dlt_enabled);
    assert_eq!(config.blocking.attempts, 1);
    assert!(config.validate().is_ok());
}

#[test]
fn test_builder_round_trip() {
    let config = RetryTopicConfiguration::builder()
        .include_topics(["orders", "payments"])
        .exclude_topic("payments")
        .max_attempts(4)
        .exponential_backoff(100, 2.0, 1000)
        .dlt_suffix(".dead")
        .blocking_retries(2, 10)
        .dlt_handler("audit")
        .create()
        .unwrap();

    assert!(config.handles("orders"));
    assert!(!config.handles("payments"));
    assert!(!config.handles("invoices"));
    assert_eq!(config.max_attempts(), 4);
    assert_eq!(config.naming().dlt_suffix, ".dead");
    assert_eq!(config.dlt_handler.as_deref(), Some("audit"));
}

#[test]
fn test_empty_topics_handle_everything() {
    let config = RetryTopicConfiguration::builder()
        .exclude_topic("audit")
        .create()
        .unwrap();
    assert!(config.handles("anything"));
    assert!(!config.handles("audit"));
}

#[test]
fn test_explicit_backoff_implies_attempts() {
    let config = RetryTopicConfiguration::builder()
        .max_attempts(10)
        .explicit_backoff(vec![100, 200])
        .create()
        .unwrap();
    assert_eq!(config.max_attempts(), 3);
}

#[test]
fn test_retry_on_and_not_retry_on_conflict() {
    let result = RetryTopicConfiguration::builder()
        .retry_on(["TimeoutError"])
        .not_retry_on(["ValidationError"])
        .create();
    assert!(matches!(result, Err(RetryTopicError::Configuration(_))));
}

#[test]
fn test_single_topic_rejects_random_backoff() {
    let result = RetryTopicConfiguration::builder()
        .same_interval_topic_reuse(SameIntervalTopicReuseStrategy::SingleTopic)
        .uniform_random_backoff(10, 100)
        .create();
    assert!(result.is_err());
}

#[test]
fn test_invalid_backoff_rejected() {
    let result = RetryTopicConfiguration::builder()
        .exponential_backoff(100, 0.5, 1000)
        .create();
    assert!(result.is_err());
}

#[test]
fn test_classifier_from_configuration() {
    let config = RetryTopicConfiguration::builder()
        .not_retry_on(["ValidationError"])
        .subtype("InvalidOrder", "ValidationError")
        .traversing_causes(true)
        .create()
        .unwrap();

    let classifier = config.classifier();
    let wrapped = ListenerFailure::new("ListenerError", "failed")
        .caused_by(ListenerFailure::new("InvalidOrder", "no lines"));
    assert!(classifier.is_fatal(&wrapped));
    assert!(!classifier.is_fatal(&ListenerFailure::new("IoError", "reset")));
}

#[test]
fn test_retry_on_makes_others_fatal() {
    let config = RetryTopicConfiguration::builder()
        .retry_on(["TimeoutError"])
        .create()
        .unwrap();
    let classifier = config.classifier();
    assert!(!classifier.is_fatal(&ListenerFailure::new("TimeoutError", "slow")));
    assert!(classifier.is_fatal(&ListenerFailure::new("IoError", "reset")));
}

#[test]
fn test_deserialize_from_yaml() {
    let yaml = r#"
topics: [orders]
attempts: 4
backoff:
  type: fixed
  delay_ms: 250
same_interval_topic_reuse: SINGLE_TOPIC
auto_create:
  partitions: 6
not_retry_on: [ValidationError]
retry_on_dlt_failure: false
blocking:
  attempts: 2
  interval_ms: 5
dlt_handler: audit
"#;
    let config: RetryTopicConfiguration = serde_yaml::from_str(yaml).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.topics, vec!["orders"]);
    assert_eq!(config.backoff, BackoffSpec::Fixed { delay_ms: 250 });
    assert_eq!(
        config.same_interval_topic_reuse,
        SameIntervalTopicReuseStrategy::SingleTopic
    );
    assert!(config.auto_create.enabled);
    assert_eq!(config.auto_create.partitions, Some(6));
    assert!(!config.retry_on_dlt_failure);
    assert_eq!(config.blocking.attempts, 2);
    assert_eq!(config.dlt_suffix, "-dlt");
}
