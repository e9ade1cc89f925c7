use super::*;
use crate::retrytopic::{BackoffSpec, SameIntervalTopicReuseStrategy};
use serial_test::serial;
use std::io::Write;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!(config.kafka.bootstrap_servers, "localhost:9092");
    assert!(config.retry_topics.is_empty());
    assert_eq!(config.failure_log_level, FailureLogLevel::Error);
    assert_eq!(config.publish_retry.max_times, 3);
}

#[test]
#[serial]
fn test_load_from_path() {
    let file = write_config(
        r#"
kafka:
  bootstrap_servers: "broker:29092"
failure_log_level: warn
retry_topics:
  - topics: [orders]
    attempts: 4
    backoff:
      type: exponential
      initial_ms: 1000
      multiplier: 2.0
      max_ms: 10000
    same_interval_topic_reuse: MULTIPLE_TOPICS
  - exclude_topics: [audit]
    dlt_enabled: false
"#,
    );

    let config = Config::load(file.path().to_str()).unwrap();
    assert_eq!(config.kafka.bootstrap_servers, "broker:29092");
    assert_eq!(config.failure_log_level, FailureLogLevel::Warn);
    assert_eq!(config.retry_topics.len(), 2);

    let orders = &config.retry_topics[0];
    assert_eq!(orders.attempts, 4);
    assert_eq!(
        orders.backoff,
        BackoffSpec::Exponential {
            initial_ms: 1000,
            multiplier: 2.0,
            max_ms: 10000
        }
    );
    assert_eq!(
        orders.same_interval_topic_reuse,
        SameIntervalTopicReuseStrategy::MultipleTopics
    );
    assert!(!config.retry_topics[1].dlt_enabled);
    assert!(config.retry_topics[1].handles("payments"));
}

#[test]
#[serial]
fn test_env_overrides_file() {
    let file = write_config("kafka:\n  bootstrap_servers: \"from-file:9092\"\n");

    std::env::set_var("RETRYTOPIC__KAFKA__BOOTSTRAP_SERVERS", "from-env:9092");
    let config = Config::load(file.path().to_str());
    std::env::remove_var("RETRYTOPIC__KAFKA__BOOTSTRAP_SERVERS");

    assert_eq!(config.unwrap().kafka.bootstrap_servers, "from-env:9092");
}

#[test]
#[serial]
fn test_config_env_var_names_file() {
    let file = write_config("failure_log_level: debug\n");

    std::env::set_var(CONFIG_ENV_VAR, file.path());
    let config = Config::load(None);
    std::env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(config.unwrap().failure_log_level, FailureLogLevel::Debug);
}

#[test]
#[serial]
fn test_missing_explicit_file_fails() {
    let result = Config::load(Some("/nonexistent/retrytopic.yaml"));
    assert!(matches!(result, Err(RetryTopicError::Configuration(_))));
}

#[test]
#[serial]
fn test_invalid_retry_topic_rejected() {
    let file = write_config(
        r#"
retry_topics:
  - retry_on: [TimeoutError]
    not_retry_on: [ValidationError]
"#,
    );
    let result = Config::load(file.path().to_str());
    let err = result.unwrap_err().to_string();
    assert!(err.contains("retry_topics[0]"), "{}", err);
}
