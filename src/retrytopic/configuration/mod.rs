//! Per-source-topic retry configuration.
//!
//! A [`RetryTopicConfiguration`] is either deserialized from the `retry_topics`
//! section of the config file or assembled in code with
//! [`RetryTopicConfigurationBuilder`]. Both paths go through `validate`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;

use super::backoff::BackoffSpec;
use super::classifier::{ExceptionHierarchy, FatalExceptionClassifier};
use super::destination::{SameIntervalTopicReuseStrategy, TopicSuffixingStrategy};
use super::failure::FailureKind;
use super::processor::{RoutingPolicy, TopicNaming, DEFAULT_DLT_SUFFIX, DEFAULT_RETRY_SUFFIX};
use crate::error::{Result, RetryTopicError};

/// Total attempts (main plus retry levels) when none are configured.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Topic auto-provisioning settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AutoCreateConfig {
    pub enabled: bool,
    /// Partition count. Inherited from the main topic when unset.
    pub partitions: Option<i32>,
    /// Replication factor. Inherited from the main topic when unset.
    pub replication_factor: Option<i16>,
}

impl Default for AutoCreateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            partitions: None,
            replication_factor: None,
        }
    }
}

/// In-process retries at every MAIN and RETRY level.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BlockingRetries {
    /// Attempts per level, including the first one.
    pub attempts: u32,
    /// Pause between in-process attempts.
    pub interval_ms: u64,
    /// Failure kinds retried in-process. Empty means all retryable kinds.
    pub retry_on: Vec<String>,
}

impl Default for BlockingRetries {
    fn default() -> Self {
        Self {
            attempts: 1,
            interval_ms: 0,
            retry_on: Vec::new(),
        }
    }
}

/// Retry-topic settings for a set of source topics.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryTopicConfiguration {
    /// Topics this configuration applies to. Empty means every topic.
    pub topics: Vec<String>,
    pub exclude_topics: Vec<String>,
    /// Total delivery attempts: the main topic plus one per retry topic.
    pub attempts: u32,
    pub backoff: BackoffSpec,
    pub retry_topic_suffix: String,
    pub dlt_suffix: String,
    pub suffixing: TopicSuffixingStrategy,
    pub same_interval_topic_reuse: SameIntervalTopicReuseStrategy,
    pub auto_create: AutoCreateConfig,
    /// Only these kinds are retried. Mutually exclusive with `not_retry_on`.
    pub retry_on: Vec<String>,
    /// Kinds that go straight to the DLT.
    pub not_retry_on: Vec<String>,
    pub traversing_causes: bool,
    /// Child kind -> parent kind.
    pub exception_hierarchy: BTreeMap<String, String>,
    pub retry_on_dlt_failure: bool,
    pub dlt_enabled: bool,
    pub timeout_ms: Option<u64>,
    pub blocking: BlockingRetries,
    /// Name of a handler registered with the configurer. Logs when unset.
    pub dlt_handler: Option<String>,
    /// Consumer group for the retry and DLT listeners.
    pub group_id: Option<String>,
}

impl Default for RetryTopicConfiguration {
    fn default() -> Self {
        Self {
            topics: Vec::new(),
            exclude_topics: Vec::new(),
            attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: BackoffSpec::default(),
            retry_topic_suffix: DEFAULT_RETRY_SUFFIX.to_string(),
            dlt_suffix: DEFAULT_DLT_SUFFIX.to_string(),
            suffixing: TopicSuffixingStrategy::default(),
            same_interval_topic_reuse: SameIntervalTopicReuseStrategy::default(),
            auto_create: AutoCreateConfig::default(),
            retry_on: Vec::new(),
            not_retry_on: Vec::new(),
            traversing_causes: false,
            exception_hierarchy: BTreeMap::new(),
            retry_on_dlt_failure: true,
            dlt_enabled: true,
            timeout_ms: None,
            blocking: BlockingRetries::default(),
            dlt_handler: None,
            group_id: None,
        }
    }
}

impl RetryTopicConfiguration {
    pub fn builder() -> RetryTopicConfigurationBuilder {
        RetryTopicConfigurationBuilder::default()
    }

    /// Reject contradictory settings.
    pub fn validate(&self) -> Result<()> {
        if !self.retry_on.is_empty() && !self.not_retry_on.is_empty() {
            return Err(RetryTopicError::configuration(
                "retry_on and not_retry_on cannot both be set",
            ));
        }
        if self.same_interval_topic_reuse == SameIntervalTopicReuseStrategy::SingleTopic
            && self.backoff.is_random()
        {
            return Err(RetryTopicError::configuration(
                "SINGLE_TOPIC reuse needs a deterministic backoff",
            ));
        }
        if self.backoff.implied_max_attempts().is_none() && self.attempts < 1 {
            return Err(RetryTopicError::configuration("attempts must be at least 1"));
        }
        if self.blocking.attempts < 1 {
            return Err(RetryTopicError::configuration(
                "blocking attempts must be at least 1",
            ));
        }
        if matches!(self.auto_create.partitions, Some(p) if p < 1) {
            return Err(RetryTopicError::configuration(
                "auto-created topics need at least one partition",
            ));
        }
        if self.retry_topic_suffix.is_empty() {
            return Err(RetryTopicError::configuration("retry topic suffix is empty"));
        }
        if self.dlt_enabled && self.dlt_suffix.is_empty() {
            return Err(RetryTopicError::configuration("DLT suffix is empty"));
        }
        self.backoff.validate()
    }

    /// Whether this configuration covers `topic`.
    pub fn handles(&self, topic: &str) -> bool {
        let included = self.topics.is_empty() || self.topics.iter().any(|t| t == topic);
        included && !self.exclude_topics.iter().any(|t| t == topic)
    }

    /// Attempts after accounting for explicit delay lists.
    pub fn max_attempts(&self) -> u32 {
        self.backoff.implied_max_attempts().unwrap_or(self.attempts)
    }

    pub fn naming(&self) -> TopicNaming {
        TopicNaming {
            retry_suffix: self.retry_topic_suffix.clone(),
            dlt_suffix: self.dlt_suffix.clone(),
            suffixing: self.suffixing,
            reuse: self.same_interval_topic_reuse,
        }
    }

    pub fn hierarchy(&self) -> ExceptionHierarchy {
        let mut hierarchy = ExceptionHierarchy::with_defaults();
        for (child, parent) in &self.exception_hierarchy {
            hierarchy.declare(child.clone(), parent.clone());
        }
        hierarchy
    }

    /// Classifier seeded with defaults and amended by this configuration.
    pub fn classifier(&self) -> FatalExceptionClassifier {
        let mut classifier = FatalExceptionClassifier::new(self.hierarchy());
        classifier.add_not_retryable(self.not_retry_on.iter().cloned());
        if !self.retry_on.is_empty() {
            classifier.retry_only(self.retry_on.iter().cloned());
        }
        classifier.set_traversing_causes(self.traversing_causes);
        classifier
    }

    /// Routing rules with a frozen classifier.
    pub fn routing_policy(&self) -> RoutingPolicy {
        RoutingPolicy {
            classifier: Arc::new(self.classifier()),
            blocking_retry_on: self
                .blocking
                .retry_on
                .iter()
                .cloned()
                .map(FailureKind::from)
                .collect(),
            timeout_ms: self.timeout_ms,
        }
    }
}

/// Fluent builder for [`RetryTopicConfiguration`].
#[derive(Debug, Clone, Default)]
pub struct RetryTopicConfigurationBuilder {
    config: RetryTopicConfiguration,
}

impl RetryTopicConfigurationBuilder {
    pub fn include_topic(mut self, topic: impl Into<String>) -> Self {
        self.config.topics.push(topic.into());
        self
    }

    pub fn include_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.topics.extend(topics.into_iter().map(Into::into));
        self
    }

    pub fn exclude_topic(mut self, topic: impl Into<String>) -> Self {
        self.config.exclude_topics.push(topic.into());
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.attempts = attempts;
        self
    }

    pub fn fixed_backoff(mut self, delay_ms: u64) -> Self {
        self.config.backoff = BackoffSpec::Fixed { delay_ms };
        self
    }

    pub fn uniform_random_backoff(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.config.backoff = BackoffSpec::UniformRandom { min_ms, max_ms };
        self
    }

    pub fn exponential_backoff(mut self, initial_ms: u64, multiplier: f64, max_ms: u64) -> Self {
        self.config.backoff = BackoffSpec::Exponential {
            initial_ms,
            multiplier,
            max_ms,
        };
        self
    }

    pub fn exponential_random_backoff(mut self, initial_ms: u64, multiplier: f64, max_ms: u64) -> Self {
        self.config.backoff = BackoffSpec::ExponentialRandom {
            initial_ms,
            multiplier,
            max_ms,
        };
        self
    }

    pub fn explicit_backoff(mut self, delays_ms: Vec<u64>) -> Self {
        self.config.backoff = BackoffSpec::Explicit { delays_ms };
        self
    }

    pub fn retry_topic_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.retry_topic_suffix = suffix.into();
        self
    }

    pub fn dlt_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.dlt_suffix = suffix.into();
        self
    }

    pub fn suffixing(mut self, strategy: TopicSuffixingStrategy) -> Self {
        self.config.suffixing = strategy;
        self
    }

    pub fn same_interval_topic_reuse(mut self, strategy: SameIntervalTopicReuseStrategy) -> Self {
        self.config.same_interval_topic_reuse = strategy;
        self
    }

    pub fn auto_create_topics(mut self, partitions: Option<i32>, replication_factor: Option<i16>) -> Self {
        self.config.auto_create = AutoCreateConfig {
            enabled: true,
            partitions,
            replication_factor,
        };
        self
    }

    pub fn do_not_auto_create_topics(mut self) -> Self {
        self.config.auto_create.enabled = false;
        self
    }

    pub fn retry_on<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.retry_on.extend(kinds.into_iter().map(Into::into));
        self
    }

    pub fn not_retry_on<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.not_retry_on.extend(kinds.into_iter().map(Into::into));
        self
    }

    pub fn traversing_causes(mut self, traversing: bool) -> Self {
        self.config.traversing_causes = traversing;
        self
    }

    /// Declare `child` a subtype of `parent` for classification.
    pub fn subtype(mut self, child: impl Into<String>, parent: impl Into<String>) -> Self {
        self.config
            .exception_hierarchy
            .insert(child.into(), parent.into());
        self
    }

    pub fn do_not_retry_on_dlt_failure(mut self) -> Self {
        self.config.retry_on_dlt_failure = false;
        self
    }

    pub fn do_not_configure_dlt(mut self) -> Self {
        self.config.dlt_enabled = false;
        self
    }

    pub fn timeout_after(mut self, timeout_ms: u64) -> Self {
        self.config.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn blocking_retries(mut self, attempts: u32, interval_ms: u64) -> Self {
        self.config.blocking.attempts = attempts;
        self.config.blocking.interval_ms = interval_ms;
        self
    }

    pub fn blocking_retry_on<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config
            .blocking
            .retry_on
            .extend(kinds.into_iter().map(Into::into));
        self
    }

    pub fn dlt_handler(mut self, name: impl Into<String>) -> Self {
        self.config.dlt_handler = Some(name.into());
        self
    }

    pub fn group_id(mut self, group_id: impl Into<String>) -> Self {
        self.config.group_id = Some(group_id.into());
        self
    }

    /// Validate and return the configuration.
    pub fn create(self) -> Result<RetryTopicConfiguration> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests;
