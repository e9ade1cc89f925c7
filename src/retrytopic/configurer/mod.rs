//! Wiring of retry-topic endpoints.
//!
//! For each main topic the configurer:
//! 1. generates the backoff delays and builds the destination chain
//! 2. creates every destination topic that does not exist yet
//! 3. publishes the chains to the shared registry
//! 4. starts one listener container per destination topic
//!
//! The main and retry containers run the endpoint's handler; the DLT container
//! runs the configured DLT handler, or a logging one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use tracing::{info, warn};

use super::backoff::BackoffPolicyGenerator;
use super::configuration::RetryTopicConfiguration;
use super::container::ListenerContainer;
use super::destination::{DestinationTopic, DestinationTopicProperties};
use super::listener::{FailureLogLevel, LoggingDltHandler, RecordHandler, RetryTopicListener};
use super::processor::{Context, DestinationTopicProcessor, DestinationTopicRegistry};
use super::resolver::DestinationTopicResolver;
use super::scheduler::ActivationScheduler;
use crate::bus::{BusError, NewTopic, RecordPublisher, RecordSourceFactory, TopicAdmin, TopicDescription};
use crate::config::Config;
use crate::error::{Result, RetryTopicError};
use crate::utils::retry::{admin_backoff, PublishRetryConfig};

/// Partitions for created topics when nothing is known about the main topic.
const FALLBACK_PARTITIONS: i32 = 1;
/// Lets the broker pick its default replication factor.
const BROKER_DEFAULT_REPLICATION: i16 = -1;

/// Named handlers that configurations refer to (e.g. `dlt_handler: audit`).
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn RecordHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, handler: Arc<dyn RecordHandler>) -> Self {
        self.register(name, handler);
        self
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn RecordHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn RecordHandler>> {
        self.handlers.get(name).cloned().ok_or_else(|| {
            RetryTopicError::configuration(format!("no handler registered under '{}'", name))
        })
    }
}

/// Running containers of one configured endpoint.
pub struct RetryEndpoint {
    source_topics: Vec<String>,
    containers: Vec<ListenerContainer>,
}

impl RetryEndpoint {
    pub fn source_topics(&self) -> &[String] {
        &self.source_topics
    }

    /// Topics with a running container, in chain order.
    pub fn topics(&self) -> Vec<&str> {
        self.containers.iter().map(|c| c.topic()).collect()
    }

    pub fn container(&self, topic: &str) -> Option<&ListenerContainer> {
        self.containers.iter().find(|c| c.topic() == topic)
    }

    /// Stop every container. Returns the first error that stopped one.
    pub async fn stop(self) -> Result<()> {
        let mut first_error = None;
        for container in &self.containers {
            if let Err(e) = container.stop().await {
                warn!(topic = %container.topic(), error = %e, "Listener container ended with error");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Composes topology building, provisioning and listener wiring.
pub struct RetryTopicConfigurer {
    publisher: Arc<dyn RecordPublisher>,
    admin: Arc<dyn TopicAdmin>,
    sources: Arc<dyn RecordSourceFactory>,
    processor: DestinationTopicProcessor,
    resolver: DestinationTopicResolver,
    scheduler: Arc<ActivationScheduler>,
    handlers: HandlerRegistry,
    configurations: Vec<RetryTopicConfiguration>,
    backoff: BackoffPolicyGenerator,
    group_id: String,
    log_level: FailureLogLevel,
    publish_retry: PublishRetryConfig,
}

impl RetryTopicConfigurer {
    /// Must be called inside a tokio runtime (starts the activation scheduler).
    pub fn new(
        publisher: Arc<dyn RecordPublisher>,
        admin: Arc<dyn TopicAdmin>,
        sources: Arc<dyn RecordSourceFactory>,
    ) -> Self {
        let registry = Arc::new(DestinationTopicRegistry::new());
        Self {
            publisher,
            admin,
            sources,
            processor: DestinationTopicProcessor::new(registry.clone()),
            resolver: DestinationTopicResolver::new(registry),
            scheduler: ActivationScheduler::start(),
            handlers: HandlerRegistry::new(),
            configurations: Vec::new(),
            backoff: BackoffPolicyGenerator::new(),
            group_id: "retrytopic".to_string(),
            log_level: FailureLogLevel::default(),
            publish_retry: PublishRetryConfig::default(),
        }
    }

    /// Configurer carrying the application settings and every retry topic
    /// configuration of `config`.
    pub fn from_config(
        config: &Config,
        publisher: Arc<dyn RecordPublisher>,
        admin: Arc<dyn TopicAdmin>,
        sources: Arc<dyn RecordSourceFactory>,
    ) -> Result<Self> {
        let mut configurer = Self::new(publisher, admin, sources)
            .with_group_id(config.kafka.group_id.clone())
            .with_log_level(config.failure_log_level)
            .with_publish_retry(config.publish_retry.clone());
        for configuration in &config.retry_topics {
            configurer.add_configuration(configuration.clone())?;
        }
        Ok(configurer)
    }

    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn with_backoff_generator(mut self, generator: BackoffPolicyGenerator) -> Self {
        self.backoff = generator;
        self
    }

    /// Default consumer group for configurations that do not name one.
    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }

    pub fn with_log_level(mut self, level: FailureLogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_publish_retry(mut self, publish_retry: PublishRetryConfig) -> Self {
        self.publish_retry = publish_retry;
        self
    }

    pub fn resolver(&self) -> &DestinationTopicResolver {
        &self.resolver
    }

    pub fn registry(&self) -> &Arc<DestinationTopicRegistry> {
        self.processor.registry()
    }

    pub fn scheduler(&self) -> &Arc<ActivationScheduler> {
        &self.scheduler
    }

    /// Add a configuration. An explicit topic may belong to one configuration only.
    pub fn add_configuration(&mut self, configuration: RetryTopicConfiguration) -> Result<()> {
        configuration.validate()?;
        if let Some(topic) = configuration.topics.iter().find(|topic| {
            self.configurations
                .iter()
                .any(|existing| existing.topics.contains(topic))
        }) {
            return Err(RetryTopicError::configuration(format!(
                "topic '{}' appears in two retry topic configurations",
                topic
            )));
        }
        self.configurations.push(configuration);
        Ok(())
    }

    pub fn configurations(&self) -> &[RetryTopicConfiguration] {
        &self.configurations
    }

    /// First configuration that handles every topic in `topics`.
    pub fn configuration_for(&self, topics: &[&str]) -> Option<&RetryTopicConfiguration> {
        self.configurations
            .iter()
            .find(|c| topics.iter().all(|t| c.handles(t)))
    }

    /// Wire `topics` with the configuration that handles them.
    pub async fn configure(
        &mut self,
        topics: &[&str],
        handler: Arc<dyn RecordHandler>,
    ) -> Result<RetryEndpoint> {
        let configuration = self.configuration_for(topics).cloned().ok_or_else(|| {
            RetryTopicError::configuration(format!(
                "no retry topic configuration handles {:?}",
                topics
            ))
        })?;
        self.configure_with(&configuration, topics, handler).await
    }

    /// Build the chains of `topics` without registering them.
    pub fn build_topology(
        &mut self,
        configuration: &RetryTopicConfiguration,
        topics: &[&str],
    ) -> Result<Context> {
        configuration.validate()?;
        if topics.is_empty() {
            return Err(RetryTopicError::configuration("no topics to configure"));
        }

        let delays = self
            .backoff
            .generate(&configuration.backoff, configuration.max_attempts())?;
        let properties = DestinationTopicProperties::for_chain(
            &delays,
            configuration.blocking.attempts,
            configuration.dlt_enabled,
            configuration.retry_on_dlt_failure,
        );
        let naming = configuration.naming();
        let policy = configuration.routing_policy();

        let mut context = Context::new();
        for topic in topics {
            self.processor
                .process(&mut context, topic, &properties, &naming, policy.clone())?;
        }
        Ok(context)
    }

    /// Build, provision and register the chains of `topics`.
    ///
    /// Returns every distinct destination that has a real topic.
    pub async fn declare_topology(
        &mut self,
        configuration: &RetryTopicConfiguration,
        topics: &[&str],
    ) -> Result<Vec<DestinationTopic>> {
        let context = self.build_topology(configuration, topics)?;

        let mut destinations: Vec<DestinationTopic> = Vec::new();
        self.processor
            .for_each_destination(&context, |d| destinations.push(d.clone()));

        if configuration.auto_create.enabled {
            self.provision(&destinations, configuration).await?;
        }

        self.processor.register(context);
        Ok(destinations)
    }

    /// Wire `topics` with an explicit configuration.
    pub async fn configure_with(
        &mut self,
        configuration: &RetryTopicConfiguration,
        topics: &[&str],
        handler: Arc<dyn RecordHandler>,
    ) -> Result<RetryEndpoint> {
        let dlt_handler: Arc<dyn RecordHandler> = match configuration.dlt_handler {
            Some(ref name) => self.handlers.get(name)?,
            None => Arc::new(LoggingDltHandler::new(self.log_level)),
        };

        let destinations = self.declare_topology(configuration, topics).await?;

        let group_id = configuration
            .group_id
            .clone()
            .unwrap_or_else(|| self.group_id.clone());
        let blocking_interval = Duration::from_millis(configuration.blocking.interval_ms);

        let mut containers = Vec::with_capacity(destinations.len());
        for destination in destinations {
            let endpoint_handler = if destination.is_dlt() {
                dlt_handler.clone()
            } else {
                handler.clone()
            };
            let listener = RetryTopicListener::new(
                destination,
                endpoint_handler,
                self.resolver.clone(),
                self.publisher.clone(),
            )
            .with_blocking_interval(blocking_interval)
            .with_publish_retry(self.publish_retry.clone())
            .with_log_level(self.log_level);

            match ListenerContainer::start(
                self.sources.as_ref(),
                listener,
                self.scheduler.clone(),
                &group_id,
            )
            .await
            {
                Ok(container) => containers.push(container),
                Err(e) => {
                    for started in &containers {
                        let _ = started.stop().await;
                    }
                    return Err(e);
                }
            }
        }

        info!(
            topics = ?topics,
            containers = containers.len(),
            group_id = %group_id,
            "Configured retry topic endpoint"
        );

        Ok(RetryEndpoint {
            source_topics: topics.iter().map(|t| t.to_string()).collect(),
            containers,
        })
    }

    /// Create every missing destination topic.
    ///
    /// Partitions and replication follow the main topic unless overridden.
    async fn provision(
        &self,
        destinations: &[DestinationTopic],
        configuration: &RetryTopicConfiguration,
    ) -> Result<()> {
        let mut layouts: HashMap<String, Option<TopicDescription>> = HashMap::new();
        for destination in destinations.iter().filter(|d| d.is_main()) {
            let admin = self.admin.clone();
            let name = destination.source_topic().to_string();
            let description = (|| {
                let admin = admin.clone();
                let name = name.clone();
                async move { admin.describe_topic(&name).await }
            })
            .retry(admin_backoff())
            .notify(|err: &BusError, dur: Duration| {
                warn!(topic = %name, error = %err, delay = ?dur, "Describe topic failed, retrying");
            })
            .await?;
            layouts.insert(name, description);
        }

        let new_topics: Vec<NewTopic> = destinations
            .iter()
            .map(|destination| {
                let inherited = layouts.get(destination.source_topic()).copied().flatten();
                NewTopic {
                    name: destination.destination_name().to_string(),
                    partitions: configuration
                        .auto_create
                        .partitions
                        .or(inherited.map(|l| l.partitions))
                        .unwrap_or(FALLBACK_PARTITIONS),
                    replication_factor: configuration
                        .auto_create
                        .replication_factor
                        .or(inherited.map(|l| l.replication_factor))
                        .unwrap_or(BROKER_DEFAULT_REPLICATION),
                }
            })
            .collect();

        let admin = self.admin.clone();
        (|| {
            let admin = admin.clone();
            let new_topics = new_topics.clone();
            async move { admin.create_topics_if_absent(&new_topics).await }
        })
        .retry(admin_backoff())
        .notify(|err: &BusError, dur: Duration| {
            warn!(error = %err, delay = ?dur, "Topic creation failed, retrying");
        })
        .await?;

        info!(topics = new_topics.len(), "Provisioned destination topics");
        Ok(())
    }

    /// Stop the activation scheduler. Containers are stopped through their endpoints.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}
