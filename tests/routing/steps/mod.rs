//! Cucumber step definitions for routing scenarios.

pub mod resolution;
pub mod topology;

use std::sync::Arc;

use cucumber::World;

use retrytopic::bus::InMemoryBroker;
use retrytopic::retrytopic::{
    BackoffPolicyGenerator, DestinationTopic, DestinationTopicProcessor, DestinationTopicRegistry,
    DestinationTopicResolver, RetryTopicConfigurationBuilder, RetryTopicConfigurer,
};
use retrytopic::RetryTopicError;

/// Test context shared by topology and resolution scenarios.
#[derive(Debug, World)]
#[world(init = Self::new)]
pub struct RoutingWorld {
    topic: String,
    builder: RetryTopicConfigurationBuilder,
    processor: DestinationTopicProcessor,
    resolver: DestinationTopicResolver,
    destinations: Vec<DestinationTopic>,
    build_error: Option<RetryTopicError>,
    resolved: Option<Result<DestinationTopic, RetryTopicError>>,
}

impl RoutingWorld {
    fn new() -> Self {
        let registry = Arc::new(DestinationTopicRegistry::new());
        Self {
            topic: String::new(),
            builder: RetryTopicConfigurationBuilder::default(),
            processor: DestinationTopicProcessor::new(registry.clone()),
            resolver: DestinationTopicResolver::new(registry),
            destinations: Vec::new(),
            build_error: None,
            resolved: None,
        }
    }

    /// Apply one builder call to the pending configuration.
    fn configure<F>(&mut self, f: F)
    where
        F: FnOnce(RetryTopicConfigurationBuilder) -> RetryTopicConfigurationBuilder,
    {
        let builder = std::mem::take(&mut self.builder);
        self.builder = f(builder);
    }

    /// Build the chain of the scenario topic and register it.
    fn build_topology(&mut self) {
        let topic = self.topic.clone();
        let result = self.builder.clone().create().and_then(|configuration| {
            let broker = Arc::new(InMemoryBroker::new());
            let mut configurer = RetryTopicConfigurer::new(broker.clone(), broker.clone(), broker)
                .with_backoff_generator(BackoffPolicyGenerator::with_seed(7));
            let context = configurer.build_topology(&configuration, &[topic.as_str()]);
            configurer.shutdown();
            context
        });

        match result {
            Ok(context) => {
                self.destinations = context
                    .chains()
                    .first()
                    .map(|chain| chain.destinations().to_vec())
                    .unwrap_or_default();
                self.processor.register(context);
            }
            Err(e) => self.build_error = Some(e),
        }
    }

    fn destination(&self, name: &str) -> &DestinationTopic {
        self.destinations
            .iter()
            .find(|d| d.destination_name() == name)
            .unwrap_or_else(|| panic!("no destination named {}", name))
    }
}
