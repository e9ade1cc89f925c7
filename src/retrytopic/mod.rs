//! Non-blocking retry topics and dead-letter routing.
//!
//! A failed record moves along a chain of topics built per main topic:
//!
//! ```text
//! orders -> orders-retry-0 -> orders-retry-1 -> orders-dlt
//! ```
//!
//! - `failure` / `classifier`: what failed and whether retrying makes sense
//! - `backoff`: delay of each retry level
//! - `destination` / `processor`: chain nodes, building and registration
//! - `resolver`: where a failed record goes next
//! - `configuration` / `configurer`: per-topic settings and endpoint wiring
//! - `listener` / `container` / `scheduler`: the consuming side

pub mod backoff;
pub mod classifier;
pub mod configuration;
pub mod configurer;
pub mod container;
pub mod destination;
pub mod failure;
pub mod listener;
pub mod processor;
pub mod resolver;
pub mod scheduler;

// Re-exports
pub use backoff::{BackoffPolicyGenerator, BackoffSpec};
pub use classifier::{ExceptionHierarchy, FatalExceptionClassifier};
pub use configuration::{
    AutoCreateConfig, BlockingRetries, RetryTopicConfiguration, RetryTopicConfigurationBuilder,
};
pub use configurer::{HandlerRegistry, RetryEndpoint, RetryTopicConfigurer};
pub use container::ListenerContainer;
pub use destination::{
    DestinationKind, DestinationTopic, DestinationTopicProperties, SameIntervalTopicReuseStrategy,
    TopicSuffixingStrategy,
};
pub use failure::{FailureKind, ListenerFailure};
pub use listener::{
    handler_fn, FailureLogLevel, ListenerOutcome, LoggingDltHandler, RecordHandler,
    RetryTopicListener,
};
pub use processor::{
    Context, DestinationChain, DestinationTopicProcessor, DestinationTopicRegistry, RoutingPolicy,
    TopicNaming,
};
pub use resolver::DestinationTopicResolver;
pub use scheduler::{Activation, ActivationScheduler};
