use super::*;
use crate::retrytopic::classifier::{FatalExceptionClassifier, DESERIALIZATION_ERROR};
use crate::retrytopic::destination::{
    DestinationKind, DestinationTopicProperties, SameIntervalTopicReuseStrategy,
};
use crate::retrytopic::processor::{Context, DestinationTopicProcessor, RoutingPolicy, TopicNaming};

fn resolver_for(
    delays: &[u64],
    attempts_per_level: u32,
    dlt_enabled: bool,
    retries_on_dlt: bool,
    reuse: SameIntervalTopicReuseStrategy,
    policy: RoutingPolicy,
) -> DestinationTopicResolver {
    let registry = Arc::new(DestinationTopicRegistry::new());
    let processor = DestinationTopicProcessor::new(registry.clone());
    let properties =
        DestinationTopicProperties::for_chain(delays, attempts_per_level, dlt_enabled, retries_on_dlt);
    let naming = TopicNaming {
        reuse,
        ..Default::default()
    };
    let mut context = Context::new();
    processor
        .process(&mut context, "orders", &properties, &naming, policy)
        .unwrap();
    processor.register(context);
    DestinationTopicResolver::new(registry)
}

fn default_resolver() -> DestinationTopicResolver {
    resolver_for(
        &[50, 50],
        3,
        true,
        true,
        SameIntervalTopicReuseStrategy::MultipleTopics,
        RoutingPolicy::default(),
    )
}

fn retryable() -> ListenerFailure {
    ListenerFailure::new("TimeoutError", "downstream slow")
}

#[test]
fn test_attempts_exhaust_each_level_in_order() {
    let resolver = default_resolver();
    let failure = retryable();

    for attempt in 1..3 {
        let next = resolver
            .resolve_destination("orders", "orders", attempt, &failure)
            .unwrap();
        assert_eq!(next.destination_name(), "orders");
    }
    let next = resolver.resolve_destination("orders", "orders", 3, &failure).unwrap();
    assert_eq!(next.destination_name(), "orders-retry-0");
    assert_eq!(next.delay_ms(), 50);

    let next = resolver
        .resolve_destination("orders", "orders-retry-0", 3, &failure)
        .unwrap();
    assert_eq!(next.destination_name(), "orders-retry-1");

    let next = resolver
        .resolve_destination("orders", "orders-retry-1", 3, &failure)
        .unwrap();
    assert_eq!(next.kind(), DestinationKind::Dlt);
}

#[test]
fn test_fatal_failure_skips_to_dlt() {
    let resolver = default_resolver();
    let failure = ListenerFailure::new(DESERIALIZATION_ERROR, "bad payload");
    let next = resolver.resolve_destination("orders", "orders", 1, &failure).unwrap();
    assert_eq!(next.destination_name(), "orders-dlt");
}

#[test]
fn test_fatal_failure_without_dlt_resolves_to_no_ops() {
    let resolver = resolver_for(
        &[50],
        1,
        false,
        true,
        SameIntervalTopicReuseStrategy::MultipleTopics,
        RoutingPolicy::default(),
    );
    let failure = ListenerFailure::new(DESERIALIZATION_ERROR, "bad payload");
    let next = resolver.resolve_destination("orders", "orders", 1, &failure).unwrap();
    assert!(next.is_no_ops());
}

#[test]
fn test_dlt_failure_loops_back_when_enabled() {
    let resolver = default_resolver();
    let next = resolver
        .resolve_destination("orders", "orders-dlt", 1, &retryable())
        .unwrap();
    assert_eq!(next.destination_name(), "orders-dlt");
}

#[test]
fn test_dlt_failure_is_terminal_when_disabled() {
    let resolver = resolver_for(
        &[50],
        1,
        true,
        false,
        SameIntervalTopicReuseStrategy::MultipleTopics,
        RoutingPolicy::default(),
    );
    let result = resolver.resolve_destination("orders", "orders-dlt", 1, &retryable());
    assert!(matches!(result, Err(RetryTopicError::FatalProcessing { .. })));
}

#[test]
fn test_fatal_dlt_failure_is_terminal_even_when_enabled() {
    let resolver = default_resolver();
    let failure = ListenerFailure::new(DESERIALIZATION_ERROR, "bad payload");
    let result = resolver.resolve_destination("orders", "orders-dlt", 1, &failure);
    assert!(matches!(result, Err(RetryTopicError::FatalProcessing { .. })));
}

#[test]
fn test_single_topic_tracks_header_attempts() {
    let resolver = resolver_for(
        &[1000, 1000],
        2,
        true,
        true,
        SameIntervalTopicReuseStrategy::SingleTopic,
        RoutingPolicy::default(),
    );
    let failure = retryable();

    let reused = resolver.destination("orders", "orders-retry").unwrap();
    assert!(reused.is_reusable());
    assert_eq!(reused.max_attempts(), 4);

    for attempt in 1..4 {
        let next = resolver
            .resolve_destination("orders", "orders-retry", attempt, &failure)
            .unwrap();
        assert_eq!(next.destination_name(), "orders-retry", "attempt {}", attempt);
    }
    let next = resolver
        .resolve_destination("orders", "orders-retry", 4, &failure)
        .unwrap();
    assert!(next.is_dlt());
}

#[test]
fn test_blocking_retry_only_for_listed_kinds() {
    let policy = RoutingPolicy {
        blocking_retry_on: vec!["TimeoutError".into()],
        ..Default::default()
    };
    let resolver = resolver_for(
        &[50],
        3,
        true,
        true,
        SameIntervalTopicReuseStrategy::MultipleTopics,
        policy,
    );

    let stay = resolver
        .resolve_destination("orders", "orders", 1, &retryable())
        .unwrap();
    assert_eq!(stay.destination_name(), "orders");

    let other = ListenerFailure::new("IoError", "closed");
    let advance = resolver.resolve_destination("orders", "orders", 1, &other).unwrap();
    assert_eq!(advance.destination_name(), "orders-retry");
}

#[test]
fn test_timeout_routes_to_terminal() {
    let policy = RoutingPolicy {
        timeout_ms: Some(1_000),
        ..Default::default()
    };
    let resolver = resolver_for(
        &[50, 100],
        1,
        true,
        true,
        SameIntervalTopicReuseStrategy::MultipleTopics,
        policy,
    );

    let within = resolver
        .resolve_destination_at("orders", "orders-retry-0", 1, &retryable(), Some(10_000), 10_500)
        .unwrap();
    assert_eq!(within.destination_name(), "orders-retry-1");

    let past = resolver
        .resolve_destination_at("orders", "orders-retry-0", 1, &retryable(), Some(10_000), 11_001)
        .unwrap();
    assert!(past.is_dlt());
}

#[test]
fn test_traversing_classifier_applies() {
    let mut classifier = FatalExceptionClassifier::default();
    classifier.set_traversing_causes(true);
    let policy = RoutingPolicy {
        classifier: Arc::new(classifier),
        ..Default::default()
    };
    let resolver = resolver_for(
        &[50],
        3,
        true,
        true,
        SameIntervalTopicReuseStrategy::MultipleTopics,
        policy,
    );

    let wrapped = ListenerFailure::new("ListenerError", "handler failed")
        .caused_by(ListenerFailure::new(DESERIALIZATION_ERROR, "bad payload"));
    let next = resolver.resolve_destination("orders", "orders", 1, &wrapped).unwrap();
    assert!(next.is_dlt());
}

#[test]
fn test_unknown_source_is_configuration_error() {
    let resolver = default_resolver();
    let result = resolver.resolve_destination("payments", "payments", 1, &retryable());
    assert!(matches!(result, Err(RetryTopicError::Configuration(_))));
}

#[test]
fn test_unknown_current_is_routing_error() {
    let resolver = default_resolver();
    let result = resolver.resolve_destination("orders", "elsewhere", 1, &retryable());
    assert!(matches!(result, Err(RetryTopicError::RoutingDecision(_))));
    assert!(result.unwrap_err().stops_consumer());
}
