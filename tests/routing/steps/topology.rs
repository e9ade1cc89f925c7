//! Topology building step definitions.

use cucumber::{given, then, when};

use retrytopic::retrytopic::{
    DestinationKind, SameIntervalTopicReuseStrategy, TopicSuffixingStrategy,
};
use retrytopic::RetryTopicError;

use super::RoutingWorld;

fn parse_kind(kind: &str) -> DestinationKind {
    match kind {
        "MAIN" => DestinationKind::Main,
        "RETRY" => DestinationKind::Retry,
        "DLT" => DestinationKind::Dlt,
        "NO_OPS" => DestinationKind::NoOps,
        other => panic!("unknown destination kind {}", other),
    }
}

// --- Given steps ---

#[given(expr = "a retry topic configuration for {string}")]
async fn given_configuration(world: &mut RoutingWorld, topic: String) {
    world.configure(|b| b.include_topic(topic.clone()));
    world.topic = topic;
}

#[given(expr = "max attempts {int}")]
async fn given_max_attempts(world: &mut RoutingWorld, attempts: u32) {
    world.configure(|b| b.max_attempts(attempts));
}

#[given(expr = "a fixed backoff of {int} ms")]
async fn given_fixed_backoff(world: &mut RoutingWorld, delay_ms: u64) {
    world.configure(|b| b.fixed_backoff(delay_ms));
}

#[given(expr = "a uniform random backoff between {int} and {int} ms")]
async fn given_uniform_random_backoff(world: &mut RoutingWorld, min_ms: u64, max_ms: u64) {
    world.configure(|b| b.uniform_random_backoff(min_ms, max_ms));
}

#[given(expr = "an exponential backoff from {int} ms times {float} up to {int} ms")]
async fn given_exponential_backoff(
    world: &mut RoutingWorld,
    initial_ms: u64,
    multiplier: f64,
    max_ms: u64,
) {
    world.configure(|b| b.exponential_backoff(initial_ms, multiplier, max_ms));
}

#[given("same interval topic reuse")]
async fn given_single_topic(world: &mut RoutingWorld) {
    world.configure(|b| b.same_interval_topic_reuse(SameIntervalTopicReuseStrategy::SingleTopic));
}

#[given("delay suffixing")]
async fn given_delay_suffixing(world: &mut RoutingWorld) {
    world.configure(|b| b.suffixing(TopicSuffixingStrategy::Delay));
}

#[given(expr = "{int} blocking attempts per level")]
async fn given_blocking_attempts(world: &mut RoutingWorld, attempts: u32) {
    world.configure(|b| b.blocking_retries(attempts, 0));
}

#[given("no DLT")]
async fn given_no_dlt(world: &mut RoutingWorld) {
    world.configure(|b| b.do_not_configure_dlt());
}

#[given("the topology is built")]
async fn given_topology_built(world: &mut RoutingWorld) {
    world.build_topology();
    assert!(
        world.build_error.is_none(),
        "topology failed to build: {:?}",
        world.build_error
    );
}

// --- When steps ---

#[when("the topology is built")]
async fn when_topology_built(world: &mut RoutingWorld) {
    world.build_topology();
}

// --- Then steps ---

#[then(expr = "the chain is {string}")]
async fn then_chain_is(world: &mut RoutingWorld, expected: String) {
    assert!(world.build_error.is_none(), "build failed: {:?}", world.build_error);
    let names: Vec<&str> = world
        .destinations
        .iter()
        .map(|d| d.destination_name())
        .collect();
    let expected: Vec<&str> = expected.split(',').map(str::trim).collect();
    assert_eq!(names, expected);
}

#[then(expr = "destination {string} is a {word} node with delay {int} ms and {int} attempts")]
async fn then_destination_shape(
    world: &mut RoutingWorld,
    name: String,
    kind: String,
    delay_ms: u64,
    attempts: u32,
) {
    let destination = world.destination(&name);
    assert_eq!(destination.kind(), parse_kind(&kind));
    assert_eq!(destination.delay_ms(), delay_ms);
    assert_eq!(destination.max_attempts(), attempts);
}

#[then(expr = "destination {string} is reused")]
async fn then_destination_reused(world: &mut RoutingWorld, name: String) {
    assert!(world.destination(&name).is_reusable());
}

#[then(expr = "destination {string} has no topic")]
async fn then_destination_has_no_topic(world: &mut RoutingWorld, name: String) {
    assert!(!world.destination(&name).has_topic());
}

#[then("building fails with a configuration error")]
async fn then_build_fails(world: &mut RoutingWorld) {
    assert!(
        matches!(world.build_error, Some(RetryTopicError::Configuration(_))),
        "expected configuration error, got {:?}",
        world.build_error
    );
}
