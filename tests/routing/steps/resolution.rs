//! Destination resolution step definitions.

use cucumber::{given, then, when};

use retrytopic::retrytopic::ListenerFailure;
use retrytopic::RetryTopicError;

use super::RoutingWorld;

// --- Given steps ---

#[given(expr = "{string} is not retryable")]
async fn given_not_retryable(world: &mut RoutingWorld, kind: String) {
    world.configure(|b| b.not_retry_on([kind]));
}

#[given(expr = "{string} is a kind of {string}")]
async fn given_subtype(world: &mut RoutingWorld, child: String, parent: String) {
    world.configure(|b| b.subtype(child, parent));
}

#[given("DLT failures are not retried")]
async fn given_no_dlt_retries(world: &mut RoutingWorld) {
    world.configure(|b| b.do_not_retry_on_dlt_failure());
}

#[given(expr = "a retry timeout of {int} ms")]
async fn given_timeout(world: &mut RoutingWorld, timeout_ms: u64) {
    world.configure(|b| b.timeout_after(timeout_ms));
}

// --- When steps ---

#[when(expr = "a {string} failure happens on {string} at attempt {int}")]
async fn when_failure(world: &mut RoutingWorld, kind: String, current: String, attempt: u32) {
    let failure = ListenerFailure::new(kind, "boom");
    world.resolved = Some(
        world
            .resolver
            .resolve_destination(&world.topic, &current, attempt, &failure),
    );
}

#[when(expr = "a {string} failure happens on {string} {int} ms after the first failure")]
async fn when_late_failure(world: &mut RoutingWorld, kind: String, current: String, elapsed_ms: i64) {
    let failure = ListenerFailure::new(kind, "boom");
    world.resolved = Some(world.resolver.resolve_destination_at(
        &world.topic,
        &current,
        1,
        &failure,
        Some(0),
        elapsed_ms,
    ));
}

// --- Then steps ---

#[then(expr = "the record goes to {string}")]
async fn then_record_goes_to(world: &mut RoutingWorld, expected: String) {
    match world.resolved {
        Some(Ok(ref destination)) => assert_eq!(destination.destination_name(), expected),
        ref other => panic!("expected a destination, got {:?}", other),
    }
}

#[then("the record has nowhere to go")]
async fn then_record_dropped(world: &mut RoutingWorld) {
    assert!(
        matches!(world.resolved, Some(Err(RetryTopicError::FatalProcessing { .. }))),
        "expected a fatal processing error, got {:?}",
        world.resolved
    );
}

#[then("routing fails")]
async fn then_routing_fails(world: &mut RoutingWorld) {
    assert!(
        matches!(world.resolved, Some(Err(RetryTopicError::RoutingDecision(_)))),
        "expected a routing error, got {:?}",
        world.resolved
    );
}

#[then("routing fails with a configuration error")]
async fn then_routing_configuration_error(world: &mut RoutingWorld) {
    assert!(
        matches!(world.resolved, Some(Err(RetryTopicError::Configuration(_)))),
        "expected a configuration error, got {:?}",
        world.resolved
    );
}
