use super::*;

fn failure(kind: &'static str) -> ListenerFailure {
    ListenerFailure::new(kind, "boom")
}

#[test]
fn test_defaults_are_fatal() {
    let classifier = FatalExceptionClassifier::default();
    for kind in default_fatal_kinds() {
        assert!(classifier.is_fatal_kind(&kind), "{} should be fatal", kind);
    }
}

#[test]
fn test_unclassified_is_retryable() {
    let classifier = FatalExceptionClassifier::default();
    assert!(!classifier.is_fatal(&failure("TimeoutError")));
}

#[test]
fn test_subtype_of_fatal_is_fatal() {
    let hierarchy = ExceptionHierarchy::with_defaults().with_subtype("JsonError", DESERIALIZATION_ERROR);
    let classifier = FatalExceptionClassifier::new(hierarchy);
    assert!(classifier.is_fatal(&failure("JsonError")));
}

#[test]
fn test_non_fatal_wins_over_fatal_at_same_level() {
    let mut classifier = FatalExceptionClassifier::default();
    classifier.add_retryable([CONVERSION_ERROR]);
    assert!(!classifier.is_fatal_kind(&CONVERSION_ERROR));
    assert!(classifier.is_fatal_kind(&DESERIALIZATION_ERROR));
}

#[test]
fn test_nearest_classification_wins() {
    // MessageConversionError is itself default-fatal, so the retryable parent
    // does not override it.
    let mut classifier = FatalExceptionClassifier::default();
    classifier.add_retryable([CONVERSION_ERROR]);
    assert!(classifier.is_fatal_kind(&MESSAGE_CONVERSION_ERROR));

    classifier.remove_classification(&MESSAGE_CONVERSION_ERROR);
    assert!(!classifier.is_fatal_kind(&MESSAGE_CONVERSION_ERROR));
}

#[test]
fn test_user_fatal_kinds() {
    let hierarchy = ExceptionHierarchy::new().with_subtype("InvalidOrder", "ValidationError");
    let mut classifier = FatalExceptionClassifier::new(hierarchy);
    classifier.add_not_retryable(["ValidationError"]);

    assert!(classifier.is_fatal(&failure("InvalidOrder")));
    assert!(!classifier.is_fatal(&failure("IoError")));
}

#[test]
fn test_cause_traversal() {
    let nested = ListenerFailure::new("ListenerError", "wrapper")
        .caused_by(ListenerFailure::new(DESERIALIZATION_ERROR, "bad bytes"));

    let mut classifier = FatalExceptionClassifier::default();
    assert!(!classifier.is_fatal(&nested));

    classifier.set_traversing_causes(true);
    assert!(classifier.is_fatal(&nested));
}

#[test]
fn test_first_classified_cause_wins() {
    let mut classifier = FatalExceptionClassifier::default();
    classifier.set_traversing_causes(true);
    classifier.add_retryable(["ListenerError"]);

    let nested = ListenerFailure::new("ListenerError", "wrapper")
        .caused_by(ListenerFailure::new(DESERIALIZATION_ERROR, "bad bytes"));
    assert!(!classifier.is_fatal(&nested));
}

#[test]
fn test_retry_only_makes_others_fatal() {
    let mut classifier = FatalExceptionClassifier::default();
    classifier.retry_only(["TimeoutError"]);

    assert!(!classifier.is_fatal(&failure("TimeoutError")));
    assert!(classifier.is_fatal(&failure("IoError")));
}

#[test]
fn test_lineage_stops_on_cycle() {
    let hierarchy = ExceptionHierarchy::new()
        .with_subtype("A", "B")
        .with_subtype("B", "A");
    let lineage = hierarchy.lineage(&FailureKind::from_static("A"));
    assert_eq!(lineage.len(), 2);
    assert!(hierarchy.is_a(&FailureKind::from_static("A"), &FailureKind::from_static("B")));
}
