//! Fatal vs retryable classification of listener failures.
//!
//! Failure kinds are plain names; subtype relations are supplied by the
//! caller through an [`ExceptionHierarchy`]. A kind is looked up by walking
//! its supertype chain, nearest first. At each step the non-fatal set wins
//! over the fatal sets. Kinds nobody classified fall back to the default
//! (retryable unless the configuration lists the only kinds to retry on).
//!
//! The classifier is mutated while a configuration is assembled and then
//! moved behind an `Arc`. Nothing mutates it once listeners are running.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use super::failure::{FailureKind, ListenerFailure};

pub const DESERIALIZATION_ERROR: FailureKind = FailureKind::from_static("DeserializationError");
pub const CONVERSION_ERROR: FailureKind = FailureKind::from_static("ConversionError");
pub const MESSAGE_CONVERSION_ERROR: FailureKind =
    FailureKind::from_static("MessageConversionError");
pub const ARGUMENT_RESOLUTION_ERROR: FailureKind =
    FailureKind::from_static("ArgumentResolutionError");
pub const NO_SUCH_HANDLER_ERROR: FailureKind = FailureKind::from_static("NoSuchHandlerError");
pub const TYPE_MISMATCH_ERROR: FailureKind = FailureKind::from_static("TypeMismatchError");

/// Kinds that are fatal unless configuration says otherwise.
pub fn default_fatal_kinds() -> Vec<FailureKind> {
    vec![
        DESERIALIZATION_ERROR,
        MESSAGE_CONVERSION_ERROR,
        CONVERSION_ERROR,
        ARGUMENT_RESOLUTION_ERROR,
        NO_SUCH_HANDLER_ERROR,
        TYPE_MISMATCH_ERROR,
    ]
}

/// Explicit "is-subtype-of" relations between failure kinds.
#[derive(Debug, Clone, Default)]
pub struct ExceptionHierarchy {
    parents: HashMap<FailureKind, FailureKind>,
}

impl ExceptionHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hierarchy with the built-in relations between the default kinds.
    pub fn with_defaults() -> Self {
        Self::new().with_subtype(MESSAGE_CONVERSION_ERROR, CONVERSION_ERROR)
    }

    /// Declare `child` a direct subtype of `parent`.
    pub fn with_subtype(mut self, child: impl Into<FailureKind>, parent: impl Into<FailureKind>) -> Self {
        self.declare(child, parent);
        self
    }

    pub fn declare(&mut self, child: impl Into<FailureKind>, parent: impl Into<FailureKind>) {
        self.parents.insert(child.into(), parent.into());
    }

    /// `kind` followed by its supertypes, nearest first. Stops on cycles.
    pub fn lineage(&self, kind: &FailureKind) -> Vec<FailureKind> {
        let mut seen = HashSet::new();
        let mut lineage = Vec::new();
        let mut current = Some(kind.clone());
        while let Some(k) = current {
            if !seen.insert(k.clone()) {
                break;
            }
            current = self.parents.get(&k).cloned();
            lineage.push(k);
        }
        lineage
    }

    /// Whether `kind` is `target` or one of its subtypes.
    pub fn is_a(&self, kind: &FailureKind, target: &FailureKind) -> bool {
        self.lineage(kind).iter().any(|k| k == target)
    }
}

/// Decides whether a failure is worth retrying.
#[derive(Debug, Clone)]
pub struct FatalExceptionClassifier {
    hierarchy: ExceptionHierarchy,
    default_fatal: BTreeSet<FailureKind>,
    user_fatal: BTreeSet<FailureKind>,
    user_non_fatal: BTreeSet<FailureKind>,
    traversing_causes: bool,
    default_retryable: bool,
}

impl Default for FatalExceptionClassifier {
    fn default() -> Self {
        Self::new(ExceptionHierarchy::with_defaults())
    }
}

impl FatalExceptionClassifier {
    /// Classifier seeded with the default fatal kinds.
    pub fn new(hierarchy: ExceptionHierarchy) -> Self {
        Self {
            hierarchy,
            default_fatal: default_fatal_kinds().into_iter().collect(),
            user_fatal: BTreeSet::new(),
            user_non_fatal: BTreeSet::new(),
            traversing_causes: false,
            default_retryable: true,
        }
    }

    pub fn hierarchy(&self) -> &ExceptionHierarchy {
        &self.hierarchy
    }

    /// Treat these kinds (and their subtypes) as fatal.
    pub fn add_not_retryable<I, K>(&mut self, kinds: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<FailureKind>,
    {
        for kind in kinds {
            let kind = kind.into();
            self.user_non_fatal.remove(&kind);
            self.user_fatal.insert(kind);
        }
    }

    /// Treat these kinds (and their subtypes) as retryable, overriding defaults.
    pub fn add_retryable<I, K>(&mut self, kinds: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<FailureKind>,
    {
        for kind in kinds {
            let kind = kind.into();
            self.user_fatal.remove(&kind);
            self.user_non_fatal.insert(kind);
        }
    }

    /// Retry only the listed kinds; everything unclassified becomes fatal.
    pub fn retry_only<I, K>(&mut self, kinds: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<FailureKind>,
    {
        self.default_retryable = false;
        self.add_retryable(kinds);
    }

    /// Drop a kind from every set. Returns whether it was classified.
    pub fn remove_classification(&mut self, kind: &FailureKind) -> bool {
        let fatal = self.default_fatal.remove(kind);
        let user_fatal = self.user_fatal.remove(kind);
        let non_fatal = self.user_non_fatal.remove(kind);
        fatal || user_fatal || non_fatal
    }

    pub fn set_traversing_causes(&mut self, traversing: bool) {
        self.traversing_causes = traversing;
    }

    pub fn traversing_causes(&self) -> bool {
        self.traversing_causes
    }

    /// `Some(true)` fatal, `Some(false)` retryable, `None` unclassified.
    pub fn classify_kind(&self, kind: &FailureKind) -> Option<bool> {
        self.hierarchy.lineage(kind).iter().find_map(|k| {
            if self.user_non_fatal.contains(k) {
                Some(false)
            } else if self.user_fatal.contains(k) || self.default_fatal.contains(k) {
                Some(true)
            } else {
                None
            }
        })
    }

    /// Fatal classification of a single kind, falling back to the default.
    pub fn is_fatal_kind(&self, kind: &FailureKind) -> bool {
        self.classify_kind(kind)
            .unwrap_or(!self.default_retryable)
    }

    /// Fatal classification of a failure, walking its causes when enabled.
    pub fn is_fatal(&self, failure: &ListenerFailure) -> bool {
        let classified = if self.traversing_causes {
            failure.chain().find_map(|f| self.classify_kind(f.kind()))
        } else {
            self.classify_kind(failure.kind())
        };

        let fatal = classified.unwrap_or(!self.default_retryable);
        if fatal {
            debug!(kind = %failure.kind(), "Failure classified as fatal");
        }
        fatal
    }
}

#[cfg(test)]
mod tests;
