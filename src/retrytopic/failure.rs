//! Listener failures and their kinds.
//!
//! A handler failure carries a `FailureKind` (the name written to the
//! `exception-fqcn` header), a message and an optional cause. Kinds form a
//! caller-supplied hierarchy, see [`ExceptionHierarchy`](super::ExceptionHierarchy).

use std::borrow::Cow;
use std::fmt;

/// Name of a failure type, e.g. `"DeserializationError"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FailureKind(Cow<'static, str>);

impl FailureKind {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for FailureKind {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl From<String> for FailureKind {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Failure returned by a record handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerFailure {
    kind: FailureKind,
    message: String,
    cause: Option<Box<ListenerFailure>>,
}

impl ListenerFailure {
    pub fn new(kind: impl Into<FailureKind>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            cause: None,
        }
    }

    /// Attach the failure that caused this one.
    pub fn caused_by(mut self, cause: ListenerFailure) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn kind(&self) -> &FailureKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&ListenerFailure> {
        self.cause.as_deref()
    }

    /// This failure followed by its causes, outermost first.
    pub fn chain(&self) -> impl Iterator<Item = &ListenerFailure> {
        std::iter::successors(Some(self), |f| f.cause())
    }

    /// One line per failure in the chain, used for the `exception-stacktrace` header.
    pub fn stack_summary(&self) -> String {
        self.chain()
            .enumerate()
            .map(|(i, f)| {
                if i == 0 {
                    format!("{}: {}", f.kind, f.message)
                } else {
                    format!("Caused by: {}: {}", f.kind, f.message)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for ListenerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ListenerFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_outermost_first() {
        let failure = ListenerFailure::new("ListenerError", "outer")
            .caused_by(ListenerFailure::new("IoError", "inner"));
        let kinds: Vec<&str> = failure.chain().map(|f| f.kind().as_str()).collect();
        assert_eq!(kinds, vec!["ListenerError", "IoError"]);
    }

    #[test]
    fn test_stack_summary() {
        let failure = ListenerFailure::new("ListenerError", "outer")
            .caused_by(ListenerFailure::new("IoError", "inner"));
        assert_eq!(
            failure.stack_summary(),
            "ListenerError: outer\nCaused by: IoError: inner"
        );
    }

    #[test]
    fn test_error_source_is_cause() {
        use std::error::Error;
        let failure = ListenerFailure::new("A", "a").caused_by(ListenerFailure::new("B", "b"));
        assert_eq!(failure.source().map(|s| s.to_string()), Some("B: b".to_string()));
    }
}
