//! Destination topics: the nodes of a retry chain.

use std::fmt;

use serde::Deserialize;

/// Role of a node in a retry chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestinationKind {
    Main,
    Retry,
    Dlt,
    /// Terminal node of a chain without a DLT. Records reaching it are dropped.
    NoOps,
}

impl DestinationKind {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Dlt | Self::NoOps)
    }
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Main => "MAIN",
            Self::Retry => "RETRY",
            Self::Dlt => "DLT",
            Self::NoOps => "NO_OPS",
        };
        f.write_str(name)
    }
}

/// Whether consecutive retry levels with the same delay share one topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SameIntervalTopicReuseStrategy {
    SingleTopic,
    #[default]
    MultipleTopics,
}

/// How retry topic names are made unique.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicSuffixingStrategy {
    /// `orders-retry-0`, `orders-retry-1`, ...
    #[default]
    Index,
    /// `orders-retry-1000`, `orders-retry-2000`, ...
    Delay,
}

/// One node of a retry chain. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationTopic {
    source_topic: String,
    destination_name: String,
    kind: DestinationKind,
    delay_ms: u64,
    max_attempts: u32,
    retries_on_dlt_enabled: bool,
    reusable: bool,
}

impl DestinationTopic {
    pub fn new(
        source_topic: impl Into<String>,
        destination_name: impl Into<String>,
        properties: &DestinationTopicProperties,
    ) -> Self {
        Self {
            source_topic: source_topic.into(),
            destination_name: destination_name.into(),
            kind: properties.kind,
            delay_ms: properties.delay_ms,
            max_attempts: properties.max_attempts,
            retries_on_dlt_enabled: properties.retries_on_dlt_enabled,
            reusable: false,
        }
    }

    pub(crate) fn into_reusable(mut self, max_attempts: u32) -> Self {
        self.reusable = true;
        self.max_attempts = max_attempts;
        self
    }

    pub fn source_topic(&self) -> &str {
        &self.source_topic
    }

    pub fn destination_name(&self) -> &str {
        &self.destination_name
    }

    pub fn kind(&self) -> DestinationKind {
        self.kind
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn retries_on_dlt_enabled(&self) -> bool {
        self.retries_on_dlt_enabled
    }

    /// Collapsed node that tracks attempts through the attempts header.
    pub fn is_reusable(&self) -> bool {
        self.reusable
    }

    pub fn is_main(&self) -> bool {
        self.kind == DestinationKind::Main
    }

    pub fn is_dlt(&self) -> bool {
        self.kind == DestinationKind::Dlt
    }

    pub fn is_no_ops(&self) -> bool {
        self.kind == DestinationKind::NoOps
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    /// Whether records arriving here are consumed from a real topic.
    pub fn has_topic(&self) -> bool {
        !self.is_no_ops()
    }
}

impl fmt::Display for DestinationTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] delay={}ms attempts={}",
            self.destination_name, self.kind, self.delay_ms, self.max_attempts
        )?;
        if self.reusable {
            f.write_str(" reused")?;
        }
        Ok(())
    }
}

/// Per-level settings a chain is built from, before naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationTopicProperties {
    pub kind: DestinationKind,
    pub delay_ms: u64,
    pub max_attempts: u32,
    pub retries_on_dlt_enabled: bool,
}

impl DestinationTopicProperties {
    /// MAIN, one RETRY per delay, then DLT (or NO_OPS without a DLT).
    /// The terminal node is consumed without delay.
    ///
    /// Every MAIN/RETRY level allows `attempts_per_level` in-process attempts.
    pub fn for_chain(
        delays_ms: &[u64],
        attempts_per_level: u32,
        dlt_enabled: bool,
        retries_on_dlt_enabled: bool,
    ) -> Vec<Self> {
        let level = |kind, delay_ms| Self {
            kind,
            delay_ms,
            max_attempts: attempts_per_level,
            retries_on_dlt_enabled,
        };

        let mut properties = Vec::with_capacity(delays_ms.len() + 2);
        properties.push(level(DestinationKind::Main, 0));
        properties.extend(delays_ms.iter().map(|d| level(DestinationKind::Retry, *d)));

        let terminal_kind = if dlt_enabled {
            DestinationKind::Dlt
        } else {
            DestinationKind::NoOps
        };
        properties.push(Self {
            kind: terminal_kind,
            delay_ms: 0,
            max_attempts: 1,
            retries_on_dlt_enabled,
        });
        properties
    }
}
