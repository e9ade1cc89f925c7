//! Topology building and registration.
//!
//! `DestinationTopicProcessor::build` turns per-level properties into a
//! named chain (main, retries, DLT or NO_OPS). Chains are collected into a
//! [`Context`] on the configuration task and published to the shared
//! [`DestinationTopicRegistry`] in one swap. Readers always see either the
//! old or the new set of chains, never a mix.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use super::backoff::MAX_DELAY_MS;
use super::classifier::FatalExceptionClassifier;
use super::destination::{
    DestinationKind, DestinationTopic, DestinationTopicProperties, SameIntervalTopicReuseStrategy,
    TopicSuffixingStrategy,
};
use super::failure::{FailureKind, ListenerFailure};
use crate::error::{Result, RetryTopicError};

pub const DEFAULT_RETRY_SUFFIX: &str = "-retry";
pub const DEFAULT_DLT_SUFFIX: &str = "-dlt";
const NO_OPS_SUFFIX: &str = "-noops";

/// How destination names are derived from the source topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicNaming {
    pub retry_suffix: String,
    pub dlt_suffix: String,
    pub suffixing: TopicSuffixingStrategy,
    pub reuse: SameIntervalTopicReuseStrategy,
}

impl Default for TopicNaming {
    fn default() -> Self {
        Self {
            retry_suffix: DEFAULT_RETRY_SUFFIX.to_string(),
            dlt_suffix: DEFAULT_DLT_SUFFIX.to_string(),
            suffixing: TopicSuffixingStrategy::default(),
            reuse: SameIntervalTopicReuseStrategy::default(),
        }
    }
}

/// Routing rules shared by every node of a chain.
#[derive(Debug, Clone)]
pub struct RoutingPolicy {
    pub classifier: Arc<FatalExceptionClassifier>,
    /// Kinds retried in-process. Empty means every non-fatal kind.
    pub blocking_retry_on: Vec<FailureKind>,
    /// Give up on retry levels once this long has passed since the first failure.
    pub timeout_ms: Option<u64>,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            classifier: Arc::new(FatalExceptionClassifier::default()),
            blocking_retry_on: Vec::new(),
            timeout_ms: None,
        }
    }
}

impl RoutingPolicy {
    /// Whether this failure may be retried in-process on a non-reused node.
    pub fn blocks_on(&self, failure: &ListenerFailure) -> bool {
        if self.blocking_retry_on.is_empty() {
            return true;
        }
        let hierarchy = self.classifier.hierarchy();
        self.blocking_retry_on
            .iter()
            .any(|kind| hierarchy.is_a(failure.kind(), kind))
    }
}

/// The ordered destinations of one source topic.
#[derive(Debug, Clone)]
pub struct DestinationChain {
    source_topic: String,
    destinations: Vec<DestinationTopic>,
    policy: RoutingPolicy,
}

impl DestinationChain {
    pub fn source_topic(&self) -> &str {
        &self.source_topic
    }

    pub fn destinations(&self) -> &[DestinationTopic] {
        &self.destinations
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    pub fn position(&self, destination_name: &str) -> Option<usize> {
        self.destinations
            .iter()
            .position(|d| d.destination_name() == destination_name)
    }

    pub fn get(&self, destination_name: &str) -> Option<&DestinationTopic> {
        self.position(destination_name).map(|i| &self.destinations[i])
    }

    /// The DLT or NO_OPS node closing the chain.
    pub fn terminal(&self) -> &DestinationTopic {
        // build() guarantees a non-empty chain ending in a terminal node
        &self.destinations[self.destinations.len() - 1]
    }
}

/// Chains accumulated during one configuration pass.
#[derive(Debug, Default)]
pub struct Context {
    chains: Vec<DestinationChain>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chains(&self) -> &[DestinationChain] {
        &self.chains
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    fn add(&mut self, chain: DestinationChain) -> Result<()> {
        if self
            .chains
            .iter()
            .any(|c| c.source_topic == chain.source_topic)
        {
            return Err(RetryTopicError::configuration(format!(
                "topic '{}' is configured twice",
                chain.source_topic
            )));
        }
        self.chains.push(chain);
        Ok(())
    }
}

type ChainMap = HashMap<String, Arc<DestinationChain>>;

/// Registered chains, keyed by source topic. Copy-on-write.
#[derive(Debug, Default)]
pub struct DestinationTopicRegistry {
    chains: RwLock<Arc<ChainMap>>,
}

impl DestinationTopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot of every chain.
    pub fn snapshot(&self) -> Arc<ChainMap> {
        self.chains
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn chain(&self, source_topic: &str) -> Option<Arc<DestinationChain>> {
        self.snapshot().get(source_topic).cloned()
    }

    /// Replace the chains of every source topic in `chains`, atomically.
    fn publish(&self, chains: Vec<DestinationChain>) {
        let mut guard = self
            .chains
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next: ChainMap = guard.as_ref().clone();
        for chain in chains {
            next.insert(chain.source_topic.clone(), Arc::new(chain));
        }
        *guard = Arc::new(next);
    }
}

/// Builds chains and registers them.
#[derive(Debug, Clone)]
pub struct DestinationTopicProcessor {
    registry: Arc<DestinationTopicRegistry>,
}

impl DestinationTopicProcessor {
    pub fn new(registry: Arc<DestinationTopicRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<DestinationTopicRegistry> {
        &self.registry
    }

    /// Named, ordered destinations for `source_topic`.
    pub fn build(
        &self,
        source_topic: &str,
        properties: &[DestinationTopicProperties],
        naming: &TopicNaming,
    ) -> Result<Vec<DestinationTopic>> {
        validate_properties(source_topic, properties)?;

        let main = &properties[0];
        let terminal = &properties[properties.len() - 1];
        let groups = group_retry_levels(&properties[1..properties.len() - 1], naming.reuse);
        let retry_names = retry_topic_names(source_topic, &groups, naming);

        let mut destinations = Vec::with_capacity(groups.len() + 2);
        destinations.push(DestinationTopic::new(source_topic, source_topic, main));

        for (group, name) in groups.iter().zip(retry_names) {
            let topic = DestinationTopic::new(source_topic, name, group.properties);
            if group.levels > 1 {
                destinations.push(topic.into_reusable(group.max_attempts));
            } else {
                destinations.push(topic);
            }
        }

        let terminal_name = match terminal.kind {
            DestinationKind::Dlt => format!("{}{}", source_topic, naming.dlt_suffix),
            _ => format!("{}{}", source_topic, NO_OPS_SUFFIX),
        };
        destinations.push(DestinationTopic::new(source_topic, terminal_name, terminal));

        let mut seen = HashSet::new();
        if let Some(duplicate) = destinations
            .iter()
            .find(|d| !seen.insert(d.destination_name()))
        {
            return Err(RetryTopicError::configuration(format!(
                "destination name '{}' is used twice in the chain of '{}'",
                duplicate.destination_name(),
                source_topic
            )));
        }

        debug!(
            source_topic = %source_topic,
            destinations = destinations.len(),
            "Built destination chain"
        );
        Ok(destinations)
    }

    /// Build the chain for `source_topic` and add it to `context`.
    pub fn process(
        &self,
        context: &mut Context,
        source_topic: &str,
        properties: &[DestinationTopicProperties],
        naming: &TopicNaming,
        policy: RoutingPolicy,
    ) -> Result<()> {
        let destinations = self.build(source_topic, properties, naming)?;
        context.add(DestinationChain {
            source_topic: source_topic.to_string(),
            destinations,
            policy,
        })
    }

    /// Publish every chain in `context` to the registry.
    pub fn register(&self, context: Context) {
        for chain in &context.chains {
            info!(
                source_topic = %chain.source_topic,
                chain = %chain
                    .destinations
                    .iter()
                    .map(|d| d.destination_name())
                    .collect::<Vec<_>>()
                    .join(" -> "),
                "Registered retry topic chain"
            );
        }
        self.registry.publish(context.chains);
    }

    /// Visit every distinct destination that has a real topic, in chain order.
    pub fn for_each_destination<F>(&self, context: &Context, mut visitor: F)
    where
        F: FnMut(&DestinationTopic),
    {
        let mut seen = HashSet::new();
        for destination in context.chains.iter().flat_map(|c| c.destinations.iter()) {
            if destination.has_topic() && seen.insert(destination.destination_name().to_string()) {
                visitor(destination);
            }
        }
    }
}

fn validate_properties(source_topic: &str, properties: &[DestinationTopicProperties]) -> Result<()> {
    let invalid = |reason: &str| {
        Err(RetryTopicError::configuration(format!(
            "invalid chain for '{}': {}",
            source_topic, reason
        )))
    };

    if source_topic.is_empty() {
        return invalid("empty topic name");
    }
    if properties.len() < 2 {
        return invalid("a chain needs a main and a terminal node");
    }
    if properties[0].kind != DestinationKind::Main {
        return invalid("first node must be MAIN");
    }
    if !properties[properties.len() - 1].kind.is_terminal() {
        return invalid("last node must be DLT or NO_OPS");
    }
    let middle = &properties[1..properties.len() - 1];
    if middle.iter().any(|p| p.kind != DestinationKind::Retry) {
        return invalid("only RETRY nodes may sit between MAIN and the terminal node");
    }
    if properties.iter().any(|p| p.max_attempts < 1) {
        return invalid("every level needs at least one attempt");
    }
    if middle.windows(2).any(|w| w[0].delay_ms > w[1].delay_ms) {
        return invalid("retry delays must not decrease");
    }
    if properties.iter().any(|p| p.delay_ms > MAX_DELAY_MS) {
        return invalid("delay does not fit an epoch-millis due time");
    }
    Ok(())
}

struct RetryGroup<'a> {
    properties: &'a DestinationTopicProperties,
    levels: usize,
    max_attempts: u32,
}

fn group_retry_levels(
    levels: &[DestinationTopicProperties],
    reuse: SameIntervalTopicReuseStrategy,
) -> Vec<RetryGroup<'_>> {
    let mut groups: Vec<RetryGroup<'_>> = Vec::new();
    for level in levels {
        match groups.last_mut() {
            Some(group)
                if reuse == SameIntervalTopicReuseStrategy::SingleTopic
                    && group.properties.delay_ms == level.delay_ms =>
            {
                group.levels += 1;
                group.max_attempts += level.max_attempts;
            }
            _ => groups.push(RetryGroup {
                properties: level,
                levels: 1,
                max_attempts: level.max_attempts,
            }),
        }
    }
    groups
}

fn retry_topic_names(source_topic: &str, groups: &[RetryGroup<'_>], naming: &TopicNaming) -> Vec<String> {
    let base = format!("{}{}", source_topic, naming.retry_suffix);
    if groups.len() == 1 {
        return vec![base];
    }

    match naming.suffixing {
        TopicSuffixingStrategy::Index => (0..groups.len())
            .map(|i| format!("{}-{}", base, i))
            .collect(),
        TopicSuffixingStrategy::Delay => {
            let mut totals: HashMap<u64, usize> = HashMap::new();
            for group in groups {
                *totals.entry(group.properties.delay_ms).or_default() += 1;
            }
            let mut seen: HashMap<u64, usize> = HashMap::new();
            groups
                .iter()
                .map(|group| {
                    let delay = group.properties.delay_ms;
                    if totals.get(&delay).copied().unwrap_or(0) > 1 {
                        let occurrence = seen.entry(delay).or_default();
                        let name = format!("{}-{}-{}", base, delay, occurrence);
                        *occurrence += 1;
                        name
                    } else {
                        format!("{}-{}", base, delay)
                    }
                })
                .collect()
        }
    }
}
