//! Backoff policy generation.
//!
//! A [`BackoffSpec`] is turned into the concrete delay of every retry level
//! once, when the topology is built. Records never recompute delays.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::error::{Result, RetryTopicError};

/// Delay used when nothing else is configured, in milliseconds.
pub const DEFAULT_DELAY_MS: u64 = 1000;

/// Largest accepted delay, in milliseconds.
pub const MAX_DELAY_MS: u64 = i64::MAX as u64;

/// Backoff specification for a retry chain.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffSpec {
    Fixed {
        delay_ms: u64,
    },
    UniformRandom {
        min_ms: u64,
        max_ms: u64,
    },
    Exponential {
        initial_ms: u64,
        multiplier: f64,
        max_ms: u64,
    },
    ExponentialRandom {
        initial_ms: u64,
        multiplier: f64,
        max_ms: u64,
    },
    /// Delays used verbatim. The attempt count becomes `len + 1`.
    Explicit {
        delays_ms: Vec<u64>,
    },
}

impl Default for BackoffSpec {
    fn default() -> Self {
        Self::Fixed {
            delay_ms: DEFAULT_DELAY_MS,
        }
    }
}

impl BackoffSpec {
    pub fn is_random(&self) -> bool {
        matches!(self, Self::UniformRandom { .. } | Self::ExponentialRandom { .. })
    }

    /// Attempt count implied by an explicit delay list, if any.
    pub fn implied_max_attempts(&self) -> Option<u32> {
        match self {
            Self::Explicit { delays_ms } => Some(delays_ms.len() as u32 + 1),
            _ => None,
        }
    }

    /// Reject malformed parameters.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Fixed { delay_ms } => check_delay(*delay_ms),
            Self::UniformRandom { min_ms, max_ms } => {
                if min_ms > max_ms {
                    return Err(RetryTopicError::configuration(format!(
                        "uniform random backoff has min {}ms above max {}ms",
                        min_ms, max_ms
                    )));
                }
                check_delay(*max_ms)
            }
            Self::Exponential {
                initial_ms,
                multiplier,
                max_ms,
            }
            | Self::ExponentialRandom {
                initial_ms,
                multiplier,
                max_ms,
            } => {
                if !multiplier.is_finite() || *multiplier <= 1.0 {
                    return Err(RetryTopicError::configuration(format!(
                        "exponential backoff multiplier must be finite and greater than 1, got {}",
                        multiplier
                    )));
                }
                if max_ms < initial_ms {
                    return Err(RetryTopicError::configuration(format!(
                        "exponential backoff has initial {}ms above max {}ms",
                        initial_ms, max_ms
                    )));
                }
                check_delay(*max_ms)
            }
            Self::Explicit { delays_ms } => delays_ms.iter().try_for_each(|d| check_delay(*d)),
        }
    }
}

/// Delays must fit an epoch-millis due time.
fn check_delay(delay_ms: u64) -> Result<()> {
    if delay_ms > MAX_DELAY_MS {
        return Err(RetryTopicError::configuration(format!(
            "backoff delay {}ms exceeds the maximum of {}ms",
            delay_ms, MAX_DELAY_MS
        )));
    }
    Ok(())
}

/// Computes retry delays from a [`BackoffSpec`].
pub struct BackoffPolicyGenerator {
    rng: StdRng,
}

impl Default for BackoffPolicyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl BackoffPolicyGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic generator for reproducible random delays.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Delays for the retry levels, `max_attempts - 1` of them.
    ///
    /// Explicit lists ignore `max_attempts`. Uniform random delays come back
    /// sorted so the chain stays non-decreasing.
    pub fn generate(&mut self, spec: &BackoffSpec, max_attempts: u32) -> Result<Vec<u64>> {
        spec.validate()?;

        if spec.implied_max_attempts().is_none() && max_attempts < 1 {
            return Err(RetryTopicError::configuration(
                "max attempts must be at least 1",
            ));
        }
        let levels = max_attempts.saturating_sub(1) as usize;

        let delays = match *spec {
            BackoffSpec::Explicit { ref delays_ms } => delays_ms.clone(),
            BackoffSpec::Fixed { delay_ms } => vec![delay_ms; levels],
            BackoffSpec::UniformRandom { min_ms, max_ms } => {
                let mut delays: Vec<u64> = (0..levels)
                    .map(|_| self.rng.random_range(min_ms..=max_ms))
                    .collect();
                delays.sort_unstable();
                delays
            }
            BackoffSpec::Exponential {
                initial_ms,
                multiplier,
                max_ms,
            } => (0..levels)
                .map(|i| capped(initial_ms as f64 * multiplier.powi(i as i32), max_ms))
                .collect(),
            BackoffSpec::ExponentialRandom {
                initial_ms,
                multiplier,
                max_ms,
            } => {
                let mut delays = Vec::with_capacity(levels);
                let mut current = initial_ms.min(max_ms);
                for i in 0..levels {
                    if i > 0 {
                        let factor = self.rng.random_range(1.0..=multiplier);
                        current = capped(current as f64 * factor, max_ms);
                    }
                    delays.push(current);
                }
                delays
            }
        };

        Ok(delays)
    }
}

fn capped(delay: f64, max_ms: u64) -> u64 {
    if delay >= max_ms as f64 {
        max_ms
    } else {
        delay.round() as u64
    }
}
