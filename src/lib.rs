//! retrytopic - non-blocking retry topics for Kafka consumers.
//!
//! A failing record is republished along a chain of retry topics with
//! increasing delays and finally to a dead-letter topic, instead of blocking
//! the main consumer. See [`retrytopic`] for the routing core and [`bus`] for
//! the broker collaborators.

pub mod bus;
pub mod config;
pub mod error;
pub mod retrytopic;
pub mod utils;

pub use error::{Result, RetryTopicError};
