//! Shared helpers for binaries and broker operations.

pub mod bootstrap;
pub mod retry;
