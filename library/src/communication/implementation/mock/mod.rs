//! Test doubles for the traits of the [`event`](super::super::event) module
//!
//! Enabled for dependants through the `test` feature.

mod message_publisher;
mod queue_provider;

pub use message_publisher::*;
pub use queue_provider::*;

/// Strictness with which a mock verifies its expectations
#[derive(Clone, PartialEq, Eq)]
pub enum ExpectationMode {
    /// No validity checks of any sort, just a dummy
    Ignore,
    /// Only allows expected items and requires all of them
    ExpectOnlyProvided,
    /// Allows intermittent noise but still requires all expected
    /// items to eventually be published
    AllowNoise,
}
