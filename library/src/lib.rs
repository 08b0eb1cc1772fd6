//! Project agnostic messaging plumbing
//!
//! Everything in this crate is independent of the data that is being moved around. It provides
//! the traits through which messages are published onto and consumed from a broker, a
//! [`serde_json`] based implementation of the higher-level traits and an AMQP backed
//! [`BrokerGateway`](communication::implementation::amqp::BrokerGateway) implementing them.
//! Domain specific types live in the `domain` crate.

#![deny(missing_docs)]

pub mod communication;

/// Generic error type
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result with no value and a [`BoxedError`]
pub type EmptyResult = Result<(), BoxedError>;
