//! Implementations of traits from this module using third-party crates

pub mod amqp;
pub mod json;

#[cfg(any(test, feature = "test"))]
pub mod mock;
