//! Structures to communicate with other services through a message broker
//!
//! Communication is strictly one-directional and event driven. Producers publish a
//! [`Message`](event::Message) onto an exchange where the broker routes it, based on the
//! routing key of the message, into every queue bound with a matching key. Consumers on the
//! other end read [`QueueEntries`](event::QueueEntry) from one of those queues and have to
//! terminate each of them exactly once, either by acknowledging or by rejecting it.
//!
//! The traits are split into a raw, byte oriented layer which broker implementations provide
//! and a typed layer which is derived from it by the marker traits in
//! [`implementation::json`].

mod error;

pub mod event;
pub mod implementation;

pub use error::BlackboxError;
