//! Structures to publish and consume messages
//!
//! Messages are published to an exchange and routed by their [routing key](Message::routing_key).
//! A [`QueueDescriptor`] names the queue a consumer reads from, the exchange it is bound to
//! and the binding key. Queues are declared durable and every delivery has to be terminated
//! manually. There is no automatic acknowledgement, a [`QueueEntry`] that is dropped without
//! being acknowledged or rejected stays unacknowledged until the broker redelivers it to
//! another consumer.

mod message;
mod publisher;
mod queue;
mod queue_provider;

pub use message::*;
pub use publisher::*;
pub use queue::*;
pub use queue_provider::*;
