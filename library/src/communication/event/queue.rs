use crate::EmptyResult;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;

/// Describes a queue, the exchange it is bound to and the key it is bound with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDescriptor {
    exchange: String,
    queue: String,
    routing_key: String,
}

impl QueueDescriptor {
    /// Creates a new instance from raw parts
    pub fn new<E, Q, K>(exchange: E, queue: Q, routing_key: K) -> Self
    where
        E: Into<String>,
        Q: Into<String>,
        K: Into<String>,
    {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
            routing_key: routing_key.into(),
        }
    }

    /// Exchange from which messages are routed into the queue
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Name of the queue, declared durable when consumption starts
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Binding key between the exchange and the queue
    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }
}

impl fmt::Display for QueueDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({} <- {})", self.queue, self.routing_key, self.exchange)
    }
}

/// Broker provided information about a single delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryInfo {
    /// Channel scoped identifier of the delivery
    pub delivery_tag: u64,
    /// Exchange the message was originally published to
    pub exchange: String,
    /// Routing key the message was originally published with
    pub routing_key: String,
    /// Whether the message has been delivered before
    pub redelivered: bool,
}

/// Entry retrieved from a queue providing a raw payload
///
/// Every entry has to be terminated exactly once by either [acknowledging](RawQueueEntry::acknowledge)
/// or [rejecting](RawQueueEntry::reject) it. Both consume the entry so it can not be referenced
/// afterwards. Rejected entries are never requeued.
#[async_trait]
pub trait RawQueueEntry: Send {
    /// Payload of the item
    fn payload(&self) -> &[u8];

    /// Delivery information attached by the broker
    fn info(&self) -> &DeliveryInfo;

    /// Acknowledge the item as processed
    async fn acknowledge(self) -> EmptyResult;

    /// Reject the item without requeueing it
    async fn reject(self) -> EmptyResult;
}

/// Useful functions for [`RawQueueEntry`] implementations with default implementations
pub trait QueueEntry: RawQueueEntry {
    /// Error returned when the payload does not match the requested structure
    type ParseError: std::error::Error + Send + Sync + 'static;

    /// Attempts to parse the wire-format payload into a given data structure
    fn parse_payload<'a, T>(&'a self) -> Result<T, Self::ParseError>
    where
        T: Deserialize<'a>;
}
