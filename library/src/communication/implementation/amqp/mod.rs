//! Trait implementations using [`lapin`](::lapin), an AMQP 0.9.1 client
//!
//! A [`BrokerGateway`] owns exactly one connection and one channel. It publishes
//! [`Messages`](crate::communication::event::Message) as JSON and consumes queues with
//! manual acknowledgement and a prefetch of [`PREFETCH_COUNT`].
//!
//! The gateway can not recover a lost connection. Whenever the connection terminates
//! unexpectedly, the configured [`FatalClosePolicy`] decides whether the loss is surfaced to
//! consumers of the gateway or whether the process is aborted right away. In both cases an
//! external supervisor is expected to restart the process.

/// Maximum number of unacknowledged deliveries the broker grants one consumer
pub const PREFETCH_COUNT: u16 = 3;

const CONTENT_TYPE_JSON: &str = "application/json";
const REPLY_SUCCESS: u16 = 200;

mod fatal;
mod gateway;
mod queue_entry;

pub use fatal::*;
pub use gateway::*;
pub use queue_entry::*;
