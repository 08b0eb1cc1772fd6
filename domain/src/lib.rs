//! Data shapes moved through the ingestion pipeline and the backends they are resolved from
//!
//! Producers wrap every unit of collected data in a [`RawEnvelope`] which is published onto
//! the broker. After the raw data has been persisted, downstream transformers only receive a
//! lightweight [`NotificationEnvelope`] whose [`Selector`] points at the stored document. The
//! [`resolver`] module turns such a selector back into a typed envelope.

#![deny(missing_docs)]

mod envelope;
mod notification;

pub mod resolver;

pub use envelope::*;
pub use notification::*;
