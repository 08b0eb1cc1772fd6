//! Serialization and deserialization provided by [`serde_json`] using marker traits
//!
//! This module allows implementors of traits that allow raw access to underlying messaging systems
//! to provide the higher-level traits relying on serialization. It does so by providing
//! marker traits which, when implemented, provide default implementations of the higher-level traits
//! by translating between lower-level serialized data and higher-level strongly typed data by using
//! [`serde_json`].

use super::super::event::{
    Message, MessagePublisher, PublishError, QueueEntry, RawMessagePublisher, RawQueueEntry,
};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{instrument, trace};

/// Marker trait providing a default [`MessagePublisher`] implementation based on [`serde_json`]
pub trait JsonMessagePublisher: RawMessagePublisher + Send + Sync {}

#[async_trait]
impl<P> MessagePublisher for P
where
    P: JsonMessagePublisher,
{
    /// Serializes the message using [`serde_json::to_vec`]
    #[instrument(err, skip(self, message), fields(routing_key = message.routing_key()))]
    async fn publish<M: Message + Send + Sync>(
        &self,
        message: &M,
        exchange: &str,
    ) -> Result<(), PublishError> {
        trace!("Serializing message");
        let data = serde_json::to_vec(message)?;

        self.publish_raw(&data, exchange, message.routing_key(), &message.headers())
            .await
            .map_err(PublishError::Transport)
    }
}

/// Marker trait providing a default [`QueueEntry`] implementation based on [`serde_json`]
pub trait JsonQueueEntry: RawQueueEntry {}

impl<E> QueueEntry for E
where
    E: JsonQueueEntry,
{
    type ParseError = serde_json::Error;

    /// Parses the payload using [`serde_json::from_slice`]
    #[instrument(err, skip(self), fields(payload = std::any::type_name::<T>()))]
    fn parse_payload<'a, T>(&'a self) -> Result<T, Self::ParseError>
    where
        T: Deserialize<'a>,
    {
        trace!("Deserializing payload");
        serde_json::from_slice(self.payload())
    }
}
