use super::Message;
use crate::{BoxedError, EmptyResult};
use async_trait::async_trait;
use thiserror::Error;

/// Failure while publishing a [`Message`]
#[derive(Debug, Error)]
pub enum PublishError {
    /// Message could not be converted into its wire format
    #[error("error marshalling message to json")]
    Serialization(#[from] serde_json::Error),
    /// Serialized message could not be handed to the broker
    #[error("error sending message to the broker")]
    Transport(#[source] BoxedError),
}

/// Structure which allows publishing of serialized data onto an exchange
#[async_trait]
pub trait RawMessagePublisher {
    /// Sends an opaque payload to an exchange using the given routing key and headers
    async fn publish_raw(
        &self,
        data: &[u8],
        exchange: &str,
        routing_key: &str,
        headers: &[(String, String)],
    ) -> EmptyResult;
}

/// Publisher for [`Messages`](Message)
#[async_trait]
pub trait MessagePublisher {
    /// Publishes a [`Message`] onto the given exchange
    async fn publish<M: Message + Send + Sync>(
        &self,
        message: &M,
        exchange: &str,
    ) -> Result<(), PublishError>;
}
