use super::{QueueDescriptor, QueueEntry};
use crate::BoxedError;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Allows consumption of queues with manual acknowledgement
#[async_trait]
pub trait QueueProvider {
    /// Type of [`QueueEntry`] returned by the provider
    type Entry: QueueEntry + Send + Sync + 'static;

    /// Declares the queue, binds it to its exchange and subscribes to new entries
    ///
    /// The returned stream yields entries in the order the broker delivers them. It ends when
    /// the subscription is cancelled by the broker and ends right after yielding the first
    /// error, after which no further entries can be received from this provider.
    async fn consume(
        &self,
        queue: &QueueDescriptor,
    ) -> Result<BoxStream<'static, Result<Self::Entry, BoxedError>>, BoxedError>;
}
