use super::super::json::JsonMessagePublisher;
use super::fatal::{connection_lost, spawn_fatal_close_watcher, FatalCloseNotifier};
use super::{AmqpQueueEntry, FatalClosePolicy, CONTENT_TYPE_JSON, PREFETCH_COUNT, REPLY_SUCCESS};
use crate::communication::event::{QueueDescriptor, QueueProvider, RawMessagePublisher};
use crate::communication::BlackboxError;
use crate::{BoxedError, EmptyResult};
use async_trait::async_trait;
use futures::future;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// Errors raised by the [`BrokerGateway`]
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Dialing the broker or opening the channel failed
    #[error("failed to connect to the broker")]
    Connection(#[source] lapin::Error),
    /// The gateway has been closed and can not be used anymore
    #[error("gateway has been closed")]
    Closed,
    /// Declaring the queue failed
    #[error("failed to declare queue {queue}")]
    Declare {
        /// Name of the queue
        queue: String,
        /// Underlying protocol error
        #[source]
        source: lapin::Error,
    },
    /// Binding the queue to its exchange failed
    #[error("failed binding queue {queue} to exchange {exchange}")]
    Bind {
        /// Name of the queue
        queue: String,
        /// Name of the exchange
        exchange: String,
        /// Underlying protocol error
        #[source]
        source: lapin::Error,
    },
    /// Registering the consumer failed
    #[error("failed registering consumer for queue {queue}")]
    Consume {
        /// Name of the queue
        queue: String,
        /// Underlying protocol error
        #[source]
        source: lapin::Error,
    },
    /// Handing a message to the broker failed
    #[error("error sending amqp message")]
    Publish(#[source] lapin::Error),
}

/// Single connection and channel pair to an AMQP broker
///
/// Each gateway assumes a single owner using it sequentially. Producers sharing one gateway
/// should go through a serializing layer instead of publishing concurrently.
///
/// - [`MessagePublisher`](crate::communication::event::MessagePublisher) implementation using `basic.publish`
/// - [`QueueProvider`] implementation using `queue.declare`, `queue.bind` and `basic.consume`
pub struct BrokerGateway {
    label: String,
    connection: Option<Connection>,
    channel: Option<Channel>,
    notifier: Arc<FatalCloseNotifier>,
    lost: watch::Receiver<Option<BlackboxError>>,
}

impl BrokerGateway {
    /// Connects to the broker using the [default policy](FatalClosePolicy::default)
    pub async fn connect(uri: &str, label: &str) -> Result<Self, GatewayError> {
        Self::connect_with_policy(uri, label, FatalClosePolicy::default()).await
    }

    /// Connects to the broker, opens a channel and installs the fatal close policy
    ///
    /// The `label` is sent to the broker as the human-readable connection name.
    #[instrument(skip(uri, policy))]
    pub async fn connect_with_policy(
        uri: &str,
        label: &str,
        policy: FatalClosePolicy,
    ) -> Result<Self, GatewayError> {
        let properties = ConnectionProperties::default()
            .with_connection_name(label.into())
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio);

        debug!("Dialing broker");
        let connection = Connection::connect(uri, properties)
            .await
            .map_err(GatewayError::Connection)?;

        let channel = connection
            .create_channel()
            .await
            .map_err(GatewayError::Connection)?;

        channel
            .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
            .await
            .map_err(GatewayError::Connection)?;

        let (notifier, closed) = FatalCloseNotifier::new();
        let notifier = Arc::new(notifier);
        let lost = spawn_fatal_close_watcher(label.to_owned(), closed, policy);

        let hook = notifier.clone();
        connection.on_error(move |error| {
            hook.notify(BlackboxError::new(error));
        });

        info!("Connected to broker");

        Ok(Self {
            label: label.to_owned(),
            connection: Some(connection),
            channel: Some(channel),
            notifier,
            lost,
        })
    }

    /// Human-readable name of the connection
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Releases the channel and then the connection
    ///
    /// Calling this more than once is a no-op. A deliberate close never triggers the fatal
    /// close policy.
    #[instrument(skip(self), fields(connection = %self.label))]
    pub async fn close(&mut self) {
        self.notifier.disarm();

        if let Some(channel) = self.channel.take() {
            if channel.status().connected() {
                if let Err(error) = channel.close(REPLY_SUCCESS, "closing").await {
                    warn!(?error, "Failed to close channel");
                }
            }
        }

        if let Some(connection) = self.connection.take() {
            if connection.status().connected() {
                if let Err(error) = connection.close(REPLY_SUCCESS, "closing").await {
                    warn!(?error, "Failed to close connection");
                }
            }
            debug!("Connection released");
        }
    }

    fn channel(&self) -> Result<&Channel, GatewayError> {
        self.channel.as_ref().ok_or(GatewayError::Closed)
    }
}

impl JsonMessagePublisher for BrokerGateway {}

#[async_trait]
impl RawMessagePublisher for BrokerGateway {
    async fn publish_raw(
        &self,
        data: &[u8],
        exchange: &str,
        routing_key: &str,
        headers: &[(String, String)],
    ) -> EmptyResult {
        let channel = self.channel()?;

        let mut table = FieldTable::default();
        for (key, value) in headers {
            table.insert(key.as_str().into(), AMQPValue::LongString(value.as_str().into()));
        }

        let properties = BasicProperties::default()
            .with_content_type(CONTENT_TYPE_JSON.into())
            .with_headers(table);

        channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                data,
                properties,
            )
            .await
            .map_err(GatewayError::Publish)?
            .await
            .map_err(GatewayError::Publish)?;

        Ok(())
    }
}

#[async_trait]
impl QueueProvider for BrokerGateway {
    type Entry = AmqpQueueEntry;

    /// Consumes a queue using the following steps:
    ///
    /// 1. Declare the queue as durable if it does not exist
    /// 2. Bind it to the exchange with the routing key
    /// 3. Register a consumer with manual acknowledgement
    /// 4. Merge the deliveries with the connection loss notification
    #[instrument(skip(self, queue), fields(connection = %self.label, queue = %queue))]
    async fn consume(
        &self,
        queue: &QueueDescriptor,
    ) -> Result<BoxStream<'static, Result<Self::Entry, BoxedError>>, BoxedError> {
        let channel = self.channel()?;

        let declared = channel
            .queue_declare(
                queue.queue(),
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|source| GatewayError::Declare {
                queue: queue.queue().to_owned(),
                source,
            })?;

        let name = declared.name().as_str();

        channel
            .queue_bind(
                name,
                queue.exchange(),
                queue.routing_key(),
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|source| GatewayError::Bind {
                queue: name.to_owned(),
                exchange: queue.exchange().to_owned(),
                source,
            })?;

        let consumer = channel
            .basic_consume(
                name,
                "",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|source| GatewayError::Consume {
                queue: name.to_owned(),
                source,
            })?;

        debug!("Registered consumer");

        let deliveries = consumer.map(|delivery| {
            delivery
                .map(AmqpQueueEntry::from)
                .map_err(BoxedError::from)
        });
        let lost = connection_lost(self.lost.clone()).map(Err);

        Ok(end_after_first_error(until_deliveries_end(deliveries, lost)).boxed())
    }
}

/// Merges both streams but ends as soon as the deliveries end
///
/// The connection loss stream stays pending for the lifetime of the gateway, so a consumer
/// cancelled by the broker would otherwise never end the merged stream.
fn until_deliveries_end<D, L, T>(deliveries: D, lost: L) -> impl Stream<Item = T>
where
    D: Stream<Item = T>,
    L: Stream<Item = T>,
{
    let deliveries = deliveries
        .map(Some)
        .chain(stream::once(future::ready(None)));

    stream::select(deliveries, lost.map(Some))
        .take_while(|item| future::ready(item.is_some()))
        .filter_map(future::ready)
}

/// Passes items through until the first error which is yielded before the stream ends
fn end_after_first_error<S, T, E>(stream: S) -> impl Stream<Item = Result<T, E>>
where
    S: Stream<Item = Result<T, E>>,
{
    stream.scan(false, |failed, item| {
        if *failed {
            return future::ready(None);
        }

        *failed = item.is_err();
        future::ready(Some(item))
    })
}
