use async_trait::async_trait;
use domain::resolver::{RawDataResolver, RawDataResolverExt, ResolveError};
use domain::{NotificationEnvelope, RawEnvelope, Selector};
use futures::future::{self, Future};
use futures::StreamExt;
use library::communication::event::{
    DeliveryInfo, QueueDescriptor, QueueEntry, QueueProvider, RawQueueEntry,
};
use library::communication::BlackboxError;
use library::{BoxedError, EmptyResult};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, debug_span, error, info, info_span, warn, Instrument, Span};

/// Caller logic invoked for every resolved raw document
#[async_trait]
pub trait Transformer {
    /// Type the payload of the raw document is decoded into
    type Rawdata: DeserializeOwned + Send + 'static;
    /// Type the metadata of the raw document is decoded into
    type Metadata: DeserializeOwned + Send + 'static;

    /// Processes a raw document, returning an error rejects the delivery
    async fn transform(
        &self,
        context: &DeliveryContext,
        raw: RawEnvelope<Self::Rawdata, Self::Metadata>,
    ) -> EmptyResult;
}

/// Information about the delivery a [`Transformer`] is currently handling
#[derive(Debug, Clone)]
pub struct DeliveryContext {
    info: DeliveryInfo,
    selector: Selector,
}

impl DeliveryContext {
    /// Broker provided delivery information
    pub fn info(&self) -> &DeliveryInfo {
        &self.info
    }

    /// Reference to the raw document that has been resolved
    pub fn selector(&self) -> &Selector {
        &self.selector
    }
}

/// Failure local to a single delivery, always resulting in a reject
#[derive(Debug, Error)]
pub enum MessageError {
    /// Body is not a notification
    #[error("failed to decode notification")]
    Notification(#[source] BoxedError),
    /// Referenced raw document could not be fetched
    #[error("failed to resolve raw data")]
    Resolve(#[from] ResolveError),
    /// Transformer reported a failure
    #[error("failed to transform raw data")]
    Handler(#[source] BoxedError),
}

/// Conditions under which a [`TransformerStack`] stops consuming
///
/// None of them can be recovered from without a new broker connection.
#[derive(Debug, Error)]
pub enum TransformerError {
    /// Declaring, binding or subscribing to the queue failed
    #[error("failed to subscribe to queue {queue}")]
    Subscribe {
        /// Queue which has been subscribed to
        queue: String,
        /// Underlying cause
        #[source]
        source: BoxedError,
    },
    /// The connection to the broker has been lost
    #[error("lost connection to the broker")]
    ConnectionLost(#[source] BoxedError),
    /// The broker ended the subscription without it being requested
    #[error("consumer has been closed by the broker")]
    ConsumerClosed,
    /// Acknowledging a delivery failed, the broker state is unknown
    #[error("failed to acknowledge delivery {delivery_tag}")]
    Acknowledge {
        /// Tag of the affected delivery
        delivery_tag: u64,
        /// Underlying cause
        #[source]
        source: BoxedError,
    },
    /// Rejecting a delivery failed, the broker state is unknown
    #[error("failed to reject delivery {delivery_tag}")]
    Reject {
        /// Tag of the affected delivery
        delivery_tag: u64,
        /// Underlying cause
        #[source]
        source: BoxedError,
    },
}

impl TransformerError {
    /// Whether the broker connection has to be considered broken
    ///
    /// Only an unrequested end of the subscription leaves the connection intact.
    pub fn is_connection_failure(&self) -> bool {
        !matches!(self, TransformerError::ConsumerClosed)
    }
}

/// Consume-resolve-handle-acknowledge loop for a single queue
///
/// Deliveries are handled strictly one after another. Every delivery is terminated exactly once:
/// it is acknowledged when the [`Transformer`] succeeds and rejected without requeueing when any
/// step before that fails. Failures to acknowledge or reject are fatal.
pub struct TransformerStack<Q, R> {
    provider: Q,
    resolver: R,
    queue: QueueDescriptor,
    span: Span,
}

impl<Q, R> TransformerStack<Q, R>
where
    Q: QueueProvider + Send + Sync,
    R: RawDataResolver + Send + Sync,
{
    /// Creates a new stack consuming the given queue
    pub fn new(provider: Q, resolver: R, queue: QueueDescriptor) -> Self {
        let span = info_span!("transformer", queue = %queue);

        Self {
            provider,
            resolver,
            queue,
            span,
        }
    }

    /// Runs the loop inside the given span instead of the default one
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Queue that is being consumed
    pub fn queue(&self) -> &QueueDescriptor {
        &self.queue
    }

    /// Provider the deliveries are consumed from
    pub fn provider(&self) -> &Q {
        &self.provider
    }

    /// Resolver used to fetch the raw documents
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Dismantles the stack, e.g. to close the provider once consumption has stopped
    pub fn into_parts(self) -> (Q, R) {
        (self.provider, self.resolver)
    }

    /// Consumes the queue until a fatal error occurs
    ///
    /// Since the loop is expected to run until the process terminates, this never returns `Ok`.
    pub async fn start<T>(&self, transformer: &T) -> TransformerError
    where
        T: Transformer + Sync,
    {
        match self.start_until(transformer, future::pending()).await {
            Ok(()) => TransformerError::ConsumerClosed,
            Err(error) => error,
        }
    }

    /// Consumes the queue until either a fatal error occurs or `shutdown` resolves
    ///
    /// The delivery that is being handled when the shutdown is requested is terminated before
    /// returning. Deliveries received but not yet handled are returned to the queue by the
    /// broker once the subscription is dropped.
    pub async fn start_until<T, S>(&self, transformer: &T, shutdown: S) -> Result<(), TransformerError>
    where
        T: Transformer + Sync,
        S: Future<Output = ()> + Send,
    {
        self.run(transformer, shutdown)
            .instrument(self.span.clone())
            .await
    }

    async fn run<T, S>(&self, transformer: &T, shutdown: S) -> Result<(), TransformerError>
    where
        T: Transformer + Sync,
        S: Future<Output = ()> + Send,
    {
        let mut entries =
            self.provider
                .consume(&self.queue)
                .await
                .map_err(|source| TransformerError::Subscribe {
                    queue: self.queue.queue().to_owned(),
                    source,
                })?;

        info!("Consuming deliveries");

        tokio::pin!(shutdown);

        loop {
            let item = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    return Ok(());
                }
                item = entries.next() => item,
            };

            match item {
                Some(Ok(entry)) => self.handle(transformer, entry).await?,
                Some(Err(cause)) => {
                    let cause = BlackboxError::from_boxed(cause);
                    error!(error = %cause, "Lost connection to the broker");
                    return Err(TransformerError::ConnectionLost(cause.into()));
                }
                None => {
                    error!("Consumer has been closed by the broker");
                    return Err(TransformerError::ConsumerClosed);
                }
            }
        }
    }

    async fn handle<T>(&self, transformer: &T, entry: Q::Entry) -> Result<(), TransformerError>
    where
        T: Transformer + Sync,
    {
        let info = entry.info().clone();
        let delivery_tag = info.delivery_tag;
        let span = debug_span!(
            "delivery",
            delivery_tag,
            routing_key = %info.routing_key,
            redelivered = info.redelivered
        );

        async move {
            debug!("Received delivery");

            match self.process(transformer, &entry, info).await {
                Ok(()) => {
                    entry
                        .acknowledge()
                        .await
                        .map_err(|source| TransformerError::Acknowledge {
                            delivery_tag,
                            source,
                        })?;

                    debug!("Acknowledged delivery");
                }
                Err(error) => {
                    warn!(error = %BlackboxError::new(error), "Rejecting delivery");

                    entry
                        .reject()
                        .await
                        .map_err(|source| TransformerError::Reject {
                            delivery_tag,
                            source,
                        })?;
                }
            }

            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn process<T>(
        &self,
        transformer: &T,
        entry: &Q::Entry,
        info: DeliveryInfo,
    ) -> Result<(), MessageError>
    where
        T: Transformer + Sync,
    {
        let notification: NotificationEnvelope = entry
            .parse_payload()
            .map_err(|e| MessageError::Notification(e.into()))?;

        let selector = notification.selector();
        debug!(%selector, "Resolving raw data");

        let raw = self
            .resolver
            .fetch_as::<T::Rawdata, T::Metadata>(selector)
            .await?;

        let context = DeliveryContext {
            info,
            selector: selector.clone(),
        };

        transformer
            .transform(&context, raw)
            .await
            .map_err(MessageError::Handler)
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use chrono::{DateTime, Utc};
    use library::communication::implementation::mock::{MockDisposition, MockQueueProvider};
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Reading {
        x: u32,
    }

    /// Resolver serving envelopes from memory, keyed by the displayed selector
    #[derive(Default)]
    struct MemoryResolver {
        documents: HashMap<String, RawEnvelope<Value, Value>>,
        fetched: AtomicUsize,
    }

    impl MemoryResolver {
        fn with(mut self, urn: &str, rawdata: Value) -> Self {
            let timestamp: DateTime<Utc> = "2024-03-01T12:00:00Z".parse().unwrap();
            self.documents
                .insert(urn.to_owned(), RawEnvelope::new("p1", timestamp, rawdata));
            self
        }

        fn fetched(&self) -> usize {
            self.fetched.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RawDataResolver for MemoryResolver {
        type Payload = Value;
        type Metadata = Value;

        async fn fetch(
            &self,
            selector: &Selector,
        ) -> Result<RawEnvelope<Value, Value>, ResolveError> {
            self.fetched.fetch_add(1, Ordering::SeqCst);
            self.documents
                .get(&selector.to_string())
                .cloned()
                .ok_or(ResolveError::NotFound)
        }
    }

    /// Transformer recording every reading it receives
    #[derive(Default)]
    struct RecordingTransformer {
        readings: Mutex<Vec<(u64, u32)>>,
        failing: bool,
    }

    impl RecordingTransformer {
        fn failing() -> Self {
            Self {
                failing: true,
                ..Default::default()
            }
        }

        fn readings(&self) -> Vec<(u64, u32)> {
            self.readings.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transformer for RecordingTransformer {
        type Rawdata = Reading;
        type Metadata = Value;

        async fn transform(
            &self,
            context: &DeliveryContext,
            raw: RawEnvelope<Reading, Value>,
        ) -> EmptyResult {
            self.readings
                .lock()
                .unwrap()
                .push((context.info().delivery_tag, raw.rawdata().x));

            if self.failing {
                Err("transformer refused reading".into())
            } else {
                Ok(())
            }
        }
    }

    fn queue() -> QueueDescriptor {
        QueueDescriptor::new("routed", "p1-transformer", "p1")
    }

    fn notification(urn: &str) -> NotificationEnvelope {
        NotificationEnvelope::for_urn(urn)
    }

    #[tokio::test]
    async fn acknowledge_handled_delivery() {
        let provider = MockQueueProvider::new().deliver(&notification("urn:x:1"));
        let resolver = MemoryResolver::default().with("urn:x:1", json!({ "x": 1 }));
        let stack = TransformerStack::new(provider, resolver, queue());
        let transformer = RecordingTransformer::default();

        let error = stack.start(&transformer).await;

        assert!(matches!(error, TransformerError::ConsumerClosed));
        assert_eq!(transformer.readings(), vec![(1, 1)]);
        assert_eq!(
            stack.provider().dispositions(),
            vec![(1, MockDisposition::Acknowledged)]
        );
        assert_eq!(stack.provider().subscriptions(), vec![queue()]);
    }

    #[tokio::test]
    async fn reject_malformed_body_and_continue() {
        let provider = MockQueueProvider::new()
            .deliver_raw("definitely not json")
            .deliver(&json!({ "unrelated": true }))
            .deliver(&notification("urn:x:1"));
        let resolver = MemoryResolver::default().with("urn:x:1", json!({ "x": 1 }));
        let stack = TransformerStack::new(provider, resolver, queue());
        let transformer = RecordingTransformer::default();

        stack.start(&transformer).await;

        assert_eq!(
            stack.provider().dispositions(),
            vec![
                (1, MockDisposition::Rejected),
                (2, MockDisposition::Rejected),
                (3, MockDisposition::Acknowledged)
            ]
        );
        assert_eq!(stack.resolver().fetched(), 1);
    }

    #[tokio::test]
    async fn reject_unresolvable_delivery_without_handling() {
        let provider = MockQueueProvider::new().deliver(&notification("urn:x:1"));
        let stack = TransformerStack::new(provider, MemoryResolver::default(), queue());
        let transformer = RecordingTransformer::default();

        stack.start(&transformer).await;

        assert!(transformer.readings().is_empty());
        assert_eq!(stack.provider().count(MockDisposition::Rejected), 1);
        assert_eq!(stack.provider().count(MockDisposition::Acknowledged), 0);
    }

    #[tokio::test]
    async fn reject_mismatching_payload_without_handling() {
        let provider = MockQueueProvider::new().deliver(&notification("urn:x:1"));
        let resolver = MemoryResolver::default().with("urn:x:1", json!("not a reading"));
        let stack = TransformerStack::new(provider, resolver, queue());
        let transformer = RecordingTransformer::default();

        stack.start(&transformer).await;

        assert!(transformer.readings().is_empty());
        assert_eq!(
            stack.provider().dispositions(),
            vec![(1, MockDisposition::Rejected)]
        );
    }

    #[tokio::test]
    async fn reject_failed_handling_without_refetch() {
        let provider = MockQueueProvider::new().deliver(&notification("urn:x:1"));
        let resolver = MemoryResolver::default().with("urn:x:1", json!({ "x": 1 }));
        let stack = TransformerStack::new(provider, resolver, queue());
        let transformer = RecordingTransformer::failing();

        stack.start(&transformer).await;

        assert_eq!(transformer.readings(), vec![(1, 1)]);
        assert_eq!(stack.resolver().fetched(), 1);
        assert_eq!(
            stack.provider().dispositions(),
            vec![(1, MockDisposition::Rejected)]
        );
    }

    #[tokio::test]
    async fn surface_connection_loss() {
        let provider = MockQueueProvider::new()
            .deliver(&notification("urn:x:1"))
            .lose_connection("connection reset by peer");
        let resolver = MemoryResolver::default().with("urn:x:1", json!({ "x": 1 }));
        let stack = TransformerStack::new(provider, resolver, queue());

        let error = stack.start(&RecordingTransformer::default()).await;

        assert!(error.is_connection_failure());
        assert!(matches!(error, TransformerError::ConnectionLost(_)));
        assert_eq!(stack.provider().count(MockDisposition::Acknowledged), 1);
    }

    #[tokio::test]
    async fn treat_failed_acknowledgement_as_fatal() {
        let provider = MockQueueProvider::new()
            .deliver(&notification("urn:x:1"))
            .deliver(&notification("urn:x:1"))
            .failing_terminations();
        let resolver = MemoryResolver::default().with("urn:x:1", json!({ "x": 1 }));
        let stack = TransformerStack::new(provider, resolver, queue());
        let transformer = RecordingTransformer::default();

        let error = stack.start(&transformer).await;

        assert!(matches!(
            error,
            TransformerError::Acknowledge { delivery_tag: 1, .. }
        ));
        assert_eq!(transformer.readings(), vec![(1, 1)]);
    }

    #[tokio::test]
    async fn treat_failed_rejection_as_fatal() {
        let provider = MockQueueProvider::new()
            .deliver_raw("{")
            .failing_terminations();
        let stack = TransformerStack::new(provider, MemoryResolver::default(), queue());

        let error = stack.start(&RecordingTransformer::default()).await;

        assert!(matches!(
            error,
            TransformerError::Reject { delivery_tag: 1, .. }
        ));
    }

    #[tokio::test]
    async fn stop_on_requested_shutdown() {
        let stack = TransformerStack::new(MockQueueProvider::new(), MemoryResolver::default(), queue())
            .with_span(tracing::info_span!("test-transformer"));

        let result = stack
            .start_until(&RecordingTransformer::default(), future::ready(()))
            .await;

        assert!(result.is_ok());
    }

    #[test]
    fn distinguish_consumer_closure_from_connection_failure() {
        assert!(!TransformerError::ConsumerClosed.is_connection_failure());
        assert!(TransformerError::ConnectionLost("reset".into()).is_connection_failure());
    }
}
