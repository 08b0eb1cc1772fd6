use domain::RawAny;
use library::communication::event::MessagePublisher;
use library::communication::BlackboxError;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info_span, Instrument};

/// Errors surfaced by the [`PublishSink`]
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink no longer accepts envelopes because an earlier publish failed
    #[error("publish sink has been closed")]
    Closed,
    /// Publishing an envelope failed, the sink has been closed afterwards
    ///
    /// Envelopes which had already been accepted but were still queued are not published.
    #[error("failed to publish envelope, dropped {dropped} queued envelopes")]
    Publish {
        /// Number of accepted envelopes which have not been published
        dropped: usize,
        /// Underlying cause
        #[source]
        source: BlackboxError,
    },
    /// The background task panicked or has been cancelled
    #[error("publish task terminated abnormally")]
    Task(#[source] JoinError),
}

/// Send-only queue of envelopes which are published from a background task
///
/// Publishers assume a single sequential user. The sink serializes all producers through an
/// internal channel drained by one task. The first failed publish closes the channel so that
/// every later send fails. Envelopes still queued at that point are logged and counted in
/// the error returned by [`close`](Self::close).
pub struct PublishSink<P> {
    sender: mpsc::Sender<RawAny>,
    task: JoinHandle<Result<P, SinkError>>,
}

impl<P> PublishSink<P>
where
    P: MessagePublisher + Send + Sync + 'static,
{
    /// Spawns the background task publishing every envelope onto `exchange`
    pub fn spawn<E: Into<String>>(publisher: P, exchange: E) -> Self {
        let exchange = exchange.into();
        let (sender, mut receiver) = mpsc::channel::<RawAny>(1);
        let span = info_span!("publish_sink", exchange = %exchange);

        let task = tokio::spawn(
            async move {
                while let Some(envelope) = receiver.recv().await {
                    if let Err(error) = publisher.publish(&envelope, &exchange).await {
                        let source = BlackboxError::new(error);
                        error!(provider = envelope.provider(), error = %source, "Failed to publish envelope, closing sink");
                        receiver.close();

                        let mut dropped = 0;
                        while let Ok(envelope) = receiver.try_recv() {
                            error!(provider = envelope.provider(), "Dropping queued envelope");
                            dropped += 1;
                        }

                        return Err(SinkError::Publish { dropped, source });
                    }

                    debug!(provider = envelope.provider(), "Published envelope");
                }

                Ok(publisher)
            }
            .instrument(span),
        );

        Self { sender, task }
    }

    /// Queues an envelope for publishing, waiting while the sink is busy
    pub async fn send(&self, envelope: RawAny) -> Result<(), SinkError> {
        self.sender
            .send(envelope)
            .await
            .map_err(|_| SinkError::Closed)
    }

    /// Hands out an additional producer handle
    ///
    /// Sending fails once the sink has been closed due to a failed publish.
    pub fn sender(&self) -> mpsc::Sender<RawAny> {
        self.sender.clone()
    }

    /// Publishes all queued envelopes and returns the publisher
    ///
    /// Waits until every handle obtained through [`sender`](Self::sender) has been dropped, unless
    /// publishing fails in the meantime.
    pub async fn close(self) -> Result<P, SinkError> {
        drop(self.sender);

        self.task.await.map_err(SinkError::Task)?
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use domain::RawEnvelope;
    use library::communication::event::{Message, PublishError};
    use library::communication::implementation::mock::MockMessagePublisher;
    use serde_json::json;
    use std::sync::Arc;

    /// Fails every publish after suspending a few times
    struct SlowFailingPublisher;

    #[async_trait]
    impl MessagePublisher for SlowFailingPublisher {
        async fn publish<M: Message + Send + Sync>(
            &self,
            _message: &M,
            _exchange: &str,
        ) -> Result<(), PublishError> {
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            Err(PublishError::Transport("broker went away".into()))
        }
    }

    fn envelope(value: u32) -> RawAny {
        let timestamp: DateTime<Utc> = "2024-03-01T12:00:00Z".parse().unwrap();
        RawEnvelope::new("p1", timestamp, json!({ "x": value }))
    }

    #[tokio::test]
    async fn publish_in_order() {
        let publisher = Arc::new(MockMessagePublisher::default());
        publisher
            .expect(&envelope(1), "ingress")
            .expect(&envelope(2), "ingress");

        let sink = PublishSink::spawn(publisher.clone(), "ingress");
        sink.send(envelope(1)).await.unwrap();
        sink.sender().send(envelope(2)).await.unwrap();

        let returned = sink.close().await.unwrap();
        assert_eq!(returned.published(), 2);
    }

    #[tokio::test]
    async fn close_after_failed_publish() {
        let publisher = Arc::new(MockMessagePublisher::failing_after(1));
        let sink = PublishSink::spawn(publisher.clone(), "ingress");
        let sender = sink.sender();

        sink.send(envelope(1)).await.unwrap();
        sink.send(envelope(2)).await.unwrap();

        // Returns despite the outstanding sender since the failure ends the task
        let result = sink.close().await;

        assert!(matches!(result, Err(SinkError::Publish { .. })));
        assert!(sender.send(envelope(3)).await.is_err());
        assert_eq!(publisher.published(), 1);
    }

    #[tokio::test]
    async fn report_queued_envelopes_dropped_after_failure() {
        let sink = PublishSink::spawn(SlowFailingPublisher, "ingress");

        sink.send(envelope(1)).await.unwrap();
        tokio::task::yield_now().await;
        sink.send(envelope(2)).await.unwrap();

        match sink.close().await {
            Err(SinkError::Publish { dropped, .. }) => assert_eq!(dropped, 1),
            other => panic!("expected a publish failure, got {:?}", other.map(|_| ())),
        }
    }
}
