//! Producer side helpers publishing collected raw data

use crate::options::PublishOptions;
use chrono::Utc;
use domain::{RawAny, RawEnvelope};
use harness::{PublishSink, SinkError};
use library::communication::event::MessagePublisher;
use library::communication::implementation::amqp::{BrokerGateway, GatewayError};
use serde_json::Value;
use tracing::{info, instrument};

/// Connects to the broker and spawns a [`PublishSink`] onto the configured exchange
#[instrument(skip(options), fields(exchange = %options.exchange))]
pub async fn publish_sink_from_options(
    options: &PublishOptions,
) -> Result<PublishSink<BrokerGateway>, GatewayError> {
    let gateway = BrokerGateway::connect(&options.broker.uri, &options.broker.client).await?;
    info!("Publishing raw data");

    Ok(PublishSink::spawn(gateway, options.exchange.clone()))
}

/// Wraps collected payloads into envelopes of a single provider and publishes them
pub struct Collector<P> {
    provider: String,
    sink: PublishSink<P>,
}

impl Collector<BrokerGateway> {
    /// Creates a collector for the provider and exchange configured by the options
    pub async fn from_options(options: &PublishOptions) -> Result<Self, GatewayError> {
        let sink = publish_sink_from_options(options).await?;
        Ok(Self::new(options.provider.clone(), sink))
    }

    /// Publishes everything that is still queued and closes the broker connection
    pub async fn shutdown(self) -> Result<(), SinkError> {
        let mut gateway = self.sink.close().await?;
        gateway.close().await;
        Ok(())
    }
}

impl<P> Collector<P>
where
    P: MessagePublisher + Send + Sync + 'static,
{
    /// Creates a collector publishing through the given sink
    pub fn new<S: Into<String>>(provider: S, sink: PublishSink<P>) -> Self {
        Self {
            provider: provider.into(),
            sink,
        }
    }

    /// Identifier of the data source
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Publishes a payload collected just now
    pub async fn collect(&self, rawdata: Value) -> Result<(), SinkError> {
        self.forward(RawEnvelope::new(&self.provider, Utc::now(), rawdata))
            .await
    }

    /// Publishes a complete envelope as is
    pub async fn forward(&self, envelope: RawAny) -> Result<(), SinkError> {
        self.sink.send(envelope).await
    }

    /// Publishes everything that is still queued and returns the publisher
    pub async fn close(self) -> Result<P, SinkError> {
        self.sink.close().await
    }
}
