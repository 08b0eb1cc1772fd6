use crate::options::InspectOptions;
use anyhow::Result;
use async_trait::async_trait;
use domain::RawEnvelope;
use harness::{DeliveryContext, Transformer};
use library::communication::implementation::amqp::FatalClosePolicy;
use library::EmptyResult;
use modules::transformer::listen_until;
use serde_json::Value;
use tracing::{info, warn};

/// Logs every raw document without transforming it
struct Inspector;

#[async_trait]
impl Transformer for Inspector {
    type Rawdata = Value;
    type Metadata = Value;

    async fn transform(
        &self,
        context: &DeliveryContext,
        raw: RawEnvelope<Value, Value>,
    ) -> EmptyResult {
        info!(
            selector = %context.selector(),
            provider = raw.provider(),
            timestamp = %raw.timestamp(),
            rawdata = %raw.rawdata(),
            metadata = ?raw.metadata(),
            "Resolved raw document"
        );

        Ok(())
    }
}

pub async fn run(options: InspectOptions) -> Result<()> {
    let policy = if options.abort_on_connection_loss {
        FatalClosePolicy::abort()
    } else {
        FatalClosePolicy::default()
    };

    let shutdown = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "Failed to listen for interrupts");
            std::future::pending::<()>().await;
        }
    };

    listen_until(&options.listen, policy, &Inspector, shutdown).await?;
    info!("Stopped on request");

    Ok(())
}
