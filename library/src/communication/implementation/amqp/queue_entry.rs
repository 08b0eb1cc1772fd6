use super::super::json::JsonQueueEntry;
use crate::communication::event::{DeliveryInfo, RawQueueEntry};
use crate::EmptyResult;
use async_trait::async_trait;
use lapin::acker::Acker;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicRejectOptions};

/// AMQP based implementation of the [`QueueEntry`](crate::communication::event::QueueEntry) trait
pub struct AmqpQueueEntry {
    info: DeliveryInfo,
    payload: Vec<u8>,
    acker: Acker,
}

impl From<Delivery> for AmqpQueueEntry {
    fn from(delivery: Delivery) -> Self {
        let info = DeliveryInfo {
            delivery_tag: delivery.delivery_tag,
            exchange: delivery.exchange.as_str().to_owned(),
            routing_key: delivery.routing_key.as_str().to_owned(),
            redelivered: delivery.redelivered,
        };

        Self {
            info,
            payload: delivery.data,
            acker: delivery.acker,
        }
    }
}

#[async_trait]
impl RawQueueEntry for AmqpQueueEntry {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn info(&self) -> &DeliveryInfo {
        &self.info
    }

    async fn acknowledge(self) -> EmptyResult {
        self.acker.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn reject(self) -> EmptyResult {
        self.acker
            .reject(BasicRejectOptions { requeue: false })
            .await?;
        Ok(())
    }
}

impl JsonQueueEntry for AmqpQueueEntry {}
