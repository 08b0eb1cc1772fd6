use crate::communication::event::{DeliveryInfo, QueueDescriptor, QueueProvider, RawQueueEntry};
use crate::communication::implementation::json::JsonQueueEntry;
use crate::communication::BlackboxError;
use crate::{BoxedError, EmptyResult};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Terminal state a [`MockQueueEntry`] ended up in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockDisposition {
    /// Entry was acknowledged
    Acknowledged,
    /// Entry was rejected
    Rejected,
    /// Entry was dropped without being terminated
    Abandoned,
}

type Ledger = Arc<Mutex<Vec<(u64, MockDisposition)>>>;

enum MockItem {
    Delivery(Vec<u8>),
    ConnectionLoss(String),
}

/// Entry handed out by the [`MockQueueProvider`]
pub struct MockQueueEntry {
    info: DeliveryInfo,
    payload: Vec<u8>,
    ledger: Ledger,
    failing: bool,
    terminated: bool,
}

impl MockQueueEntry {
    fn terminate(mut self, disposition: MockDisposition) -> EmptyResult {
        self.terminated = true;

        if self.failing {
            return Err(BlackboxError::from_message("channel closed by mock").into());
        }

        self.ledger
            .lock()
            .unwrap()
            .push((self.info.delivery_tag, disposition));

        Ok(())
    }
}

#[async_trait]
impl RawQueueEntry for MockQueueEntry {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn info(&self) -> &DeliveryInfo {
        &self.info
    }

    async fn acknowledge(self) -> EmptyResult {
        self.terminate(MockDisposition::Acknowledged)
    }

    async fn reject(self) -> EmptyResult {
        self.terminate(MockDisposition::Rejected)
    }
}

impl JsonQueueEntry for MockQueueEntry {}

impl Drop for MockQueueEntry {
    fn drop(&mut self) {
        if !self.terminated {
            if let Ok(mut ledger) = self.ledger.lock() {
                ledger.push((self.info.delivery_tag, MockDisposition::Abandoned));
            }
        }
    }
}

/// [`QueueProvider`] replaying a prepared list of deliveries
///
/// Deliveries receive ascending delivery tags starting at `1`. Once all prepared items have
/// been yielded the stream ends, just like a consumer that has been cancelled by the broker.
/// Only the first subscription receives the items, every later one gets an empty stream.
#[derive(Default)]
pub struct MockQueueProvider {
    items: Mutex<Vec<MockItem>>,
    ledger: Ledger,
    subscriptions: Mutex<Vec<QueueDescriptor>>,
    failing_terminations: bool,
}

impl MockQueueProvider {
    /// Creates a provider without any deliveries
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a delivery carrying the JSON representation of the value
    pub fn deliver<T: Serialize>(self, value: &T) -> Self {
        let payload = serde_json::to_vec(value).expect("mock delivery failed to serialize");
        self.deliver_raw(payload)
    }

    /// Appends a delivery carrying the given bytes
    pub fn deliver_raw<P: Into<Vec<u8>>>(self, payload: P) -> Self {
        self.items
            .lock()
            .unwrap()
            .push(MockItem::Delivery(payload.into()));
        self
    }

    /// Appends a connection loss, the stream ends right after it
    pub fn lose_connection(self, cause: &str) -> Self {
        self.items
            .lock()
            .unwrap()
            .push(MockItem::ConnectionLoss(cause.to_owned()));
        self
    }

    /// Makes every acknowledgement and rejection fail
    pub fn failing_terminations(mut self) -> Self {
        self.failing_terminations = true;
        self
    }

    /// Terminal states of all entries in the order they were reached
    pub fn dispositions(&self) -> Vec<(u64, MockDisposition)> {
        self.ledger.lock().unwrap().clone()
    }

    /// Number of entries that reached the given terminal state
    pub fn count(&self, disposition: MockDisposition) -> usize {
        self.dispositions()
            .iter()
            .filter(|(_, d)| *d == disposition)
            .count()
    }

    /// Queues that have been subscribed to
    pub fn subscriptions(&self) -> Vec<QueueDescriptor> {
        self.subscriptions.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueueProvider for MockQueueProvider {
    type Entry = MockQueueEntry;

    async fn consume(
        &self,
        queue: &QueueDescriptor,
    ) -> Result<BoxStream<'static, Result<Self::Entry, BoxedError>>, BoxedError> {
        self.subscriptions.lock().unwrap().push(queue.clone());

        let items = std::mem::take(&mut *self.items.lock().unwrap());
        let ledger = self.ledger.clone();
        let failing = self.failing_terminations;
        let exchange = queue.exchange().to_owned();
        let routing_key = queue.routing_key().to_owned();

        let mut delivery_tag = 0;
        let mut entries: Vec<Result<MockQueueEntry, BoxedError>> =
            Vec::with_capacity(items.len());

        for item in items {
            match item {
                MockItem::Delivery(payload) => {
                    delivery_tag += 1;
                    entries.push(Ok(MockQueueEntry {
                        info: DeliveryInfo {
                            delivery_tag,
                            exchange: exchange.clone(),
                            routing_key: routing_key.clone(),
                            redelivered: false,
                        },
                        payload,
                        ledger: ledger.clone(),
                        failing,
                        terminated: false,
                    }));
                }
                MockItem::ConnectionLoss(cause) => {
                    entries.push(Err(BlackboxError::from_message(cause).into()));
                    break;
                }
            }
        }

        Ok(stream::iter(entries).boxed())
    }
}
