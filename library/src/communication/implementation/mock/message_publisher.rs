use super::ExpectationMode;
use crate::communication::event::{Message, MessagePublisher, PublishError};
use crate::BoxedError;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde::Deserialize;
use std::any::type_name;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct ExpectedMessage {
    serialized: String,
    exchange: String,
    routing_key: String,
}

impl ExpectedMessage {
    fn deserialized<'a, D: Deserialize<'a>>(&'a self) -> Result<D, String> {
        let message = format!(
            "failed to deserialize expected value to type {}: {}",
            type_name::<D>(),
            self.serialized
        );
        serde_json::from_str(&self.serialized).map_err(|_| message)
    }
}

/// [`MessagePublisher`] which verifies published messages against a list of expectations
///
/// Remaining expectations cause a panic when the publisher is dropped.
pub struct MockMessagePublisher {
    remaining: AtomicUsize,
    published: AtomicUsize,
    expected: Mutex<VecDeque<ExpectedMessage>>,
    mode: ExpectationMode,
    fail_after: Option<usize>,
}

impl Default for MockMessagePublisher {
    fn default() -> Self {
        Self {
            remaining: AtomicUsize::new(0),
            published: AtomicUsize::new(0),
            expected: Mutex::new(VecDeque::new()),
            mode: ExpectationMode::ExpectOnlyProvided,
            fail_after: None,
        }
    }
}

#[async_trait]
impl MessagePublisher for Arc<MockMessagePublisher> {
    async fn publish<M: Message + Send + Sync>(
        &self,
        message: &M,
        exchange: &str,
    ) -> Result<(), PublishError> {
        self.handle(message, exchange)
    }
}

impl MockMessagePublisher {
    /// Creates a publisher which tolerates unexpected messages in between expected ones
    #[allow(clippy::field_reassign_with_default)]
    pub fn permitting_noise() -> Self {
        let mut instance = Self::default();
        instance.mode = ExpectationMode::AllowNoise;
        instance
    }

    /// Creates a publisher which accepts everything without verification
    #[allow(clippy::field_reassign_with_default)]
    pub fn ignoring() -> Self {
        let mut instance = Self::default();
        instance.mode = ExpectationMode::Ignore;
        instance
    }

    /// Creates a publisher that accepts `count` messages and fails with a transport error afterwards
    #[allow(clippy::field_reassign_with_default)]
    pub fn failing_after(count: usize) -> Self {
        let mut instance = Self::ignoring();
        instance.fail_after = Some(count);
        instance
    }

    /// Number of messages that have been accepted so far
    pub fn published(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }

    /// Expects the given message to be published onto the exchange
    pub fn expect<M: Message>(&self, message: &M, exchange: &str) -> &Self {
        self.add_expectation(message, exchange).unwrap();
        self
    }

    fn add_expectation<M: Message>(&self, message: &M, exchange: &str) -> Result<(), BoxedError> {
        let serialized = serde_json::to_string(message)?;

        self.expected.lock().unwrap().push_back(ExpectedMessage {
            serialized,
            exchange: exchange.to_owned(),
            routing_key: message.routing_key().to_owned(),
        });

        self.remaining.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }

    fn handle<M: Message>(&self, message: &M, exchange: &str) -> Result<(), PublishError> {
        if let Some(limit) = self.fail_after {
            if self.published() >= limit {
                let cause: BoxedError = "connection closed by mock".into();
                return Err(PublishError::Transport(cause));
            }
        }

        let json = serde_json::to_string(message)?;

        match self.mode {
            ExpectationMode::Ignore => {}
            ExpectationMode::ExpectOnlyProvided => {
                match self.expected.lock().unwrap().pop_front() {
                    None => panic!(
                        "Unexpected message was published to {:?}: {:?}",
                        exchange, json
                    ),
                    Some(expected) => {
                        assert_eq!(
                            expected.exchange, exchange,
                            "Exchange (right) did not match expectation (left)"
                        );
                        assert_eq!(
                            expected.routing_key,
                            message.routing_key(),
                            "Routing key (right) did not match expectation (left)"
                        );
                        assert_eq!(expected.deserialized::<M>().unwrap(), *message);
                    }
                }
            }
            ExpectationMode::AllowNoise => {
                let mut lock = self.expected.lock().unwrap();
                if let Some(expected) = lock.front() {
                    if expected.exchange == exchange && expected.routing_key == message.routing_key()
                    {
                        if let Ok(expected_message) = expected.deserialized::<M>() {
                            if expected_message == *message {
                                lock.pop_front();
                            }
                        }
                    }
                }
            }
        };

        let new_length = self.expected.lock().unwrap().len();
        self.remaining.store(new_length, Ordering::SeqCst);
        self.published.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }
}

impl Drop for MockMessagePublisher {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            let remaining = self.remaining.load(Ordering::SeqCst);

            if self.mode != ExpectationMode::Ignore && remaining > 0 {
                panic!(
                    "MockMessagePublisher was dropped with {} expected messages remaining",
                    remaining
                );
            }
        }
    }
}
