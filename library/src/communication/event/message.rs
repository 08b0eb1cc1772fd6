use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// Name of the header every message carries its routing key in
pub const ROUTING_HEADER: &str = "provider";

/// Entity which can be published onto an exchange
///
/// The broker routes each message purely based on its [`routing_key`](Message::routing_key).
/// Additional [`headers`](Message::headers) travel alongside the serialized body and are
/// intended for downstream filtering and observability only.
pub trait Message: Serialize + DeserializeOwned + PartialEq + Debug {
    /// Key by which the exchange routes this message into bound queues
    fn routing_key(&self) -> &str;

    /// Headers attached to the published message
    ///
    /// Defaults to a single [`ROUTING_HEADER`] carrying the routing key.
    fn headers(&self) -> Vec<(String, String)> {
        vec![(ROUTING_HEADER.to_owned(), self.routing_key().to_owned())]
    }
}
