use chrono::{DateTime, Utc};
use library::communication::event::Message;
use library::BoxedError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

/// One unit of collected data together with its provenance
///
/// Envelopes are immutable once built. The payload type `D` and the metadata type `M` are
/// usually concrete types on the consuming side while producers tend to use [`RawAny`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RawEnvelope<D, M = serde_json::Value> {
    provider: String,
    timestamp: DateTime<Utc>,
    rawdata: D,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<M>,
}

/// Envelope with an untyped payload and untyped metadata
pub type RawAny = RawEnvelope<serde_json::Value, serde_json::Value>;

impl<D, M> RawEnvelope<D, M> {
    /// Creates a new envelope without metadata
    pub fn new<P: Into<String>>(provider: P, timestamp: DateTime<Utc>, rawdata: D) -> Self {
        Self {
            provider: provider.into(),
            timestamp,
            rawdata,
            metadata: None,
        }
    }

    /// Attaches metadata to the envelope
    pub fn with_metadata(self, metadata: M) -> Self {
        Self {
            metadata: Some(metadata),
            ..self
        }
    }

    /// Identifier of the data source, also used to route the envelope
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Instant at which the data was collected
    pub fn timestamp(&self) -> &DateTime<Utc> {
        &self.timestamp
    }

    /// Collected payload
    pub fn rawdata(&self) -> &D {
        &self.rawdata
    }

    /// Optional metadata attached by the producer
    pub fn metadata(&self) -> Option<&M> {
        self.metadata.as_ref()
    }

    /// Consumes the envelope, returning the payload
    pub fn into_rawdata(self) -> D {
        self.rawdata
    }
}

impl<D, M> RawEnvelope<D, M>
where
    D: Decoder,
    M: Decoder,
{
    /// Decodes the opaque payload and metadata into concrete types
    pub fn decode<T, N>(self) -> Result<RawEnvelope<T, N>, DecodeError>
    where
        T: DeserializeOwned,
        N: DeserializeOwned,
    {
        let rawdata = self
            .rawdata
            .decode()
            .map_err(|e| DecodeError::Field("rawdata", e))?;

        let metadata = self
            .metadata
            .map(|metadata| metadata.decode())
            .transpose()
            .map_err(|e| DecodeError::Field("metadata", e))?;

        Ok(RawEnvelope {
            provider: self.provider,
            timestamp: self.timestamp,
            rawdata,
            metadata,
        })
    }
}

impl<D, M> Message for RawEnvelope<D, M>
where
    D: Serialize + DeserializeOwned + PartialEq + Debug,
    M: Serialize + DeserializeOwned + PartialEq + Debug,
{
    fn routing_key(&self) -> &str {
        &self.provider
    }
}

/// Failure to turn an opaque body into a concrete type
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The outer envelope did not have the expected shape
    #[error("failed to unmarshal raw data wrapper")]
    Envelope(#[source] BoxedError),
    /// A field of the envelope could not be decoded into the requested type
    #[error("failed to unmarshal {0} field")]
    Field(&'static str, #[source] BoxedError),
}

/// Opaque body which can be decoded into any deserializable type
///
/// Resolvers hand out envelopes whose payload has only been decoded structurally. The typed
/// decoding happens in a second step so that resolvers stay independent of payload types.
pub trait Decoder {
    /// Decodes the body into `T`
    fn decode<T: DeserializeOwned>(self) -> Result<T, BoxedError>;
}

impl Decoder for serde_json::Value {
    fn decode<T: DeserializeOwned>(self) -> Result<T, BoxedError> {
        serde_json::from_value(self).map_err(Into::into)
    }
}

/// JSON document which has been transported as a string
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct JsonText(pub String);

impl Decoder for JsonText {
    fn decode<T: DeserializeOwned>(self) -> Result<T, BoxedError> {
        serde_json::from_str(&self.0).map_err(Into::into)
    }
}
