//! Backends turning a [`Selector`] into a materialized [`RawEnvelope`]
//!
//! Resolvers only decode the structure of the stored envelope. The payload and metadata stay
//! opaque until [`RawDataResolverExt::fetch_as`] decodes them into the requested types.

use crate::{DecodeError, Decoder, RawEnvelope, Selector};
use async_trait::async_trait;
use library::BoxedError;
use serde::de::DeserializeOwned;
use thiserror::Error;

mod bridge;
mod mongo;

pub use bridge::*;
pub use mongo::*;

/// Reasons a selector could not be resolved
///
/// All of them are local to a single message. The variants are only distinguished for diagnostics.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The selector is well formed but does not reference an existing document
    #[error("document not found")]
    NotFound,
    /// The selector is malformed or not supported by the resolver
    #[error("bad selector: {0}")]
    BadSelector(String),
    /// The backing store could not be reached or responded unexpectedly
    #[error("failed to get raw data")]
    Transport(#[source] BoxedError),
    /// The stored document does not have the requested shape
    #[error("failed to decode raw data")]
    Decode(#[from] DecodeError),
}

/// Fetches raw documents from a backing store
#[async_trait]
pub trait RawDataResolver {
    /// Opaque payload type of the fetched envelopes
    type Payload: Decoder + Send + 'static;
    /// Opaque metadata type of the fetched envelopes
    type Metadata: Decoder + Send + 'static;

    /// Looks up the document referenced by the selector
    async fn fetch(
        &self,
        selector: &Selector,
    ) -> Result<RawEnvelope<Self::Payload, Self::Metadata>, ResolveError>;
}

/// Typed convenience functions for every [`RawDataResolver`]
#[async_trait]
pub trait RawDataResolverExt: RawDataResolver {
    /// Fetches the document and decodes its payload and metadata into concrete types
    async fn fetch_as<D, M>(&self, selector: &Selector) -> Result<RawEnvelope<D, M>, ResolveError>
    where
        D: DeserializeOwned + Send + 'static,
        M: DeserializeOwned + Send + 'static;
}

#[async_trait]
impl<R> RawDataResolverExt for R
where
    R: RawDataResolver + Sync,
{
    async fn fetch_as<D, M>(&self, selector: &Selector) -> Result<RawEnvelope<D, M>, ResolveError>
    where
        D: DeserializeOwned + Send + 'static,
        M: DeserializeOwned + Send + 'static,
    {
        let envelope = self.fetch(selector).await?;
        Ok(envelope.decode()?)
    }
}

#[async_trait]
impl<R> RawDataResolver for std::sync::Arc<R>
where
    R: RawDataResolver + Send + Sync,
{
    type Payload = R::Payload;
    type Metadata = R::Metadata;

    async fn fetch(
        &self,
        selector: &Selector,
    ) -> Result<RawEnvelope<Self::Payload, Self::Metadata>, ResolveError> {
        self.as_ref().fetch(selector).await
    }
}
