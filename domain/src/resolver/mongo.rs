use super::{RawDataResolver, ResolveError};
use crate::{DecodeError, Decoder, RawEnvelope, Selector};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use library::BoxedError;
use mongodb::bson::{self, doc, oid::ObjectId, Bson, Document};
use mongodb::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument};

/// Shape of the raw documents inside the document store
#[derive(Deserialize)]
struct StoredEnvelope {
    provider: String,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    timestamp: DateTime<Utc>,
    rawdata: Bson,
    #[serde(default)]
    metadata: Option<Bson>,
}

impl Decoder for Bson {
    fn decode<T: DeserializeOwned>(self) -> Result<T, BoxedError> {
        bson::from_bson(self).map_err(Into::into)
    }
}

enum ClientSource {
    PerCall(String),
    Pooled(Client),
}

/// Resolver looking up documents by identifier in a MongoDB collection
///
/// Accepts [`Selector::Document`] selectors only.
pub struct MongoResolver {
    source: ClientSource,
}

impl MongoResolver {
    /// Opens a new client for every fetch and shuts it down afterwards
    ///
    /// Acceptable as long as the message rate is low, which is the common case for ingestion.
    pub fn per_call<U: Into<String>>(uri: U) -> Self {
        Self {
            source: ClientSource::PerCall(uri.into()),
        }
    }

    /// Reuses the given client and its connection pool for every fetch
    pub fn pooled(client: Client) -> Self {
        Self {
            source: ClientSource::Pooled(client),
        }
    }
}

async fn find_document(
    client: &Client,
    db: &str,
    collection: &str,
    id: ObjectId,
) -> Result<Document, ResolveError> {
    client
        .database(db)
        .collection::<Document>(collection)
        .find_one(doc! { "_id": id }, None)
        .await
        .map_err(|e| ResolveError::Transport(e.into()))?
        .ok_or(ResolveError::NotFound)
}

fn parse_document_selector(selector: &Selector) -> Result<(&str, &str, ObjectId), ResolveError> {
    match selector {
        Selector::Document { db, collection, id } => {
            let id = ObjectId::parse_str(id).map_err(|e| {
                ResolveError::BadSelector(format!("invalid document id {:?}: {}", id, e))
            })?;
            Ok((db.as_str(), collection.as_str(), id))
        }
        Selector::Urn { urn } => Err(ResolveError::BadSelector(format!(
            "document store can not resolve urn {}",
            urn
        ))),
    }
}

#[async_trait]
impl RawDataResolver for MongoResolver {
    type Payload = Bson;
    type Metadata = Bson;

    #[instrument(skip(self, selector), fields(selector = %selector))]
    async fn fetch(&self, selector: &Selector) -> Result<RawEnvelope<Bson, Bson>, ResolveError> {
        let (db, collection, id) = parse_document_selector(selector)?;

        let document = match &self.source {
            ClientSource::Pooled(client) => find_document(client, db, collection, id).await?,
            ClientSource::PerCall(uri) => {
                let client = Client::with_uri_str(uri)
                    .await
                    .map_err(|e| ResolveError::Transport(e.into()))?;
                let result = find_document(&client, db, collection, id).await;

                client.shutdown().await;
                debug!("Released per call client");

                result?
            }
        };

        debug!(?document, "Fetched raw document");

        let stored: StoredEnvelope = bson::from_document(document)
            .map_err(|e| ResolveError::Decode(DecodeError::Envelope(e.into())))?;

        let envelope = RawEnvelope::new(stored.provider, stored.timestamp, stored.rawdata);

        Ok(match stored.metadata {
            Some(metadata) => envelope.with_metadata(metadata),
            None => envelope,
        })
    }
}
