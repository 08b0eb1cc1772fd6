use super::{RawDataResolver, ResolveError};
use crate::{DecodeError, JsonText, RawEnvelope, Selector, Urn};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

/// Failures of the raw data bridge which do not map onto a dedicated [`ResolveError`]
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The bridge responded with a status other than success, not found or bad request
    #[error("raw data bridge responded with unexpected status {0}")]
    UnexpectedStatus(u16),
}

/// Resolver fetching documents by URN through the raw data bridge HTTP service
///
/// The bridge transports the payload as a JSON encoded string. It is handed out as [`JsonText`]
/// and decoded into the target type on demand.
pub struct BridgeResolver {
    endpoint: String,
    client: Client,
}

impl BridgeResolver {
    /// Creates a resolver for the bridge reachable at `endpoint`
    pub fn new<E: AsRef<str>>(endpoint: E) -> Self {
        Self::with_client(endpoint, Client::new())
    }

    /// Creates a resolver which sends its requests through the given client
    pub fn with_client<E: AsRef<str>>(endpoint: E, client: Client) -> Self {
        Self {
            endpoint: endpoint.as_ref().trim_end_matches('/').to_owned(),
            client,
        }
    }

    /// Base URL without trailing slashes
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RawDataResolver for BridgeResolver {
    type Payload = JsonText;
    type Metadata = Value;

    #[instrument(skip(self, selector), fields(selector = %selector))]
    async fn fetch(
        &self,
        selector: &Selector,
    ) -> Result<RawEnvelope<JsonText, Value>, ResolveError> {
        let urn: Urn = match selector {
            Selector::Urn { urn } => urn
                .parse()
                .map_err(|e| ResolveError::BadSelector(format!("{}", e)))?,
            Selector::Document { .. } => {
                return Err(ResolveError::BadSelector(format!(
                    "raw data bridge can not resolve document {}",
                    selector
                )))
            }
        };

        let url = format!("{}/urns/{}", self.endpoint, urn);
        debug!(%url, "Requesting raw data");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ResolveError::Transport(e.into()))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(ResolveError::NotFound),
            StatusCode::BAD_REQUEST => {
                return Err(ResolveError::BadSelector(format!(
                    "raw data bridge refused urn {}",
                    urn
                )))
            }
            status if !status.is_success() => {
                let cause = BridgeError::UnexpectedStatus(status.as_u16());
                return Err(ResolveError::Transport(cause.into()));
            }
            _ => {}
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ResolveError::Transport(e.into()))?;

        serde_json::from_slice(&body)
            .map_err(|e| ResolveError::Decode(DecodeError::Envelope(e.into())))
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use crate::resolver::RawDataResolverExt;
    use crate::{NotificationEnvelope, RawAny};
    use chrono::{DateTime, Utc};
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server};
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::json;
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    type Requests = Arc<Mutex<Vec<String>>>;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Reading {
        x: u32,
    }

    /// Serves a single canned response for every request and records the requested paths
    fn serve(status: u16, body: String) -> (String, Requests) {
        let requests: Requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();

        let make_service = make_service_fn(move |_| {
            let recorded = recorded.clone();
            let body = body.clone();

            async move {
                Ok::<_, Infallible>(service_fn(move |request: Request<Body>| {
                    recorded
                        .lock()
                        .unwrap()
                        .push(request.uri().path().to_owned());

                    let response = Response::builder()
                        .status(status)
                        .body(Body::from(body.clone()))
                        .unwrap();

                    async move { Ok::<_, Infallible>(response) }
                }))
            }
        });

        let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make_service);
        let endpoint = format!("http://{}", server.local_addr());
        tokio::spawn(server);

        (endpoint, requests)
    }

    fn stored(envelope: &RawAny) -> String {
        json!({
            "provider": envelope.provider(),
            "timestamp": envelope.timestamp(),
            "rawdata": envelope.rawdata().to_string(),
        })
        .to_string()
    }

    fn urn(urn: &str) -> NotificationEnvelope {
        NotificationEnvelope::for_urn(urn)
    }

    #[tokio::test]
    async fn resolve_published_envelope() {
        let timestamp: DateTime<Utc> = "2024-03-01T12:00:00Z".parse().unwrap();
        let original: RawAny = RawEnvelope::new("p1", timestamp, json!({ "x": 1 }));
        let (endpoint, requests) = serve(200, stored(&original));

        let resolver = BridgeResolver::new(&endpoint);
        let resolved = resolver
            .fetch_as::<Value, Value>(urn("urn:raw:p1:1").selector())
            .await
            .unwrap();

        assert_eq!(resolved.provider(), original.provider());
        assert_eq!(resolved.timestamp(), original.timestamp());
        assert_eq!(resolved.rawdata(), original.rawdata());
        assert_eq!(*requests.lock().unwrap(), vec!["/urns/urn:raw:p1:1"]);
    }

    #[tokio::test]
    async fn decode_into_target_type() {
        let timestamp: DateTime<Utc> = "2024-03-01T12:00:00Z".parse().unwrap();
        let original: RawAny = RawEnvelope::new("p1", timestamp, json!({ "x": 5 }));
        let (endpoint, _) = serve(200, stored(&original));

        let resolved = BridgeResolver::new(&endpoint)
            .fetch_as::<Reading, Value>(urn("urn:raw:p1:1").selector())
            .await
            .unwrap();

        assert_eq!(resolved.into_rawdata(), Reading { x: 5 });
    }

    #[tokio::test]
    async fn report_missing_document() {
        let (endpoint, _) = serve(404, String::new());

        let result = BridgeResolver::new(&endpoint)
            .fetch(urn("urn:x:1").selector())
            .await;

        assert!(matches!(result, Err(ResolveError::NotFound)));
    }

    #[tokio::test]
    async fn report_refused_urn() {
        let (endpoint, _) = serve(400, String::new());

        let result = BridgeResolver::new(&endpoint)
            .fetch(urn("urn:x:1").selector())
            .await;

        assert!(matches!(result, Err(ResolveError::BadSelector(_))));
    }

    #[tokio::test]
    async fn report_server_failure_as_transport_error() {
        let (endpoint, _) = serve(500, "internal".into());

        let result = BridgeResolver::new(&endpoint)
            .fetch(urn("urn:x:1").selector())
            .await;

        assert!(matches!(result, Err(ResolveError::Transport(_))));
    }

    #[tokio::test]
    async fn report_unreachable_bridge_as_transport_error() {
        let result = BridgeResolver::new("http://127.0.0.1:1")
            .fetch(urn("urn:x:1").selector())
            .await;

        assert!(matches!(result, Err(ResolveError::Transport(_))));
    }

    #[tokio::test]
    async fn report_mismatching_payload() {
        let body = json!({
            "provider": "p1",
            "timestamp": "2024-03-01T12:00:00Z",
            "rawdata": "not json",
        });
        let (endpoint, _) = serve(200, body.to_string());

        let result = BridgeResolver::new(&endpoint)
            .fetch_as::<Reading, Value>(urn("urn:x:1").selector())
            .await;

        assert!(matches!(
            result,
            Err(ResolveError::Decode(DecodeError::Field("rawdata", _)))
        ));
    }

    #[tokio::test]
    async fn report_malformed_wrapper() {
        let (endpoint, _) = serve(200, "[]".into());

        let result = BridgeResolver::new(&endpoint)
            .fetch(urn("urn:x:1").selector())
            .await;

        assert!(matches!(
            result,
            Err(ResolveError::Decode(DecodeError::Envelope(_)))
        ));
    }

    #[tokio::test]
    async fn refuse_malformed_urn_without_request() {
        let (endpoint, requests) = serve(200, String::new());

        let result = BridgeResolver::new(&endpoint)
            .fetch(urn("not-a-urn").selector())
            .await;

        assert!(matches!(result, Err(ResolveError::BadSelector(_))));
        assert!(requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn refuse_document_selectors() {
        let notification = NotificationEnvelope::for_document("raw", "p1", "65e1c0ffee");

        let result = BridgeResolver::new("http://127.0.0.1:1")
            .fetch(notification.selector())
            .await;

        assert!(matches!(result, Err(ResolveError::BadSelector(_))));
    }

    #[test]
    fn strip_trailing_slashes() {
        assert_eq!(
            BridgeResolver::new("http://bridge:2000//").endpoint(),
            "http://bridge:2000"
        );
    }
}
