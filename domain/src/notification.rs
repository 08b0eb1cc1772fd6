use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Reference to a stored raw document
///
/// Legacy producers capitalise the keys of the document variant, both spellings are accepted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Selector {
    /// Document addressed by a URN, resolved through the raw data bridge
    Urn {
        /// Unvalidated URN
        #[serde(alias = "Urn", alias = "URN")]
        urn: String,
    },
    /// Document addressed by its identifier in a collection of the document store
    Document {
        /// Name of the database
        #[serde(alias = "Db")]
        db: String,
        /// Name of the collection
        #[serde(alias = "Collection")]
        collection: String,
        /// Hex encoded identifier of the document
        #[serde(alias = "Id")]
        id: String,
    },
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Urn { urn } => write!(f, "{}", urn),
            Selector::Document { db, collection, id } => {
                write!(f, "{}.{}/{}", db, collection, id)
            }
        }
    }
}

/// Lightweight message which is sent instead of the raw data itself
///
/// It lives for exactly one handling cycle and is never persisted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct NotificationEnvelope {
    selector: Selector,
}

impl NotificationEnvelope {
    /// Notification referencing a document in the document store
    pub fn for_document<D, C, I>(db: D, collection: C, id: I) -> Self
    where
        D: Into<String>,
        C: Into<String>,
        I: Into<String>,
    {
        Self {
            selector: Selector::Document {
                db: db.into(),
                collection: collection.into(),
                id: id.into(),
            },
        }
    }

    /// Notification referencing a document by URN
    pub fn for_urn<U: Into<String>>(urn: U) -> Self {
        Self {
            selector: Selector::Urn { urn: urn.into() },
        }
    }

    /// Reference to the raw document
    pub fn selector(&self) -> &Selector {
        &self.selector
    }
}

/// Reasons why a string is not a URN
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrnError {
    /// The `urn:` scheme prefix is missing
    #[error("missing urn: prefix in {0:?}")]
    MissingScheme(String),
    /// The namespace identifier is empty or contains invalid characters
    #[error("invalid namespace identifier in {0:?}")]
    InvalidNamespace(String),
    /// The namespace specific part is empty
    #[error("empty namespace specific string in {0:?}")]
    EmptySpecificString(String),
}

/// Validated uniform resource name of the form `urn:<nid>:<nss>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Urn(String);

impl Urn {
    /// Namespace identifier
    pub fn namespace(&self) -> &str {
        self.parts().0
    }

    /// Namespace specific string
    pub fn specific(&self) -> &str {
        self.parts().1
    }

    fn parts(&self) -> (&str, &str) {
        // Validated on construction
        let rest = &self.0[4..];
        rest.split_once(':').unwrap_or((rest, ""))
    }
}

impl FromStr for Urn {
    type Err = UrnError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let rest = match input.get(..4) {
            Some(scheme) if scheme.eq_ignore_ascii_case("urn:") => &input[4..],
            _ => return Err(UrnError::MissingScheme(input.to_owned())),
        };

        let (namespace, specific) = rest
            .split_once(':')
            .ok_or_else(|| UrnError::EmptySpecificString(input.to_owned()))?;

        let valid_namespace = !namespace.is_empty()
            && namespace.len() <= 32
            && namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
            && !namespace.starts_with('-');

        if !valid_namespace {
            return Err(UrnError::InvalidNamespace(input.to_owned()));
        }

        if specific.is_empty() {
            return Err(UrnError::EmptySpecificString(input.to_owned()));
        }

        Ok(Self(input.to_owned()))
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_document_notification() {
        let raw = json!({ "id": "65e1c0ffee", "db": "raw", "collection": "p1" });
        let notification: NotificationEnvelope = serde_json::from_value(raw).unwrap();

        assert_eq!(
            notification,
            NotificationEnvelope::for_document("raw", "p1", "65e1c0ffee")
        );
    }

    #[test]
    fn parse_capitalised_document_notification() {
        let raw = json!({ "Id": "65e1c0ffee", "Db": "raw", "Collection": "p1" });
        let notification: NotificationEnvelope = serde_json::from_value(raw).unwrap();

        assert_eq!(notification.selector().to_string(), "raw.p1/65e1c0ffee");
    }

    #[test]
    fn parse_urn_notification() {
        let raw = json!({ "urn": "urn:raw:p1:1" });
        let notification: NotificationEnvelope = serde_json::from_value(raw).unwrap();

        assert_eq!(notification, NotificationEnvelope::for_urn("urn:raw:p1:1"));
    }

    #[test]
    fn reject_incomplete_notification() {
        let raw = json!({ "db": "raw", "collection": "p1" });
        assert!(serde_json::from_value::<NotificationEnvelope>(raw).is_err());
    }

    #[test]
    fn accept_valid_urns() {
        let urn: Urn = "urn:x:1".parse().unwrap();

        assert_eq!(urn.namespace(), "x");
        assert_eq!(urn.specific(), "1");
        assert_eq!(urn.to_string(), "urn:x:1");
        assert!("URN:raw-data:p1:42".parse::<Urn>().is_ok());
    }

    #[test]
    fn refuse_invalid_urns() {
        assert!(matches!(
            "x:1".parse::<Urn>(),
            Err(UrnError::MissingScheme(_))
        ));
        assert!(matches!(
            "urn::1".parse::<Urn>(),
            Err(UrnError::InvalidNamespace(_))
        ));
        assert!(matches!(
            "urn:x".parse::<Urn>(),
            Err(UrnError::EmptySpecificString(_))
        ));
        assert!(matches!(
            "urn:x:".parse::<Urn>(),
            Err(UrnError::EmptySpecificString(_))
        ));
    }
}
