#[cfg(any(feature = "crypto-k256", feature = "crypto-p256"))]
use crate::types::crypto::{CryptoError, PublicKey};
use crate::types::string::{AtStrError, Did, Handle};
use bon::Builder;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use url::Url;

const AT_PREFIX: &str = "at://";

/// Errors from building a [`DidDocument`] out of JSON.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum DidDocError {
    /// Not JSON, or not shaped like a DID document
    #[error("invalid DID document JSON: {0}")]
    #[diagnostic(code(weft::did_doc::json))]
    Json(#[from] serde_json::Error),
    /// The `id` field is not a valid DID
    #[error("invalid DID document id")]
    #[diagnostic(code(weft::did_doc::invalid_id))]
    InvalidId(#[source] AtStrError),
    /// A service endpoint is neither a string nor an object with a `uri`/`url`
    #[error("service `{id}` has an unusable serviceEndpoint")]
    #[diagnostic(code(weft::did_doc::invalid_service_endpoint))]
    InvalidServiceEndpoint {
        /// The service's `id`
        id: SmolStr,
    },
}

/// A resolved DID document, reduced to the parts atproto reads.
///
/// Everything is owned, so the document outlives the response body it was
/// parsed from. Arrays missing from the JSON come through as empty lists.
///
/// ```
/// use weft_common::types::did_doc::DidDocument;
/// let doc = DidDocument::from_json(r##"{
///   "id": "did:plc:alice",
///   "alsoKnownAs": ["at://alice.example.com"],
///   "service": [{"id": "#atproto_pds", "type": "AtprotoPersonalDataServer",
///                "serviceEndpoint": "https://pds.example.com"}]
/// }"##).unwrap();
/// assert_eq!(doc.handle().unwrap().as_str(), "alice.example.com");
/// assert_eq!(doc.pds_endpoint(), Some("https://pds.example.com"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[serde(try_from = "RawDidDocument", into = "RawDidDocument")]
#[builder(start_fn = new)]
pub struct DidDocument {
    /// Document identifier (e.g., `did:plc:...` or `did:web:...`)
    pub id: Did<'static>,
    /// `alsoKnownAs` entries, with any `at://` prefix stripped
    #[builder(default)]
    pub also_known_as: Vec<SmolStr>,
    /// Verification methods (keys) for this DID
    #[builder(default)]
    pub verification_methods: Vec<VerificationMethod>,
    /// Services associated with this DID
    #[builder(default)]
    pub services: Vec<Service>,
}

/// Verification method (key) entry in a DID Document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[builder(start_fn = new)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    /// Identifier for this key material, e.g. `did:plc:...#atproto` or `#atproto`
    #[builder(into)]
    pub id: SmolStr,
    /// Key type (e.g., `Multikey`)
    #[serde(rename = "type")]
    #[builder(into)]
    pub r#type: SmolStr,
    /// Optional controller DID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub controller: Option<SmolStr>,
    /// Multikey `publicKeyMultibase` (base58btc)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub public_key_multibase: Option<SmolStr>,
}

impl VerificationMethod {
    /// Decode `publicKeyMultibase` into a curve key.
    ///
    /// `Ok(None)` if the method doesn't carry a multibase key.
    #[cfg(any(feature = "crypto-k256", feature = "crypto-p256"))]
    pub fn public_key(&self) -> Result<Option<PublicKey>, CryptoError> {
        self.public_key_multibase
            .as_deref()
            .map(PublicKey::from_multibase)
            .transpose()
    }
}

/// Service entry in a DID Document.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(start_fn = new)]
pub struct Service {
    /// Service identifier, e.g. `#atproto_pds`
    #[builder(into)]
    pub id: SmolStr,
    /// Service type (e.g., `AtprotoPersonalDataServer`)
    #[builder(into)]
    pub r#type: SmolStr,
    /// The endpoint, as written in the document
    #[builder(into)]
    pub endpoint: SmolStr,
}

impl DidDocument {
    /// Parse a document from JSON text.
    pub fn from_json(json: &str) -> Result<Self, DidDocError> {
        let raw: RawDidDocument = serde_json::from_str(json)?;
        raw.try_into()
    }

    /// Parse a document from raw JSON bytes (e.g. a response body).
    pub fn from_slice(json: &[u8]) -> Result<Self, DidDocError> {
        let raw: RawDidDocument = serde_json::from_slice(json)?;
        raw.try_into()
    }

    /// Build a document from an already-parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, DidDocError> {
        let raw: RawDidDocument = serde_json::from_value(value)?;
        raw.try_into()
    }

    /// The primary handle: the first `alsoKnownAs` entry, if it is a valid handle.
    pub fn handle(&self) -> Option<Handle<'_>> {
        self.also_known_as.first().and_then(|h| Handle::parse(h))
    }

    /// All `alsoKnownAs` entries that are valid handles, in document order.
    pub fn handles(&self) -> impl Iterator<Item = Handle<'_>> {
        self.also_known_as.iter().filter_map(|h| Handle::parse(h))
    }

    /// Whether the document claims `handle` (compared case-insensitively).
    pub fn has_handle(&self, handle: &Handle<'_>) -> bool {
        self.handles().any(|h| h.eq_ignore_case(handle))
    }

    /// The atproto signing key: the verification method whose id ends in `#atproto`.
    pub fn signing_key(&self) -> Option<&VerificationMethod> {
        self.verification_methods
            .iter()
            .find(|m| m.id.ends_with("#atproto"))
    }

    /// The atproto signing key, decoded.
    #[cfg(any(feature = "crypto-k256", feature = "crypto-p256"))]
    pub fn signing_public_key(&self) -> Result<Option<PublicKey>, CryptoError> {
        match self.signing_key() {
            Some(method) => method.public_key(),
            None => Ok(None),
        }
    }

    /// The PDS service: the service whose id ends in `#atproto_pds`.
    pub fn pds_service(&self) -> Option<&Service> {
        self.services.iter().find(|s| s.id.ends_with("#atproto_pds"))
    }

    /// Endpoint of the PDS service, as written in the document.
    pub fn pds_endpoint(&self) -> Option<&str> {
        self.pds_service().map(|s| s.endpoint.as_str())
    }

    /// Endpoint of the PDS service as a `Url`; `None` if absent or unparseable.
    pub fn pds_url(&self) -> Option<Url> {
        self.pds_endpoint().and_then(|e| Url::parse(e).ok())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDidDocument {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    also_known_as: Option<Vec<SmolStr>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    verification_method: Option<Vec<VerificationMethod>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    service: Option<Vec<RawService>>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawService {
    id: SmolStr,
    #[serde(rename = "type", default)]
    r#type: SmolStr,
    service_endpoint: serde_json::Value,
}

impl TryFrom<RawService> for Service {
    type Error = DidDocError;

    fn try_from(raw: RawService) -> Result<Self, Self::Error> {
        use serde_json::Value;
        let endpoint = match &raw.service_endpoint {
            Value::String(s) => Some(SmolStr::new(s)),
            Value::Object(obj) => obj
                .get("uri")
                .or_else(|| obj.get("url"))
                .and_then(Value::as_str)
                .map(SmolStr::new),
            _ => None,
        };
        match endpoint {
            Some(endpoint) => Ok(Service {
                id: raw.id,
                r#type: raw.r#type,
                endpoint,
            }),
            None => Err(DidDocError::InvalidServiceEndpoint { id: raw.id }),
        }
    }
}

impl TryFrom<RawDidDocument> for DidDocument {
    type Error = DidDocError;

    fn try_from(raw: RawDidDocument) -> Result<Self, Self::Error> {
        let id = Did::try_from(raw.id).map_err(DidDocError::InvalidId)?;
        let also_known_as = raw
            .also_known_as
            .unwrap_or_default()
            .into_iter()
            .map(|aka| match aka.strip_prefix(AT_PREFIX) {
                Some(stripped) => SmolStr::new(stripped),
                None => aka,
            })
            .collect();
        let services = raw
            .service
            .unwrap_or_default()
            .into_iter()
            .map(Service::try_from)
            .collect::<Result<_, _>>()?;
        Ok(DidDocument {
            id,
            also_known_as,
            verification_methods: raw.verification_method.unwrap_or_default(),
            services,
        })
    }
}

impl From<DidDocument> for RawDidDocument {
    fn from(doc: DidDocument) -> Self {
        // entries that were never at:// uris (other schemes) go back out untouched
        let also_known_as = doc
            .also_known_as
            .into_iter()
            .map(|aka| {
                if aka.contains("://") {
                    aka
                } else {
                    smol_str::format_smolstr!("{AT_PREFIX}{aka}")
                }
            })
            .collect();
        RawDidDocument {
            id: doc.id.into(),
            also_known_as: Some(also_known_as),
            verification_method: Some(doc.verification_methods),
            service: Some(
                doc.services
                    .into_iter()
                    .map(|s| RawService {
                        id: s.id,
                        r#type: s.r#type,
                        service_endpoint: serde_json::Value::String(s.endpoint.into()),
                    })
                    .collect(),
            ),
        }
    }
}
