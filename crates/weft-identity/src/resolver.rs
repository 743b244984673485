//! Identity resolution: handle → DID and DID → document.
//!
//! Resolution order:
//! - Handle → DID: HTTPS well-known, then DNS TXT over HTTPS (configurable via
//!   [`ResolverOptions::handle_order`]). First success wins.
//! - DID → Doc: `did:plc` from the PLC directory, `did:web` from the domain's
//!   well-known location. Other methods fail without touching the network.
//!
//! Nothing here retries or caches. Every call is a fresh fetch; timeouts and
//! cancellation belong to the HTTP client (or to whoever drops the future).

use bon::Builder;
use http::StatusCode;
use smol_str::SmolStr;
use std::future::Future;
use url::Url;
use weft_common::IntoStatic;
use weft_common::types::crypto::{CryptoError, PublicKey};
use weft_common::types::did_doc::{DidDocError, DidDocument};
use weft_common::types::ident::AtIdentifier;
use weft_common::types::string::{Did, Handle};

/// Default PLC directory.
pub const DEFAULT_PLC_DIRECTORY: &str = "https://plc.directory/";
/// Default DNS-over-HTTPS JSON endpoint.
pub const DEFAULT_DOH_ENDPOINT: &str = "https://cloudflare-dns.com/dns-query";

/// Result alias for resolver operations.
pub type Result<T> = core::result::Result<T, IdentityError>;

/// Why a single fetch failed.
///
/// Resolution errors carry this as their source. Transport failures and non-2xx
/// statuses end up in the same resolution error either way; this is only for
/// callers that want to dig.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum FetchError {
    /// The request never got a response
    #[error("transport error: {0}")]
    #[diagnostic(code(weft_identity::fetch::transport))]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The server answered with a non-2xx status
    #[error("HTTP status {0}")]
    #[diagnostic(code(weft_identity::fetch::status))]
    Status(StatusCode),
    /// The request could not be built
    #[error("invalid request: {0}")]
    #[diagnostic(code(weft_identity::fetch::request))]
    Request(#[from] http::Error),
    /// The response arrived but didn't contain what was asked for
    #[error("{0}")]
    #[diagnostic(code(weft_identity::fetch::body))]
    Body(SmolStr),
}

/// Errors that can occur during identity resolution.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum IdentityError {
    /// DID method other than `plc` or `web`
    #[error("unsupported DID method: {0}")]
    #[diagnostic(
        code(weft_identity::unsupported_did_method),
        help("supported DID methods: did:web, did:plc")
    )]
    UnsupportedDidMethod(SmolStr),

    /// The DID document could not be fetched
    #[error("failed to resolve {did}")]
    #[diagnostic(
        code(weft_identity::did_resolution_failed),
        help("check network connectivity, or that the DID exists")
    )]
    DidResolutionFailed {
        /// DID being resolved
        did: Did<'static>,
        /// What went wrong with the fetch
        #[source]
        #[diagnostic_source]
        source: FetchError,
    },

    /// The document was fetched but isn't a usable DID document
    #[error("invalid DID document for {did}")]
    #[diagnostic(code(weft_identity::invalid_document))]
    InvalidDocument {
        /// DID being resolved
        did: Did<'static>,
        /// Why the document was rejected
        #[source]
        #[diagnostic_source]
        source: DidDocError,
    },

    /// The document's `id` is not the DID that was requested
    #[error("DID document id {} does not match requested {expected}", .doc.id)]
    #[diagnostic(
        code(weft_identity::doc_id_mismatch),
        help("document id differs from requested DID; do not trust this document")
    )]
    DocIdMismatch {
        /// DID that was requested
        expected: Did<'static>,
        /// The fetched document, for inspection
        doc: Box<DidDocument>,
    },

    /// `https://{handle}/.well-known/atproto-did` did not yield a DID
    #[error("HTTPS well-known lookup failed for {handle}")]
    #[diagnostic(code(weft_identity::http_resolution_failed))]
    HttpResolutionFailed {
        /// Handle being resolved
        handle: Handle<'static>,
        /// What went wrong
        #[source]
        #[diagnostic_source]
        source: FetchError,
    },

    /// The `_atproto.{handle}` TXT lookup did not yield a DID
    #[error("DNS TXT lookup failed for {handle}")]
    #[diagnostic(code(weft_identity::dns_resolution_failed))]
    DnsResolutionFailed {
        /// Handle being resolved
        handle: Handle<'static>,
        /// What went wrong
        #[source]
        #[diagnostic_source]
        source: FetchError,
    },

    /// Every configured handle resolution method failed
    #[error("could not resolve handle {handle}")]
    #[diagnostic(
        code(weft_identity::handle_resolution_failed),
        help("the handle needs either a well-known atproto-did file or an _atproto TXT record")
    )]
    HandleResolutionFailed {
        /// Handle being resolved
        handle: Handle<'static>,
        /// One error per attempted method, in order
        #[related]
        attempts: Vec<IdentityError>,
    },

    /// Handle is under a TLD that never resolves publicly
    #[error("handle {0} is under a reserved TLD")]
    #[diagnostic(code(weft_identity::reserved_handle))]
    ReservedHandle(Handle<'static>),

    /// The DID document doesn't list the handle it was resolved from
    #[error("{did} does not claim handle {handle}")]
    #[diagnostic(
        code(weft_identity::handle_mismatch),
        help("the DID document's alsoKnownAs must include at://{handle}")
    )]
    HandleMismatch {
        /// Handle that was resolved
        handle: Handle<'static>,
        /// DID it resolved to
        did: Did<'static>,
    },

    /// The document has no `#atproto_pds` service
    #[error("missing PDS endpoint in DID document")]
    #[diagnostic(code(weft_identity::missing_pds_endpoint))]
    MissingPdsEndpoint,

    /// The document has no `#atproto` verification method
    #[error("missing #atproto signing key in DID document")]
    #[diagnostic(code(weft_identity::missing_signing_key))]
    MissingSigningKey,

    /// The `#atproto` key doesn't decode
    #[error("invalid signing key in DID document")]
    #[diagnostic(code(weft_identity::signing_key))]
    SigningKey(#[from] CryptoError),

    /// URL parse error
    #[error("URL parse error: {0}")]
    #[diagnostic(code(weft_identity::url))]
    Url(#[from] url::ParseError),
}

/// Handle → DID resolution method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleStep {
    /// HTTPS GET https://\<handle\>/.well-known/atproto-did
    HttpsWellKnown,
    /// DNS TXT `_atproto.<handle>`, queried over HTTPS
    DnsOverHttps,
}

/// Configurable resolver options.
///
/// - `plc_directory`: base URL `did:plc` documents are fetched from.
/// - `doh_endpoint`: DNS-over-HTTPS JSON API used for TXT lookups.
/// - `handle_order`: handle resolution methods, tried in order.
/// - `validate_doc_id`: reject a document whose `id` differs from the requested DID.
/// - `reject_reserved_tlds`: refuse handles under `.local`, `.arpa`, `.invalid`,
///   `.localhost`, `.internal`, `.example`, `.alt` or `.onion` before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(start_fn = new)]
pub struct ResolverOptions {
    /// PLC directory base
    pub plc_directory: Url,
    /// DNS-over-HTTPS endpoint
    pub doh_endpoint: Url,
    /// Order of attempts for handle → DID resolution
    pub handle_order: Vec<HandleStep>,
    /// Validate that fetched DID document id matches the requested DID
    #[builder(default = true)]
    pub validate_doc_id: bool,
    /// Refuse reserved-TLD handles without a lookup
    #[builder(default = true)]
    pub reject_reserved_tlds: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self::new()
            .plc_directory(Url::parse(DEFAULT_PLC_DIRECTORY).expect("valid url"))
            .doh_endpoint(Url::parse(DEFAULT_DOH_ENDPOINT).expect("valid url"))
            .handle_order(vec![HandleStep::HttpsWellKnown, HandleStep::DnsOverHttps])
            .build()
    }
}

/// Trait for identity resolution, for pluggable implementations.
///
/// Implementors provide the two primitive lookups; everything else is built on them.
pub trait IdentityResolver {
    /// Access options for validation decisions in default methods
    fn options(&self) -> &ResolverOptions;

    /// Resolve handle to DID
    fn resolve_handle(
        &self,
        handle: &Handle<'_>,
    ) -> impl Future<Output = Result<Did<'static>>> + Send
    where
        Self: Sync;

    /// Resolve DID document
    fn resolve_did_doc(&self, did: &Did<'_>) -> impl Future<Output = Result<DidDocument>> + Send
    where
        Self: Sync;

    /// Resolve DID doc from an identifier
    fn resolve_ident(
        &self,
        actor: &AtIdentifier<'_>,
    ) -> impl Future<Output = Result<DidDocument>> + Send
    where
        Self: Sync,
    {
        async move {
            match actor {
                AtIdentifier::Did(did) => self.resolve_did_doc(did).await,
                AtIdentifier::Handle(handle) => {
                    let did = self.resolve_handle(handle).await?;
                    self.resolve_did_doc(&did).await
                }
            }
        }
    }

    /// Return the PDS url for a DID
    fn pds_for_did(&self, did: &Did<'_>) -> impl Future<Output = Result<Url>> + Send
    where
        Self: Sync,
    {
        async {
            let doc = self.resolve_did_doc(did).await?;
            doc.pds_url().ok_or(IdentityError::MissingPdsEndpoint)
        }
    }

    /// Return the DID and PDS url for a handle
    fn pds_for_handle(
        &self,
        handle: &Handle<'_>,
    ) -> impl Future<Output = Result<(Did<'static>, Url)>> + Send
    where
        Self: Sync,
    {
        async {
            let did = self.resolve_handle(handle).await?;
            let pds = self.pds_for_did(&did).await?;
            Ok((did, pds))
        }
    }

    /// Return the `#atproto` signing key for a DID
    fn signing_key_for_did(&self, did: &Did<'_>) -> impl Future<Output = Result<PublicKey>> + Send
    where
        Self: Sync,
    {
        async {
            let doc = self.resolve_did_doc(did).await?;
            doc.signing_public_key()?
                .ok_or(IdentityError::MissingSigningKey)
        }
    }

    /// Resolve a handle and confirm the DID document claims it back.
    ///
    /// A handle is only trustworthy when both directions agree.
    fn verify_handle(
        &self,
        handle: &Handle<'_>,
    ) -> impl Future<Output = Result<Did<'static>>> + Send
    where
        Self: Sync,
    {
        async {
            let did = self.resolve_handle(handle).await?;
            let doc = self.resolve_did_doc(&did).await?;
            if !doc.has_handle(handle) {
                return Err(IdentityError::HandleMismatch {
                    handle: handle.clone().into_static(),
                    did,
                });
            }
            Ok(did)
        }
    }
}

impl<T: IdentityResolver + Sync + Send> IdentityResolver for std::sync::Arc<T> {
    fn options(&self) -> &ResolverOptions {
        self.as_ref().options()
    }

    async fn resolve_handle(&self, handle: &Handle<'_>) -> Result<Did<'static>> {
        self.as_ref().resolve_handle(handle).await
    }

    async fn resolve_did_doc(&self, did: &Did<'_>) -> Result<DidDocument> {
        self.as_ref().resolve_did_doc(did).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let opts = ResolverOptions::default();
        assert_eq!(opts.plc_directory.as_str(), "https://plc.directory/");
        assert_eq!(opts.doh_endpoint.host_str(), Some("cloudflare-dns.com"));
        assert_eq!(
            opts.handle_order,
            vec![HandleStep::HttpsWellKnown, HandleStep::DnsOverHttps]
        );
        assert!(opts.validate_doc_id);
        assert!(opts.reject_reserved_tlds);
    }

    #[test]
    fn builder_defaults_flags() {
        let opts = ResolverOptions::new()
            .plc_directory(Url::parse("http://localhost:2582/").unwrap())
            .doh_endpoint(Url::parse("https://dns.google/resolve").unwrap())
            .handle_order(vec![HandleStep::DnsOverHttps])
            .reject_reserved_tlds(false)
            .build();
        assert!(opts.validate_doc_id);
        assert!(!opts.reject_reserved_tlds);
    }

    #[test]
    fn handle_failure_lists_attempts() {
        let handle = Handle::new_static("alice.example.org").unwrap();
        let err = IdentityError::HandleResolutionFailed {
            handle: handle.clone(),
            attempts: vec![
                IdentityError::HttpResolutionFailed {
                    handle: handle.clone(),
                    source: FetchError::Status(StatusCode::NOT_FOUND),
                },
                IdentityError::DnsResolutionFailed {
                    handle,
                    source: FetchError::Body("no did= TXT record".into()),
                },
            ],
        };
        assert_eq!(err.to_string(), "could not resolve handle alice.example.org");
        let related: Vec<String> = miette::Diagnostic::related(&err)
            .unwrap()
            .map(|e| e.to_string())
            .collect();
        assert_eq!(related.len(), 2);
        assert!(related[0].starts_with("HTTPS well-known"));
    }
}
