//! Identity resolution for the AT Protocol
//!
//! Handle-to-DID and DID-to-document resolution for weft, plus verification of
//! inbound service auth tokens against the issuer's published key.
//!
//! ## Quick start
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use weft_identity::{PublicResolver, resolver::IdentityResolver};
//! use weft_common::types::string::Handle;
//!
//! let resolver = PublicResolver::default();
//!
//! // Resolve handle to DID
//! let did = resolver.resolve_handle(&Handle::new("alice.bsky.social")?).await?;
//!
//! // Fetch DID document
//! let doc = resolver.resolve_did_doc(&did).await?;
//! println!("{:?}", doc.pds_endpoint());
//! # Ok(())
//! # }
//! ```
//!
//! ## Resolution order
//!
//! **Handle → DID** (configurable via [`resolver::HandleStep`]):
//! 1. HTTPS well-known at `https://{handle}/.well-known/atproto-did`
//! 2. TXT record at `_atproto.{handle}`, via a DNS-over-HTTPS JSON endpoint
//!
//! **DID → Document**:
//! - `did:plc`: `GET {plc_directory}/{did}`
//! - `did:web`: `GET https://{domain}/.well-known/did.json`, or
//!   `https://{domain}/{path...}/did.json` when the DID has path segments
//!
//! ## Customization
//!
//! ```
//! use weft_identity::WeftResolver;
//! use weft_identity::resolver::{HandleStep, ResolverOptions};
//!
//! let resolver = WeftResolver::new(reqwest::Client::new(), ResolverOptions::default())
//!     .with_handle_order(vec![HandleStep::DnsOverHttps])
//!     .with_validate_doc_id(true);
//! ```
//!
//! The resolver holds no mutable state. Clone the HTTP client (or wrap the resolver
//! in an `Arc`) to share one connection pool between concurrent lookups.

#![warn(missing_docs)]
pub mod resolver;
pub mod service_auth;

use crate::resolver::{FetchError, HandleStep, IdentityError, IdentityResolver, ResolverOptions};
use http::header::ACCEPT;
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use smol_str::SmolStr;
use url::{ParseError, Url};
use weft_common::IntoStatic;
use weft_common::http_client::HttpClient;
use weft_common::types::did::DidMethod;
use weft_common::types::did_doc::DidDocument;
use weft_common::types::string::{Did, Handle};

/// DNS resource record type for TXT
const DNS_TYPE_TXT: u16 = 16;

/// Default resolver implementation.
#[derive(Debug, Clone)]
pub struct WeftResolver<C = reqwest::Client> {
    http: C,
    opts: ResolverOptions,
}

/// Resolver using a plain `reqwest` client and default options
pub type PublicResolver = WeftResolver<reqwest::Client>;

impl Default for PublicResolver {
    fn default() -> Self {
        WeftResolver::new(reqwest::Client::new(), ResolverOptions::default())
    }
}

impl<C: HttpClient> WeftResolver<C> {
    /// Create a resolver over `http` with the given options
    pub fn new(http: C, opts: ResolverOptions) -> Self {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            plc_directory = %opts.plc_directory,
            doh_endpoint = %opts.doh_endpoint,
            validate_doc_id = opts.validate_doc_id,
            "weft resolver created"
        );
        Self { http, opts }
    }

    /// Set the PLC directory base
    pub fn with_plc_directory(mut self, base: Url) -> Self {
        self.opts.plc_directory = base;
        self
    }

    /// Set the DNS-over-HTTPS endpoint
    pub fn with_doh_endpoint(mut self, endpoint: Url) -> Self {
        self.opts.doh_endpoint = endpoint;
        self
    }

    /// Set which handle resolution methods run, and in what order
    pub fn with_handle_order(mut self, order: Vec<HandleStep>) -> Self {
        self.opts.handle_order = order;
        self
    }

    /// Enable/disable doc id validation
    pub fn with_validate_doc_id(mut self, enable: bool) -> Self {
        self.opts.validate_doc_id = enable;
        self
    }

    /// Enable/disable the reserved TLD check on handles
    pub fn with_reject_reserved_tlds(mut self, enable: bool) -> Self {
        self.opts.reject_reserved_tlds = enable;
        self
    }

    /// The underlying HTTP client
    pub fn http_client(&self) -> &C {
        &self.http
    }

    /// Where a `did:plc` document lives: `{plc_directory}/{did}`.
    pub fn plc_url(&self, did: &Did<'_>) -> resolver::Result<Url> {
        let mut url = self.opts.plc_directory.clone();
        url.path_segments_mut()
            .map_err(|_| IdentityError::Url(ParseError::SetHostOnCannotBeABaseUrl))?
            .pop_if_empty()
            .push(did.as_str());
        Ok(url)
    }

    /// Fetch `url` and return the body of a 2xx response.
    async fn fetch(&self, url: &Url, accept: &str) -> Result<Vec<u8>, FetchError> {
        let request = http::Request::get(url.as_str())
            .header(ACCEPT, accept)
            .body(Vec::new())?;
        #[cfg(feature = "tracing")]
        tracing::debug!(%url, "fetching");
        let response = self
            .http
            .send_http(request)
            .await
            .map_err(|e| FetchError::Transport(Box::new(e)))?;
        let status = response.status();
        #[cfg(feature = "tracing")]
        tracing::trace!(%url, %status, "fetched");
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        Ok(response.into_body())
    }

    /// `GET https://{handle}/.well-known/atproto-did`; the trimmed body must be a DID.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self), fields(handle = %handle)))]
    pub async fn resolve_handle_well_known(
        &self,
        handle: &Handle<'_>,
    ) -> resolver::Result<Did<'static>> {
        let fail = |source| IdentityError::HttpResolutionFailed {
            handle: handle.clone().into_static(),
            source,
        };
        let url = Url::parse(&format!(
            "https://{}/.well-known/atproto-did",
            handle.normalize()
        ))?;
        let body = self.fetch(&url, "text/plain").await.map_err(fail)?;
        parse_well_known_body(&body).ok_or_else(|| {
            fail(FetchError::Body(SmolStr::new_static(
                "well-known body is not a valid DID",
            )))
        })
    }

    /// Look up `_atproto.{handle}` TXT records through the DNS-over-HTTPS endpoint.
    ///
    /// The first answer of the form `did=<did>` holding a valid DID wins.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self), fields(handle = %handle)))]
    pub async fn resolve_handle_doh(&self, handle: &Handle<'_>) -> resolver::Result<Did<'static>> {
        let fail = |source| IdentityError::DnsResolutionFailed {
            handle: handle.clone().into_static(),
            source,
        };
        let mut url = self.opts.doh_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("name", &format!("_atproto.{}", handle.normalize()))
            .append_pair("type", "TXT");
        let body = self
            .fetch(&url, "application/dns-json")
            .await
            .map_err(fail)?;
        let response: DohResponse = serde_json::from_slice(&body).map_err(|_| {
            fail(FetchError::Body(SmolStr::new_static(
                "DNS-over-HTTPS response is not valid JSON",
            )))
        })?;
        response
            .answer
            .iter()
            .filter(|answer| answer.kind.is_none_or(|kind| kind == DNS_TYPE_TXT))
            .find_map(|answer| parse_txt_did(&answer.data))
            .ok_or_else(|| {
                fail(FetchError::Body(SmolStr::new_static(
                    "no valid did= TXT record",
                )))
            })
    }

    async fn resolve_did_doc_inner(&self, did: &Did<'_>) -> resolver::Result<DidDocument> {
        let url = match did.method() {
            DidMethod::Plc => self.plc_url(did)?,
            DidMethod::Web => did_web_url(did)?,
            DidMethod::Other(method) => {
                return Err(IdentityError::UnsupportedDidMethod(SmolStr::new(method)));
            }
        };
        let body = self
            .fetch(&url, "application/did+ld+json, application/json")
            .await
            .map_err(|source| IdentityError::DidResolutionFailed {
                did: did.clone().into_static(),
                source,
            })?;
        let doc =
            DidDocument::from_slice(&body).map_err(|source| IdentityError::InvalidDocument {
                did: did.clone().into_static(),
                source,
            })?;
        if self.opts.validate_doc_id && doc.id.as_str() != did.as_str() {
            return Err(IdentityError::DocIdMismatch {
                expected: did.clone().into_static(),
                doc: Box::new(doc),
            });
        }
        Ok(doc)
    }
}

/// Construct the HTTPS URL for a `did:web` DID.
///
/// - `did:web:example.com` → `https://example.com/.well-known/did.json`
/// - `did:web:example.com:user:alice` → `https://example.com/user/alice/did.json`
/// - `did:web:localhost%3A8080` → `https://localhost:8080/.well-known/did.json`
pub fn did_web_url(did: &Did<'_>) -> resolver::Result<Url> {
    if did.method() != DidMethod::Web {
        return Err(IdentityError::UnsupportedDidMethod(SmolStr::new(
            did.method().as_str(),
        )));
    }
    let mut parts = did.identifier().split(':');
    // the identifier is never empty, so there is always a first part
    let host = parts.next().unwrap_or_default();
    let host = percent_decode_str(host).decode_utf8_lossy();
    let mut url = Url::parse(&format!("https://{host}/"))?;
    let path: Vec<_> = parts.collect();
    if path.is_empty() {
        url.set_path(".well-known/did.json");
    } else {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| IdentityError::Url(ParseError::SetHostOnCannotBeABaseUrl))?;
        segments.pop_if_empty();
        for seg in path {
            segments.push(&percent_decode_str(seg).decode_utf8_lossy());
        }
        segments.push("did.json");
    }
    Ok(url)
}

fn parse_well_known_body(body: &[u8]) -> Option<Did<'static>> {
    let text = std::str::from_utf8(body).ok()?;
    Did::new_owned(text.trim()).ok()
}

/// Pull a DID out of one TXT answer, e.g. `"did=did:plc:abc123"`.
fn parse_txt_did(data: &str) -> Option<Did<'static>> {
    let data = data.trim();
    let data = data
        .strip_prefix('"')
        .and_then(|d| d.strip_suffix('"'))
        .unwrap_or(data);
    let did = data.strip_prefix("did=")?;
    Did::new_owned(did).ok()
}

#[derive(Deserialize)]
struct DohResponse {
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    kind: Option<u16>,
    data: String,
}

impl<C: HttpClient + Sync> IdentityResolver for WeftResolver<C> {
    fn options(&self) -> &ResolverOptions {
        &self.opts
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self), fields(handle = %handle)))]
    async fn resolve_handle(&self, handle: &Handle<'_>) -> resolver::Result<Did<'static>> {
        if self.opts.reject_reserved_tlds && handle.has_reserved_tld() {
            return Err(IdentityError::ReservedHandle(handle.clone().into_static()));
        }
        let mut attempts = Vec::with_capacity(self.opts.handle_order.len());
        for step in &self.opts.handle_order {
            let result = match step {
                HandleStep::HttpsWellKnown => self.resolve_handle_well_known(handle).await,
                HandleStep::DnsOverHttps => self.resolve_handle_doh(handle).await,
            };
            match result {
                Ok(did) => return Ok(did),
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(?step, error = %e, "handle resolution step failed, falling back");
                    attempts.push(e);
                }
            }
        }
        Err(IdentityError::HandleResolutionFailed {
            handle: handle.clone().into_static(),
            attempts,
        })
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self), fields(did = %did)))]
    async fn resolve_did_doc(&self, did: &Did<'_>) -> resolver::Result<DidDocument> {
        self.resolve_did_doc_inner(did).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web_url(s: &str) -> String {
        did_web_url(&Did::new(s).unwrap()).unwrap().to_string()
    }

    #[test]
    fn did_web_urls() {
        assert_eq!(
            web_url("did:web:example.com"),
            "https://example.com/.well-known/did.json"
        );
        assert_eq!(
            web_url("did:web:example.com:user:alice"),
            "https://example.com/user/alice/did.json"
        );
        assert_eq!(
            web_url("did:web:localhost%3A8080"),
            "https://localhost:8080/.well-known/did.json"
        );
        assert_eq!(
            web_url("did:web:localhost%3A8080:u"),
            "https://localhost:8080/u/did.json"
        );
        assert!(matches!(
            did_web_url(&Did::new("did:plc:abc").unwrap()),
            Err(IdentityError::UnsupportedDidMethod(_))
        ));
    }

    #[test]
    fn plc_urls() {
        let r = PublicResolver::default();
        let did = Did::new("did:plc:ewvi7nxzyoun6zhxrhs64oiz").unwrap();
        assert_eq!(
            r.plc_url(&did).unwrap().as_str(),
            "https://plc.directory/did:plc:ewvi7nxzyoun6zhxrhs64oiz"
        );
        let r = r.with_plc_directory(Url::parse("http://localhost:2582").unwrap());
        assert_eq!(
            r.plc_url(&did).unwrap().as_str(),
            "http://localhost:2582/did:plc:ewvi7nxzyoun6zhxrhs64oiz"
        );
        let r = r.with_plc_directory(Url::parse("https://mirror.test/plc/").unwrap());
        assert_eq!(
            r.plc_url(&did).unwrap().as_str(),
            "https://mirror.test/plc/did:plc:ewvi7nxzyoun6zhxrhs64oiz"
        );
    }

    #[test]
    fn txt_records() {
        assert_eq!(
            parse_txt_did("\"did=did:plc:abc123\"").unwrap().as_str(),
            "did:plc:abc123"
        );
        assert_eq!(
            parse_txt_did("did=did:web:example.com").unwrap().as_str(),
            "did:web:example.com"
        );
        assert!(parse_txt_did("\"v=spf1 -all\"").is_none());
        assert!(parse_txt_did("\"did=not-a-did\"").is_none());
    }

    #[test]
    fn well_known_bodies() {
        assert_eq!(
            parse_well_known_body(b"  did:plc:abc123\n").unwrap().as_str(),
            "did:plc:abc123"
        );
        assert!(parse_well_known_body(b"<html>nope</html>").is_none());
        assert!(parse_well_known_body(b"").is_none());
        assert!(parse_well_known_body(&[0xff, 0xfe]).is_none());
    }
}
