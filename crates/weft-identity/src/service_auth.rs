//! End-to-end verification of inbound service auth tokens.
//!
//! [`weft_common::service_auth`] knows how to check a token against a key. This module
//! finds the key: it resolves the issuer's DID document, takes its `#atproto`
//! verification method, and only then checks the signature, audience, expiry and
//! method binding.
//!
//! ```no_run
//! # async fn example(token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! use weft_common::types::string::{Did, Nsid};
//! use weft_identity::PublicResolver;
//! use weft_identity::service_auth::verify_service_auth;
//!
//! let resolver = PublicResolver::default();
//! let me = Did::new("did:web:feed.example.com")?;
//! let lxm = Nsid::new("app.bsky.feed.getFeedSkeleton")?;
//! let auth = verify_service_auth(&resolver, token, &me, Some(&lxm)).await?;
//! println!("request from {}", auth.issuer());
//! # Ok(())
//! # }
//! ```

use crate::resolver::{IdentityError, IdentityResolver};
use weft_common::service_auth::{ParsedJwt, ServiceAuthClaims, ServiceAuthError};
use weft_common::types::crypto::PublicKey;
use weft_common::types::string::{Did, Nsid};

/// Why an inbound token was refused.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum VerifyError {
    /// The token is malformed, badly signed, expired, or meant for someone else
    #[error(transparent)]
    #[diagnostic(transparent)]
    Token(#[from] ServiceAuthError),
    /// The issuer's signing key could not be found
    #[error(transparent)]
    #[diagnostic(transparent)]
    Identity(#[from] IdentityError),
}

/// A service auth token that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedServiceAuth {
    claims: ServiceAuthClaims,
    key: PublicKey,
}

impl VerifiedServiceAuth {
    /// The DID of the account the request is made on behalf of
    pub fn issuer(&self) -> &Did<'static> {
        &self.claims.iss
    }

    /// The method the token is bound to, if any
    pub fn method(&self) -> Option<&Nsid<'static>> {
        self.claims.lxm.as_ref()
    }

    /// All verified claims
    pub fn claims(&self) -> &ServiceAuthClaims {
        &self.claims
    }

    /// The key the signature was checked against
    pub fn signing_key(&self) -> &PublicKey {
        &self.key
    }

    /// Take the claims
    pub fn into_claims(self) -> ServiceAuthClaims {
        self.claims
    }
}

/// Verify `token` as a service auth token addressed to `expected_aud`.
///
/// When `expected_lxm` is given, the token must be bound to exactly that method.
/// Structural problems are reported before any network access.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(aud = %expected_aud)))]
pub async fn verify_service_auth<R>(
    resolver: &R,
    token: &str,
    expected_aud: &Did<'_>,
    expected_lxm: Option<&Nsid<'_>>,
) -> Result<VerifiedServiceAuth, VerifyError>
where
    R: IdentityResolver + Sync,
{
    let jwt = ParsedJwt::parse(token)?;
    let iss = jwt.unverified_claims().iss.clone();
    #[cfg(feature = "tracing")]
    tracing::debug!(%iss, alg = %jwt.header().alg, "resolving service auth issuer");
    let key = resolver.signing_key_for_did(&iss).await?;
    let verified = jwt.verify_with(&key)?;
    let claims = verified.into_claims();
    claims.validate(expected_aud)?;
    if let Some(lxm) = expected_lxm {
        claims.require_method(lxm)?;
    }
    Ok(VerifiedServiceAuth { claims, key })
}
