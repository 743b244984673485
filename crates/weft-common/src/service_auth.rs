//! Service auth JWT parsing, verification and signing.
//!
//! Service auth is atproto's inter-service authentication mechanism. A PDS signs a
//! short-lived JWT with the account's `#atproto` signing key and the receiving
//! service (feed generator, labeler, ...) checks it against the key published in
//! the issuer's DID document.
//!
//! # Token shape
//!
//! - Header: `alg` (`ES256K` for secp256k1, `ES256` for P-256), `typ` (`JWT`)
//! - Payload: `iss` (issuer DID), `aud` (audience DID), `exp` (expiry, unix seconds),
//!   and optionally `iat`, `jti` (nonce) and `lxm` (the XRPC method the token is bound to)
//! - Signature: 64 raw bytes, `r || s`, over `header_b64 "." payload_b64` with SHA-256
//!
//! # Lifecycle
//!
//! [`ParsedJwt::parse`] checks structure only. Nothing it returns is authentic: the
//! claims are only reachable through [`ParsedJwt::unverified_claims`]. A
//! [`VerifiedJwt`] comes out of [`ParsedJwt::verify`] / [`ParsedJwt::verify_with`]
//! once the signature checks out.
//!
//! **Signature verification does not look at `exp`, `aud` or `lxm`.** A verified token
//! may still be expired or meant for somebody else; call
//! [`ServiceAuthClaims::validate`] (and [`ServiceAuthClaims::require_method`] where the
//! method matters) on the verified claims as well.

use crate::types::crypto::{CryptoError, KeyType, PublicKey, parse_public_key};
use crate::types::string::{AtStrError, Did, Nsid};
use crate::{IntoStatic, multibase};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bon::Builder;
use serde::{Deserialize, Serialize};
use signature::{Signer, Verifier};
use smol_str::SmolStr;
use std::fmt;

/// Length of a raw `r || s` ECDSA signature on either supported curve.
pub const SIGNATURE_LEN: usize = 64;

/// Errors that can occur during JWT parsing and verification.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ServiceAuthError {
    /// Not three dot-separated segments
    #[error("malformed JWT: {0}")]
    #[diagnostic(
        code(weft::service_auth::malformed),
        help("compact JWTs are `header.payload.signature`, each base64url without padding")
    )]
    MalformedToken(&'static str),

    /// A segment is not unpadded base64url
    #[error("base64 decode error in JWT {part}")]
    #[diagnostic(code(weft::service_auth::base64))]
    Base64Decode {
        /// Which segment failed
        part: &'static str,
        /// Underlying decoder error
        #[source]
        source: base64::DecodeError,
    },

    /// The header or payload is not the expected JSON
    #[error("JSON error in JWT {part}")]
    #[diagnostic(code(weft::service_auth::json))]
    JsonParse {
        /// Which segment failed
        part: &'static str,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// The header or claims could not be serialized while signing
    #[error("could not encode JWT {part} as JSON")]
    #[diagnostic(code(weft::service_auth::json_encode))]
    JsonEncode {
        /// Which segment failed
        part: &'static str,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// `alg` is not one of the two supported ECDSA algorithms
    #[error("unsupported algorithm: {alg}")]
    #[diagnostic(
        code(weft::service_auth::unsupported_algorithm),
        help("service auth tokens are signed with ES256K or ES256")
    )]
    UnsupportedAlgorithm {
        /// Algorithm name from the header
        alg: SmolStr,
    },

    /// The signature segment decoded to the wrong number of bytes
    #[error("signature is {0} bytes, expected 64")]
    #[diagnostic(
        code(weft::service_auth::signature_length),
        help("signatures must be raw r||s, not ASN.1 DER")
    )]
    InvalidSignatureLength(usize),

    /// A required claim is absent
    #[error("missing required claim `{0}`")]
    #[diagnostic(code(weft::service_auth::missing_claim))]
    MissingClaim(&'static str),

    /// A claim is present but not a valid identifier of its kind
    #[error("invalid `{claim}` claim")]
    #[diagnostic(code(weft::service_auth::invalid_claim))]
    InvalidClaim {
        /// Claim name
        claim: &'static str,
        /// Why the value was rejected
        #[source]
        #[diagnostic_source]
        source: AtStrError,
    },

    /// The key's curve does not match the token's `alg`
    #[error("token is {alg} but the key is {key}")]
    #[diagnostic(code(weft::service_auth::key_type_mismatch))]
    KeyTypeMismatch {
        /// Algorithm declared by the token
        alg: Algorithm,
        /// Curve of the supplied key
        key: KeyType,
    },

    /// The verification key could not be decoded
    #[error("bad verification key")]
    #[diagnostic(code(weft::service_auth::key))]
    Key(#[from] CryptoError),

    /// The signature does not verify
    #[error("invalid signature")]
    #[diagnostic(code(weft::service_auth::invalid_signature))]
    InvalidSignature,

    /// Token has expired
    #[error("token expired at {exp} (current time: {now})")]
    #[diagnostic(code(weft::service_auth::expired))]
    Expired {
        /// Expiration timestamp from the token
        exp: i64,
        /// Current timestamp
        now: i64,
    },

    /// Audience mismatch
    #[error("audience mismatch: expected {expected}, got {actual}")]
    #[diagnostic(code(weft::service_auth::audience_mismatch))]
    AudienceMismatch {
        /// Expected audience DID
        expected: Did<'static>,
        /// Audience DID in the token
        actual: Did<'static>,
    },

    /// Method mismatch (`lxm` claim)
    #[error("method mismatch: expected {expected}, got {actual:?}")]
    #[diagnostic(code(weft::service_auth::method_mismatch))]
    MethodMismatch {
        /// Expected method NSID
        expected: Nsid<'static>,
        /// Method NSID in the token, if any
        actual: Option<Nsid<'static>>,
    },
}

/// Signing algorithm declared in a JWT header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// ECDSA over secp256k1 with SHA-256
    #[serde(rename = "ES256K")]
    Es256K,
    /// ECDSA over P-256 with SHA-256
    #[serde(rename = "ES256")]
    Es256,
}

impl Algorithm {
    /// Look up an algorithm by its JOSE name.
    pub fn from_name(alg: &str) -> Option<Self> {
        match alg {
            "ES256K" => Some(Algorithm::Es256K),
            "ES256" => Some(Algorithm::Es256),
            _ => None,
        }
    }

    /// The JOSE name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Algorithm::Es256K => "ES256K",
            Algorithm::Es256 => "ES256",
        }
    }

    /// The curve a key must be on to verify this algorithm.
    pub const fn key_type(self) -> KeyType {
        match self {
            Algorithm::Es256K => KeyType::Secp256k1,
            Algorithm::Es256 => KeyType::P256,
        }
    }

    /// The algorithm that signs with keys on `key_type`.
    pub const fn for_key_type(key_type: KeyType) -> Self {
        match key_type {
            KeyType::Secp256k1 => Algorithm::Es256K,
            KeyType::P256 => Algorithm::Es256,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT header for service auth tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JwtHeader {
    /// Algorithm used for signing
    pub alg: Algorithm,
    /// Token type, normally `JWT`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<SmolStr>,
}

#[derive(Deserialize)]
struct RawHeader {
    alg: Option<SmolStr>,
    typ: Option<SmolStr>,
}

/// Service authentication claims.
///
/// These are the payload fields in a service auth JWT. Timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Builder)]
#[builder(start_fn = new)]
pub struct ServiceAuthClaims {
    /// Issuer (the account's DID)
    pub iss: Did<'static>,
    /// Audience (the target service's DID)
    pub aud: Did<'static>,
    /// Expiration time
    pub exp: i64,
    /// Issued at
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// JWT ID (nonce for replay protection)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub jti: Option<SmolStr>,
    /// Lexicon method NSID the token is bound to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lxm: Option<Nsid<'static>>,
}

#[derive(Deserialize)]
struct RawClaims {
    iss: Option<String>,
    aud: Option<String>,
    exp: Option<i64>,
    iat: Option<i64>,
    jti: Option<SmolStr>,
    lxm: Option<String>,
}

impl TryFrom<RawClaims> for ServiceAuthClaims {
    type Error = ServiceAuthError;

    fn try_from(raw: RawClaims) -> Result<Self, Self::Error> {
        let did_claim = |claim: &'static str, value: Option<String>| {
            let value = value.ok_or(ServiceAuthError::MissingClaim(claim))?;
            Did::try_from(value).map_err(|source| ServiceAuthError::InvalidClaim { claim, source })
        };
        let iss = did_claim("iss", raw.iss)?;
        let aud = did_claim("aud", raw.aud)?;
        let exp = raw.exp.ok_or(ServiceAuthError::MissingClaim("exp"))?;
        let lxm = raw
            .lxm
            .map(Nsid::new_owned)
            .transpose()
            .map_err(|source| ServiceAuthError::InvalidClaim {
                claim: "lxm",
                source,
            })?;
        Ok(ServiceAuthClaims {
            iss,
            aud,
            exp,
            iat: raw.iat,
            jti: raw.jti,
            lxm,
        })
    }
}

impl ServiceAuthClaims {
    /// Check audience and expiry against the current time.
    pub fn validate(&self, expected_aud: &Did<'_>) -> Result<(), ServiceAuthError> {
        self.validate_at(expected_aud, chrono::Utc::now().timestamp())
    }

    /// Check audience and expiry against `now`.
    pub fn validate_at(&self, expected_aud: &Did<'_>, now: i64) -> Result<(), ServiceAuthError> {
        if self.aud.as_str() != expected_aud.as_str() {
            return Err(ServiceAuthError::AudienceMismatch {
                expected: expected_aud.clone().into_static(),
                actual: self.aud.clone(),
            });
        }
        if self.is_expired_at(now) {
            return Err(ServiceAuthError::Expired { exp: self.exp, now });
        }
        Ok(())
    }

    /// Whether the token has expired by the wall clock.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp())
    }

    /// Whether the token has expired as of `now`. A token expires at `exp` exactly.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp <= now
    }

    /// Like [`is_expired`](Self::is_expired), but allows the token to live `skew_secs`
    /// past `exp` to tolerate clock drift between services.
    pub fn is_expired_with_skew(&self, skew_secs: i64) -> bool {
        self.exp.saturating_add(skew_secs) <= chrono::Utc::now().timestamp()
    }

    /// Whether the token is bound to `nsid`.
    pub fn check_method(&self, nsid: &Nsid<'_>) -> bool {
        self.lxm
            .as_ref()
            .is_some_and(|lxm| lxm.as_str() == nsid.as_str())
    }

    /// Require that the token is bound to `nsid`.
    pub fn require_method(&self, nsid: &Nsid<'_>) -> Result<(), ServiceAuthError> {
        if !self.check_method(nsid) {
            return Err(ServiceAuthError::MethodMismatch {
                expected: nsid.clone().into_static(),
                actual: self.lxm.clone(),
            });
        }
        Ok(())
    }
}

fn decode_segment(part: &'static str, segment: &str) -> Result<Vec<u8>, ServiceAuthError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|source| ServiceAuthError::Base64Decode { part, source })
}

/// A structurally valid JWT whose signature has **not** been checked.
#[derive(Debug, Clone)]
pub struct ParsedJwt {
    token: String,
    signing_input_end: usize,
    header: JwtHeader,
    claims: ServiceAuthClaims,
    signature: [u8; SIGNATURE_LEN],
}

impl ParsedJwt {
    /// Split and decode a compact token.
    ///
    /// Fails on anything other than exactly three segments, an unknown `alg`, missing
    /// `iss`/`aud`/`exp`, or a signature that isn't 64 bytes.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all))]
    pub fn parse(token: &str) -> Result<Self, ServiceAuthError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ServiceAuthError::MalformedToken(
                "JWT must have exactly 3 parts separated by dots",
            ));
        };

        let header_buf = decode_segment("header", header_b64)?;
        let raw_header: RawHeader = serde_json::from_slice(&header_buf)
            .map_err(|source| ServiceAuthError::JsonParse {
                part: "header",
                source,
            })?;
        let alg_name = raw_header
            .alg
            .ok_or(ServiceAuthError::MalformedToken("header has no `alg`"))?;
        let alg = Algorithm::from_name(&alg_name)
            .ok_or(ServiceAuthError::UnsupportedAlgorithm { alg: alg_name })?;
        let header = JwtHeader {
            alg,
            typ: raw_header.typ,
        };

        let payload_buf = decode_segment("payload", payload_b64)?;
        let raw_claims: RawClaims = serde_json::from_slice(&payload_buf)
            .map_err(|source| ServiceAuthError::JsonParse {
                part: "payload",
                source,
            })?;
        let claims = ServiceAuthClaims::try_from(raw_claims)?;

        let signature_buf = decode_segment("signature", signature_b64)?;
        let signature: [u8; SIGNATURE_LEN] = signature_buf
            .as_slice()
            .try_into()
            .map_err(|_| ServiceAuthError::InvalidSignatureLength(signature_buf.len()))?;

        Ok(ParsedJwt {
            token: token.to_owned(),
            signing_input_end: header_b64.len() + 1 + payload_b64.len(),
            header,
            claims,
            signature,
        })
    }

    /// The decoded header.
    pub fn header(&self) -> &JwtHeader {
        &self.header
    }

    /// The payload claims. **Not authenticated**: use for routing (e.g. which DID to
    /// resolve) only, never for access decisions.
    pub fn unverified_claims(&self) -> &ServiceAuthClaims {
        &self.claims
    }

    /// The raw `r || s` signature.
    pub fn signature(&self) -> &[u8; SIGNATURE_LEN] {
        &self.signature
    }

    /// The signed bytes: the original `header.payload` text.
    pub fn signing_input(&self) -> &[u8] {
        &self.token.as_bytes()[..self.signing_input_end]
    }

    /// The token as given to [`parse`](Self::parse).
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// Verify against a `publicKeyMultibase` value.
    ///
    /// The key's curve is checked against `alg` before the point is decoded.
    pub fn verify(self, multibase_key: &str) -> Result<VerifiedJwt, ServiceAuthError> {
        let bytes = multibase::decode(multibase_key).map_err(CryptoError::from)?;
        let key = parse_public_key(&bytes)?;
        self.check_key_type(key.key_type)?;
        let key = PublicKey::from_parts(key)?;
        self.verify_signature(&key)
    }

    /// Verify against an already-decoded key.
    pub fn verify_with(self, key: &PublicKey) -> Result<VerifiedJwt, ServiceAuthError> {
        self.check_key_type(key.key_type())?;
        self.verify_signature(key)
    }

    fn check_key_type(&self, key: KeyType) -> Result<(), ServiceAuthError> {
        if self.header.alg.key_type() != key {
            return Err(ServiceAuthError::KeyTypeMismatch {
                alg: self.header.alg,
                key,
            });
        }
        Ok(())
    }

    fn verify_signature(self, key: &PublicKey) -> Result<VerifiedJwt, ServiceAuthError> {
        let signing_input = self.signing_input();
        // some signers emit high-S signatures, which k256 refuses as-is
        let verified = match key {
            PublicKey::K256(key) => {
                let sig = k256::ecdsa::Signature::from_slice(&self.signature)
                    .map_err(|_| ServiceAuthError::InvalidSignature)?;
                let sig = sig.normalize_s().unwrap_or(sig);
                key.verify(signing_input, &sig).is_ok()
            }
            PublicKey::P256(key) => {
                let sig = p256::ecdsa::Signature::from_slice(&self.signature)
                    .map_err(|_| ServiceAuthError::InvalidSignature)?;
                let sig = sig.normalize_s().unwrap_or(sig);
                key.verify(signing_input, &sig).is_ok()
            }
        };
        if !verified {
            #[cfg(feature = "tracing")]
            tracing::debug!(iss = %self.claims.iss, alg = %self.header.alg, "service auth signature rejected");
            return Err(ServiceAuthError::InvalidSignature);
        }
        Ok(VerifiedJwt {
            header: self.header,
            claims: self.claims,
        })
    }
}

/// A JWT whose signature verified against the issuer's key.
///
/// Expiry, audience and method binding are still the caller's to check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedJwt {
    header: JwtHeader,
    claims: ServiceAuthClaims,
}

impl VerifiedJwt {
    /// The header.
    pub fn header(&self) -> &JwtHeader {
        &self.header
    }

    /// The authenticated claims.
    pub fn claims(&self) -> &ServiceAuthClaims {
        &self.claims
    }

    /// Take the authenticated claims.
    pub fn into_claims(self) -> ServiceAuthClaims {
        self.claims
    }
}

/// A private key for minting service auth tokens.
#[derive(Clone)]
pub enum SigningKey {
    /// secp256k1 signing key (`ES256K`)
    K256(k256::ecdsa::SigningKey),
    /// P-256 signing key (`ES256`)
    P256(p256::ecdsa::SigningKey),
}

impl SigningKey {
    /// Load a 32-byte secret scalar.
    pub fn from_bytes(key_type: KeyType, secret: &[u8]) -> Result<Self, CryptoError> {
        match key_type {
            KeyType::Secp256k1 => k256::ecdsa::SigningKey::from_slice(secret)
                .map(SigningKey::K256)
                .map_err(|_| CryptoError::InvalidLength {
                    expected: 32,
                    actual: secret.len(),
                }),
            KeyType::P256 => p256::ecdsa::SigningKey::from_slice(secret)
                .map(SigningKey::P256)
                .map_err(|_| CryptoError::InvalidLength {
                    expected: 32,
                    actual: secret.len(),
                }),
        }
    }

    /// The curve.
    pub fn key_type(&self) -> KeyType {
        match self {
            SigningKey::K256(_) => KeyType::Secp256k1,
            SigningKey::P256(_) => KeyType::P256,
        }
    }

    /// The matching verification key.
    pub fn public_key(&self) -> PublicKey {
        match self {
            SigningKey::K256(key) => PublicKey::K256(key.verifying_key().clone()),
            SigningKey::P256(key) => PublicKey::P256(key.verifying_key().clone()),
        }
    }

    fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        let mut out = [0u8; SIGNATURE_LEN];
        match self {
            SigningKey::K256(key) => {
                let sig: k256::ecdsa::Signature = key.sign(message);
                let sig = sig.normalize_s().unwrap_or(sig);
                out.copy_from_slice(&sig.to_bytes());
            }
            SigningKey::P256(key) => {
                let sig: p256::ecdsa::Signature = key.sign(message);
                let sig = sig.normalize_s().unwrap_or(sig);
                out.copy_from_slice(&sig.to_bytes());
            }
        }
        out
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SigningKey").field(&self.key_type()).finish()
    }
}

/// Mint a compact service auth token for `claims`, signed with `key`.
pub fn sign_service_auth(
    claims: &ServiceAuthClaims,
    key: &SigningKey,
) -> Result<String, ServiceAuthError> {
    let header = JwtHeader {
        alg: Algorithm::for_key_type(key.key_type()),
        typ: Some(SmolStr::new_static("JWT")),
    };
    let mut token = encode_segment("header", &header)?;
    token.push('.');
    token.push_str(&encode_segment("payload", claims)?);
    let signature = key.sign(token.as_bytes());
    token.push('.');
    token.push_str(&URL_SAFE_NO_PAD.encode(signature));
    Ok(token)
}

fn encode_segment<T: Serialize>(part: &'static str, value: &T) -> Result<String, ServiceAuthError> {
    let json =
        serde_json::to_vec(value).map_err(|source| ServiceAuthError::JsonEncode { part, source })?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}
