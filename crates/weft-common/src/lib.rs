//! Common types for the weft implementation of atproto
//!
//! This crate holds the pieces of the protocol that need no network access:
//!
//! - validated identifier types ([`types::tid::Tid`], [`types::did::Did`],
//!   [`types::handle::Handle`], [`types::nsid::Nsid`], [`types::recordkey::Rkey`],
//!   [`types::aturi::AtUri`]), parsed by single-pass scanners that borrow from the input
//! - [`multibase`] and multicodec ([`types::crypto`]) decoding of public keys
//! - the [`types::did_doc::DidDocument`] model
//! - service auth JWT parsing, verification and signing ([`service_auth`])
//! - a small HTTP abstraction ([`http_client`]) and XRPC client ([`xrpc`]) that the
//!   identity crate builds on

#![warn(missing_docs)]
pub use cowstr::CowStr;
pub use into_static::IntoStatic;
pub use smol_str;
pub use url;

/// A copy-on-write immutable string type that uses [`smol_str::SmolStr`] for
/// the "owned" variant.
pub mod cowstr;
/// Trait for taking ownership of borrowed weft types.
pub mod into_static;
pub mod error;
/// HTTP client abstraction used by weft crates.
pub mod http_client;
pub mod multibase;
#[cfg(feature = "service-auth")]
pub mod service_auth;
/// Baseline fundamental AT Protocol data types.
pub mod types;
pub mod xrpc;

/// Authorization token types for XRPC requests.
#[derive(Debug, Clone)]
pub enum AuthorizationToken<'s> {
    /// Bearer token (access JWT, refresh JWT, or a service auth token)
    Bearer(CowStr<'s>),
}

impl IntoStatic for AuthorizationToken<'_> {
    type Output = AuthorizationToken<'static>;

    fn into_static(self) -> Self::Output {
        match self {
            AuthorizationToken::Bearer(token) => AuthorizationToken::Bearer(token.into_static()),
        }
    }
}
