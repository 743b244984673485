//! # weft
//!
//! AT Protocol identifiers, identity resolution and service auth, in one crate.
//!
//! This is a facade over [`weft_common`] (re-exported at the root) and
//! [`weft_identity`] (re-exported as [`identity`]).
//!
//! ## Goals
//!
//! - Validated identifier types that borrow from their input, with explicit
//!   [`IntoStatic`] conversion when you need to keep them
//! - Single-pass parsers that report *why* a string was rejected, as miette diagnostics
//! - DID documents, `did:key`, and multibase keys without a JOSE stack
//! - Handle and DID resolution over any [`http_client::HttpClient`]
//! - Service auth tokens whose claims can't be read as trusted before the signature is
//!
//! ## Example
//!
//! Check an inbound service auth token and find out who sent it.
//!
//! ```no_run
//! use weft::identity::PublicResolver;
//! use weft::identity::service_auth::verify_service_auth;
//! use weft::types::string::{Did, Nsid};
//!
//! # async fn handle(token: &str) -> miette::Result<()> {
//! let resolver = PublicResolver::default();
//! let me = Did::new("did:web:feed.example.com")?;
//! let lxm = Nsid::new("app.bsky.feed.getFeedSkeleton")?;
//!
//! let auth = verify_service_auth(&resolver, token, &me, Some(&lxm)).await?;
//! println!("skeleton requested by {}", auth.issuer());
//! # Ok(())
//! # }
//! ```
//!
//! ## Command line
//!
//! With the default `cli` feature this crate also builds the `weft` binary:
//!
//! ```text
//! weft inspect at://did:plc:ewvi7nxzyoun6zhxrhs64oiz/app.bsky.feed.post/3jzfcijpj2z2a
//! weft tid --clock-id 7
//! weft resolve-handle alice.bsky.social --verify
//! weft resolve-did did:web:example.com
//! weft verify-jwt <token> --resolve --aud did:web:feed.example.com
//! ```

#![warn(missing_docs)]

pub mod inspect;

pub use weft_common::*;
/// Handle and DID resolution
pub use weft_identity as identity;
