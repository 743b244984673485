//! What can go wrong talking to an XRPC service.
//!
//! [`ClientError`] is the top level. Its variants say which stage failed: the
//! request never made it ([`TransportError`]), could not be built ([`EncodeError`]),
//! came back non-2xx ([`HttpError`]), or came back with a body we couldn't decode.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::error::Error;
use std::fmt;

/// Any failure of an XRPC call
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ClientError {
    /// No response arrived
    #[error("transport failed: {0}")]
    #[diagnostic(code(weft::xrpc::transport))]
    Transport(
        #[from]
        #[diagnostic_source]
        TransportError,
    ),

    /// The request could not be encoded
    #[error("{0}")]
    #[diagnostic(code(weft::xrpc::encode))]
    Encode(
        #[from]
        #[diagnostic_source]
        EncodeError,
    ),

    /// The response body is not the JSON the caller asked for
    #[error("could not decode response body: {0}")]
    #[diagnostic(
        code(weft::xrpc::decode),
        help("the service answered 2xx, but with a body of a different shape")
    )]
    Decode(#[from] serde_json::Error),

    /// The service answered with a non-2xx status
    #[error("{0}")]
    #[diagnostic(code(weft::xrpc::http))]
    Http(
        #[from]
        #[diagnostic_source]
        HttpError,
    ),
}

/// The request did not produce a response
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum TransportError {
    /// Could not connect
    #[error("could not connect: {0}")]
    Connect(String),

    /// Gave up waiting
    #[error("timed out")]
    Timeout,

    /// The URI, headers or body were rejected before sending
    #[error("request rejected before sending: {0}")]
    InvalidRequest(String),

    /// Anything the HTTP client didn't classify
    #[error("{0}")]
    Other(Box<dyn Error + Send + Sync>),
}

impl TransportError {
    /// Classify an error returned by an [`HttpClient`](crate::http_client::HttpClient).
    ///
    /// `reqwest` errors are sorted into connect/timeout/request failures; anything
    /// else ends up in [`Other`](Self::Other).
    pub fn from_client<E: Error + Send + Sync + 'static>(error: E) -> Self {
        let boxed: Box<dyn Error + Send + Sync> = Box::new(error);
        #[cfg(feature = "reqwest-client")]
        let boxed = match boxed.downcast::<reqwest::Error>() {
            Ok(error) => return Self::from(*error),
            Err(other) => other,
        };
        Self::Other(boxed)
    }
}

#[cfg(feature = "reqwest-client")]
impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        match () {
            _ if error.is_timeout() => Self::Timeout,
            _ if error.is_connect() => Self::Connect(error.to_string()),
            _ if error.is_builder() || error.is_request() => {
                Self::InvalidRequest(error.to_string())
            }
            _ => Self::Other(Box::new(error)),
        }
    }
}

/// The request parameters or body could not be serialized
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum EncodeError {
    /// Query parameters
    #[error("could not encode query string: {0}")]
    Query(#[from] serde_html_form::ser::Error),
    /// Procedure body
    #[error("could not encode JSON body: {0}")]
    Json(#[from] serde_json::Error),
}

/// A non-2xx response, with whatever body came with it
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub struct HttpError {
    /// Status the service answered with
    pub status: http::StatusCode,
    /// Response body, if there was one
    pub body: Option<Bytes>,
}

/// The `{"error": ..., "message": ...}` body XRPC servers send with failures.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct XrpcErrorBody {
    /// Error name (e.g. `InvalidRequest`)
    pub error: SmolStr,
    /// Human-readable detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<SmolStr>,
}

impl HttpError {
    /// The XRPC error body, if the server sent one.
    pub fn xrpc_error(&self) -> Option<XrpcErrorBody> {
        serde_json::from_slice(self.body.as_deref()?).ok()
    }

    fn body_text(&self) -> Option<&str> {
        let text = std::str::from_utf8(self.body.as_deref()?).ok()?;
        (!text.is_empty()).then_some(text)
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.body_text() {
            Some(text) => write!(f, "HTTP {}: {text}", self.status),
            None => write!(f, "HTTP {}", self.status),
        }
    }
}

/// Result of an XRPC call
pub type XrpcResult<T> = std::result::Result<T, ClientError>;
