//! Minimal XRPC client.
//!
//! Queries are `GET {base}/xrpc/{nsid}?{params}`, procedures are `POST` with a JSON
//! body. Responses are handed back as raw bytes plus status; decoding is left to
//! [`XrpcResponse::parse`] so callers can pick the output type.

use crate::error::{EncodeError, HttpError, TransportError, XrpcResult};
use crate::http_client::HttpClient;
use crate::types::string::Nsid;
use crate::{AuthorizationToken, CowStr};
use bytes::Bytes;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderValue, Method, Request, StatusCode};
use serde::Serialize;
use serde::de::{Deserialize, DeserializeOwned};
use url::Url;

const JSON: &str = "application/json";

/// XRPC method type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XrpcMethod {
    /// Query (HTTP GET)
    Query,
    /// Procedure (HTTP POST)
    Procedure,
}

impl XrpcMethod {
    /// Get the HTTP method
    pub fn http_method(self) -> Method {
        match self {
            Self::Query => Method::GET,
            Self::Procedure => Method::POST,
        }
    }
}

/// `{base}/xrpc/{nsid}`, keeping any path prefix on `base`.
pub fn endpoint_url(base: &Url, nsid: &Nsid<'_>) -> Url {
    let mut url = base.clone();
    let mut path = url.path().trim_end_matches('/').to_owned();
    path.push_str("/xrpc/");
    path.push_str(nsid.as_str());
    url.set_path(&path);
    url.set_query(None);
    url
}

/// Build the HTTP request for one XRPC call.
///
/// For queries `params` are form-encoded into the query string and `body` is ignored;
/// for procedures `body` is sent as JSON.
pub fn build_http_request<P, B>(
    base: &Url,
    method: XrpcMethod,
    nsid: &Nsid<'_>,
    params: &P,
    body: Option<&B>,
    auth: Option<&AuthorizationToken<'_>>,
) -> XrpcResult<Request<Vec<u8>>>
where
    P: Serialize + ?Sized,
    B: Serialize + ?Sized,
{
    let mut url = endpoint_url(base, nsid);
    let qs = serde_html_form::to_string(params).map_err(EncodeError::from)?;
    if !qs.is_empty() {
        url.set_query(Some(&qs));
    }

    let mut builder = Request::builder()
        .method(method.http_method())
        .uri(url.as_str())
        .header(ACCEPT, JSON);

    if let Some(AuthorizationToken::Bearer(token)) = auth {
        let hv = HeaderValue::from_str(&format!("Bearer {}", token.as_ref())).map_err(|e| {
            TransportError::InvalidRequest(format!("Invalid authorization token: {}", e))
        })?;
        builder = builder.header(AUTHORIZATION, hv);
    }

    let body = match (method, body) {
        (XrpcMethod::Procedure, Some(body)) => {
            builder = builder.header(CONTENT_TYPE, JSON);
            serde_json::to_vec(body).map_err(EncodeError::from)?
        }
        _ => Vec::new(),
    };

    Ok(builder
        .body(body)
        .map_err(|e| TransportError::InvalidRequest(e.to_string()))?)
}

/// A successful (2xx) XRPC response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XrpcResponse {
    status: StatusCode,
    body: Bytes,
}

impl XrpcResponse {
    /// Create a response from a status and buffer
    pub fn new(status: StatusCode, body: Bytes) -> Self {
        Self { status, body }
    }

    /// HTTP status code
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Raw response body
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Decode the JSON body into an owned value.
    pub fn parse<T: DeserializeOwned>(&self) -> XrpcResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Decode the JSON body into a value borrowing from the buffer.
    pub fn parse_borrowed<'a, T: Deserialize<'a>>(&'a self) -> XrpcResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Turn a raw HTTP response into an [`XrpcResponse`], failing on non-2xx.
pub fn process_response(response: http::Response<Vec<u8>>) -> XrpcResult<XrpcResponse> {
    let status = response.status();
    let body = Bytes::from(response.into_body());
    if !status.is_success() {
        return Err(HttpError {
            status,
            body: Some(body),
        }
        .into());
    }
    Ok(XrpcResponse::new(status, body))
}

/// XRPC client bound to one service.
#[derive(Debug, Clone)]
pub struct XrpcClient<C> {
    client: C,
    base: Url,
    auth: Option<AuthorizationToken<'static>>,
}

impl<C: HttpClient> XrpcClient<C> {
    /// Client for the service at `base` (e.g. `https://public.api.bsky.app`).
    pub fn new(client: C, base: Url) -> Self {
        Self {
            client,
            base,
            auth: None,
        }
    }

    /// Send `Authorization: Bearer {token}` with every call.
    pub fn with_bearer(mut self, token: impl Into<CowStr<'static>>) -> Self {
        self.auth = Some(AuthorizationToken::Bearer(token.into()));
        self
    }

    /// Base URL
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Underlying HTTP client
    pub fn http_client(&self) -> &C {
        &self.client
    }

    /// `GET {base}/xrpc/{nsid}?{params}`
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(nsid = %nsid)))]
    pub async fn query<P>(&self, nsid: &Nsid<'_>, params: &P) -> XrpcResult<XrpcResponse>
    where
        P: Serialize + ?Sized,
    {
        let request = build_http_request::<P, ()>(
            &self.base,
            XrpcMethod::Query,
            nsid,
            params,
            None,
            self.auth.as_ref(),
        )?;
        self.send(request).await
    }

    /// `POST {base}/xrpc/{nsid}` with a JSON body
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(nsid = %nsid)))]
    pub async fn procedure<B>(&self, nsid: &Nsid<'_>, body: &B) -> XrpcResult<XrpcResponse>
    where
        B: Serialize + ?Sized,
    {
        let request = build_http_request(
            &self.base,
            XrpcMethod::Procedure,
            nsid,
            &[] as &[(&str, &str)],
            Some(body),
            self.auth.as_ref(),
        )?;
        self.send(request).await
    }

    async fn send(&self, request: Request<Vec<u8>>) -> XrpcResult<XrpcResponse> {
        let response = self
            .client
            .send_http(request)
            .await
            .map_err(TransportError::from_client)?;
        #[cfg(feature = "tracing")]
        tracing::debug!(status = %response.status(), "xrpc response");
        process_response(response)
    }
}
