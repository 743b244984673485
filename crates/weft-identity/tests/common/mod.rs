#![allow(dead_code)]

use http::{Request, Response, StatusCode};
use std::collections::VecDeque;
use std::sync::Mutex;
use weft_common::http_client::HttpClient;
use weft_identity::WeftResolver;
use weft_identity::resolver::ResolverOptions;

#[derive(Debug, thiserror::Error)]
#[error("mock transport failure")]
pub struct MockError;

/// Canned HTTP client: pops queued responses in order and records every request.
#[derive(Default)]
pub struct MockClient {
    queue: Mutex<VecDeque<Result<Response<Vec<u8>>, MockError>>>,
    log: Mutex<Vec<Request<Vec<u8>>>>,
}

impl MockClient {
    pub fn respond(&self, status: u16, body: impl Into<Vec<u8>>) -> &Self {
        let mut response = Response::new(body.into());
        *response.status_mut() = StatusCode::from_u16(status).unwrap();
        self.queue.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn fail(&self) -> &Self {
        self.queue.lock().unwrap().push_back(Err(MockError));
        self
    }

    /// URIs requested so far, in order
    pub fn requested(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.uri().to_string())
            .collect()
    }

    pub fn accept_headers(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.headers()[http::header::ACCEPT].to_str().unwrap().to_owned())
            .collect()
    }
}

impl HttpClient for MockClient {
    type Error = MockError;

    async fn send_http(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, MockError> {
        self.log.lock().unwrap().push(request);
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected request")
    }
}

pub fn resolver() -> WeftResolver<MockClient> {
    WeftResolver::new(MockClient::default(), ResolverOptions::default())
}

pub const PLC_DID: &str = "did:plc:ewvi7nxzyoun6zhxrhs64oiz";

/// A DID document for `did`, claiming `handle`, with an optional `#atproto` key.
pub fn did_doc(did: &str, handle: &str, key: Option<&str>) -> String {
    let methods = match key {
        Some(key) => serde_json::json!([{
            "id": format!("{did}#atproto"),
            "type": "Multikey",
            "controller": did,
            "publicKeyMultibase": key,
        }]),
        None => serde_json::json!([]),
    };
    serde_json::json!({
        "@context": ["https://www.w3.org/ns/did/v1"],
        "id": did,
        "alsoKnownAs": [format!("at://{handle}")],
        "verificationMethod": methods,
        "service": [{
            "id": "#atproto_pds",
            "type": "AtprotoPersonalDataServer",
            "serviceEndpoint": "https://pds.example.com"
        }]
    })
    .to_string()
}

pub fn doh_answer(data: &[&str]) -> String {
    let answers: Vec<_> = data
        .iter()
        .map(|d| serde_json::json!({"name": "_atproto.alice.example.com", "type": 16, "TTL": 300, "data": d}))
        .collect();
    serde_json::json!({"Status": 0, "Answer": answers}).to_string()
}
