mod common;

use common::{MockClient, PLC_DID, did_doc, doh_answer, resolver};
use weft_common::types::ident::AtIdentifier;
use weft_common::types::string::{Did, Handle};
use weft_identity::WeftResolver;
use weft_identity::resolver::{
    FetchError, HandleStep, IdentityError, IdentityResolver, ResolverOptions,
};

fn handle(s: &'static str) -> Handle<'static> {
    Handle::new_static(s).unwrap()
}

fn did(s: &'static str) -> Did<'static> {
    Did::new_static(s).unwrap()
}

#[tokio::test]
async fn plc_document_from_directory() {
    let r = resolver();
    r.http_client()
        .respond(200, did_doc(PLC_DID, "alice.example.com", None));
    let doc = r.resolve_did_doc(&did(PLC_DID)).await.unwrap();
    assert_eq!(doc.id.as_str(), PLC_DID);
    assert_eq!(doc.handle().unwrap().as_str(), "alice.example.com");
    assert_eq!(doc.pds_endpoint(), Some("https://pds.example.com"));
    assert_eq!(
        r.http_client().requested(),
        vec![format!("https://plc.directory/{PLC_DID}")]
    );
    assert!(r.http_client().accept_headers()[0].contains("application/did+ld+json"));
}

#[tokio::test]
async fn did_web_documents() {
    let r = resolver();
    r.http_client()
        .respond(200, did_doc("did:web:example.com", "example.com", None))
        .respond(
            200,
            did_doc("did:web:example.com:u:bob", "bob.example.com", None),
        );
    r.resolve_did_doc(&did("did:web:example.com")).await.unwrap();
    r.resolve_did_doc(&did("did:web:example.com:u:bob"))
        .await
        .unwrap();
    assert_eq!(
        r.http_client().requested(),
        vec![
            "https://example.com/.well-known/did.json",
            "https://example.com/u/bob/did.json",
        ]
    );
}

#[tokio::test]
async fn unsupported_method_never_fetches() {
    let r = resolver();
    let err = r
        .resolve_did_doc(&did("did:key:zQ3shscXNYZQZSPwegiv7uQZZV5kzATLBRtgJhs7uRY7pfSk4"))
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::UnsupportedDidMethod(m) if m == "key"));
    assert!(r.http_client().requested().is_empty());
}

#[tokio::test]
async fn missing_document_is_resolution_failure() {
    let r = resolver();
    r.http_client().respond(404, "not found");
    let err = r.resolve_did_doc(&did(PLC_DID)).await.unwrap_err();
    match err {
        IdentityError::DidResolutionFailed { did, source } => {
            assert_eq!(did.as_str(), PLC_DID);
            assert!(matches!(source, FetchError::Status(s) if s.as_u16() == 404));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn transport_error_is_resolution_failure() {
    let r = resolver();
    r.http_client().fail();
    let err = r.resolve_did_doc(&did(PLC_DID)).await.unwrap_err();
    assert!(matches!(
        err,
        IdentityError::DidResolutionFailed {
            source: FetchError::Transport(_),
            ..
        }
    ));
}

#[tokio::test]
async fn document_for_another_did_is_rejected() {
    let r = resolver();
    let other = "did:plc:aaaaaaaaaaaaaaaaaaaaaaaa";
    r.http_client()
        .respond(200, did_doc(other, "alice.example.com", None))
        .respond(200, did_doc(other, "alice.example.com", None));
    let err = r.resolve_did_doc(&did(PLC_DID)).await.unwrap_err();
    match err {
        IdentityError::DocIdMismatch { expected, doc } => {
            assert_eq!(expected.as_str(), PLC_DID);
            assert_eq!(doc.id.as_str(), other);
        }
        other => panic!("unexpected error {other:?}"),
    }

    let r = WeftResolver::new(MockClient::default(), ResolverOptions::default())
        .with_validate_doc_id(false);
    r.http_client()
        .respond(200, did_doc(other, "alice.example.com", None));
    let doc = r.resolve_did_doc(&did(PLC_DID)).await.unwrap();
    assert_eq!(doc.id.as_str(), other);
}

#[tokio::test]
async fn garbage_document_is_invalid() {
    let r = resolver();
    r.http_client()
        .respond(200, "<html>hi</html>")
        .respond(200, r#"{"id":"not a did"}"#);
    for _ in 0..2 {
        let err = r.resolve_did_doc(&did(PLC_DID)).await.unwrap_err();
        assert!(matches!(err, IdentityError::InvalidDocument { .. }), "{err:?}");
    }
}

#[tokio::test]
async fn handle_via_well_known() {
    let r = resolver();
    r.http_client().respond(200, format!("{PLC_DID}\n"));
    let resolved = r
        .resolve_handle(&handle("Alice.Example.com"))
        .await
        .unwrap();
    assert_eq!(resolved.as_str(), PLC_DID);
    assert_eq!(
        r.http_client().requested(),
        vec!["https://alice.example.com/.well-known/atproto-did"]
    );
}

#[tokio::test]
async fn handle_falls_back_to_dns() {
    let r = resolver();
    r.http_client()
        .respond(404, "")
        .respond(
            200,
            doh_answer(&["\"v=spf1 -all\"", &format!("\"did={PLC_DID}\"")]),
        );
    let resolved = r
        .resolve_handle(&handle("alice.example.com"))
        .await
        .unwrap();
    assert_eq!(resolved.as_str(), PLC_DID);
    let requested = r.http_client().requested();
    assert_eq!(requested.len(), 2);
    assert_eq!(
        requested[1],
        "https://cloudflare-dns.com/dns-query?name=_atproto.alice.example.com&type=TXT"
    );
    assert_eq!(r.http_client().accept_headers()[1], "application/dns-json");
}

#[tokio::test]
async fn well_known_body_must_be_a_did() {
    let r = resolver().with_handle_order(vec![HandleStep::HttpsWellKnown]);
    r.http_client().respond(200, "<!doctype html>");
    let err = r
        .resolve_handle(&handle("alice.example.com"))
        .await
        .unwrap_err();
    match err {
        IdentityError::HandleResolutionFailed { attempts, .. } => assert!(matches!(
            attempts.as_slice(),
            [IdentityError::HttpResolutionFailed {
                source: FetchError::Body(_),
                ..
            }]
        )),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn handle_failure_carries_both_attempts() {
    let r = resolver();
    r.http_client().fail().respond(200, doh_answer(&[]));
    let err = r
        .resolve_handle(&handle("alice.example.com"))
        .await
        .unwrap_err();
    match err {
        IdentityError::HandleResolutionFailed { handle, attempts } => {
            assert_eq!(handle.as_str(), "alice.example.com");
            assert_eq!(attempts.len(), 2);
            assert!(matches!(
                attempts[0],
                IdentityError::HttpResolutionFailed {
                    source: FetchError::Transport(_),
                    ..
                }
            ));
            assert!(matches!(attempts[1], IdentityError::DnsResolutionFailed { .. }));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn dns_only_order() {
    let r = resolver().with_handle_order(vec![HandleStep::DnsOverHttps]);
    r.http_client()
        .respond(200, doh_answer(&["did=did:web:alice.example.com"]));
    let resolved = r
        .resolve_handle(&handle("alice.example.com"))
        .await
        .unwrap();
    assert_eq!(resolved.as_str(), "did:web:alice.example.com");
    assert_eq!(r.http_client().requested().len(), 1);
}

#[tokio::test]
async fn reserved_tld_is_refused_offline() {
    let r = resolver();
    let err = r
        .resolve_handle(&handle("printer.local"))
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::ReservedHandle(_)));
    assert!(r.http_client().requested().is_empty());

    let r = resolver().with_reject_reserved_tlds(false);
    r.http_client().respond(200, PLC_DID);
    assert!(r.resolve_handle(&handle("printer.local")).await.is_ok());
}

#[tokio::test]
async fn verify_handle_checks_both_directions() {
    let r = resolver();
    r.http_client()
        .respond(200, PLC_DID)
        .respond(200, did_doc(PLC_DID, "alice.example.com", None));
    let verified = r.verify_handle(&handle("alice.example.com")).await.unwrap();
    assert_eq!(verified.as_str(), PLC_DID);

    let r = resolver();
    r.http_client()
        .respond(200, PLC_DID)
        .respond(200, did_doc(PLC_DID, "mallory.example.com", None));
    let err = r
        .verify_handle(&handle("alice.example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::HandleMismatch { .. }));
}

#[tokio::test]
async fn pds_lookups() {
    let r = resolver();
    r.http_client()
        .respond(200, PLC_DID)
        .respond(200, did_doc(PLC_DID, "alice.example.com", None));
    let (resolved, pds) = r
        .pds_for_handle(&handle("alice.example.com"))
        .await
        .unwrap();
    assert_eq!(resolved.as_str(), PLC_DID);
    assert_eq!(pds.as_str(), "https://pds.example.com/");

    let r = resolver();
    r.http_client().respond(
        200,
        serde_json::json!({"id": PLC_DID, "alsoKnownAs": []}).to_string(),
    );
    assert!(matches!(
        r.pds_for_did(&did(PLC_DID)).await,
        Err(IdentityError::MissingPdsEndpoint)
    ));
}

#[tokio::test]
async fn ident_dispatch() {
    let r = resolver();
    r.http_client()
        .respond(200, PLC_DID)
        .respond(200, did_doc(PLC_DID, "alice.example.com", None))
        .respond(200, did_doc(PLC_DID, "alice.example.com", None));
    let by_handle = AtIdentifier::new("alice.example.com").unwrap();
    let by_did = AtIdentifier::new(PLC_DID).unwrap();
    let a = r.resolve_ident(&by_handle).await.unwrap();
    let b = r.resolve_ident(&by_did).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(r.http_client().requested().len(), 3);
}

#[tokio::test]
async fn signing_key_lookup() {
    let key = "zQ3shscXNYZQZSPwegiv7uQZZV5kzATLBRtgJhs7uRY7pfSk4";
    let r = resolver();
    r.http_client()
        .respond(200, did_doc(PLC_DID, "alice.example.com", Some(key)))
        .respond(200, did_doc(PLC_DID, "alice.example.com", None))
        .respond(200, did_doc(PLC_DID, "alice.example.com", Some("zNotAKey")));
    let found = r.signing_key_for_did(&did(PLC_DID)).await.unwrap();
    assert_eq!(found.to_multibase(), key);
    assert!(matches!(
        r.signing_key_for_did(&did(PLC_DID)).await,
        Err(IdentityError::MissingSigningKey)
    ));
    assert!(matches!(
        r.signing_key_for_did(&did(PLC_DID)).await,
        Err(IdentityError::SigningKey(_))
    ));
}
