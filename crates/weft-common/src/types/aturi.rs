use std::fmt;
use std::{ops::Deref, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error};

use crate::types::did::{self, Did};
use crate::types::handle;
use crate::types::nsid::{self, Nsid};
use crate::types::recordkey::{self, Rkey};
use crate::types::string::{AtStrError, FormatError, StrParseKind, write_parts};
use crate::{CowStr, IntoStatic};

/// Maximum length of an at:// uri.
pub const MAX_AT_URI_LEN: usize = 8192;
const PREFIX: &str = "at://";

/// An [at:// URI] pointing at a repository, a collection, or a single record.
///
/// ```text
/// at://{authority}[/{collection}[/{rkey}]]
/// ```
///
/// The authority is a DID or handle, the collection an NSID and the record key
/// an [`Rkey`]. Each component is validated during the scan and its position is
/// recorded, so the accessors just slice. Trailing slashes, query strings and
/// fragments are rejected.
///
/// [at:// URI]: https://atproto.com/specs/at-uri-scheme
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AtUri<'u> {
    uri: CowStr<'u>,
    authority_end: usize,
    collection_end: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct Offsets {
    authority_end: usize,
    collection_end: Option<usize>,
}

/// Where a scan failed: in the uri structure itself, or inside one component.
enum Fault {
    Uri(StrParseKind),
    Component {
        spec: &'static str,
        start: usize,
        end: usize,
        kind: StrParseKind,
    },
}

fn component<T>(
    spec: &'static str,
    start: usize,
    end: usize,
    res: Result<T, StrParseKind>,
) -> Result<T, Fault> {
    res.map_err(|kind| Fault::Component {
        spec,
        start,
        end,
        kind,
    })
}

fn scan(uri: &str) -> Result<Offsets, Fault> {
    let bytes = uri.as_bytes();
    if bytes.len() > MAX_AT_URI_LEN {
        return Err(Fault::Uri(StrParseKind::TooLong {
            max: MAX_AT_URI_LEN,
            actual: bytes.len(),
        }));
    }
    if !uri.starts_with(PREFIX) {
        return Err(Fault::Uri(StrParseKind::missing(0, "at:// uris start with `at://`")));
    }
    if let Some(i) = bytes.iter().position(|&c| c == b'?' || c == b'#') {
        return Err(Fault::Uri(StrParseKind::invalid_char(
            i,
            "query and fragment parts are not supported",
        )));
    }

    let start = PREFIX.len();
    let authority_end = bytes[start..]
        .iter()
        .position(|&c| c == b'/')
        .map_or(bytes.len(), |p| start + p);
    if authority_end == start {
        return Err(Fault::Uri(StrParseKind::missing(start, "authority")));
    }
    let authority = &uri[start..authority_end];
    if authority.starts_with("did:") {
        component("did", start, authority_end, did::scan(authority))?;
    } else {
        component("handle", start, authority_end, handle::scan(authority))?;
    }
    if authority_end == bytes.len() {
        return Ok(Offsets {
            authority_end,
            collection_end: None,
        });
    }

    let start = authority_end + 1;
    let collection_end = bytes[start..]
        .iter()
        .position(|&c| c == b'/')
        .map_or(bytes.len(), |p| start + p);
    if collection_end == start {
        return Err(Fault::Uri(StrParseKind::missing(
            start,
            "collection after `/` (no trailing slash)",
        )));
    }
    component(
        "nsid",
        start,
        collection_end,
        nsid::scan(&uri[start..collection_end]),
    )?;
    if collection_end == bytes.len() {
        return Ok(Offsets {
            authority_end,
            collection_end: Some(collection_end),
        });
    }

    let start = collection_end + 1;
    if start == bytes.len() {
        return Err(Fault::Uri(StrParseKind::missing(
            start,
            "record key after `/` (no trailing slash)",
        )));
    }
    if let Some(p) = bytes[start..].iter().position(|&c| c == b'/') {
        return Err(Fault::Uri(StrParseKind::invalid_char(
            start + p,
            "at most three path segments: authority, collection, record key",
        )));
    }
    component("record-key", start, bytes.len(), recordkey::scan(&uri[start..]))?;
    Ok(Offsets {
        authority_end,
        collection_end: Some(collection_end),
    })
}

impl<'u> AtUri<'u> {
    /// Validate an at:// uri, borrowing from the input. Returns `None` on any grammar violation.
    pub fn parse(uri: &'u str) -> Option<Self> {
        let offsets = scan(uri).ok()?;
        Some(Self::with_offsets(CowStr::Borrowed(uri), offsets))
    }

    /// Fallible constructor, validates, borrows from input
    pub fn new(uri: &'u str) -> Result<Self, AtStrError> {
        Self::from_cow(CowStr::Borrowed(uri))
    }

    /// Fallible constructor, validates, takes ownership
    pub fn new_owned(uri: impl AsRef<str>) -> Result<AtUri<'static>, AtStrError> {
        AtUri::from_cow(CowStr::copy_from_str(uri.as_ref()))
    }

    fn with_offsets(uri: CowStr<'u>, offsets: Offsets) -> Self {
        Self {
            uri,
            authority_end: offsets.authority_end,
            collection_end: offsets.collection_end,
        }
    }

    pub(crate) fn from_cow(uri: CowStr<'u>) -> Result<Self, AtStrError> {
        match scan(&uri) {
            Ok(offsets) => Ok(Self::with_offsets(uri, offsets)),
            Err(Fault::Uri(kind)) => Err(AtStrError::new("at-uri-scheme", &uri, kind)),
            Err(Fault::Component {
                spec,
                start,
                end,
                kind,
            }) => Err(AtStrError::wrap(
                "at-uri-scheme",
                &uri,
                start,
                AtStrError::new(spec, &uri[start..end], kind),
            )),
        }
    }

    /// Assemble an at:// uri in `buf` from its components and validate the result.
    ///
    /// An `rkey` without a `collection` is rejected.
    pub fn format_into<'b>(
        authority: &str,
        collection: Option<&str>,
        rkey: Option<&str>,
        buf: &'b mut [u8],
    ) -> Result<AtUri<'b>, FormatError> {
        let written = match (collection, rkey) {
            (None, None) => write_parts(buf, &[PREFIX, authority])?,
            (Some(collection), None) => write_parts(buf, &[PREFIX, authority, "/", collection])?,
            (Some(collection), Some(rkey)) => {
                write_parts(buf, &[PREFIX, authority, "/", collection, "/", rkey])?
            }
            (None, Some(_)) => {
                return Err(FormatError::Invalid(AtStrError::new(
                    "at-uri-scheme",
                    authority,
                    StrParseKind::missing(authority.len(), "collection before the record key"),
                )));
            }
        };
        Ok(AtUri::new(written)?)
    }

    /// The repository: a DID or handle.
    pub fn authority(&self) -> &str {
        &self.uri[PREFIX.len()..self.authority_end]
    }

    /// The authority, if it is a DID rather than a handle.
    pub fn authority_did(&self) -> Option<Did<'_>> {
        Did::parse(self.authority())
    }

    /// The collection NSID, if the uri has one.
    pub fn collection(&self) -> Option<&str> {
        self.collection_end
            .map(|end| &self.uri[self.authority_end + 1..end])
    }

    /// The collection as a typed [`Nsid`].
    pub fn collection_nsid(&self) -> Option<Nsid<'_>> {
        self.collection().and_then(Nsid::parse)
    }

    /// The record key, if the uri points at a single record.
    pub fn rkey(&self) -> Option<&str> {
        let end = self.collection_end?;
        (end < self.uri.len()).then(|| &self.uri[end + 1..])
    }

    /// The record key as a typed [`Rkey`].
    pub fn record_key(&self) -> Option<Rkey<'_>> {
        self.rkey().and_then(Rkey::parse)
    }

    pub fn as_str(&self) -> &str {
        self.uri.as_str()
    }
}

impl FromStr for AtUri<'_> {
    type Err = AtStrError;

    /// Has to take ownership due to the lifetime constraints of the FromStr trait.
    /// Prefer `AtUri::new()` if you want to borrow.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AtUri::new_owned(s)
    }
}

impl IntoStatic for AtUri<'_> {
    type Output = AtUri<'static>;

    fn into_static(self) -> Self::Output {
        AtUri {
            uri: self.uri.into_static(),
            authority_end: self.authority_end,
            collection_end: self.collection_end,
        }
    }
}

impl Serialize for AtUri<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de, 'a> Deserialize<'de> for AtUri<'a>
where
    'de: 'a,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: CowStr<'a> = Deserialize::deserialize(deserializer)?;
        Self::from_cow(value).map_err(D::Error::custom)
    }
}

impl fmt::Display for AtUri<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

impl fmt::Debug for AtUri<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AtUri({})", self.uri)
    }
}

impl<'a> From<AtUri<'a>> for String {
    fn from(value: AtUri<'a>) -> Self {
        value.uri.to_string()
    }
}

impl<'a> From<AtUri<'a>> for CowStr<'a> {
    fn from(value: AtUri<'a>) -> Self {
        value.uri
    }
}

impl AsRef<str> for AtUri<'_> {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Deref for AtUri<'_> {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_record_uri() {
        let uri = AtUri::parse("at://did:plc:xyz/app.bsky.feed.post/abc123").unwrap();
        assert_eq!(uri.authority(), "did:plc:xyz");
        assert_eq!(uri.collection(), Some("app.bsky.feed.post"));
        assert_eq!(uri.rkey(), Some("abc123"));
        assert_eq!(uri.authority_did().unwrap().identifier(), "xyz");
        assert_eq!(uri.collection_nsid().unwrap().name(), "post");
        assert_eq!(uri.record_key().unwrap().as_str(), "abc123");
    }

    #[test]
    fn shorter_forms() {
        let uri = AtUri::parse("at://did:plc:xyz").unwrap();
        assert_eq!(uri.authority(), "did:plc:xyz");
        assert_eq!(uri.collection(), None);
        assert_eq!(uri.rkey(), None);

        let uri = AtUri::parse("at://alice.bsky.social/app.bsky.feed.like").unwrap();
        assert_eq!(uri.authority(), "alice.bsky.social");
        assert!(uri.authority_did().is_none());
        assert_eq!(uri.collection(), Some("app.bsky.feed.like"));
        assert_eq!(uri.rkey(), None);
    }

    #[test]
    fn rejects_trailing_slash() {
        assert!(AtUri::parse("at://did:plc:xyz/").is_none());
        assert!(AtUri::parse("at://did:plc:xyz/app.bsky.feed.post/").is_none());
        assert!(AtUri::parse("at://did:plc:xyz/app.bsky.feed.post/abc123/").is_none());
    }

    #[test]
    fn rejects_bad_structure() {
        for u in [
            "",
            "at://",
            "at:///app.bsky.feed.post",
            "did:plc:xyz/app.bsky.feed.post/abc",
            "http://did:plc:xyz",
            "at://did:plc:xyz//abc",
            "at://did:plc:xyz/app.bsky.feed.post/abc/def",
            "at://did:plc:xyz/app.bsky.feed.post/abc?x=1",
            "at://did:plc:xyz/app.bsky.feed.post/abc#frag",
        ] {
            assert!(AtUri::parse(u).is_none(), "{u} should not parse");
        }
    }

    #[test]
    fn rejects_bad_components() {
        assert!(AtUri::parse("at://did:PLC:xyz").is_none());
        assert!(AtUri::parse("at://not_a_handle").is_none());
        assert!(AtUri::parse("at://did:plc:xyz/notansid").is_none());
        assert!(AtUri::parse("at://did:plc:xyz/app.bsky.feed.post/..").is_none());
        assert!(AtUri::parse("at://did:plc:xyz/app.bsky.feed.post/a b").is_none());
    }

    #[test]
    fn component_error_is_wrapped() {
        let err = AtUri::new("at://did:plc:xyz/notansid").unwrap_err();
        assert_eq!(err.spec, "at-uri-scheme");
        match err.kind {
            StrParseKind::Wrap { span: Some(span), err } => {
                assert_eq!(span.offset(), 17);
                assert_eq!(err.spec, "nsid");
                assert_eq!(err.source, "notansid");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn max_length() {
        let rkey = "a".repeat(512);
        let uri = format!("at://did:plc:{}/app.bsky.feed.post/{rkey}", "x".repeat(2000));
        assert!(uri.len() < MAX_AT_URI_LEN);
        assert!(AtUri::parse(&uri).is_some());

        let long = format!("at://did:plc:{}", "x".repeat(MAX_AT_URI_LEN));
        assert!(matches!(
            AtUri::new(&long).unwrap_err().kind,
            StrParseKind::TooLong { max: 8192, .. }
        ));
    }

    #[test]
    fn format_into_buffer() {
        let mut buf = [0u8; 64];
        let uri = AtUri::format_into(
            "did:plc:xyz",
            Some("app.bsky.feed.post"),
            Some("abc123"),
            &mut buf,
        )
        .unwrap();
        assert_eq!(uri.as_str(), "at://did:plc:xyz/app.bsky.feed.post/abc123");
        assert_eq!(uri.rkey(), Some("abc123"));

        let mut buf = [0u8; 64];
        let uri = AtUri::format_into("alice.test", None, None, &mut buf).unwrap();
        assert_eq!(uri.as_str(), "at://alice.test");

        let mut small = [0u8; 16];
        assert!(matches!(
            AtUri::format_into("did:plc:xyz", Some("app.bsky.feed.post"), None, &mut small),
            Err(FormatError::BufferTooSmall { .. })
        ));

        let mut buf = [0u8; 64];
        assert!(matches!(
            AtUri::format_into("did:plc:xyz", None, Some("abc"), &mut buf),
            Err(FormatError::Invalid(_))
        ));
    }

    #[test]
    fn owned_copy_outlives_source() {
        let source = String::from("at://did:plc:xyz/app.bsky.feed.post/abc123");
        let owned = AtUri::parse(&source).unwrap().into_static();
        drop(source);
        assert_eq!(owned.collection(), Some("app.bsky.feed.post"));
    }
}
