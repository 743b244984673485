use miette::SourceSpan;
use smol_str::SmolStr;
use std::sync::Arc;

pub use crate::{
    CowStr,
    types::{
        aturi::AtUri,
        did::{Did, DidMethod},
        handle::Handle,
        ident::AtIdentifier,
        nsid::Nsid,
        recordkey::Rkey,
        tid::Tid,
    },
};
use crate::IntoStatic;

/// ATProto string value, classified by the first identifier grammar it matches.
///
/// Record keys are deliberately not tried: nearly every short string is a valid
/// record key, so classifying bare strings as rkeys would swallow everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AtprotoStr<'s> {
    Tid(Tid),
    Did(Did<'s>),
    Handle(Handle<'s>),
    Nsid(Nsid<'s>),
    AtUri(AtUri<'s>),
    String(CowStr<'s>),
}

impl<'s> AtprotoStr<'s> {
    /// Borrowing classifier for bare atproto string values.
    ///
    /// TIDs are tried before handles and NSIDs; a handle is tried before an NSID,
    /// so `app.bsky.feed` (valid as both) classifies as a handle. Only strings too
    /// long to be a hostname fall through to the NSID branch.
    pub fn new(string: &'s str) -> Self {
        if let Some(tid) = Tid::parse(string) {
            Self::Tid(tid)
        } else if string.starts_with("did:") {
            match Did::parse(string) {
                Some(did) => Self::Did(did),
                None => Self::String(CowStr::Borrowed(string)),
            }
        } else if string.starts_with("at://") {
            match AtUri::parse(string) {
                Some(uri) => Self::AtUri(uri),
                None => Self::String(CowStr::Borrowed(string)),
            }
        } else if let Some(handle) = Handle::parse(string) {
            Self::Handle(handle)
        } else if let Some(nsid) = Nsid::parse(string) {
            Self::Nsid(nsid)
        } else {
            Self::String(CowStr::Borrowed(string))
        }
    }

    /// Name of the grammar this value matched.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Tid(_) => "tid",
            Self::Did(_) => "did",
            Self::Handle(_) => "handle",
            Self::Nsid(_) => "nsid",
            Self::AtUri(_) => "at-uri",
            Self::String(_) => "string",
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Tid(tid) => tid.as_str(),
            Self::Did(did) => did.as_str(),
            Self::Handle(handle) => handle.as_str(),
            Self::Nsid(nsid) => nsid.as_str(),
            Self::AtUri(uri) => uri.as_str(),
            Self::String(string) => string.as_str(),
        }
    }
}

impl AsRef<str> for AtprotoStr<'_> {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl IntoStatic for AtprotoStr<'_> {
    type Output = AtprotoStr<'static>;

    fn into_static(self) -> Self::Output {
        match self {
            AtprotoStr::Tid(tid) => AtprotoStr::Tid(tid),
            AtprotoStr::Did(did) => AtprotoStr::Did(did.into_static()),
            AtprotoStr::Handle(handle) => AtprotoStr::Handle(handle.into_static()),
            AtprotoStr::Nsid(nsid) => AtprotoStr::Nsid(nsid.into_static()),
            AtprotoStr::AtUri(uri) => AtprotoStr::AtUri(uri.into_static()),
            AtprotoStr::String(s) => AtprotoStr::String(s.into_static()),
        }
    }
}

/// Parsing error for atproto identifier strings.
///
/// `spec` refers to the final url path segment on atproto.com/specs,
/// detailing the grammar for the type
/// `source` is the source string
/// `kind` is the type of parsing error: [`StrParseKind`]
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("error in `{source}`: {kind}")]
#[diagnostic(url("https://atproto.com/specs/{spec}"))]
pub struct AtStrError {
    pub spec: SmolStr,
    #[source_code]
    pub source: String,
    #[source]
    #[diagnostic_source]
    pub kind: StrParseKind,
}

impl AtStrError {
    pub fn new(spec: &'static str, source: &str, kind: StrParseKind) -> Self {
        Self {
            spec: SmolStr::new_static(spec),
            source: source.to_string(),
            kind,
        }
    }

    /// Wrap an error from a component (e.g. the collection of an at:// uri),
    /// pointing the span at where that component sits in the outer string.
    pub fn wrap(spec: &'static str, source: &str, offset: usize, error: AtStrError) -> Self {
        let span = Some(SourceSpan::new(offset.into(), error.source.len()));
        Self {
            spec: SmolStr::new_static(spec),
            source: source.to_string(),
            kind: StrParseKind::Wrap {
                span,
                err: Arc::new(error),
            },
        }
    }

    pub fn too_long(spec: &'static str, source: &str, max: usize, actual: usize) -> Self {
        Self::new(spec, source, StrParseKind::TooLong { max, actual })
    }

    pub fn too_short(spec: &'static str, source: &str, min: usize, actual: usize) -> Self {
        Self::new(spec, source, StrParseKind::TooShort { min, actual })
    }
}

/// Why a scanner rejected its input.
///
/// Scanners build these without allocating (messages are static), so the
/// `parse` path stays allocation-free even though it shares code with `new`.
#[derive(Debug, Clone, thiserror::Error, miette::Diagnostic)]
pub enum StrParseKind {
    #[error("invalid character - {message}")]
    #[diagnostic(code(weft::types::string::invalid_char))]
    InvalidChar {
        #[label]
        span: Option<SourceSpan>,
        #[help]
        message: SmolStr,
    },
    #[error("string too long (allowed: {max}, actual: {actual})")]
    #[diagnostic(code(weft::types::string::wrong_length))]
    TooLong { max: usize, actual: usize },

    #[error("string too short (allowed: {min}, actual: {actual})")]
    #[diagnostic(code(weft::types::string::wrong_length))]
    TooShort { min: usize, actual: usize },

    #[error("disallowed - {message}")]
    #[diagnostic(code(weft::types::string::disallowed))]
    Disallowed {
        #[label]
        problem: Option<SourceSpan>,
        #[help]
        message: SmolStr,
    },
    #[error("missing - {message}")]
    #[diagnostic(code(weft::types::string::missing_component))]
    MissingComponent {
        #[label]
        span: Option<SourceSpan>,
        #[help]
        message: SmolStr,
    },
    #[error("{err}")]
    #[diagnostic(code(weft::types::string::inner))]
    Wrap {
        #[label]
        span: Option<SourceSpan>,
        #[source]
        err: Arc<AtStrError>,
    },
}

impl StrParseKind {
    pub(crate) fn invalid_char(at: usize, message: &'static str) -> Self {
        Self::InvalidChar {
            span: Some(SourceSpan::new(at.into(), 1)),
            message: SmolStr::new_static(message),
        }
    }

    pub(crate) fn missing(at: usize, message: &'static str) -> Self {
        Self::MissingComponent {
            span: Some(SourceSpan::new(at.into(), 0)),
            message: SmolStr::new_static(message),
        }
    }

    pub(crate) fn disallowed(at: usize, len: usize, message: &'static str) -> Self {
        Self::Disallowed {
            problem: Some(SourceSpan::new(at.into(), len)),
            message: SmolStr::new_static(message),
        }
    }
}

/// Error from writing an identifier into a caller-provided buffer.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum FormatError {
    /// The buffer cannot hold the serialized value; nothing usable was written
    #[error("buffer too small: need {needed} bytes, have {capacity}")]
    #[diagnostic(code(weft::types::format::buffer_too_small))]
    BufferTooSmall { needed: usize, capacity: usize },

    /// The components serialize to text that doesn't validate
    #[error(transparent)]
    #[diagnostic(transparent)]
    Invalid(#[from] AtStrError),

    /// A numeric component is outside the encodable range
    #[error("{0} out of range")]
    #[diagnostic(code(weft::types::format::out_of_range))]
    OutOfRange(&'static str),
}

/// Concatenate `parts` into `buf`, returning the written prefix as a `&str`.
///
/// Fails up front if the total length exceeds the buffer, so a failed call never
/// leaves a truncated value behind for the caller to mistake for output.
pub(crate) fn write_parts<'b>(buf: &'b mut [u8], parts: &[&str]) -> Result<&'b str, FormatError> {
    let needed: usize = parts.iter().map(|p| p.len()).sum();
    if needed > buf.len() {
        return Err(FormatError::BufferTooSmall {
            needed,
            capacity: buf.len(),
        });
    }
    let mut at = 0;
    for part in parts {
        buf[at..at + part.len()].copy_from_slice(part.as_bytes());
        at += part.len();
    }
    let buf: &'b [u8] = buf;
    // every part was a str, so the concatenation is valid utf8
    std::str::from_utf8(&buf[..at]).map_err(|_| FormatError::OutOfRange("utf8"))
}

/// Like [`write_parts`], with `sep` written between consecutive parts.
pub(crate) fn write_joined<'b>(
    buf: &'b mut [u8],
    parts: &[&str],
    sep: u8,
) -> Result<&'b str, FormatError> {
    let needed = parts.iter().map(|p| p.len()).sum::<usize>() + parts.len().saturating_sub(1);
    if needed > buf.len() {
        return Err(FormatError::BufferTooSmall {
            needed,
            capacity: buf.len(),
        });
    }
    let mut at = 0;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            buf[at] = sep;
            at += 1;
        }
        buf[at..at + part.len()].copy_from_slice(part.as_bytes());
        at += part.len();
    }
    let buf: &'b [u8] = buf;
    std::str::from_utf8(&buf[..at]).map_err(|_| FormatError::OutOfRange("utf8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_strings() {
        assert_eq!(AtprotoStr::new("3jzfcijpj2z2a").kind(), "tid");
        assert_eq!(AtprotoStr::new("did:plc:abc123").kind(), "did");
        assert_eq!(AtprotoStr::new("alice.bsky.social").kind(), "handle");
        assert_eq!(
            AtprotoStr::new("at://did:plc:abc123/app.bsky.feed.post/3jzfcijpj2z2a").kind(),
            "at-uri"
        );
        // every NSID is also a valid hostname
        assert_eq!(AtprotoStr::new("com.example.fooBar").kind(), "handle");
        assert_eq!(AtprotoStr::Nsid(Nsid::parse("com.example.fooBar").unwrap()).kind(), "nsid");
        assert_eq!(AtprotoStr::new("hello world").kind(), "string");
        assert_eq!(AtprotoStr::new("did:PLC:abc").kind(), "string");
    }

    #[test]
    fn write_parts_checks_capacity() {
        let mut buf = [0u8; 8];
        assert!(matches!(
            write_parts(&mut buf, &["did:", "plc:", "x"]),
            Err(FormatError::BufferTooSmall {
                needed: 9,
                capacity: 8
            })
        ));
        assert_eq!(buf, [0u8; 8]);

        let mut buf = [0u8; 16];
        assert_eq!(write_parts(&mut buf, &["did:", "plc:", "x"]).unwrap(), "did:plc:x");
    }

    #[test]
    fn write_joined_separates() {
        let mut buf = [0u8; 17];
        assert_eq!(
            write_joined(&mut buf, &["alice", "example", "com"], b'.').unwrap(),
            "alice.example.com"
        );
        let mut buf = [0u8; 16];
        assert!(matches!(
            write_joined(&mut buf, &["alice", "example", "com"], b'.'),
            Err(FormatError::BufferTooSmall { needed: 17, .. })
        ));
    }
}
