use crate::types::string::{AtStrError, FormatError, StrParseKind, write_parts};
use crate::{CowStr, IntoStatic};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error};
use std::fmt;
use std::{ops::Deref, str::FromStr};

/// Maximum length of a DID string.
pub const MAX_DID_LEN: usize = 2048;

/// A [Decentralized Identifier] as accepted by atproto.
///
/// Holds the validated string along with the position of the colon separating
/// the method from the method-specific identifier, so [`Did::method`] and
/// [`Did::identifier`] are plain slices.
///
/// The identifier part may contain `%`, but percent-encoding is not checked
/// for well-formedness beyond forbidding a trailing `%`.
///
/// [Decentralized Identifier]: https://atproto.com/specs/did
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Did<'d> {
    did: CowStr<'d>,
    method_end: usize,
}

/// The method of a [`Did`], with the methods atproto blesses as their own variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DidMethod<'a> {
    /// `did:plc`, resolved through a PLC directory
    Plc,
    /// `did:web`, resolved from a `did.json` on the named host
    Web,
    /// Anything else; syntactically valid, but no resolver knows it
    Other(&'a str),
}

impl<'a> DidMethod<'a> {
    /// The method name as it appears in the DID.
    pub fn as_str(&self) -> &'a str {
        match self {
            DidMethod::Plc => "plc",
            DidMethod::Web => "web",
            DidMethod::Other(method) => method,
        }
    }
}

impl fmt::Display for DidMethod<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const fn is_id_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, b'.' | b'_' | b':' | b'%' | b'-')
}

/// Scan a DID, returning the index of the colon after the method.
pub(crate) fn scan(did: &str) -> Result<usize, StrParseKind> {
    let bytes = did.as_bytes();
    if bytes.len() > MAX_DID_LEN {
        return Err(StrParseKind::TooLong {
            max: MAX_DID_LEN,
            actual: bytes.len(),
        });
    }
    if !did.starts_with("did:") {
        return Err(StrParseKind::missing(0, "DIDs start with `did:`"));
    }

    let mut method_end = None;
    for (i, &c) in bytes.iter().enumerate().skip(4) {
        match c {
            b':' => {
                method_end = Some(i);
                break;
            }
            b'a'..=b'z' => {}
            _ => {
                return Err(StrParseKind::invalid_char(
                    i,
                    "the method is lowercase ascii letters",
                ));
            }
        }
    }
    let Some(method_end) = method_end else {
        return Err(StrParseKind::missing(
            bytes.len(),
            "`:` followed by a method-specific identifier",
        ));
    };
    if method_end == 4 {
        return Err(StrParseKind::missing(4, "method name"));
    }
    if method_end + 1 == bytes.len() {
        return Err(StrParseKind::missing(
            bytes.len(),
            "method-specific identifier",
        ));
    }

    for (i, &c) in bytes.iter().enumerate().skip(method_end + 1) {
        if !is_id_char(c) {
            let message = if matches!(c, b'/' | b'?' | b'#' | b'[' | b']' | b'@') {
                "URL delimiters are not allowed in a DID"
            } else {
                "allowed characters are ascii letters, digits and `._:%-`"
            };
            return Err(StrParseKind::invalid_char(i, message));
        }
    }
    if matches!(bytes[bytes.len() - 1], b':' | b'%') {
        return Err(StrParseKind::invalid_char(
            bytes.len() - 1,
            "a DID may not end with `:` or `%`",
        ));
    }
    Ok(method_end)
}

impl<'d> Did<'d> {
    /// Validate a DID, borrowing from the input. Returns `None` on any grammar violation.
    pub fn parse(did: &'d str) -> Option<Self> {
        let method_end = scan(did).ok()?;
        Some(Self {
            did: CowStr::Borrowed(did),
            method_end,
        })
    }

    /// Fallible constructor, validates, borrows from input
    pub fn new(did: &'d str) -> Result<Self, AtStrError> {
        Self::from_cow(CowStr::Borrowed(did))
    }

    /// Fallible constructor, validates, takes ownership
    pub fn new_owned(did: impl AsRef<str>) -> Result<Did<'static>, AtStrError> {
        Did::from_cow(CowStr::copy_from_str(did.as_ref()))
    }

    /// Fallible constructor, validates, doesn't allocate
    pub fn new_static(did: &'static str) -> Result<Did<'static>, AtStrError> {
        Did::from_cow(CowStr::new_static(did))
    }

    pub(crate) fn from_cow(did: CowStr<'d>) -> Result<Self, AtStrError> {
        match scan(&did) {
            Ok(method_end) => Ok(Self { did, method_end }),
            Err(kind) => Err(AtStrError::new("did", &did, kind)),
        }
    }

    /// Write `did:{method}:{identifier}` into `buf` and validate the result.
    pub fn format_into<'b>(
        method: &str,
        identifier: &str,
        buf: &'b mut [u8],
    ) -> Result<Did<'b>, FormatError> {
        let written = write_parts(buf, &["did:", method, ":", identifier])?;
        Ok(Did::new(written)?)
    }

    /// The DID method, with `plc` and `web` broken out.
    pub fn method(&self) -> DidMethod<'_> {
        match &self.did[4..self.method_end] {
            "plc" => DidMethod::Plc,
            "web" => DidMethod::Web,
            other => DidMethod::Other(other),
        }
    }

    /// The method-specific identifier (everything after the second colon).
    pub fn identifier(&self) -> &str {
        &self.did[self.method_end + 1..]
    }

    /// The full DID text
    pub fn as_str(&self) -> &str {
        self.did.as_str()
    }
}

impl FromStr for Did<'_> {
    type Err = AtStrError;

    /// Has to take ownership due to the lifetime constraints of the FromStr trait.
    /// Prefer `Did::new()` if you want to borrow.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Did::new_owned(s)
    }
}

impl IntoStatic for Did<'_> {
    type Output = Did<'static>;

    fn into_static(self) -> Self::Output {
        Did {
            did: self.did.into_static(),
            method_end: self.method_end,
        }
    }
}

impl Serialize for Did<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de, 'a> Deserialize<'de> for Did<'a>
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

impl fmt::Display for Did<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.did)
    }
}

impl fmt::Debug for Did<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Did({})", self.did)
    }
}

impl<'d> From<Did<'d>> for String {
    fn from(value: Did<'d>) -> Self {
        value.did.to_string()
    }
}

impl<'d> From<Did<'d>> for CowStr<'d> {
    fn from(value: Did<'d>) -> Self {
        value.did
    }
}

impl TryFrom<String> for Did<'static> {
    type Error = AtStrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Did::from_cow(value.into())
    }
}

impl AsRef<str> for Did<'_> {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Deref for Did<'_> {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}
