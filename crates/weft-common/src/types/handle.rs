use std::fmt;
use std::{ops::Deref, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error};
use smol_str::SmolStr;

use crate::types::string::{AtStrError, FormatError, StrParseKind, write_joined};
use crate::types::{DISALLOWED_TLDS, ends_with_any};
use crate::{CowStr, IntoStatic};

/// Maximum length of a handle.
pub const MAX_HANDLE_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// A domain-name style account [handle].
///
/// Handles are case-insensitive; [`Handle::normalize`] gives the lowercase form
/// used for comparison. Parsing keeps the original case.
///
/// [handle]: https://atproto.com/specs/handle
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle<'h> {
    handle: CowStr<'h>,
    tld_start: usize,
}

/// Scan a handle label by label, returning where the final label starts.
pub(crate) fn scan(handle: &str) -> Result<usize, StrParseKind> {
    let bytes = handle.as_bytes();
    if bytes.len() > MAX_HANDLE_LEN {
        return Err(StrParseKind::TooLong {
            max: MAX_HANDLE_LEN,
            actual: bytes.len(),
        });
    }
    if bytes.is_empty() {
        return Err(StrParseKind::TooShort {
            min: 1,
            actual: 0,
        });
    }

    let mut label_start = 0;
    let mut labels = 0;
    for i in 0..=bytes.len() {
        let at_end = i == bytes.len();
        if at_end || bytes[i] == b'.' {
            let len = i - label_start;
            if len == 0 {
                return Err(StrParseKind::missing(i, "empty label"));
            }
            if len > MAX_LABEL_LEN {
                return Err(StrParseKind::disallowed(
                    label_start,
                    len,
                    "labels are at most 63 characters",
                ));
            }
            if bytes[label_start] == b'-' {
                return Err(StrParseKind::invalid_char(
                    label_start,
                    "labels may not start with a hyphen",
                ));
            }
            if bytes[i - 1] == b'-' {
                return Err(StrParseKind::invalid_char(
                    i - 1,
                    "labels may not end with a hyphen",
                ));
            }
            labels += 1;
            if !at_end {
                label_start = i + 1;
            }
            continue;
        }
        let c = bytes[i];
        if !(c.is_ascii_alphanumeric() || c == b'-') {
            return Err(StrParseKind::invalid_char(
                i,
                "allowed characters are ascii letters, digits and `-`",
            ));
        }
    }
    if labels < 2 {
        return Err(StrParseKind::missing(
            bytes.len(),
            "a handle needs at least two labels",
        ));
    }
    if bytes[label_start].is_ascii_digit() {
        return Err(StrParseKind::invalid_char(
            label_start,
            "the top-level domain may not start with a digit",
        ));
    }
    Ok(label_start)
}

impl<'h> Handle<'h> {
    /// Validate a handle, borrowing from the input. Returns `None` on any grammar violation.
    pub fn parse(handle: &'h str) -> Option<Self> {
        let tld_start = scan(handle).ok()?;
        Some(Self {
            handle: CowStr::Borrowed(handle),
            tld_start,
        })
    }

    /// Fallible constructor, validates, borrows from input
    pub fn new(handle: &'h str) -> Result<Self, AtStrError> {
        Self::from_cow(CowStr::Borrowed(handle))
    }

    /// Fallible constructor, validates, takes ownership
    pub fn new_owned(handle: impl AsRef<str>) -> Result<Handle<'static>, AtStrError> {
        Handle::from_cow(CowStr::copy_from_str(handle.as_ref()))
    }

    /// Fallible constructor, validates, doesn't allocate
    pub fn new_static(handle: &'static str) -> Result<Handle<'static>, AtStrError> {
        Handle::from_cow(CowStr::new_static(handle))
    }

    pub(crate) fn from_cow(handle: CowStr<'h>) -> Result<Self, AtStrError> {
        match scan(&handle) {
            Ok(tld_start) => Ok(Self { handle, tld_start }),
            Err(kind) => Err(AtStrError::new("handle", &handle, kind)),
        }
    }

    /// Join `labels` with dots into `buf` and validate the result.
    pub fn format_into<'b>(labels: &[&str], buf: &'b mut [u8]) -> Result<Handle<'b>, FormatError> {
        let written = write_joined(buf, labels, b'.')?;
        Ok(Handle::new(written)?)
    }

    /// Lowercase copy of this handle.
    pub fn normalize(&self) -> Handle<'static> {
        Handle {
            handle: CowStr::Owned(SmolStr::new(self.handle.to_ascii_lowercase())),
            tld_start: self.tld_start,
        }
    }

    /// Case-insensitive comparison.
    pub fn eq_ignore_case(&self, other: &Handle<'_>) -> bool {
        self.as_str().eq_ignore_ascii_case(other.as_str())
    }

    /// The final label, e.g. `social` for `alice.bsky.social`.
    pub fn tld(&self) -> &str {
        &self.handle[self.tld_start..]
    }

    /// Whether this handle sits under a top-level domain that will never
    /// resolve publicly (`.local`, `.arpa`, `.onion`, ...).
    ///
    /// Such handles are valid syntax, so parsing accepts them; resolvers refuse them.
    pub fn has_reserved_tld(&self) -> bool {
        ends_with_any(self.as_str(), DISALLOWED_TLDS)
    }

    pub fn as_str(&self) -> &str {
        self.handle.as_str()
    }
}

impl FromStr for Handle<'_> {
    type Err = AtStrError;

    /// Has to take ownership due to the lifetime constraints of the FromStr trait.
    /// Prefer `Handle::new()` if you want to borrow.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Handle::new_owned(s)
    }
}

impl IntoStatic for Handle<'_> {
    type Output = Handle<'static>;

    fn into_static(self) -> Self::Output {
        Handle {
            handle: self.handle.into_static(),
            tld_start: self.tld_start,
        }
    }
}

impl Serialize for Handle<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de, 'a> Deserialize<'de> for Handle<'a>
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

impl fmt::Display for Handle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.handle)
    }
}

impl fmt::Debug for Handle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.handle)
    }
}

impl<'h> From<Handle<'h>> for String {
    fn from(value: Handle<'h>) -> Self {
        value.handle.to_string()
    }
}

impl<'h> From<Handle<'h>> for CowStr<'h> {
    fn from(value: Handle<'h>) -> Self {
        value.handle
    }
}

impl TryFrom<String> for Handle<'static> {
    type Error = AtStrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Handle::from_cow(value.into())
    }
}

impl AsRef<str> for Handle<'_> {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Deref for Handle<'_> {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}
