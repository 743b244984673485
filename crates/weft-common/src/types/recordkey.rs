use crate::types::string::{AtStrError, FormatError, StrParseKind, write_parts};
use crate::types::tid::Tid;
use crate::{CowStr, IntoStatic};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error};
use std::fmt;
use std::{ops::Deref, str::FromStr};

/// Maximum length of a record key.
pub const MAX_RKEY_LEN: usize = 512;

/// ATProto Record Key (type `any`)
///
/// Catch-all for any string meeting the overall [record key] requirements.
/// TIDs, NSIDs and `self` are all valid record keys.
///
/// [record key]: https://atproto.com/specs/record-key
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Rkey<'r>(CowStr<'r>);

const fn is_rkey_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, b'.' | b'-' | b'_' | b':' | b'~')
}

pub(crate) fn scan(rkey: &str) -> Result<(), StrParseKind> {
    let bytes = rkey.as_bytes();
    if bytes.is_empty() {
        return Err(StrParseKind::TooShort { min: 1, actual: 0 });
    }
    if bytes.len() > MAX_RKEY_LEN {
        return Err(StrParseKind::TooLong {
            max: MAX_RKEY_LEN,
            actual: bytes.len(),
        });
    }
    if let Some(i) = bytes.iter().position(|&c| !is_rkey_char(c)) {
        return Err(StrParseKind::invalid_char(
            i,
            "allowed characters are ascii letters, digits and `._:~-`",
        ));
    }
    if rkey == "." || rkey == ".." {
        return Err(StrParseKind::disallowed(
            0,
            bytes.len(),
            "`.` and `..` are not valid record keys",
        ));
    }
    Ok(())
}

impl<'r> Rkey<'r> {
    /// Validate a record key, borrowing from the input. Returns `None` on any grammar violation.
    pub fn parse(rkey: &'r str) -> Option<Self> {
        scan(rkey).ok().map(|_| Self(CowStr::Borrowed(rkey)))
    }

    /// Fallible constructor, validates, borrows from input
    pub fn new(rkey: &'r str) -> Result<Self, AtStrError> {
        Self::from_cow(CowStr::Borrowed(rkey))
    }

    /// Fallible constructor, validates, takes ownership
    pub fn new_owned(rkey: impl AsRef<str>) -> Result<Rkey<'static>, AtStrError> {
        Rkey::from_cow(CowStr::copy_from_str(rkey.as_ref()))
    }

    /// Fallible constructor, validates, doesn't allocate
    pub fn new_static(rkey: &'static str) -> Result<Rkey<'static>, AtStrError> {
        Rkey::from_cow(CowStr::new_static(rkey))
    }

    pub(crate) fn from_cow(rkey: CowStr<'r>) -> Result<Self, AtStrError> {
        match scan(&rkey) {
            Ok(()) => Ok(Self(rkey)),
            Err(kind) => Err(AtStrError::new("record-key", &rkey, kind)),
        }
    }

    /// Copy `rkey` into `buf` and validate it.
    pub fn format_into<'b>(rkey: &str, buf: &'b mut [u8]) -> Result<Rkey<'b>, FormatError> {
        let written = write_parts(buf, &[rkey])?;
        Ok(Rkey::new(written)?)
    }

    /// The record key as a string
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<Tid> for Rkey<'static> {
    fn from(tid: Tid) -> Self {
        // the TID alphabet is a subset of the record key alphabet
        Rkey(CowStr::Owned(tid.into()))
    }
}

impl FromStr for Rkey<'_> {
    type Err = AtStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rkey::new_owned(s)
    }
}

impl IntoStatic for Rkey<'_> {
    type Output = Rkey<'static>;

    fn into_static(self) -> Self::Output {
        Rkey(self.0.into_static())
    }
}

impl Serialize for Rkey<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de, 'a> Deserialize<'de> for Rkey<'a>
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

impl fmt::Display for Rkey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Rkey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rkey({})", self.0)
    }
}

impl<'r> From<Rkey<'r>> for String {
    fn from(value: Rkey<'r>) -> Self {
        value.0.to_string()
    }
}

impl<'r> From<Rkey<'r>> for CowStr<'r> {
    fn from(value: Rkey<'r>) -> Self {
        value.0
    }
}

impl AsRef<str> for Rkey<'_> {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Deref for Rkey<'_> {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}
