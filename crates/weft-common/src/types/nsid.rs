use crate::types::string::{AtStrError, FormatError, StrParseKind, write_parts};
use crate::{CowStr, IntoStatic};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error};
use std::fmt;
use std::{ops::Deref, str::FromStr};

/// Maximum length of an NSID.
pub const MAX_NSID_LEN: usize = 317;
const MAX_SEGMENT_LEN: usize = 63;

/// Namespaced Identifier (NSID)
///
/// A reversed domain authority (`app.bsky.feed`) followed by a name (`post`).
/// The offset of the name is recorded at parse time.
///
/// [NSID]: https://atproto.com/specs/nsid
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Nsid<'n> {
    nsid: CowStr<'n>,
    name_start: usize,
}

fn check_segment(start: usize, end: usize) -> Result<(), StrParseKind> {
    let len = end - start;
    if len == 0 {
        return Err(StrParseKind::missing(start, "empty segment"));
    }
    if len > MAX_SEGMENT_LEN {
        return Err(StrParseKind::disallowed(
            start,
            len,
            "segments are at most 63 characters",
        ));
    }
    Ok(())
}

/// Scan an NSID, returning the offset of the name segment.
pub(crate) fn scan(nsid: &str) -> Result<usize, StrParseKind> {
    let bytes = nsid.as_bytes();
    if bytes.len() > MAX_NSID_LEN {
        return Err(StrParseKind::TooLong {
            max: MAX_NSID_LEN,
            actual: bytes.len(),
        });
    }

    let mut seg_start = 0;
    let mut segments = 0;
    for (i, &c) in bytes.iter().enumerate() {
        match c {
            b'.' => {
                check_segment(seg_start, i)?;
                if bytes[seg_start] == b'-' || bytes[i - 1] == b'-' {
                    return Err(StrParseKind::invalid_char(
                        if bytes[seg_start] == b'-' { seg_start } else { i - 1 },
                        "domain segments may not start or end with a hyphen",
                    ));
                }
                segments += 1;
                seg_start = i + 1;
            }
            b'a'..=b'z' | b'0'..=b'9' | b'-' => {}
            // uppercase is fine in the name, which is checked after the loop
            b'A'..=b'Z' => {}
            _ => {
                return Err(StrParseKind::invalid_char(
                    i,
                    "allowed characters are ascii letters, digits, `-` and `.`",
                ));
            }
        }
    }

    // the final segment is the name
    let name = &bytes[seg_start..];
    check_segment(seg_start, bytes.len())?;
    segments += 1;
    if segments < 3 {
        return Err(StrParseKind::missing(
            bytes.len(),
            "an NSID needs at least three segments",
        ));
    }
    if name[0].is_ascii_digit() {
        return Err(StrParseKind::invalid_char(
            seg_start,
            "the name may not start with a digit",
        ));
    }
    if let Some(pos) = name.iter().position(|c| !c.is_ascii_alphanumeric()) {
        return Err(StrParseKind::invalid_char(
            seg_start + pos,
            "the name is ascii letters and digits only",
        ));
    }
    if let Some(pos) = bytes[..seg_start].iter().position(|c| c.is_ascii_uppercase()) {
        return Err(StrParseKind::invalid_char(
            pos,
            "the domain authority is lowercase",
        ));
    }
    Ok(seg_start)
}

impl<'n> Nsid<'n> {
    /// Validate an NSID, borrowing from the input. Returns `None` on any grammar violation.
    pub fn parse(nsid: &'n str) -> Option<Self> {
        let name_start = scan(nsid).ok()?;
        Some(Self {
            nsid: CowStr::Borrowed(nsid),
            name_start,
        })
    }

    /// Fallible constructor, validates, borrows from input
    pub fn new(nsid: &'n str) -> Result<Self, AtStrError> {
        Self::from_cow(CowStr::Borrowed(nsid))
    }

    /// Fallible constructor, validates, takes ownership
    pub fn new_owned(nsid: impl AsRef<str>) -> Result<Nsid<'static>, AtStrError> {
        Nsid::from_cow(CowStr::copy_from_str(nsid.as_ref()))
    }

    /// Fallible constructor, validates, doesn't allocate
    pub fn new_static(nsid: &'static str) -> Result<Nsid<'static>, AtStrError> {
        Nsid::from_cow(CowStr::new_static(nsid))
    }

    pub(crate) fn from_cow(nsid: CowStr<'n>) -> Result<Self, AtStrError> {
        match scan(&nsid) {
            Ok(name_start) => Ok(Self { nsid, name_start }),
            Err(kind) => Err(AtStrError::new("nsid", &nsid, kind)),
        }
    }

    /// Write `{authority}.{name}` into `buf` and validate the result.
    pub fn format_into<'b>(
        authority: &str,
        name: &str,
        buf: &'b mut [u8],
    ) -> Result<Nsid<'b>, FormatError> {
        let written = write_parts(buf, &[authority, ".", name])?;
        Ok(Nsid::new(written)?)
    }

    /// Returns the domain authority part of the NSID.
    pub fn authority(&self) -> &str {
        &self.nsid[..self.name_start - 1]
    }

    /// Returns the name segment of the NSID.
    pub fn name(&self) -> &str {
        &self.nsid[self.name_start..]
    }

    pub fn as_str(&self) -> &str {
        self.nsid.as_str()
    }
}

impl FromStr for Nsid<'_> {
    type Err = AtStrError;

    /// Has to take ownership due to the lifetime constraints of the FromStr trait.
    /// Prefer `Nsid::new()` if you want to borrow.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Nsid::new_owned(s)
    }
}

impl IntoStatic for Nsid<'_> {
    type Output = Nsid<'static>;

    fn into_static(self) -> Self::Output {
        Nsid {
            nsid: self.nsid.into_static(),
            name_start: self.name_start,
        }
    }
}

impl Serialize for Nsid<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de, 'a> Deserialize<'de> for Nsid<'a>
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

impl fmt::Display for Nsid<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.nsid)
    }
}

impl fmt::Debug for Nsid<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nsid({})", self.nsid)
    }
}

impl<'n> From<Nsid<'n>> for String {
    fn from(value: Nsid<'n>) -> Self {
        value.nsid.to_string()
    }
}

impl<'n> From<Nsid<'n>> for CowStr<'n> {
    fn from(value: Nsid<'n>) -> Self {
        value.nsid
    }
}

impl AsRef<str> for Nsid<'_> {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Deref for Nsid<'_> {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}
