use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

use crate::IntoStatic;

/// Borrowed-or-owned string backing every identifier type.
///
/// Parsing borrows from the caller's buffer; `into_static()` copies into a
/// [`SmolStr`]. Short identifiers (TIDs, most handles and NSIDs) fit inline in a
/// `SmolStr`, so taking ownership of them does not touch the heap.
///
/// Equality, ordering and hashing only look at the text, never the variant.
#[derive(Clone)]
pub enum CowStr<'s> {
    /// Borrowed from the parsed input
    Borrowed(&'s str),
    /// Owned copy
    Owned(SmolStr),
}

impl CowStr<'static> {
    /// Owned copy of `s`. Allocates only past the `SmolStr` inline capacity.
    pub fn copy_from_str(s: &str) -> Self {
        Self::Owned(SmolStr::from(s))
    }

    /// Owned, non-allocating wrapper around a static string.
    pub fn new_static(s: &'static str) -> Self {
        Self::Owned(SmolStr::new_static(s))
    }
}

impl CowStr<'_> {
    /// The text
    pub fn as_str(&self) -> &str {
        match self {
            CowStr::Borrowed(s) => s,
            CowStr::Owned(s) => s.as_str(),
        }
    }

    /// Whether the text still points into the parsed input.
    pub fn is_borrowed(&self) -> bool {
        matches!(self, CowStr::Borrowed(_))
    }
}

impl AsRef<str> for CowStr<'_> {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Deref for CowStr<'_> {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl<'s> From<&'s str> for CowStr<'s> {
    fn from(s: &'s str) -> Self {
        CowStr::Borrowed(s)
    }
}

impl From<String> for CowStr<'_> {
    fn from(s: String) -> Self {
        CowStr::Owned(s.into())
    }
}

impl From<SmolStr> for CowStr<'_> {
    fn from(s: SmolStr) -> Self {
        CowStr::Owned(s)
    }
}

impl From<CowStr<'_>> for String {
    fn from(s: CowStr<'_>) -> Self {
        s.as_str().to_owned()
    }
}

impl From<CowStr<'_>> for SmolStr {
    fn from(s: CowStr<'_>) -> Self {
        match s {
            CowStr::Borrowed(s) => SmolStr::new(s),
            CowStr::Owned(s) => s,
        }
    }
}

impl<'a> PartialEq<CowStr<'a>> for CowStr<'_> {
    fn eq(&self, other: &CowStr<'a>) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for CowStr<'_> {}

impl PartialEq<str> for CowStr<'_> {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for CowStr<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl PartialEq<CowStr<'_>> for &str {
    fn eq(&self, other: &CowStr<'_>) -> bool {
        *self == other.as_str()
    }
}

impl PartialOrd for CowStr<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CowStr<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl Hash for CowStr<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state)
    }
}

impl fmt::Debug for CowStr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for CowStr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl IntoStatic for CowStr<'_> {
    type Output = CowStr<'static>;

    fn into_static(self) -> Self::Output {
        CowStr::Owned(self.into())
    }
}

impl Serialize for CowStr<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self)
    }
}

/// Borrows when the deserializer hands out `&'de str`, copies otherwise.
struct Visitor;

impl<'de> serde::de::Visitor<'de> for Visitor {
    type Value = CowStr<'de>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a string")
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(CowStr::copy_from_str(v))
    }

    fn visit_borrowed_str<E: serde::de::Error>(self, v: &'de str) -> Result<Self::Value, E> {
        Ok(CowStr::Borrowed(v))
    }

    fn visit_string<E: serde::de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(v.into())
    }
}

impl<'de: 'a, 'a> Deserialize<'de> for CowStr<'a> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<CowStr<'a>, D::Error> {
        deserializer.deserialize_str(Visitor)
    }
}
