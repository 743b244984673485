use crate::types::did::Did;
use crate::types::handle::Handle;
use crate::types::string::AtStrError;
use crate::{CowStr, IntoStatic};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error};

/// An AT Protocol identifier: either a DID or a handle.
///
/// Anything starting with `did:` is parsed as a DID and nothing else; a
/// malformed DID is never retried as a handle.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AtIdentifier<'i> {
    Did(Did<'i>),
    Handle(Handle<'i>),
}

impl<'i> AtIdentifier<'i> {
    /// Parse without reporting why the input was rejected.
    pub fn parse(ident: &'i str) -> Option<Self> {
        if ident.starts_with("did:") {
            Did::parse(ident).map(AtIdentifier::Did)
        } else {
            Handle::parse(ident).map(AtIdentifier::Handle)
        }
    }

    /// Fallible constructor, validates, borrows from input
    pub fn new(ident: &'i str) -> Result<Self, AtStrError> {
        Self::from_cow(CowStr::Borrowed(ident))
    }

    /// Fallible constructor, validates, takes ownership
    pub fn new_owned(ident: impl AsRef<str>) -> Result<AtIdentifier<'static>, AtStrError> {
        AtIdentifier::from_cow(CowStr::copy_from_str(ident.as_ref()))
    }

    pub(crate) fn from_cow(ident: CowStr<'i>) -> Result<Self, AtStrError> {
        if ident.starts_with("did:") {
            Did::from_cow(ident).map(AtIdentifier::Did)
        } else {
            Handle::from_cow(ident).map(AtIdentifier::Handle)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AtIdentifier::Did(did) => did.as_str(),
            AtIdentifier::Handle(handle) => handle.as_str(),
        }
    }

    pub fn as_did(&self) -> Option<&Did<'i>> {
        match self {
            AtIdentifier::Did(did) => Some(did),
            AtIdentifier::Handle(_) => None,
        }
    }

    pub fn as_handle(&self) -> Option<&Handle<'i>> {
        match self {
            AtIdentifier::Handle(handle) => Some(handle),
            AtIdentifier::Did(_) => None,
        }
    }
}

impl<'i> From<Did<'i>> for AtIdentifier<'i> {
    fn from(did: Did<'i>) -> Self {
        AtIdentifier::Did(did)
    }
}

impl<'i> From<Handle<'i>> for AtIdentifier<'i> {
    fn from(handle: Handle<'i>) -> Self {
        AtIdentifier::Handle(handle)
    }
}

impl FromStr for AtIdentifier<'_> {
    type Err = AtStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AtIdentifier::new_owned(s)
    }
}

impl IntoStatic for AtIdentifier<'_> {
    type Output = AtIdentifier<'static>;

    fn into_static(self) -> Self::Output {
        match self {
            AtIdentifier::Did(did) => AtIdentifier::Did(did.into_static()),
            AtIdentifier::Handle(handle) => AtIdentifier::Handle(handle.into_static()),
        }
    }
}

impl Serialize for AtIdentifier<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de, 'a> Deserialize<'de> for AtIdentifier<'a>
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

impl fmt::Display for AtIdentifier<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for AtIdentifier<'_> {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn did_first() {
        let ident = AtIdentifier::parse("did:plc:abc123").unwrap();
        assert!(ident.as_did().is_some());
        let ident = AtIdentifier::parse("alice.bsky.social").unwrap();
        assert!(ident.as_handle().is_some());
    }

    #[test]
    fn broken_did_is_not_a_handle() {
        assert!(AtIdentifier::parse("did:plc:").is_none());
        let err = AtIdentifier::new("did:PLC:abc").unwrap_err();
        assert_eq!(err.spec, "did");
        let err = AtIdentifier::new("not a handle").unwrap_err();
        assert_eq!(err.spec, "handle");
    }

    #[test]
    fn serde_round_trip() {
        let ident: AtIdentifier = serde_json::from_str("\"did:web:example.com\"").unwrap();
        assert!(matches!(ident, AtIdentifier::Did(_)));
        assert_eq!(
            serde_json::to_string(&ident).unwrap(),
            "\"did:web:example.com\""
        );
        assert!(serde_json::from_str::<AtIdentifier>("\"@@\"").is_err());
    }
}
