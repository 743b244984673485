//! Classify a bare string and break it into its identifier components.

use serde::Serialize;
use weft_common::types::string::{AtprotoStr, Rkey};

/// What a string parsed as, and the parts it is made of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Inspection {
    /// A timestamp identifier
    Tid {
        /// The TID text
        value: String,
        /// Microseconds since the UNIX epoch
        timestamp_us: u64,
        /// Clock identifier
        clock_id: u16,
        /// The timestamp as RFC 3339, when it is representable
        #[serde(skip_serializing_if = "Option::is_none")]
        datetime: Option<String>,
    },
    /// A DID
    Did {
        /// The DID text
        value: String,
        /// Method name, e.g. `plc`
        method: String,
        /// Method-specific identifier
        identifier: String,
    },
    /// A handle
    Handle {
        /// The handle as given
        value: String,
        /// Lowercased form
        normalized: String,
        /// Final label
        tld: String,
        /// Whether the TLD never resolves publicly
        reserved: bool,
    },
    /// A namespaced identifier
    Nsid {
        /// The NSID text
        value: String,
        /// Reversed-domain authority
        authority: String,
        /// Final name segment
        name: String,
    },
    /// An `at://` URI
    AtUri {
        /// The URI text
        value: String,
        /// DID or handle
        authority: String,
        /// Collection NSID
        #[serde(skip_serializing_if = "Option::is_none")]
        collection: Option<String>,
        /// Record key
        #[serde(skip_serializing_if = "Option::is_none")]
        rkey: Option<String>,
    },
    /// Matched none of the identifier grammars above
    String {
        /// The input
        value: String,
        /// Whether it would still be accepted as a record key
        record_key: bool,
    },
}

impl Inspection {
    /// Name of the grammar that matched.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Tid { .. } => "tid",
            Self::Did { .. } => "did",
            Self::Handle { .. } => "handle",
            Self::Nsid { .. } => "nsid",
            Self::AtUri { .. } => "at-uri",
            Self::String { .. } => "string",
        }
    }
}

/// Classify `input` the same way [`AtprotoStr::new`] does.
pub fn inspect(input: &str) -> Inspection {
    let value = input.to_owned();
    match AtprotoStr::new(input) {
        AtprotoStr::Tid(tid) => Inspection::Tid {
            value,
            timestamp_us: tid.timestamp(),
            clock_id: tid.clock_id(),
            datetime: tid.datetime().map(|dt| dt.to_rfc3339()),
        },
        AtprotoStr::Did(did) => Inspection::Did {
            value,
            method: did.method().to_string(),
            identifier: did.identifier().to_owned(),
        },
        AtprotoStr::Handle(handle) => Inspection::Handle {
            value,
            normalized: handle.normalize().to_string(),
            tld: handle.tld().to_owned(),
            reserved: handle.has_reserved_tld(),
        },
        AtprotoStr::Nsid(nsid) => Inspection::Nsid {
            value,
            authority: nsid.authority().to_owned(),
            name: nsid.name().to_owned(),
        },
        AtprotoStr::AtUri(uri) => Inspection::AtUri {
            value,
            authority: uri.authority().to_owned(),
            collection: uri.collection().map(str::to_owned),
            rkey: uri.rkey().map(str::to_owned),
        },
        AtprotoStr::String(_) => Inspection::String {
            record_key: Rkey::parse(input).is_some(),
            value,
        },
    }
}
