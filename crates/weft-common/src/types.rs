/// `at://` URIs
pub mod aturi;
/// Public keys, signing keys and `did:key`
pub mod crypto;
/// Decentralized identifiers
pub mod did;
/// DID documents
pub mod did_doc;
/// Domain-name handles
pub mod handle;
/// DID-or-handle identifiers
pub mod ident;
/// Namespaced identifiers
pub mod nsid;
/// Record keys
pub mod recordkey;
/// Parse errors and helpers shared by the identifier types
pub mod string;
/// Timestamp identifiers
pub mod tid;

/// Top-level domains which are reserved and will never resolve on the public
/// internet. Handles under them are syntactically valid but refused by resolvers.
pub const DISALLOWED_TLDS: &[&str] = &[
    ".local",
    ".arpa",
    ".invalid",
    ".localhost",
    ".internal",
    ".example",
    ".alt",
    // policy could concievably change on ".onion" some day
    ".onion",
    // NOTE: .test is allowed in testing and devopment. In practical terms
    // "should" "never" actually resolve and get registered in production
];

/// Case-insensitive check for whether `string` ends with any suffix in `list`.
pub fn ends_with_any(string: impl AsRef<str>, list: &[&str]) -> bool {
    let string = string.as_ref().as_bytes();
    list.iter().any(|item| {
        let item = item.as_bytes();
        string.len() >= item.len()
            && string[string.len() - item.len()..].eq_ignore_ascii_case(item)
    })
}
