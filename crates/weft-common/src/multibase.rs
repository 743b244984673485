//! [Multibase] decoding and encoding.
//!
//! Only base58btc (prefix `z`) is implemented. It is the only encoding atproto
//! uses for `publicKeyMultibase` and `did:key` values, and an unrecognised
//! prefix is an error rather than a pass-through.
//!
//! [Multibase]: https://github.com/multiformats/multibase

/// A supported multibase encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Base {
    /// Bitcoin base58, prefix `z`
    Base58Btc,
}

impl Base {
    /// The one-character prefix for this encoding.
    pub const fn code(self) -> char {
        match self {
            Base::Base58Btc => 'z',
        }
    }

    /// Look up an encoding by its prefix.
    pub const fn from_code(code: char) -> Option<Self> {
        match code {
            'z' => Some(Base::Base58Btc),
            _ => None,
        }
    }
}

/// Errors from multibase decoding
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
pub enum MultibaseError {
    /// Nothing to decode, not even a prefix
    #[error("empty multibase string")]
    #[diagnostic(code(weft::multibase::empty))]
    Empty,
    /// The prefix names an encoding this crate doesn't implement
    #[error("unsupported multibase encoding `{0}`")]
    #[diagnostic(
        code(weft::multibase::unsupported_encoding),
        help("only base58btc (`z`) is supported")
    )]
    UnsupportedEncoding(char),
    /// A character outside the encoding's alphabet
    #[error("invalid character {character:?} at index {index}")]
    #[diagnostic(code(weft::multibase::invalid_character))]
    InvalidCharacter {
        /// The offending character
        character: char,
        /// Its byte offset in the input
        index: usize,
    },
    /// Rejected by the codec for some other reason
    #[error("malformed multibase payload: {0}")]
    #[diagnostic(code(weft::multibase::malformed))]
    Malformed(String),
}

/// Decode a multibase string, dispatching on its prefix.
pub fn decode(input: &str) -> Result<Vec<u8>, MultibaseError> {
    let mut chars = input.chars();
    let code = chars.next().ok_or(MultibaseError::Empty)?;
    match Base::from_code(code) {
        Some(Base::Base58Btc) => base58btc::decode(chars.as_str()).map_err(|e| match e {
            MultibaseError::InvalidCharacter { character, index } => {
                MultibaseError::InvalidCharacter {
                    character,
                    index: index + code.len_utf8(),
                }
            }
            other => other,
        }),
        None => Err(MultibaseError::UnsupportedEncoding(code)),
    }
}

/// Encode `data` with the given base, including the prefix.
pub fn encode(base: Base, data: &[u8]) -> String {
    match base {
        Base::Base58Btc => format!("{}{}", base.code(), base58btc::encode(data)),
    }
}

/// Bitcoin-alphabet base58 without a multibase prefix, on top of [`bs58`].
///
/// Leading zero bytes become leading `1`s and back again.
pub mod base58btc {
    use super::MultibaseError;

    /// Decode base58btc text to bytes.
    pub fn decode(input: &str) -> Result<Vec<u8>, MultibaseError> {
        bs58::decode(input)
            .with_alphabet(bs58::Alphabet::BITCOIN)
            .into_vec()
            .map_err(|e| match e {
                bs58::decode::Error::InvalidCharacter { character, index } => {
                    MultibaseError::InvalidCharacter { character, index }
                }
                bs58::decode::Error::NonAsciiCharacter { index } => {
                    MultibaseError::InvalidCharacter {
                        character: input
                            .get(index..)
                            .and_then(|rest| rest.chars().next())
                            .unwrap_or(char::REPLACEMENT_CHARACTER),
                        index,
                    }
                }
                other => MultibaseError::Malformed(other.to_string()),
            })
    }

    /// Encode bytes as base58btc text.
    pub fn encode(data: &[u8]) -> String {
        bs58::encode(data)
            .with_alphabet(bs58::Alphabet::BITCOIN)
            .into_string()
    }
}
