//! Multicodec public key envelopes and curve keys.
//!
//! atproto publishes signing keys as a multicodec-tagged, SEC1-compressed curve
//! point, wrapped in base58btc multibase:
//!
//! ```text
//! z  base58btc( varint(codec) || 33-byte compressed point )
//! ```
//!
//! [`parse_public_key`] unwraps the multicodec envelope without any curve
//! arithmetic. [`PublicKey`] goes on to decode the point with `k256` / `p256`
//! (behind the `crypto-k256` / `crypto-p256` features).
//!
//! ```
//! use weft_common::multibase;
//! use weft_common::types::crypto::{parse_public_key, KeyType};
//!
//! let bytes = multibase::decode("zQ3shXjHeiBuRCKmM36cuYnm7YEMzhGnCmCyW92sRJ9pribSF").unwrap();
//! let key = parse_public_key(&bytes).unwrap();
//! assert_eq!(key.key_type, KeyType::Secp256k1);
//! ```

use crate::multibase::{self, Base, MultibaseError};

/// Varint encoding of the `secp256k1-pub` multicodec (0xe7).
pub const SECP256K1_PUB_PREFIX: [u8; 2] = [0xe7, 0x01];
/// Varint encoding of the `p256-pub` multicodec (0x1200).
pub const P256_PUB_PREFIX: [u8; 2] = [0x80, 0x24];
/// Length of a SEC1-compressed point on either curve.
pub const COMPRESSED_KEY_LEN: usize = 33;

const DID_KEY_PREFIX: &str = "did:key:";

/// The curves atproto signing keys may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// secp256k1, signs `ES256K` tokens
    Secp256k1,
    /// NIST P-256, signs `ES256` tokens
    P256,
}

impl KeyType {
    /// The two-byte multicodec prefix for this key type.
    pub const fn multicodec_prefix(self) -> [u8; 2] {
        match self {
            KeyType::Secp256k1 => SECP256K1_PUB_PREFIX,
            KeyType::P256 => P256_PUB_PREFIX,
        }
    }

    /// The JWT `alg` value for signatures made with this key type.
    pub const fn jwt_alg(self) -> &'static str {
        match self {
            KeyType::Secp256k1 => "ES256K",
            KeyType::P256 => "ES256",
        }
    }

    /// Curve name, e.g. `secp256k1`.
    pub const fn as_str(self) -> &'static str {
        match self {
            KeyType::Secp256k1 => "secp256k1",
            KeyType::P256 => "p256",
        }
    }
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from decoding or converting multicodec keys
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
pub enum CryptoError {
    /// The multibase wrapper didn't decode
    #[error(transparent)]
    #[diagnostic(transparent)]
    Multibase(#[from] MultibaseError),
    /// Fewer bytes than a codec prefix
    #[error("multicodec key is too short ({0} bytes)")]
    #[diagnostic(code(weft::crypto::too_short))]
    TooShort(usize),
    /// A prefix other than secp256k1-pub or p256-pub
    #[error("unsupported key codec prefix {0:02x?}")]
    #[diagnostic(
        code(weft::crypto::unsupported_codec),
        help("supported codecs are secp256k1-pub (e7 01) and p256-pub (80 24)")
    )]
    UnsupportedCodec([u8; 2]),
    /// The key body is not a 33-byte compressed point
    #[error("invalid key length: expected {expected}, got {actual}")]
    #[diagnostic(code(weft::crypto::invalid_length))]
    InvalidLength {
        /// Expected length of the key
        expected: usize,
        /// Actual length of the key
        actual: usize,
    },
    /// The bytes are not a point on the curve
    #[error("invalid {0} public key point")]
    #[diagnostic(code(weft::crypto::invalid_point))]
    InvalidPoint(KeyType),
    /// The key type's curve support isn't compiled in
    #[error("{0} support is not enabled")]
    #[diagnostic(code(weft::crypto::disabled))]
    Disabled(KeyType),
    /// Not a `did:key:z...` string
    #[error("not a did:key DID")]
    #[diagnostic(code(weft::crypto::not_did_key))]
    NotDidKey,
}

/// A public key with its multicodec envelope removed.
///
/// Borrows the 33 key bytes from the input; no curve validation has happened yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MulticodecKey<'a> {
    /// Which curve the key is on
    pub key_type: KeyType,
    /// The SEC1-compressed point
    pub raw: &'a [u8; COMPRESSED_KEY_LEN],
}

/// Split a multicodec-encoded public key into its key type and raw point.
pub fn parse_public_key(bytes: &[u8]) -> Result<MulticodecKey<'_>, CryptoError> {
    let Some((prefix, body)) = bytes.split_first_chunk::<2>() else {
        return Err(CryptoError::TooShort(bytes.len()));
    };
    let key_type = match *prefix {
        SECP256K1_PUB_PREFIX => KeyType::Secp256k1,
        P256_PUB_PREFIX => KeyType::P256,
        other => return Err(CryptoError::UnsupportedCodec(other)),
    };
    let raw = <&[u8; COMPRESSED_KEY_LEN]>::try_from(body).map_err(|_| CryptoError::InvalidLength {
        expected: COMPRESSED_KEY_LEN,
        actual: body.len(),
    })?;
    Ok(MulticodecKey { key_type, raw })
}

/// Wrap a compressed point in its multicodec envelope.
pub fn encode_public_key(key_type: KeyType, raw: &[u8; COMPRESSED_KEY_LEN]) -> [u8; 35] {
    let mut out = [0u8; 35];
    out[..2].copy_from_slice(&key_type.multicodec_prefix());
    out[2..].copy_from_slice(raw);
    out
}

/// A decoded curve public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    /// secp256k1 ECDSA verifying key
    #[cfg(feature = "crypto-k256")]
    K256(k256::ecdsa::VerifyingKey),
    /// P-256 ECDSA verifying key
    #[cfg(feature = "crypto-p256")]
    P256(p256::ecdsa::VerifyingKey),
}

#[cfg(any(feature = "crypto-k256", feature = "crypto-p256"))]
impl PublicKey {
    /// Decode the point carried by a [`MulticodecKey`].
    pub fn from_parts(key: MulticodecKey<'_>) -> Result<Self, CryptoError> {
        match key.key_type {
            #[cfg(feature = "crypto-k256")]
            KeyType::Secp256k1 => k256::ecdsa::VerifyingKey::from_sec1_bytes(key.raw)
                .map(PublicKey::K256)
                .map_err(|_| CryptoError::InvalidPoint(KeyType::Secp256k1)),
            #[cfg(feature = "crypto-p256")]
            KeyType::P256 => p256::ecdsa::VerifyingKey::from_sec1_bytes(key.raw)
                .map(PublicKey::P256)
                .map_err(|_| CryptoError::InvalidPoint(KeyType::P256)),
            #[allow(unreachable_patterns)]
            other => Err(CryptoError::Disabled(other)),
        }
    }

    /// Decode a multicodec-prefixed key.
    pub fn from_multicodec(bytes: &[u8]) -> Result<Self, CryptoError> {
        Self::from_parts(parse_public_key(bytes)?)
    }

    /// Decode a `publicKeyMultibase` value.
    pub fn from_multibase(s: &str) -> Result<Self, CryptoError> {
        let bytes = multibase::decode(s)?;
        Self::from_multicodec(&bytes)
    }

    /// Decode a `did:key:z...` identifier.
    pub fn from_did_key(did: &str) -> Result<Self, CryptoError> {
        let encoded = did
            .strip_prefix(DID_KEY_PREFIX)
            .filter(|rest| rest.starts_with(Base::Base58Btc.code()))
            .ok_or(CryptoError::NotDidKey)?;
        Self::from_multibase(encoded)
    }

    /// Which curve this key is on.
    pub fn key_type(&self) -> KeyType {
        match self {
            #[cfg(feature = "crypto-k256")]
            PublicKey::K256(_) => KeyType::Secp256k1,
            #[cfg(feature = "crypto-p256")]
            PublicKey::P256(_) => KeyType::P256,
        }
    }

    /// The SEC1-compressed point.
    pub fn to_compressed(&self) -> [u8; COMPRESSED_KEY_LEN] {
        let mut out = [0u8; COMPRESSED_KEY_LEN];
        match self {
            #[cfg(feature = "crypto-k256")]
            PublicKey::K256(key) => out.copy_from_slice(key.to_encoded_point(true).as_bytes()),
            #[cfg(feature = "crypto-p256")]
            PublicKey::P256(key) => out.copy_from_slice(key.to_encoded_point(true).as_bytes()),
        }
        out
    }

    /// Multicodec envelope around the compressed point.
    pub fn to_multicodec(&self) -> [u8; 35] {
        encode_public_key(self.key_type(), &self.to_compressed())
    }

    /// The `publicKeyMultibase` form of this key.
    pub fn to_multibase(&self) -> String {
        multibase::encode(Base::Base58Btc, &self.to_multicodec())
    }

    /// The `did:key` form of this key.
    pub fn to_did_key(&self) -> String {
        format!("{DID_KEY_PREFIX}{}", self.to_multibase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const K256_KEY: &str = "zQ3shXjHeiBuRCKmM36cuYnm7YEMzhGnCmCyW92sRJ9pribSF";

    fn multikey(prefix: [u8; 2], body: &[u8]) -> String {
        let mut buf = prefix.to_vec();
        buf.extend_from_slice(body);
        ::multibase::encode(::multibase::Base::Base58Btc, buf)
    }

    #[test]
    fn unwraps_known_k256_key() {
        let bytes = multibase::decode(K256_KEY).unwrap();
        assert_eq!(bytes.len(), 35);
        let key = parse_public_key(&bytes).unwrap();
        assert_eq!(key.key_type, KeyType::Secp256k1);
        assert!(matches!(key.raw[0], 0x02 | 0x03));
        assert_eq!(encode_public_key(key.key_type, key.raw), bytes.as_slice());
    }

    #[test]
    fn unwraps_p256_prefix() {
        let mut body = [0u8; 33];
        body[0] = 0x03;
        let bytes = multibase::decode(&multikey(P256_PUB_PREFIX, &body)).unwrap();
        let key = parse_public_key(&bytes).unwrap();
        assert_eq!(key.key_type, KeyType::P256);
        assert_eq!(key.raw, &body);
    }

    #[test]
    fn rejects_bad_envelopes() {
        assert_eq!(parse_public_key(&[0xe7]), Err(CryptoError::TooShort(1)));
        // ed25519-pub is a valid multicodec, just not one atproto signs with
        let mut ed = vec![0xed, 0x01];
        ed.extend_from_slice(&[0u8; 32]);
        assert_eq!(
            parse_public_key(&ed),
            Err(CryptoError::UnsupportedCodec([0xed, 0x01]))
        );
        let mut uncompressed = SECP256K1_PUB_PREFIX.to_vec();
        uncompressed.push(0x04);
        uncompressed.extend_from_slice(&[0u8; 64]);
        assert_eq!(
            parse_public_key(&uncompressed),
            Err(CryptoError::InvalidLength {
                expected: 33,
                actual: 65
            })
        );
        let mut short = P256_PUB_PREFIX.to_vec();
        short.extend_from_slice(&[2u8; 32]);
        assert!(matches!(
            parse_public_key(&short),
            Err(CryptoError::InvalidLength { actual: 32, .. })
        ));
    }

    #[cfg(feature = "crypto-k256")]
    #[test]
    fn k256_multibase_round_trip() {
        let key = PublicKey::from_multibase(K256_KEY).unwrap();
        assert_eq!(key.key_type(), KeyType::Secp256k1);
        assert_eq!(key.to_multibase(), K256_KEY);
        let did = key.to_did_key();
        assert_eq!(did, format!("did:key:{K256_KEY}"));
        assert_eq!(PublicKey::from_did_key(&did).unwrap(), key);
    }

    #[cfg(feature = "crypto-p256")]
    #[test]
    fn p256_round_trip() {
        let secret = p256::ecdsa::SigningKey::from_slice(&[7u8; 32]).unwrap();
        let key = PublicKey::P256(secret.verifying_key().clone());
        let encoded = key.to_multibase();
        assert!(encoded.starts_with("zDn"));
        let decoded = PublicKey::from_multibase(&encoded).unwrap();
        assert_eq!(decoded, key);
        assert_eq!(decoded.key_type(), KeyType::P256);
    }

    #[cfg(feature = "crypto-k256")]
    #[test]
    fn rejects_points_off_the_curve() {
        // x = 0 has no square root mod p on secp256k1
        let mut body = [0u8; 33];
        body[0] = 0x02;
        assert_eq!(
            PublicKey::from_multibase(&multikey(SECP256K1_PUB_PREFIX, &body)),
            Err(CryptoError::InvalidPoint(KeyType::Secp256k1))
        );
        let mut bad_tag = [0x11u8; 33];
        bad_tag[0] = 0x05;
        assert!(PublicKey::from_multibase(&multikey(SECP256K1_PUB_PREFIX, &bad_tag)).is_err());
    }

    #[cfg(any(feature = "crypto-k256", feature = "crypto-p256"))]
    #[test]
    fn did_key_prefix_is_required() {
        assert_eq!(PublicKey::from_did_key(K256_KEY), Err(CryptoError::NotDidKey));
        assert_eq!(
            PublicKey::from_did_key("did:key:mAbc"),
            Err(CryptoError::NotDidKey)
        );
        assert!(matches!(
            PublicKey::from_did_key("did:key:z0"),
            Err(CryptoError::Multibase(_))
        ));
    }
}
