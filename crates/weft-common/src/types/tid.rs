use serde::{Deserialize, Deserializer, Serialize, de::Error};
use smol_str::SmolStr;
use std::fmt;
use std::{ops::Deref, str::FromStr};

use crate::CowStr;
use crate::types::string::{AtStrError, FormatError, StrParseKind};

/// The sortable base32 alphabet. Digits `2-7` come before the letters in
/// ASCII, so comparing two encodings bytewise compares the encoded integers.
const S32_CHAR: &[u8; 32] = b"234567abcdefghijklmnopqrstuvwxyz";

/// Length of an encoded TID.
pub const TID_LEN: usize = 13;

/// Largest encodable microsecond timestamp.
///
/// This is the largest value whose encoding still starts with `7`, slightly
/// below the full 53-bit range.
pub const MAX_TIMESTAMP: u64 = (6 << 50) - 1;

/// Largest encodable clock identifier (10 bits).
pub const MAX_CLOCK_ID: u16 = (1 << 10) - 1;

const fn s32_value(c: u8) -> Option<u8> {
    match c {
        b'2'..=b'7' => Some(c - b'2'),
        b'a'..=b'z' => Some(c - b'a' + 6),
        _ => None,
    }
}

fn s32_encode(mut value: u64) -> [u8; TID_LEN] {
    let mut out = [0u8; TID_LEN];
    for slot in out.iter_mut().rev() {
        *slot = S32_CHAR[(value & 0x1F) as usize];
        value >>= 5;
    }
    out
}

/// Single pass over a candidate TID, returning the packed 64-bit value.
///
/// 13 characters carry 65 bits, one more than the integer they encode. The
/// first character is restricted to `2-7` (values 0-5), which keeps the high
/// bits of the integer clear. A letter there would either shift bits out of
/// the `u64`, so two strings collide on one value and string order stops
/// matching timestamp order, or decode to a timestamp past [`MAX_TIMESTAMP`]
/// that could never be formatted again.
fn scan(tid: &str) -> Result<u64, StrParseKind> {
    let bytes = tid.as_bytes();
    if bytes.len() > TID_LEN {
        return Err(StrParseKind::TooLong {
            max: TID_LEN,
            actual: bytes.len(),
        });
    }
    if bytes.len() < TID_LEN {
        return Err(StrParseKind::TooShort {
            min: TID_LEN,
            actual: bytes.len(),
        });
    }
    let mut value: u64 = 0;
    for (i, &c) in bytes.iter().enumerate() {
        let digit = s32_value(c).ok_or_else(|| {
            StrParseKind::invalid_char(i, "TIDs use the alphabet 234567abcdefghijklmnopqrstuvwxyz")
        })?;
        if i == 0 && !matches!(c, b'2'..=b'7') {
            return Err(StrParseKind::invalid_char(0, "first character must be one of 234567"));
        }
        value = (value << 5) | digit as u64;
    }
    Ok(value)
}

/// A [Timestamp Identifier].
///
/// Packs a microsecond UNIX timestamp and a 10-bit clock identifier into a
/// 13-character string whose lexicographic order matches timestamp order:
///
/// ```text
/// 0TTTTTTTTTTTTTTT TTTTTTTTTTTTTTTT TTTTTTTTTTTTTTTT TTTTTTCCCCCCCCCC
/// ```
///
/// The string is held inline in a [`SmolStr`], so neither parsing nor
/// formatting allocates.
///
/// [Timestamp Identifier]: https://atproto.com/specs/tid
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Hash)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Tid(SmolStr);

impl Tid {
    /// Parse a TID, returning `None` if the string doesn't match the grammar.
    pub fn parse(tid: &str) -> Option<Self> {
        scan(tid).ok().map(|_| Self(SmolStr::new_inline(tid)))
    }

    /// Parse a TID, reporting why it was rejected.
    pub fn new(tid: &str) -> Result<Self, AtStrError> {
        match scan(tid) {
            Ok(_) => Ok(Self(SmolStr::new_inline(tid))),
            Err(kind) => Err(AtStrError::new("tid", tid, kind)),
        }
    }

    /// Build a TID from its components.
    ///
    /// Returns `None` if `timestamp` is past [`MAX_TIMESTAMP`] or `clock_id` needs more
    /// than 10 bits.
    pub fn from_parts(timestamp: u64, clock_id: u16) -> Option<Self> {
        if timestamp > MAX_TIMESTAMP || clock_id > MAX_CLOCK_ID {
            return None;
        }
        let encoded = s32_encode((timestamp << 10) | clock_id as u64);
        // the alphabet is ascii
        let s = std::str::from_utf8(&encoded).ok()?;
        Some(Self(SmolStr::new_inline(s)))
    }

    /// Write the encoding of `(timestamp, clock_id)` into `buf`.
    ///
    /// `buf` must have room for [`TID_LEN`] bytes.
    pub fn format_into(
        timestamp: u64,
        clock_id: u16,
        buf: &mut [u8],
    ) -> Result<&str, FormatError> {
        if timestamp > MAX_TIMESTAMP {
            return Err(FormatError::OutOfRange("timestamp"));
        }
        if clock_id > MAX_CLOCK_ID {
            return Err(FormatError::OutOfRange("clock id"));
        }
        if buf.len() < TID_LEN {
            return Err(FormatError::BufferTooSmall {
                needed: TID_LEN,
                capacity: buf.len(),
            });
        }
        buf[..TID_LEN].copy_from_slice(&s32_encode((timestamp << 10) | clock_id as u64));
        let buf: &[u8] = buf;
        std::str::from_utf8(&buf[..TID_LEN]).map_err(|_| FormatError::OutOfRange("tid"))
    }

    /// Construct a new timestamp with the specified clock ID.
    ///
    /// If you have multiple clock sources, you can use `clock_id` to distinguish between them
    /// and hint to other implementations that the timestamp cannot be compared with other
    /// timestamps from other sources.
    /// If you are only using a single clock source, you can just specify `0` for `clock_id`.
    ///
    /// Returns `None` for times before the UNIX epoch or past [`MAX_TIMESTAMP`],
    /// and for clock ids above 1023.
    pub fn from_datetime(clock_id: u16, time: chrono::DateTime<chrono::Utc>) -> Option<Self> {
        let micros = u64::try_from(time.timestamp_micros()).ok()?;
        Self::from_parts(micros, clock_id)
    }

    /// Construct a new [Tid] that represents the current time.
    ///
    /// Two calls within the same microsecond return the same value; use a
    /// [`Ticker`] when identifiers must be unique.
    pub fn now(clock_id: u16) -> Option<Self> {
        Self::from_datetime(clock_id, chrono::Utc::now())
    }

    fn value(&self) -> u64 {
        // validated at construction
        self.0
            .bytes()
            .fold(0u64, |acc, c| (acc << 5) | s32_value(c).unwrap_or(0) as u64)
    }

    /// Microseconds since the UNIX epoch.
    pub fn timestamp(&self) -> u64 {
        self.value() >> 10
    }

    /// The 10-bit clock identifier.
    pub fn clock_id(&self) -> u16 {
        (self.value() & MAX_CLOCK_ID as u64) as u16
    }

    /// The timestamp as a UTC datetime.
    pub fn datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let micros = i64::try_from(self.timestamp()).ok()?;
        chrono::DateTime::from_timestamp_micros(micros)
    }

    /// Returns the TID as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Generates strictly increasing TIDs from the wall clock.
///
/// If the clock hasn't advanced (or went backwards) since the previous call, the
/// last timestamp is bumped by one microsecond instead.
#[derive(Debug, Clone)]
pub struct Ticker {
    last: u64,
    clock_id: u16,
}

impl Ticker {
    /// New ticker for the given clock id (values above 1023 are masked to 10 bits).
    pub fn new(clock_id: u16) -> Self {
        Self {
            last: 0,
            clock_id: clock_id & MAX_CLOCK_ID,
        }
    }

    /// Next identifier, derived from `now`.
    pub fn next_at(&mut self, now: chrono::DateTime<chrono::Utc>) -> Option<Tid> {
        let micros = u64::try_from(now.timestamp_micros()).unwrap_or(0);
        let next = if micros > self.last {
            micros
        } else {
            self.last + 1
        };
        let tid = Tid::from_parts(next, self.clock_id)?;
        self.last = next;
        Some(tid)
    }

    /// Next identifier from the current wall clock.
    ///
    /// Only returns `None` once the clock passes the year 2184.
    pub fn next(&mut self) -> Option<Tid> {
        self.next_at(chrono::Utc::now())
    }
}

impl FromStr for Tid {
    type Err = AtStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for Tid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: CowStr<'_> = Deserialize::deserialize(deserializer)?;
        Self::new(&value).map_err(D::Error::custom)
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tid({})", self.0)
    }
}

impl From<Tid> for String {
    fn from(value: Tid) -> Self {
        value.0.to_string()
    }
}

impl From<Tid> for SmolStr {
    fn from(value: Tid) -> Self {
        value.0
    }
}

impl AsRef<str> for Tid {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Deref for Tid {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_tids() {
        assert!(Tid::parse("3jzfcijpj2z2a").is_some());
        assert!(Tid::parse("7777777777777").is_some());
        assert!(Tid::parse("3zzzzzzzzzzzz").is_some());
        assert!(Tid::parse("2222222222222").is_some());
        assert!(Tid::parse("7zzzzzzzzzzzz").is_some());
    }

    #[test]
    fn invalid_tids() {
        // wrong length
        assert!(Tid::parse("3jzfcijpj2z2").is_none());
        assert!(Tid::parse("3jzfcijpj2z2aa").is_none());
        assert!(Tid::parse("").is_none());
        // outside the alphabet
        assert!(Tid::parse("3jzfcijpj2z21").is_none());
        assert!(Tid::parse("3jzfcijpj2z2A").is_none());
        assert!(Tid::parse("3jzfcijpj2z-a").is_none());
        assert!(Tid::parse("3jzf cijpj2z2").is_none());
        // letters never lead
        assert!(Tid::parse("a222222222222").is_none());
        assert!(Tid::parse("j222222222222").is_none());
        assert!(Tid::parse("jzzzzzzzzzzzz").is_none());
        assert!(Tid::parse("kjzfcijpj2z2a").is_none());
        assert!(Tid::parse("zzzzzzzzzzzzz").is_none());
    }

    #[test]
    fn every_parsed_tid_formats_again() {
        for first in ["2", "5", "7"] {
            for rest in ["222222222222", "zzzzzzzzzzzz", "jzfcijpj2z2a"] {
                let source = format!("{first}{rest}");
                let tid = Tid::parse(&source).unwrap();
                assert!(tid.timestamp() <= MAX_TIMESTAMP, "{source}");
                let again = Tid::from_parts(tid.timestamp(), tid.clock_id()).unwrap();
                assert_eq!(again.as_str(), source);
            }
        }
    }

    #[test]
    fn rejection_reason() {
        let err = Tid::new("3jzfcijpj2z2").unwrap_err();
        assert!(matches!(err.kind, StrParseKind::TooShort { min: 13, actual: 12 }));

        let err = Tid::new("a222222222222").unwrap_err();
        assert!(matches!(err.kind, StrParseKind::InvalidChar { .. }));
    }

    #[test]
    fn known_encoding() {
        let tid = Tid::parse("3jzfcijpj2z2a").unwrap();
        let again = Tid::from_parts(tid.timestamp(), tid.clock_id()).unwrap();
        assert_eq!(tid, again);

        assert_eq!(Tid::from_parts(0, 0).unwrap().as_str(), "2222222222222");
        assert_eq!(Tid::from_parts(0, 1).unwrap().as_str(), "2222222222223");
        assert_eq!(
            Tid::from_parts(MAX_TIMESTAMP, MAX_CLOCK_ID).unwrap().as_str(),
            "7zzzzzzzzzzzz"
        );
        assert_eq!(
            Tid::from_parts(MAX_TIMESTAMP + 1 - (1 << 50), 0).unwrap().as_str(),
            "7222222222222"
        );
    }

    #[test]
    fn parts_round_trip() {
        let cases = [
            (0u64, 0u16),
            (1, 1),
            (1_700_000_000_000_000, 0),
            (1_713_571_012_123_456, 42),
            (MAX_TIMESTAMP, MAX_CLOCK_ID),
            (MAX_TIMESTAMP - 1, 512),
        ];
        for (ts, clk) in cases {
            let tid = Tid::from_parts(ts, clk).unwrap();
            let parsed = Tid::parse(tid.as_str()).unwrap();
            assert_eq!(parsed.timestamp(), ts);
            assert_eq!(parsed.clock_id(), clk);
        }
    }

    #[test]
    fn out_of_range_parts() {
        assert!(Tid::from_parts(MAX_TIMESTAMP + 1, 0).is_none());
        assert!(Tid::from_parts((1 << 53) - 1, 0).is_none());
        assert!(Tid::from_parts(0, MAX_CLOCK_ID + 1).is_none());
    }

    #[test]
    fn string_order_matches_timestamp_order() {
        let timestamps = [
            0u64,
            1,
            31,
            32,
            1023,
            1024,
            1 << 20,
            (1 << 20) + 1,
            1_600_000_000_000_000,
            1_700_000_000_000_000,
            1 << 52,
            MAX_TIMESTAMP,
        ];
        for clk in [0u16, 7, MAX_CLOCK_ID] {
            for pair in timestamps.windows(2) {
                let a = Tid::from_parts(pair[0], clk).unwrap();
                let b = Tid::from_parts(pair[1], clk).unwrap();
                assert!(a.as_str() < b.as_str(), "{a} !< {b}");
                assert!(a < b);
            }
        }
    }

    #[test]
    fn format_into_buffer() {
        let mut buf = [0u8; 16];
        let s = Tid::format_into(1_713_571_012_000_000, 3, &mut buf).unwrap();
        assert_eq!(s.len(), TID_LEN);
        let tid = Tid::parse(s).unwrap();
        assert_eq!(tid.timestamp(), 1_713_571_012_000_000);
        assert_eq!(tid.clock_id(), 3);

        let mut small = [0u8; 12];
        assert!(matches!(
            Tid::format_into(0, 0, &mut small),
            Err(FormatError::BufferTooSmall {
                needed: 13,
                capacity: 12
            })
        ));
        assert!(matches!(
            Tid::format_into(MAX_TIMESTAMP + 1, 0, &mut buf),
            Err(FormatError::OutOfRange(_))
        ));
    }

    #[test]
    fn datetime_round_trip() {
        let dt = chrono::DateTime::from_timestamp_micros(1_713_571_012_345_678).unwrap();
        let tid = Tid::from_datetime(5, dt).unwrap();
        assert_eq!(tid.datetime().unwrap(), dt);
        assert_eq!(tid.clock_id(), 5);

        let before_epoch = chrono::DateTime::from_timestamp_micros(-1).unwrap();
        assert!(Tid::from_datetime(0, before_epoch).is_none());
    }

    #[test]
    fn ticker_is_strictly_increasing() {
        let mut ticker = Ticker::new(9);
        let fixed = chrono::DateTime::from_timestamp_micros(1_700_000_000_000_000).unwrap();
        let a = ticker.next_at(fixed).unwrap();
        let b = ticker.next_at(fixed).unwrap();
        let earlier = chrono::DateTime::from_timestamp_micros(1_600_000_000_000_000).unwrap();
        let c = ticker.next_at(earlier).unwrap();
        assert!(a < b && b < c);
        assert_eq!(b.timestamp(), a.timestamp() + 1);
        assert_eq!(c.clock_id(), 9);
    }

    #[test]
    fn serde_validates() {
        let tid: Tid = serde_json::from_str("\"3jzfcijpj2z2a\"").unwrap();
        assert_eq!(tid.as_str(), "3jzfcijpj2z2a");
        assert!(serde_json::from_str::<Tid>("\"not-a-tid\"").is_err());
        assert_eq!(serde_json::to_string(&tid).unwrap(), "\"3jzfcijpj2z2a\"");
    }
}
