//! Timestamp transaction keys.
//!
//! Layout (32 bytes):
//!
//! | offset | size | content                              |
//! |--------|------|--------------------------------------|
//! | 0      | 8    | creation time, nanoseconds, big endian |
//! | 8      | 1    | [`TIMESTAMP_KEY_SEPARATOR`]          |
//! | 9      | 7    | random salt                          |
//! | 16     | 16   | uuid v4                              |
//!
//! Transaction ids travel as the hex encoding of these bytes.

use crate::common::now_nanos;
use crate::error::{BirdsNestError, Result};
use rand::RngCore;
use std::fmt;

/// Sentinel byte marking a key as a timestamp key.
pub const TIMESTAMP_KEY_SEPARATOR: u8 = 0xCA;

pub const TIMESTAMP_LEN: usize = 8;
const SALT_LEN: usize = 7;
const UUID_LEN: usize = 16;
pub const TIMESTAMP_KEY_LEN: usize = TIMESTAMP_LEN + 1 + SALT_LEN + UUID_LEN;

/// Byte encoded transaction identifier embedding its creation time.
///
/// Bytes are kept as given; [`TimestampKey::parse`] and
/// [`TimestampKey::nano`] perform the validation. Keys built through
/// [`TimestampKey::generate`], [`TimestampKey::with_nano`] or
/// [`TimestampKey::from_tx_id`] are always well formed.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TimestampKey(Vec<u8>);

impl TimestampKey {
    /// Fresh key stamped with the current time.
    pub fn generate() -> Result<Self> {
        Self::with_nano(now_nanos()?)
    }

    /// Fresh key stamped with `nano`. Negative stamps are rejected.
    pub fn with_nano(nano: i64) -> Result<Self> {
        if nano < 0 {
            return Err(BirdsNestError::TimestampKeyInvalid);
        }
        let mut bytes = Vec::with_capacity(TIMESTAMP_KEY_LEN);
        bytes.extend_from_slice(&nano.to_be_bytes());
        bytes.push(TIMESTAMP_KEY_SEPARATOR);
        let mut salt = [0u8; SALT_LEN];
        rand::rng().fill_bytes(&mut salt);
        bytes.extend_from_slice(&salt);
        bytes.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
        Ok(Self(bytes))
    }

    /// Wraps raw bytes without validating them.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Decodes a hex transaction id and validates the timestamp layout.
    pub fn from_tx_id(tx_id: &str) -> Result<Self> {
        let key = Self(hex::decode(tx_id)?);
        key.parse()?;
        Ok(key)
    }

    /// Hex transaction id of this key.
    pub fn to_tx_id(&self) -> String {
        hex::encode(&self.0)
    }

    /// Raw bytes, used as the cuckoo lookup key.
    pub fn key(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Splits the key into `[timestamp, remainder]`.
    pub fn parse(&self) -> Result<[&[u8]; 2]> {
        if self.0.is_empty() {
            return Err(BirdsNestError::KeyLengthZero);
        }
        if self.0.len() <= TIMESTAMP_LEN
            || self.0[TIMESTAMP_LEN] != TIMESTAMP_KEY_SEPARATOR
        {
            return Err(BirdsNestError::NotTimestampKey);
        }
        let (timestamp, remainder) = self.0.split_at(TIMESTAMP_LEN);
        if decode_nano(timestamp) < 0 {
            return Err(BirdsNestError::TimestampKeyInvalid);
        }
        Ok([timestamp, remainder])
    }

    /// Embedded creation time in nanoseconds.
    pub fn nano(&self) -> Result<i64> {
        let [timestamp, _] = self.parse()?;
        Ok(decode_nano(timestamp))
    }
}

fn decode_nano(timestamp: &[u8]) -> i64 {
    let mut buf = [0u8; TIMESTAMP_LEN];
    buf.copy_from_slice(&timestamp[..TIMESTAMP_LEN]);
    i64::from_be_bytes(buf)
}

impl fmt::Debug for TimestampKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TimestampKey").field(&self.to_tx_id()).finish()
    }
}

impl fmt::Display for TimestampKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_tx_id())
    }
}

impl AsRef<[u8]> for TimestampKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_key_layout() {
        let key = TimestampKey::with_nano(1_700_000_000_000_000_000).unwrap();
        assert_eq!(key.len(), TIMESTAMP_KEY_LEN);
        assert_eq!(key.key()[8], TIMESTAMP_KEY_SEPARATOR);
        assert_eq!(key.nano().unwrap(), 1_700_000_000_000_000_000);

        let [timestamp, remainder] = key.parse().unwrap();
        assert_eq!(timestamp.len(), 8);
        assert_eq!(remainder.len(), 24);
    }

    #[test]
    fn test_generated_keys_are_distinct() {
        let a = TimestampKey::with_nano(42).unwrap();
        let b = TimestampKey::with_nano(42).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.nano().unwrap(), b.nano().unwrap());
    }

    #[test]
    fn test_tx_id_round_trip() {
        let key = TimestampKey::generate().unwrap();
        let tx_id = key.to_tx_id();
        assert_eq!(tx_id.len(), 64);
        assert_eq!(TimestampKey::from_tx_id(&tx_id).unwrap(), key);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            TimestampKey::from_bytes(Vec::new()).parse(),
            Err(BirdsNestError::KeyLengthZero)
        ));

        let mut bytes = TimestampKey::with_nano(1).unwrap().key().to_vec();
        bytes[8] = 0;
        assert!(matches!(
            TimestampKey::from_bytes(bytes).parse(),
            Err(BirdsNestError::NotTimestampKey)
        ));

        assert!(matches!(
            TimestampKey::from_bytes(vec![0u8; 8]).parse(),
            Err(BirdsNestError::NotTimestampKey)
        ));

        let mut bytes = TimestampKey::with_nano(1).unwrap().key().to_vec();
        bytes[..8].copy_from_slice(&(-5i64).to_be_bytes());
        assert!(matches!(
            TimestampKey::from_bytes(bytes).nano(),
            Err(BirdsNestError::TimestampKeyInvalid)
        ));
    }

    #[test]
    fn test_from_tx_id_rejects_bad_input() {
        assert!(matches!(
            TimestampKey::from_tx_id("zz"),
            Err(BirdsNestError::InvalidHex(_))
        ));
        // valid hex, no separator
        assert!(matches!(
            TimestampKey::from_tx_id(&"00".repeat(32)),
            Err(BirdsNestError::NotTimestampKey)
        ));
        assert!(matches!(
            TimestampKey::with_nano(-1),
            Err(BirdsNestError::TimestampKeyInvalid)
        ));
    }
}
