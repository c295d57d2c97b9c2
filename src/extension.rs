//! Per-filter metadata tracked next to the cuckoo tags.
//!
//! The timestamp extension remembers the oldest and newest key stamp a
//! filter has seen. Once the filter is sealed, lookups for keys outside
//! that window skip the table entirely.

use crate::cuckoo::KeyType;
use crate::error::{BirdsNestError, Result};
use crate::key::TimestampKey;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

const TAG_LEN: usize = 8;
const TIMESTAMP_EXTENSION_LEN: usize = TAG_LEN + 8 + 8;

pub trait FilterExtension: Send + Sync + fmt::Debug {
    fn key_type(&self) -> KeyType;

    /// Whether `key` may be held by the filter. `false` means the key is
    /// outside what the filter tracked and the lookup can stop there.
    fn validate(&self, key: &TimestampKey, full: bool) -> Result<bool>;

    /// Records a key that was just inserted.
    fn store(&self, key: &TimestampKey) -> Result<()>;

    /// Type tag (8 bytes, big endian) followed by the variant's state.
    fn serialize(&self) -> Vec<u8>;
}

#[derive(Debug, Default)]
pub struct DefaultExtension;

impl FilterExtension for DefaultExtension {
    fn key_type(&self) -> KeyType {
        KeyType::Default
    }

    fn validate(&self, _key: &TimestampKey, _full: bool) -> Result<bool> {
        Ok(true)
    }

    fn store(&self, _key: &TimestampKey) -> Result<()> {
        Ok(())
    }

    fn serialize(&self) -> Vec<u8> {
        KeyType::Default.tag().to_be_bytes().to_vec()
    }
}

impl DefaultExtension {
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < TAG_LEN {
            return Err(BirdsNestError::InvalidExtension(format!(
                "default extension needs {TAG_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        check_tag(bytes, KeyType::Default)?;
        Ok(Self)
    }
}

/// Tracks `[first, last]` of the key stamps stored. Zero means unset.
#[derive(Debug, Default)]
pub struct TimestampExtension {
    first: AtomicI64,
    last: AtomicI64,
}

impl TimestampExtension {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn first(&self) -> i64 {
        self.first.load(Ordering::Acquire)
    }

    pub fn last(&self) -> i64 {
        self.last.load(Ordering::Acquire)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != TIMESTAMP_EXTENSION_LEN {
            return Err(BirdsNestError::InvalidExtension(format!(
                "timestamp extension needs {TIMESTAMP_EXTENSION_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        check_tag(bytes, KeyType::Timestamp)?;
        Ok(Self {
            first: AtomicI64::new(read_i64(&bytes[8..16])),
            last: AtomicI64::new(read_i64(&bytes[16..24])),
        })
    }
}

impl FilterExtension for TimestampExtension {
    fn key_type(&self) -> KeyType {
        KeyType::Timestamp
    }

    fn validate(&self, key: &TimestampKey, full: bool) -> Result<bool> {
        if !full {
            return Ok(true);
        }
        let first = self.first();
        if first == 0 {
            return Ok(true);
        }
        let nano = key.nano()?;
        Ok(nano >= first && nano <= self.last())
    }

    fn store(&self, key: &TimestampKey) -> Result<()> {
        let nano = key.nano()?;
        // fetch_update only fails when the closure declines to update
        let _ = self.first.fetch_update(
            Ordering::AcqRel,
            Ordering::Acquire,
            |first| (first == 0 || nano < first).then_some(nano),
        );
        self.last.fetch_max(nano, Ordering::AcqRel);
        Ok(())
    }

    fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(TIMESTAMP_EXTENSION_LEN);
        bytes.extend_from_slice(&KeyType::Timestamp.tag().to_be_bytes());
        bytes.extend_from_slice(&self.first().to_be_bytes());
        bytes.extend_from_slice(&self.last().to_be_bytes());
        bytes
    }
}

fn read_i64(bytes: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    i64::from_be_bytes(buf)
}

fn check_tag(bytes: &[u8], expected: KeyType) -> Result<()> {
    let mut buf = [0u8; TAG_LEN];
    buf.copy_from_slice(&bytes[..TAG_LEN]);
    let actual = u64::from_be_bytes(buf);
    if actual != expected.tag() {
        return Err(BirdsNestError::ExtensionMismatch {
            expected: expected.tag(),
            actual,
        });
    }
    Ok(())
}

pub type ExtensionBuilder = fn() -> Box<dyn FilterExtension>;
pub type ExtensionDecoder = fn(&[u8]) -> Result<Box<dyn FilterExtension>>;

/// Constructors for each [`KeyType`], handed to the nest at construction.
#[derive(Clone)]
pub struct ExtensionRegistry {
    entries: HashMap<KeyType, (ExtensionBuilder, ExtensionDecoder)>,
}

impl ExtensionRegistry {
    /// Registry without any entry.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        key_type: KeyType,
        build: ExtensionBuilder,
        decode: ExtensionDecoder,
    ) -> &mut Self {
        self.entries.insert(key_type, (build, decode));
        self
    }

    pub fn build(&self, key_type: KeyType) -> Result<Box<dyn FilterExtension>> {
        let (build, _) = self.entry(key_type)?;
        Ok(build())
    }

    pub fn decode(
        &self,
        key_type: KeyType,
        bytes: &[u8],
    ) -> Result<Box<dyn FilterExtension>> {
        let (_, decode) = self.entry(key_type)?;
        decode(bytes)
    }

    fn entry(
        &self,
        key_type: KeyType,
    ) -> Result<&(ExtensionBuilder, ExtensionDecoder)> {
        self.entries.get(&key_type).ok_or_else(|| {
            BirdsNestError::InvalidExtension(format!(
                "no extension registered for {key_type:?}"
            ))
        })
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(
                KeyType::Default,
                || Box::new(DefaultExtension),
                |bytes| Ok(Box::new(DefaultExtension::deserialize(bytes)?)),
            )
            .register(
                KeyType::Timestamp,
                || Box::new(TimestampExtension::new()),
                |bytes| Ok(Box::new(TimestampExtension::deserialize(bytes)?)),
            );
        registry
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}
