use super::{CuckooConfig, CuckooTable};
use crate::error::Result;
use crate::extension::{ExtensionRegistry, FilterExtension};
use crate::key::TimestampKey;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Persisted form of one ring slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRecord {
    pub cuckoo: Vec<u8>,
    pub extension: Vec<u8>,
    pub config: Vec<u8>,
}

impl FilterRecord {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serde::encode_to_vec(
            self,
            bincode::config::standard(),
        )?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (record, _) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(record)
    }
}

/// One ring slot: a cuckoo table, its extension and a sticky full flag.
///
/// Once `full` is set every `add` reports "not added" until the filter is
/// replaced by the rotation strategy.
#[derive(Debug)]
pub struct CuckooFilter {
    table: CuckooTable,
    full: AtomicBool,
    extension: Box<dyn FilterExtension>,
    config: CuckooConfig,
}

impl CuckooFilter {
    pub fn new(
        config: CuckooConfig,
        extension: Box<dyn FilterExtension>,
    ) -> Result<Self> {
        config.validate()?;
        let table = CuckooTable::new(
            config.table_capacity(),
            config.tags_per_bucket,
            config.bits_per_item,
        )?;
        Ok(Self {
            table,
            full: AtomicBool::new(false),
            extension,
            config,
        })
    }

    /// Inserts `key`. `Ok(false)` is the full signal, not an error.
    pub fn add(&mut self, key: &TimestampKey) -> Result<bool> {
        if self.is_full() {
            return Ok(false);
        }
        if !self.table.add(key.key()) {
            self.full.store(true, Ordering::Release);
            return Ok(false);
        }
        if self.table.len() >= self.config.max_num_keys as usize {
            self.full.store(true, Ordering::Release);
        }
        self.extension.store(key)?;
        Ok(true)
    }

    /// Membership test. May report false positives, never false negatives
    /// for keys that were added.
    pub fn contains(&self, key: &TimestampKey) -> Result<bool> {
        if !self.extension.validate(key, self.is_full())? {
            return Ok(false);
        }
        Ok(self.table.contains(key.key()))
    }

    pub fn is_full(&self) -> bool {
        self.full.load(Ordering::Acquire)
    }

    /// Keys currently stored.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.table.size_in_bytes()
    }

    pub fn config(&self) -> &CuckooConfig {
        &self.config
    }

    pub fn extension(&self) -> &dyn FilterExtension {
        self.extension.as_ref()
    }

    pub fn encode(&self) -> Result<FilterRecord> {
        Ok(FilterRecord {
            cuckoo: self.table.encode()?,
            extension: self.extension.serialize(),
            config: self.config.to_bytes()?,
        })
    }

    /// Rebuilds a filter from [`FilterRecord::to_bytes`] output.
    ///
    /// The full flag is not stored; it is recomputed from the table.
    pub fn decode(bytes: &[u8], extensions: &ExtensionRegistry) -> Result<Self> {
        let record = FilterRecord::from_bytes(bytes)?;
        let config = CuckooConfig::from_bytes(&record.config)?;
        config.validate()?;
        let table = CuckooTable::decode(&record.cuckoo)?;
        let extension = extensions.decode(config.key_type, &record.extension)?;
        let full = table.is_saturated()
            || table.len() >= config.max_num_keys as usize;

        Ok(Self {
            table,
            full: AtomicBool::new(full),
            extension,
            config,
        })
    }
}
