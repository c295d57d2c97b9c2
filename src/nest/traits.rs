use crate::common::bytes2hr;
use crate::error::Result;
use crate::key::TimestampKey;
use crate::rules::RuleType;
use serde::Serialize;
use std::fmt;

/// Duplicate transaction filter as seen by the block pipeline
pub trait TxFilter: Send + Sync {
    /// Last block height reported through `set_height`
    fn height(&self) -> u64;

    fn set_height(&self, height: u64);

    fn add(&self, key: &TimestampKey) -> Result<()>;

    /// Adds keys one by one, stopping at the first error. Keys added
    /// before the error stay added.
    fn adds(&self, keys: &[TimestampKey]) -> Result<()>;

    fn adds_and_set_height(&self, keys: &[TimestampKey], height: u64) -> Result<()> {
        self.adds(keys)?;
        self.set_height(height);
        Ok(())
    }

    /// Checks `rules` first, then every filter of the ring
    fn contains(&self, key: &TimestampKey, rules: &[RuleType]) -> Result<bool>;

    fn validate_rule(&self, key: &TimestampKey, rules: &[RuleType]) -> Result<()>;

    fn info(&self) -> Result<NestInfo>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NestInfo {
    pub height: u64,
    /// Configured ring size N (N + 1 filters)
    pub length: u32,
    pub current_index: usize,
    pub total_keys: usize,
    pub total_bytes: usize,
}

impl NestInfo {
    /// `[height, length, current_index, total_keys, total_bytes]`
    pub fn to_array(&self) -> [u64; 5] {
        [
            self.height,
            self.length as u64,
            self.current_index as u64,
            self.total_keys as u64,
            self.total_bytes as u64,
        ]
    }
}

impl fmt::Display for NestInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "height: {}, length: {}, current index: {}, keys: {}, size: {}",
            self.height,
            self.length,
            self.current_index,
            self.total_keys,
            bytes2hr(self.total_bytes)
        )
    }
}
