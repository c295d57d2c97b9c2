use crate::error::{BirdsNestError, Result};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Which extension a filter tracks alongside its tags.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    #[default]
    Default,
    Timestamp,
}

impl KeyType {
    /// Tag written in front of the serialized extension.
    pub fn tag(self) -> u64 {
        match self {
            KeyType::Default => 0,
            KeyType::Timestamp => 1,
        }
    }

    pub fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            0 => Some(KeyType::Default),
            1 => Some(KeyType::Timestamp),
            _ => None,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    /// Plain bucket table, tags packed at `bits_per_item` bits.
    #[default]
    Single,
}

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(pattern = "owned")]
pub struct CuckooConfig {
    #[builder(default = "KeyType::Timestamp")]
    pub key_type: KeyType,

    #[builder(default = "4")]
    pub tags_per_bucket: u32,

    #[builder(default = "16")]
    pub bits_per_item: u32,

    /// Keys accepted before the filter declares itself full
    #[builder(default = "1_000_000")]
    pub max_num_keys: u32,

    #[builder(default)]
    pub table_type: TableType,
}

impl Default for CuckooConfig {
    fn default() -> Self {
        Self {
            key_type: KeyType::Timestamp,
            tags_per_bucket: 4,
            bits_per_item: 16,
            max_num_keys: 1_000_000,
            table_type: TableType::Single,
        }
    }
}

impl CuckooConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tags_per_bucket == 0 {
            return Err(BirdsNestError::InvalidConfig(
                "tags_per_bucket must be greater than 0".to_string(),
            ));
        }
        if self.bits_per_item == 0 || self.bits_per_item > 32 {
            return Err(BirdsNestError::InvalidConfig(format!(
                "bits_per_item must be in [1, 32], got {}",
                self.bits_per_item
            )));
        }
        if self.max_num_keys == 0 {
            return Err(BirdsNestError::InvalidConfig(
                "max_num_keys must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Slot capacity the underlying table is sized for.
    pub fn table_capacity(&self) -> u64 {
        approximate_max_num_keys(self.max_num_keys as u64, self.tags_per_bucket)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Achievable load factor for a bucket size.
pub fn load_factor(tags_per_bucket: u32) -> f64 {
    match tags_per_bucket {
        2 => 0.84,
        4 => 0.95,
        8 => 0.98,
        _ => 0.98,
    }
}

/// Capacity to build the underlying table with so that `max_num_keys`
/// fit with a 25% margin.
///
/// `target = max_num_keys * 1.25 / lf`; the result is `p * lf` (rounded)
/// for the smallest power of two `p` with `p * lf > target`.
pub fn approximate_max_num_keys(max_num_keys: u64, tags_per_bucket: u32) -> u64 {
    let lf = load_factor(tags_per_bucket);
    let target = max_num_keys as f64 * 1.25 / lf;
    let mut p: u64 = 1;
    while (p as f64) * lf <= target {
        p <<= 1;
    }
    ((p as f64) * lf).round() as u64
}
