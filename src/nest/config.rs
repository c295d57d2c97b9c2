use crate::cuckoo::CuckooConfig;
use crate::error::{BirdsNestError, Result};
use crate::rules::RulesConfig;
use crate::snapshot::{MAX_FILTER_INDEX, nest_dir};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What triggers a background serialize of the active filter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SerializeIntervalType {
    /// Every `block_height` blocks
    #[default]
    Height,
    /// Every `timed` seconds
    Timed,
    /// Only when the nest shuts down
    Exit,
}

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(pattern = "owned")]
pub struct SnapshotSerializerConfig {
    #[builder(default)]
    pub serialize_type: SerializeIntervalType,

    /// Block interval for `Height`
    #[builder(default = "10")]
    pub block_height: u64,

    /// Seconds between serializes for `Timed`
    #[builder(default = "10")]
    pub timed: u64,

    /// Store root; the nest lives under `<path>/<chain_id>/birdsnest`
    #[builder(default = "PathBuf::from(\"data\")", setter(into))]
    pub path: PathBuf,
}

impl Default for SnapshotSerializerConfig {
    fn default() -> Self {
        Self {
            serialize_type: SerializeIntervalType::Height,
            block_height: 10,
            timed: 10,
            path: PathBuf::from("data"),
        }
    }
}

impl SnapshotSerializerConfig {
    pub fn validate(&self) -> Result<()> {
        match self.serialize_type {
            SerializeIntervalType::Height if self.block_height == 0 => {
                Err(BirdsNestError::InvalidConfig(
                    "block_height must be greater than 0".to_string(),
                ))
            }
            SerializeIntervalType::Timed if self.timed == 0 => {
                Err(BirdsNestError::InvalidConfig(
                    "timed must be greater than 0".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(pattern = "owned")]
pub struct BirdsNestConfig {
    #[builder(default = "\"chain1\".to_string()", setter(into))]
    pub chain_id: String,

    /// Ring size N; the nest keeps N + 1 filters
    #[builder(default = "10")]
    pub length: u32,

    #[builder(default)]
    pub rules: RulesConfig,

    #[builder(default)]
    pub cuckoo: CuckooConfig,

    #[builder(default)]
    pub snapshot: SnapshotSerializerConfig,
}

impl Default for BirdsNestConfig {
    fn default() -> Self {
        Self {
            chain_id: "chain1".to_string(),
            length: 10,
            rules: RulesConfig::default(),
            cuckoo: CuckooConfig::default(),
            snapshot: SnapshotSerializerConfig::default(),
        }
    }
}

impl BirdsNestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.length == 0 {
            return Err(BirdsNestError::ZeroLength);
        }
        if self.length as usize > MAX_FILTER_INDEX {
            return Err(BirdsNestError::InvalidConfig(format!(
                "length {} exceeds {MAX_FILTER_INDEX}",
                self.length
            )));
        }
        self.cuckoo.validate()?;
        self.snapshot.validate()
    }

    /// Number of filters in the ring.
    pub fn slots(&self) -> usize {
        self.length as usize + 1
    }

    pub fn snapshot_dir(&self, shard: Option<usize>) -> PathBuf {
        nest_dir(&self.snapshot.path, &self.chain_id, shard)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BirdsNestConfigBuilder::default().build().unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config, BirdsNestConfig::default());
        assert_eq!(config.slots(), 11);
    }

    #[test]
    fn test_zero_length_rejected() {
        let config = BirdsNestConfigBuilder::default().length(0).build().unwrap();
        assert!(matches!(config.validate(), Err(BirdsNestError::ZeroLength)));
    }

    #[test]
    fn test_length_ceiling() {
        let config = BirdsNestConfigBuilder::default()
            .length(MAX_FILTER_INDEX as u32)
            .build()
            .unwrap();
        assert!(config.validate().is_ok());

        let config = BirdsNestConfigBuilder::default()
            .length(MAX_FILTER_INDEX as u32 + 1)
            .build()
            .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_interval_validation() {
        let snapshot = SnapshotSerializerConfigBuilder::default()
            .serialize_type(SerializeIntervalType::Timed)
            .timed(0u64)
            .build()
            .unwrap();
        assert!(snapshot.validate().is_err());

        let snapshot = SnapshotSerializerConfigBuilder::default()
            .serialize_type(SerializeIntervalType::Exit)
            .block_height(0u64)
            .build()
            .unwrap();
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn test_json_round_trip() {
        let config = BirdsNestConfigBuilder::default()
            .chain_id("chain42")
            .length(3)
            .build()
            .unwrap();
        let bytes = config.to_bytes().unwrap();
        assert_eq!(BirdsNestConfig::from_bytes(&bytes).unwrap(), config);

        let json = String::from_utf8(bytes).unwrap();
        assert!(json.contains("\"serialize_type\":\"height\""));
    }

    #[test]
    fn test_snapshot_dir() {
        let config = BirdsNestConfigBuilder::default()
            .chain_id("c1")
            .snapshot(
                SnapshotSerializerConfigBuilder::default()
                    .path("/store")
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();
        assert_eq!(config.snapshot_dir(None), PathBuf::from("/store/c1/birdsnest"));
        assert_eq!(
            config.snapshot_dir(Some(2)),
            PathBuf::from("/store/c1/birdsnest2")
        );
    }
}
