//! Durable storage for the nest: configuration, gauge and one record per
//! ring slot.
pub mod file;
pub mod memory;
#[cfg(feature = "redb")]
pub mod redb_store;

pub use file::FileSnapshot;
pub use memory::MemorySnapshot;
#[cfg(feature = "redb")]
pub use redb_store::RedbSnapshot;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CFG_FILE: &str = "bird_cfg";
pub const GAUGE_FILE: &str = "bird_gauge";
pub const FILTER_FILE_PREFIX: &str = "bird_filter_";
pub const TMP_SUFFIX: &str = ".tmp";

/// Ring index ceiling imposed by the 16-bit index in filter records.
pub const MAX_FILTER_INDEX: usize = u16::MAX as usize;

pub fn filter_file_name(index: u16) -> String {
    format!("{FILTER_FILE_PREFIX}{index:05}")
}

/// Index encoded in a filter file name, `None` for anything else.
pub fn parse_filter_file_name(name: &str) -> Option<u16> {
    let digits = name.strip_prefix(FILTER_FILE_PREFIX)?;
    if digits.len() != 5 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// `<root>/<chain_id>/birdsnest` or `<root>/<chain_id>/birdsnest<shard>`.
pub fn nest_dir(root: &Path, chain_id: &str, shard: Option<usize>) -> PathBuf {
    let leaf = match shard {
        Some(shard) => format!("birdsnest{shard}"),
        None => "birdsnest".to_string(),
    };
    root.join(chain_id).join(leaf)
}

/// Ring position at the last serialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Gauge {
    pub height: u64,
    pub current_index: u32,
}

impl Gauge {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serde::encode_to_vec(
            self,
            bincode::config::standard(),
        )?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (gauge, _) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(gauge)
    }
}

/// Everything persisted besides the configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotData {
    pub gauge: Option<Vec<u8>>,
    pub filters: BTreeMap<u16, Vec<u8>>,
}

impl SnapshotData {
    pub fn is_empty(&self) -> bool {
        self.gauge.is_none() && self.filters.is_empty()
    }
}

/// Backing store owned by exactly one nest.
///
/// `write` and `read` must not interleave: a reader sees either the gauge
/// and filter of a write or neither.
pub trait SnapshotStore: Send + Sync {
    fn read_cfg(&self) -> Result<Option<Vec<u8>>>;

    fn write_cfg(&self, cfg: &[u8]) -> Result<()>;

    fn read(&self) -> Result<SnapshotData>;

    /// Persists the gauge followed by the filter record for `index`.
    fn write(&self, gauge: &[u8], filter: &[u8], index: u16) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_file_names() {
        assert_eq!(filter_file_name(5), "bird_filter_00005");
        assert_eq!(filter_file_name(65535), "bird_filter_65535");
        assert_eq!(parse_filter_file_name("bird_filter_00005"), Some(5));
        assert_eq!(parse_filter_file_name("bird_filter_00005.tmp"), None);
        assert_eq!(parse_filter_file_name("bird_filter_99999"), None);
        assert_eq!(parse_filter_file_name("bird_gauge"), None);
    }

    #[test]
    fn test_nest_dir() {
        let root = Path::new("/data");
        assert_eq!(
            nest_dir(root, "chain1", None),
            PathBuf::from("/data/chain1/birdsnest")
        );
        assert_eq!(
            nest_dir(root, "chain1", Some(3)),
            PathBuf::from("/data/chain1/birdsnest3")
        );
    }

    #[test]
    fn test_gauge_bytes() {
        let gauge = Gauge {
            height: 1234,
            current_index: 7,
        };
        assert_eq!(Gauge::from_bytes(&gauge.to_bytes().unwrap()).unwrap(), gauge);
        assert!(Gauge::from_bytes(&[]).is_err());
    }
}
