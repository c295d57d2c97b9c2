use birds_nest::{
    BirdsNestConfig, BirdsNestConfigBuilder, CuckooConfigBuilder, KeyType,
    SerializeIntervalType, SnapshotSerializerConfigBuilder, TimestampKey,
};
use std::{fs, path::PathBuf};

/// Scratch snapshot root that is removed when the test ends
pub struct TestDir {
    path: PathBuf,
}

impl TestDir {
    /// Create a new scratch directory with a name based on the test name
    pub fn new(test_name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "birdsnest_test_{}_{}",
            test_name,
            rand::random::<u32>()
        ));
        Self { path }
    }

    #[allow(dead_code)]
    pub fn path(&self) -> PathBuf {
        self.path.clone()
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        if self.path.exists() {
            let _ = fs::remove_dir_all(&self.path);
        }
    }
}

/// Nest config rooted at `root` with small timestamp filters
#[allow(dead_code)]
pub fn nest_config(
    root: PathBuf,
    length: u32,
    max_num_keys: u32,
    serialize_type: SerializeIntervalType,
) -> BirdsNestConfig {
    BirdsNestConfigBuilder::default()
        .chain_id("test_chain")
        .length(length)
        .cuckoo(
            CuckooConfigBuilder::default()
                .key_type(KeyType::Timestamp)
                .max_num_keys(max_num_keys)
                .build()
                .expect("Failed to build cuckoo config"),
        )
        .snapshot(
            SnapshotSerializerConfigBuilder::default()
                .serialize_type(serialize_type)
                .block_height(2u64)
                .timed(1u64)
                .path(root)
                .build()
                .expect("Failed to build snapshot config"),
        )
        .build()
        .expect("Failed to build nest config")
}

/// `count` distinct keys with increasing stamps starting at `first_nano`
#[allow(dead_code)]
pub fn keys(first_nano: i64, count: usize) -> Vec<TimestampKey> {
    (0..count)
        .map(|i| {
            TimestampKey::with_nano(first_nano + i as i64)
                .expect("Failed to build key")
        })
        .collect()
}
