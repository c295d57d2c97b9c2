//! Key space split over several independent nests.
use crate::error::{BirdsNestError, Result};
use crate::hash::shard_for;
use crate::key::TimestampKey;
use crate::nest::{BirdsNest, BirdsNestConfig, NestInfo, TxFilter};
use crate::rules::RuleType;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(pattern = "owned")]
pub struct ShardingBirdsNestConfig {
    #[builder(default = "4")]
    pub shards: usize,

    /// Configuration shared by every shard
    #[builder(default)]
    pub birds_nest: BirdsNestConfig,
}

impl Default for ShardingBirdsNestConfig {
    fn default() -> Self {
        Self {
            shards: 4,
            birds_nest: BirdsNestConfig::default(),
        }
    }
}

impl ShardingBirdsNestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.shards == 0 {
            return Err(BirdsNestError::InvalidConfig(
                "shards must be greater than 0".to_string(),
            ));
        }
        self.birds_nest.validate()
    }
}

pub struct ShardedBirdsNest {
    shards: Vec<Arc<BirdsNest>>,
}

impl ShardedBirdsNest {
    /// Opens one file-backed nest per shard under `birdsnest<i>`.
    pub fn open(config: ShardingBirdsNestConfig) -> Result<Self> {
        config.validate()?;
        let shards = (0..config.shards)
            .map(|i| {
                BirdsNest::builder(config.birds_nest.clone())
                    .shard(i)
                    .open()
            })
            .collect::<Result<Vec<_>>>()?;
        info!(
            "sharded birds nest {} opened with {} shards",
            config.birds_nest.chain_id, config.shards
        );
        Self::from_shards(shards)
    }

    /// Wraps nests built elsewhere; routing follows their order.
    pub fn from_shards(shards: Vec<BirdsNest>) -> Result<Self> {
        if shards.is_empty() {
            return Err(BirdsNestError::InvalidConfig(
                "sharded nest needs at least one shard".to_string(),
            ));
        }
        Ok(Self {
            shards: shards.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn shard(&self, index: usize) -> Option<&Arc<BirdsNest>> {
        self.shards.get(index)
    }

    pub fn shard_of(&self, key: &TimestampKey) -> usize {
        shard_for(key.key(), self.shards.len())
    }

    pub fn start(&self) -> Result<()> {
        for shard in &self.shards {
            shard.start()?;
        }
        Ok(())
    }

    /// Shuts every shard down, returning the first error after trying all.
    pub async fn shutdown(&self) -> Result<()> {
        let mut first_error = None;
        for shard in &self.shards {
            if let Err(e) = shard.shutdown().await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn shard_infos(&self) -> Result<Vec<NestInfo>> {
        self.shards.iter().map(|shard| shard.info()).collect()
    }

    fn owner(&self, key: &TimestampKey) -> &BirdsNest {
        &self.shards[self.shard_of(key)]
    }
}

impl TxFilter for ShardedBirdsNest {
    fn height(&self) -> u64 {
        self.shards
            .iter()
            .map(|shard| shard.height())
            .min()
            .unwrap_or_default()
    }

    fn set_height(&self, height: u64) {
        for shard in &self.shards {
            shard.set_height(height);
        }
    }

    fn add(&self, key: &TimestampKey) -> Result<()> {
        if key.is_empty() {
            return Err(BirdsNestError::EmptyKey);
        }
        self.owner(key).add(key)
    }

    /// Keys are grouped by shard and each group is added on its own thread.
    fn adds(&self, keys: &[TimestampKey]) -> Result<()> {
        let mut groups: Vec<Vec<&TimestampKey>> = vec![Vec::new(); self.shards.len()];
        for key in keys {
            if key.is_empty() {
                return Err(BirdsNestError::EmptyKey);
            }
            groups[self.shard_of(key)].push(key);
        }

        std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .shards
                .iter()
                .zip(groups)
                .filter(|(_, group)| !group.is_empty())
                .map(|(shard, group)| {
                    scope.spawn(move || {
                        group.into_iter().try_for_each(|key| shard.add(key))
                    })
                })
                .collect();

            handles.into_iter().try_for_each(|handle| {
                handle.join().map_err(|_| {
                    BirdsNestError::LockError("shard add thread panicked".to_string())
                })?
            })
        })
    }

    fn contains(&self, key: &TimestampKey, rules: &[RuleType]) -> Result<bool> {
        if key.is_empty() {
            return Err(BirdsNestError::EmptyKey);
        }
        self.owner(key).contains(key, rules)
    }

    fn validate_rule(&self, key: &TimestampKey, rules: &[RuleType]) -> Result<()> {
        if key.is_empty() {
            return Err(BirdsNestError::EmptyKey);
        }
        self.owner(key).validate_rule(key, rules)
    }

    /// Keys and bytes summed over shards; height is the lowest shard
    /// height, the rest comes from shard 0.
    fn info(&self) -> Result<NestInfo> {
        let infos = self.shard_infos()?;
        let first = infos[0];
        Ok(NestInfo {
            height: infos.iter().map(|i| i.height).min().unwrap_or_default(),
            length: first.length,
            current_index: first.current_index,
            total_keys: infos.iter().map(|i| i.total_keys).sum(),
            total_bytes: infos.iter().map(|i| i.total_bytes).sum(),
        })
    }
}
