//! Duplicate transaction filter built from a rotating ring of cuckoo filters.
//!
//! HowTo:
//!    * Ring: the nest keeps N + 1 cuckoo filters. Exactly one of them, the
//!      current filter, takes writes.
//!    * Keys: transaction ids embed their creation time in nanoseconds, so
//!      every filter can remember the time range of what it holds.
//!
//! Insertion:
//!     * A key goes into the current filter.
//!     * Once that filter is full the rotation strategy picks the next slot,
//!       clears it and makes it current. The old oldest generation is gone.
//!
//! Query:
//!     * Rules run first; a key older than the expiry window is rejected
//!       outright.
//!     * Every filter is then consulted. A full filter whose time range does
//!       not cover the key is skipped without touching its table.
//!
//! Persistence:
//!     * The configuration, a gauge (height, current index) and one record
//!       per filter are written to a snapshot store, each file replaced
//!       atomically through a temporary and a rename.
//!     * Background tasks serialize every few blocks, on a timer, or only at
//!       shutdown, and flush filters as soon as they are sealed by rotation.
//!
//! Obvious problems:
//!     * False positives: a fresh key may be reported as a duplicate with a
//!       probability set by `bits_per_item`.
//!     * Keys older than the ring's capacity are forgotten; the expiry rule
//!       is what keeps them out.
pub mod common;
pub mod cuckoo;
mod error;
pub mod extension;
mod hash;
pub mod key;
pub mod nest;
pub mod ring;
pub mod rules;
pub mod sharding;
pub mod snapshot;
pub mod strategy;

pub use cuckoo::{
    CuckooConfig, CuckooConfigBuilder, CuckooConfigBuilderError, CuckooFilter,
    KeyType, TableType, approximate_max_num_keys,
};
pub use error::{BirdsNestError, Result};
pub use extension::{
    DefaultExtension, ExtensionRegistry, FilterExtension, TimestampExtension,
};
pub use hash::{key_hash64, shard_for};
pub use key::TimestampKey;
pub use nest::{
    BirdsNest, BirdsNestBuilder, BirdsNestConfig, BirdsNestConfigBuilder,
    BirdsNestConfigBuilderError, NestInfo, SerializeIntervalType,
    SerializeSignal, SnapshotSerializerConfig, SnapshotSerializerConfigBuilder,
    TxFilter,
};
pub use ring::{FilterFactory, FilterRing};
pub use rules::{
    AbsoluteExpireTimeRule, Rule, RuleType, Rules, RulesConfig,
    RulesConfigBuilder,
};
pub use sharding::{
    ShardedBirdsNest, ShardingBirdsNestConfig, ShardingBirdsNestConfigBuilder,
};
#[cfg(feature = "redb")]
pub use snapshot::RedbSnapshot;
pub use snapshot::{FileSnapshot, Gauge, MemorySnapshot, SnapshotStore};
pub use strategy::{LruStrategy, RotationStrategy};
