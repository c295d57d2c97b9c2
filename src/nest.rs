//! The birds nest: a ring of cuckoo filters rejecting replayed transactions
pub mod birds_nest;
pub mod config;
mod monitor;
pub mod traits;

pub use birds_nest::{BirdsNest, BirdsNestBuilder};
pub use config::{
    BirdsNestConfig, BirdsNestConfigBuilder, BirdsNestConfigBuilderError,
    SerializeIntervalType, SnapshotSerializerConfig,
    SnapshotSerializerConfigBuilder, SnapshotSerializerConfigBuilderError,
};
pub use monitor::SerializeSignal;
pub use traits::{NestInfo, TxFilter};
