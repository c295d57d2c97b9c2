//! Cuckoo filter wrapper used as one slot of the nest ring
pub mod config;
pub mod filter;
pub mod table;

pub use config::{
    CuckooConfig, CuckooConfigBuilder, CuckooConfigBuilderError, KeyType,
    TableType, approximate_max_num_keys, load_factor,
};
pub use filter::{CuckooFilter, FilterRecord};
pub use table::CuckooTable;
