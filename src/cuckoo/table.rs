use crate::error::{BirdsNestError, Result};
use crate::hash::{alt_index, index_and_tag};
use bitvec::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Relocations tried before an item is parked in the victim slot.
const MAX_KICKS: usize = 500;

/// Load above which the bucket count is doubled.
const MAX_BUCKET_LOAD: f64 = 0.96;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Victim {
    index: u64,
    tag: u32,
}

/// On-disk form of a [`CuckooTable`].
#[derive(Serialize, Deserialize)]
struct TableState {
    num_buckets: u64,
    tags_per_bucket: u32,
    bits_per_item: u32,
    num_items: u64,
    victim: Option<Victim>,
    bits: Vec<u8>,
}

/// Bucketed cuckoo hash table of fixed-width tags.
///
/// Tags are packed back to back in a bit vector, `tags_per_bucket` per
/// bucket. When relocation gives up the homeless tag is kept in a single
/// victim slot and the insert still succeeds; any insert after that fails.
#[derive(Debug, Clone)]
pub struct CuckooTable {
    num_buckets: usize,
    tags_per_bucket: usize,
    bits_per_item: usize,
    bits: BitVec<u8, Lsb0>,
    num_items: usize,
    victim: Option<Victim>,
}

impl CuckooTable {
    pub fn new(
        capacity: u64,
        tags_per_bucket: u32,
        bits_per_item: u32,
    ) -> Result<Self> {
        if tags_per_bucket == 0 || bits_per_item == 0 || bits_per_item > 32 {
            return Err(BirdsNestError::InvalidConfig(format!(
                "invalid table geometry: tags_per_bucket {tags_per_bucket}, \
                 bits_per_item {bits_per_item}"
            )));
        }

        let too_large = || {
            BirdsNestError::InvalidConfig(format!(
                "capacity {capacity} does not fit in a table"
            ))
        };
        let mut num_buckets = (capacity / tags_per_bucket as u64)
            .checked_next_power_of_two()
            .ok_or_else(too_large)?;
        let slots = num_buckets
            .checked_mul(tags_per_bucket as u64)
            .ok_or_else(too_large)?;
        if capacity as f64 / slots as f64 > MAX_BUCKET_LOAD {
            num_buckets = num_buckets.checked_mul(2).ok_or_else(too_large)?;
        }

        let tags_per_bucket = tags_per_bucket as usize;
        let bits_per_item = bits_per_item as usize;
        let (num_buckets, total_bits) =
            table_bits(num_buckets, tags_per_bucket, bits_per_item)
                .ok_or_else(too_large)?;

        Ok(Self {
            num_buckets,
            tags_per_bucket,
            bits_per_item,
            bits: bitvec![u8, Lsb0; 0; total_bits],
            num_items: 0,
            victim: None,
        })
    }

    pub fn num_buckets(&self) -> usize {
        self.num_buckets
    }

    /// Items stored, the victim included.
    pub fn len(&self) -> usize {
        self.num_items
    }

    pub fn is_empty(&self) -> bool {
        self.num_items == 0
    }

    /// Slots available, not counting the victim.
    pub fn slots(&self) -> usize {
        self.num_buckets * self.tags_per_bucket
    }

    /// Whether the victim slot is occupied; no further insert can succeed.
    pub fn is_saturated(&self) -> bool {
        self.victim.is_some()
    }

    /// Size of the packed tag storage in bytes.
    pub fn size_in_bytes(&self) -> usize {
        self.bits.as_raw_slice().len()
    }

    /// Inserts `key`. Returns `false` once the table cannot take more.
    pub fn add(&mut self, key: &[u8]) -> bool {
        if self.victim.is_some() {
            return false;
        }

        let (index, tag) =
            index_and_tag(key, self.bucket_mask(), self.tag_mask());
        let mut cur_index = index;
        let mut cur_tag = tag;

        for count in 0..MAX_KICKS {
            match self.insert_tag(cur_index, cur_tag, count > 0) {
                Insert::Stored => {
                    self.num_items += 1;
                    return true;
                }
                Insert::Kicked(old) => cur_tag = old,
                Insert::BucketFull => {}
            }
            cur_index = alt_index(cur_index, cur_tag, self.bucket_mask());
        }

        self.victim = Some(Victim {
            index: cur_index as u64,
            tag: cur_tag,
        });
        self.num_items += 1;
        true
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        let mask = self.bucket_mask();
        let (i1, tag) = index_and_tag(key, mask, self.tag_mask());
        let i2 = alt_index(i1, tag, mask);

        let in_victim = self.victim.is_some_and(|v| {
            v.tag == tag && (v.index == i1 as u64 || v.index == i2 as u64)
        });
        in_victim || self.bucket_has(i1, tag) || self.bucket_has(i2, tag)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let state = TableState {
            num_buckets: self.num_buckets as u64,
            tags_per_bucket: self.tags_per_bucket as u32,
            bits_per_item: self.bits_per_item as u32,
            num_items: self.num_items as u64,
            victim: self.victim,
            bits: self.bits.as_raw_slice().to_vec(),
        };
        Ok(bincode::serde::encode_to_vec(
            &state,
            bincode::config::standard(),
        )?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (state, _): (TableState, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;

        if state.num_buckets == 0 || !state.num_buckets.is_power_of_two() {
            return Err(BirdsNestError::SerializationError(format!(
                "bucket count {} is not a power of two",
                state.num_buckets
            )));
        }
        if state.tags_per_bucket == 0
            || state.bits_per_item == 0
            || state.bits_per_item > 32
        {
            return Err(BirdsNestError::SerializationError(
                "invalid table geometry".to_string(),
            ));
        }

        let tags_per_bucket = state.tags_per_bucket as usize;
        let bits_per_item = state.bits_per_item as usize;
        let (num_buckets, total_bits) =
            table_bits(state.num_buckets, tags_per_bucket, bits_per_item)
                .ok_or_else(|| {
                    BirdsNestError::SerializationError(format!(
                        "table of {} buckets is too large",
                        state.num_buckets
                    ))
                })?;
        if state.bits.len() != total_bits.div_ceil(8) {
            return Err(BirdsNestError::SerializationError(format!(
                "table holds {} bytes, expected {}",
                state.bits.len(),
                total_bits.div_ceil(8)
            )));
        }

        let mut bits = BitVec::<u8, Lsb0>::from_vec(state.bits);
        bits.truncate(total_bits);

        Ok(Self {
            num_buckets,
            tags_per_bucket,
            bits_per_item,
            bits,
            num_items: state.num_items as usize,
            victim: state.victim,
        })
    }

    fn bucket_mask(&self) -> u64 {
        self.num_buckets as u64 - 1
    }

    fn tag_mask(&self) -> u64 {
        if self.bits_per_item == 32 {
            u32::MAX as u64
        } else {
            (1u64 << self.bits_per_item) - 1
        }
    }

    fn slot_range(&self, bucket: usize, slot: usize) -> std::ops::Range<usize> {
        let start = (bucket * self.tags_per_bucket + slot) * self.bits_per_item;
        start..start + self.bits_per_item
    }

    fn read_tag(&self, bucket: usize, slot: usize) -> u32 {
        self.bits[self.slot_range(bucket, slot)].load_le::<u32>()
    }

    fn write_tag(&mut self, bucket: usize, slot: usize, tag: u32) {
        let range = self.slot_range(bucket, slot);
        self.bits[range].store_le::<u32>(tag);
    }

    fn bucket_has(&self, bucket: usize, tag: u32) -> bool {
        (0..self.tags_per_bucket).any(|slot| self.read_tag(bucket, slot) == tag)
    }

    fn insert_tag(&mut self, bucket: usize, tag: u32, kick_out: bool) -> Insert {
        for slot in 0..self.tags_per_bucket {
            if self.read_tag(bucket, slot) == 0 {
                self.write_tag(bucket, slot, tag);
                return Insert::Stored;
            }
        }
        if kick_out {
            let slot = rand::rng().random_range(0..self.tags_per_bucket);
            let old = self.read_tag(bucket, slot);
            self.write_tag(bucket, slot, tag);
            return Insert::Kicked(old);
        }
        Insert::BucketFull
    }
}

/// Bucket count as `usize` and total tag bits, `None` on overflow.
fn table_bits(
    num_buckets: u64,
    tags_per_bucket: usize,
    bits_per_item: usize,
) -> Option<(usize, usize)> {
    let num_buckets = usize::try_from(num_buckets).ok()?;
    let total_bits = num_buckets
        .checked_mul(tags_per_bucket)?
        .checked_mul(bits_per_item)?;
    Some((num_buckets, total_bits))
}

enum Insert {
    Stored,
    Kicked(u32),
    BucketFull,
}
