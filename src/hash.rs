use fnv::FnvHasher;
use murmur3::murmur3_32;
use std::hash::Hasher;
use std::io::Cursor;

/// Multiplier used to derive the alternate bucket of a tag.
const ALT_INDEX_MIX: u64 = 0x5bd1_e995;

/// Seed for shard routing, must differ from the bucket index seed.
const SHARD_SEED: u32 = 0x9747_b28c;

pub(crate) fn hash_murmur32(key: &[u8]) -> u32 {
    murmur32_with_seed(key, 0)
}

fn murmur32_with_seed(key: &[u8], seed: u32) -> u32 {
    let mut cursor = Cursor::new(key);
    // Reading from an in-memory cursor cannot fail.
    murmur3_32(&mut cursor, seed).unwrap_or_default()
}

pub(crate) fn hash_fnv32(key: &[u8]) -> u32 {
    let mut hasher = FnvHasher::default();
    hasher.write(key);
    hasher.finish() as u32
}

/// 64-bit key hash: murmur3 in the high half, fnv in the low half.
///
/// The cuckoo table takes the bucket index from the high half and the tag
/// from the low half, so the two are independent.
pub fn key_hash64(key: &[u8]) -> u64 {
    ((hash_murmur32(key) as u64) << 32) | hash_fnv32(key) as u64
}

/// Primary bucket index and tag for `key`.
///
/// `bucket_mask` is `num_buckets - 1` (bucket count is a power of two),
/// `tag_mask` keeps the low `bits_per_item` bits. A zero tag marks an
/// empty slot so it is bumped to one.
pub(crate) fn index_and_tag(
    key: &[u8],
    bucket_mask: u64,
    tag_mask: u64,
) -> (usize, u32) {
    let hash = key_hash64(key);
    let index = ((hash >> 32) & bucket_mask) as usize;
    let tag = (hash & tag_mask) as u32;
    (index, tag.max(1))
}

/// Alternate bucket for a tag. Applying it twice returns the original.
pub(crate) fn alt_index(index: usize, tag: u32, bucket_mask: u64) -> usize {
    ((index as u64 ^ (tag as u64).wrapping_mul(ALT_INDEX_MIX)) & bucket_mask)
        as usize
}

/// Shard owning `key` among `shards` shards.
///
/// Seeded apart from the bucket hash; otherwise every shard would only ever
/// use the buckets congruent to its own number.
pub fn shard_for(key: &[u8], shards: usize) -> usize {
    if shards <= 1 {
        return 0;
    }
    murmur32_with_seed(key, SHARD_SEED) as usize % shards
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alt_index_is_involution() {
        let mask = 1023;
        for key in [b"alpha".as_slice(), b"beta", b"gamma", b"delta"] {
            let (i1, tag) = index_and_tag(key, mask, 0xffff);
            let i2 = alt_index(i1, tag, mask);
            assert_eq!(alt_index(i2, tag, mask), i1);
        }
    }

    #[test]
    fn test_tag_never_zero() {
        for i in 0..10_000u32 {
            let (_, tag) = index_and_tag(&i.to_be_bytes(), 63, 0x1);
            assert_ne!(tag, 0);
        }
    }

    #[test]
    fn test_shard_routing_is_stable() {
        let key = b"some-transaction";
        assert_eq!(shard_for(key, 8), shard_for(key, 8));
        assert!(shard_for(key, 8) < 8);
        assert_eq!(shard_for(key, 1), 0);
        assert_eq!(shard_for(key, 0), 0);
    }

    #[test]
    fn test_shards_use_all_buckets() {
        // keys of one shard must still spread over every bucket residue
        let mut residues = [false; 4];
        for i in 0..1_000u32 {
            let key = i.to_be_bytes();
            if shard_for(&key, 4) == 0 {
                let (index, _) = index_and_tag(&key, 3, 0xffff);
                residues[index] = true;
            }
        }
        assert!(residues.iter().all(|seen| *seen));
    }
}
