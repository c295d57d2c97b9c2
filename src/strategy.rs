use crate::error::Result;
use crate::ring::FilterRing;
use tracing::debug;

/// Eviction policy run when the active filter reports full.
///
/// Implementations must leave the ring with an active filter that can take
/// writes; a rotation that frees nothing makes `add` fail with
/// `RotationStalled`.
pub trait RotationStrategy: Send + Sync {
    fn rotate(&self, ring: &mut FilterRing) -> Result<()>;
}

/// Moves to the next slot, discarding whatever it held.
///
/// With `N + 1` slots the ring keeps roughly the last `N + 1` filters worth
/// of keys; the slot overwritten is always the oldest one.
#[derive(Debug, Default, Clone, Copy)]
pub struct LruStrategy;

impl RotationStrategy for LruStrategy {
    fn rotate(&self, ring: &mut FilterRing) -> Result<()> {
        let next = (ring.current_index() + 1) % ring.len();
        ring.reset(next)?;
        ring.set_current_index(next)?;
        debug!("rotated birds nest ring to slot {next}");
        Ok(())
    }
}
