use super::{SnapshotData, SnapshotStore};
use crate::error::{BirdsNestError, Result};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct State {
    cfg: Option<Vec<u8>>,
    data: SnapshotData,
}

/// In-memory storage backend for testing
#[derive(Debug, Default)]
pub struct MemorySnapshot {
    state: Mutex<State>,
}

impl MemorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> Result<T> {
        let mut state = self.state.lock().map_err(|_| {
            BirdsNestError::LockError("Failed to lock memory snapshot".to_string())
        })?;
        Ok(f(&mut state))
    }
}

impl SnapshotStore for MemorySnapshot {
    fn read_cfg(&self) -> Result<Option<Vec<u8>>> {
        self.with_state(|state| state.cfg.clone())
    }

    fn write_cfg(&self, cfg: &[u8]) -> Result<()> {
        self.with_state(|state| state.cfg = Some(cfg.to_vec()))
    }

    fn read(&self) -> Result<SnapshotData> {
        self.with_state(|state| state.data.clone())
    }

    fn write(&self, gauge: &[u8], filter: &[u8], index: u16) -> Result<()> {
        self.with_state(|state| {
            state.data.gauge = Some(gauge.to_vec());
            state.data.filters.insert(index, filter.to_vec());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_snapshot() {
        let store = MemorySnapshot::new();
        assert!(store.read_cfg().unwrap().is_none());
        store.write_cfg(b"cfg").unwrap();
        store.write(b"g", b"f", 2).unwrap();
        assert_eq!(store.read_cfg().unwrap().unwrap(), b"cfg");
        let data = store.read().unwrap();
        assert_eq!(data.gauge.unwrap(), b"g");
        assert_eq!(data.filters[&2], b"f");
    }
}
