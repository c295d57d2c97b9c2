use super::config::{BirdsNestConfig, SerializeIntervalType};
use super::monitor::SerializeSignal;
use super::traits::{NestInfo, TxFilter};
use crate::error::{BirdsNestError, Result};
use crate::extension::ExtensionRegistry;
use crate::key::TimestampKey;
use crate::ring::{FilterFactory, FilterRing};
use crate::rules::{RuleType, Rules};
use crate::snapshot::{FileSnapshot, Gauge, MAX_FILTER_INDEX, SnapshotStore};
use crate::strategy::{LruStrategy, RotationStrategy};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pending serialize signals; extra height/timed signals are dropped.
const SIGNAL_CAPACITY: usize = 16;

enum SnapshotChoice {
    /// `FileSnapshot` under the configured path
    File { shard: Option<usize> },
    Store(Arc<dyn SnapshotStore>),
    None,
}

pub struct BirdsNestBuilder {
    config: BirdsNestConfig,
    strategy: Box<dyn RotationStrategy>,
    extensions: ExtensionRegistry,
    snapshot: SnapshotChoice,
}

impl BirdsNestBuilder {
    pub fn strategy(mut self, strategy: impl RotationStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    pub fn extensions(mut self, extensions: ExtensionRegistry) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshot = SnapshotChoice::Store(store);
        self
    }

    /// Keep the file store but use the `birdsnest<shard>` directory.
    pub fn shard(mut self, shard: usize) -> Self {
        self.snapshot = SnapshotChoice::File { shard: Some(shard) };
        self
    }

    /// No persistence at all.
    pub fn in_memory(mut self) -> Self {
        self.snapshot = SnapshotChoice::None;
        self
    }

    /// Builds the ring and restores persisted state when there is any.
    ///
    /// A persisted configuration that differs from the given one is logged
    /// and the persisted one wins.
    pub fn open(self) -> Result<BirdsNest> {
        self.config.validate()?;

        let snapshot: Option<Arc<dyn SnapshotStore>> = match self.snapshot {
            SnapshotChoice::File { shard } => Some(Arc::new(FileSnapshot::open(
                self.config.snapshot_dir(shard),
            )?)),
            SnapshotChoice::Store(store) => Some(store),
            SnapshotChoice::None => None,
        };

        let factory =
            FilterFactory::new(self.config.cuckoo.clone(), self.extensions);
        let ring = FilterRing::new(self.config.slots(), factory)?;
        let (signals, signal_rx) = mpsc::channel(SIGNAL_CAPACITY);

        let mut nest = BirdsNest {
            rules: Rules::from_config(&self.config.rules),
            config: self.config,
            height: AtomicU64::new(0),
            durable_height: AtomicU64::new(0),
            ring: RwLock::new(ring),
            strategy: self.strategy,
            snapshot,
            signals,
            signal_rx: Mutex::new(Some(signal_rx)),
            sealed: Mutex::new(BTreeSet::new()),
            sealed_notify: Notify::new(),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        };

        match nest.deserialize() {
            Ok(()) => {}
            Err(e) if e.is_config_drift() => {
                warn!(
                    "birds nest {} reopened with a different configuration, \
                     using the persisted one",
                    nest.config.chain_id
                );
            }
            Err(e) => return Err(e),
        }

        info!(
            "birds nest {} opened: {} filters, current index {}, height {}",
            nest.config.chain_id,
            nest.config.slots(),
            nest.current_index()?,
            nest.height()
        );
        Ok(nest)
    }
}

/// Ring of cuckoo filters with background snapshotting.
///
/// Writes go to the filter at the current index; when it fills up the
/// rotation strategy moves the ring on and the sealed filter is queued for
/// serialization. Lookups scan every filter.
pub struct BirdsNest {
    pub(super) config: BirdsNestConfig,
    /// Last height reported by the block pipeline
    height: AtomicU64,
    /// Height at the last successful serialize
    pub(super) durable_height: AtomicU64,
    ring: RwLock<FilterRing>,
    rules: Rules,
    strategy: Box<dyn RotationStrategy>,
    snapshot: Option<Arc<dyn SnapshotStore>>,
    pub(super) signals: mpsc::Sender<SerializeSignal>,
    signal_rx: Mutex<Option<mpsc::Receiver<SerializeSignal>>>,
    /// Sealed ring slots waiting to be written
    pub(super) sealed: Mutex<BTreeSet<usize>>,
    pub(super) sealed_notify: Notify,
    pub(super) cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BirdsNest {
    pub fn builder(config: BirdsNestConfig) -> BirdsNestBuilder {
        BirdsNestBuilder {
            config,
            strategy: Box::new(LruStrategy),
            extensions: ExtensionRegistry::default(),
            snapshot: SnapshotChoice::File { shard: None },
        }
    }

    /// Opens the nest with the file store under the configured path.
    pub fn open(config: BirdsNestConfig) -> Result<Self> {
        Self::builder(config).open()
    }

    pub fn config(&self) -> &BirdsNestConfig {
        &self.config
    }

    /// Height up to which the on-disk state is known to be complete.
    pub fn durable_height(&self) -> u64 {
        self.durable_height.load(Ordering::Acquire)
    }

    pub fn current_index(&self) -> Result<usize> {
        Ok(self.read_ring()?.current_index())
    }

    pub fn is_persistent(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Spawns the serialize monitor and the timed trigger on the current
    /// tokio runtime. Calling it again is a no-op.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            BirdsNestError::InvalidConfig(format!(
                "starting the birds nest requires a tokio runtime: {e}"
            ))
        })?;
        let Some(signal_rx) = self
            .signal_rx
            .lock()
            .map_err(|_| BirdsNestError::LockError("signal receiver".to_string()))?
            .take()
        else {
            return Ok(());
        };

        let monitor = runtime.spawn(Arc::clone(self).serialize_monitor(signal_rx));
        let timed = runtime.spawn(Arc::clone(self).serialize_timed());
        self.tasks
            .lock()
            .map_err(|_| BirdsNestError::LockError("task handles".to_string()))?
            .extend([monitor, timed]);
        debug!("birds nest {} background tasks started", self.config.chain_id);
        Ok(())
    }

    /// Stops the background tasks. The active filter and any sealed filter
    /// still pending are written before this returns.
    pub async fn shutdown(&self) -> Result<()> {
        if let Err(e) = self.signals.try_send(SerializeSignal::Exit) {
            debug!("exit signal not queued: {e}");
        }
        self.cancel.cancel();
        let tasks = std::mem::take(
            &mut *self
                .tasks
                .lock()
                .map_err(|_| BirdsNestError::LockError("task handles".to_string()))?,
        );

        if tasks.is_empty() {
            // never started, nobody else will flush
            self.flush_on_exit();
            return Ok(());
        }
        for task in tasks {
            if let Err(e) = task.await {
                warn!("birds nest background task failed: {e}");
            }
        }
        Ok(())
    }

    /// Writes the gauge and the filter at `index`.
    ///
    /// On success the durable height moves up to the current height, never
    /// down; on failure it stays behind so the next trigger writes again.
    /// Without a snapshot store only the index is checked.
    pub fn serialize(&self, index: usize) -> Result<()> {
        if index > MAX_FILTER_INDEX {
            return Err(BirdsNestError::IndexOutOfBounds {
                index,
                capacity: MAX_FILTER_INDEX + 1,
            });
        }
        let height = self.height();
        let ring = self.read_ring()?;
        let filter = ring.get(index).ok_or(BirdsNestError::IndexOutOfBounds {
            index,
            capacity: ring.len(),
        })?;
        let Some(store) = &self.snapshot else {
            return Ok(());
        };
        let gauge = Gauge {
            height: self.durable_height(),
            current_index: ring.current_index() as u32,
        }
        .to_bytes()?;
        let record = filter.encode()?.to_bytes()?;
        drop(ring);

        store.write(&gauge, &record, index as u16)?;
        // a racing serialize may have recorded a later height already
        self.durable_height.fetch_max(height, Ordering::AcqRel);
        debug!(
            "birds nest {} serialized filter {index} at height {height}",
            self.config.chain_id
        );
        Ok(())
    }

    /// Serializes the filter currently taking writes.
    pub fn serialize_current(&self) -> Result<()> {
        let index = self.current_index()?;
        self.serialize(index)
    }

    /// Replaces the in-memory state with the persisted one.
    ///
    /// Nothing persisted yet: the configuration is written and the nest
    /// stays empty. A persisted configuration different from the current
    /// one still gets loaded, then `CannotModifyConfiguration` is returned.
    pub fn deserialize(&mut self) -> Result<()> {
        let Some(store) = self.snapshot.clone() else {
            return Ok(());
        };
        let Some(cfg) = store.read_cfg()? else {
            store.write_cfg(&self.config.to_bytes()?)?;
            return Ok(());
        };

        let persisted = BirdsNestConfig::from_bytes(&cfg)?;
        let drift = persisted != self.config;
        let data = store.read()?;

        let factory = self
            .read_ring()?
            .factory()
            .with_config(persisted.cuckoo.clone());
        let mut ring = FilterRing::new(persisted.slots(), factory)?;
        for (index, bytes) in &data.filters {
            let index = *index as usize;
            if index >= ring.len() {
                warn!("ignoring persisted filter {index} outside the ring");
                continue;
            }
            let filter = ring.factory().restore(bytes)?;
            ring.replace(index, filter)?;
        }

        let mut height = 0;
        if let Some(gauge) = &data.gauge {
            let gauge = Gauge::from_bytes(gauge)?;
            ring.set_current_index(gauge.current_index as usize)?;
            height = gauge.height;
        }

        *self
            .ring
            .get_mut()
            .map_err(|_| BirdsNestError::LockError("ring".to_string()))? = ring;
        self.height.store(height, Ordering::Release);
        self.durable_height.store(height, Ordering::Release);
        self.rules = Rules::from_config(&persisted.rules);
        self.config = persisted;

        if drift {
            return Err(BirdsNestError::CannotModifyConfiguration);
        }
        Ok(())
    }

    /// Writes every sealed filter still queued, then the active one.
    ///
    /// All writes are attempted; the first error is returned and sealed
    /// filters that failed stay queued.
    pub fn flush(&self) -> Result<()> {
        let mut first_error = None;
        for index in self.take_sealed() {
            if let Err(e) = self.serialize(index) {
                warn!("failed to serialize sealed filter {index}: {e}");
                self.mark_sealed(index);
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = self.serialize_current() {
            first_error.get_or_insert(e);
        }
        first_error.map_or(Ok(()), Err)
    }

    pub(super) fn flush_on_exit(&self) {
        if let Err(e) = self.flush() {
            warn!("failed to serialize birds nest on exit: {e}");
        }
    }

    pub(super) fn take_sealed(&self) -> BTreeSet<usize> {
        match self.sealed.lock() {
            Ok(mut sealed) => std::mem::take(&mut *sealed),
            Err(_) => BTreeSet::new(),
        }
    }

    fn mark_sealed(&self, index: usize) {
        if self.snapshot.is_none() {
            return;
        }
        if let Ok(mut sealed) = self.sealed.lock() {
            sealed.insert(index);
        }
        self.sealed_notify.notify_one();
    }

    fn read_ring(&self) -> Result<RwLockReadGuard<'_, FilterRing>> {
        self.ring.read().map_err(|_| {
            BirdsNestError::LockError("Failed to acquire read lock on ring".to_string())
        })
    }

    fn write_ring(&self) -> Result<RwLockWriteGuard<'_, FilterRing>> {
        self.ring.write().map_err(|_| {
            BirdsNestError::LockError("Failed to acquire write lock on ring".to_string())
        })
    }
}

impl TxFilter for BirdsNest {
    fn height(&self) -> u64 {
        self.height.load(Ordering::Acquire)
    }

    fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::Release);
        if self.config.snapshot.serialize_type != SerializeIntervalType::Height {
            return;
        }
        if let Err(e) = self.signals.try_send(SerializeSignal::Height) {
            debug!("height signal dropped: {e}");
        }
    }

    fn add(&self, key: &TimestampKey) -> Result<()> {
        if key.is_empty() {
            return Err(BirdsNestError::EmptyKey);
        }

        let mut ring = self.write_ring()?;
        let attempts = ring.len() + 1;
        for _ in 0..attempts {
            if ring.current_mut().add(key)? {
                return Ok(());
            }
            if ring.current().is_full() {
                let sealed = ring.current_index();
                self.strategy.rotate(&mut ring)?;
                self.mark_sealed(sealed);
            }
        }
        Err(BirdsNestError::RotationStalled { attempts })
    }

    fn adds(&self, keys: &[TimestampKey]) -> Result<()> {
        for key in keys {
            self.add(key)?;
        }
        Ok(())
    }

    fn contains(&self, key: &TimestampKey, rules: &[RuleType]) -> Result<bool> {
        if key.is_empty() {
            return Err(BirdsNestError::EmptyKey);
        }
        self.rules.validate(key, rules)?;

        let ring = self.read_ring()?;
        for filter in ring.filters() {
            if filter.contains(key)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn validate_rule(&self, key: &TimestampKey, rules: &[RuleType]) -> Result<()> {
        if key.is_empty() {
            return Err(BirdsNestError::EmptyKey);
        }
        self.rules.validate(key, rules)
    }

    fn info(&self) -> Result<NestInfo> {
        let ring = self.read_ring()?;
        Ok(NestInfo {
            height: self.height(),
            length: self.config.length,
            current_index: ring.current_index(),
            total_keys: ring.filters().iter().map(|f| f.len()).sum(),
            total_bytes: ring.filters().iter().map(|f| f.size_in_bytes()).sum(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cuckoo::{CuckooConfigBuilder, KeyType};
    use crate::nest::config::BirdsNestConfigBuilder;
    use crate::snapshot::MemorySnapshot;

    fn config(length: u32, max_num_keys: u32) -> BirdsNestConfig {
        BirdsNestConfigBuilder::default()
            .length(length)
            .cuckoo(
                CuckooConfigBuilder::default()
                    .key_type(KeyType::Timestamp)
                    .max_num_keys(max_num_keys)
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap()
    }

    fn keys(count: usize) -> Vec<TimestampKey> {
        (0..count)
            .map(|i| TimestampKey::with_nano(1_000 + i as i64).unwrap())
            .collect()
    }

    /// Strategy that never moves the ring.
    struct StuckStrategy;

    impl RotationStrategy for StuckStrategy {
        fn rotate(&self, _ring: &mut FilterRing) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_add_rejects_empty_key() {
        let nest = BirdsNest::builder(config(2, 10)).in_memory().open().unwrap();
        let empty = TimestampKey::from_bytes(Vec::new());
        assert!(matches!(nest.add(&empty), Err(BirdsNestError::EmptyKey)));
        assert!(matches!(
            nest.contains(&empty, &[]),
            Err(BirdsNestError::EmptyKey)
        ));
    }

    #[test]
    fn test_rotation_on_full() {
        let nest = BirdsNest::builder(config(2, 5)).in_memory().open().unwrap();
        nest.adds(&keys(5)).unwrap();
        // full but not rotated until the next add
        assert_eq!(nest.current_index().unwrap(), 0);
        nest.adds(&keys(1)).unwrap();
        assert_eq!(nest.current_index().unwrap(), 1);
    }

    #[test]
    fn test_stuck_strategy_fails_instead_of_looping() {
        let nest = BirdsNest::builder(config(2, 3))
            .strategy(StuckStrategy)
            .in_memory()
            .open()
            .unwrap();
        nest.adds(&keys(3)).unwrap();
        assert!(matches!(
            nest.add(&TimestampKey::with_nano(9).unwrap()),
            Err(BirdsNestError::RotationStalled { .. })
        ));
    }

    #[test]
    fn test_info() {
        let nest = BirdsNest::builder(config(3, 100)).in_memory().open().unwrap();
        nest.adds(&keys(42)).unwrap();
        nest.set_height(7);
        let info = nest.info().unwrap();
        assert_eq!(info.height, 7);
        assert_eq!(info.length, 3);
        assert_eq!(info.current_index, 0);
        assert_eq!(info.total_keys, 42);
        assert!(info.total_bytes > 0);
        assert_eq!(info.to_array()[3], 42);
    }

    #[test]
    fn test_serialize_index_checks() {
        let store = Arc::new(MemorySnapshot::new());
        let nest = BirdsNest::builder(config(2, 10))
            .snapshot_store(store)
            .open()
            .unwrap();
        assert!(nest.serialize(2).is_ok());
        assert!(matches!(
            nest.serialize(3),
            Err(BirdsNestError::IndexOutOfBounds { capacity: 3, .. })
        ));
        assert!(matches!(
            nest.serialize(MAX_FILTER_INDEX + 1),
            Err(BirdsNestError::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_serialize_advances_durable_height() {
        let store = Arc::new(MemorySnapshot::new());
        let nest = BirdsNest::builder(config(2, 10))
            .snapshot_store(store.clone())
            .open()
            .unwrap();
        nest.set_height(5);
        assert_eq!(nest.durable_height(), 0);
        nest.serialize_current().unwrap();
        assert_eq!(nest.durable_height(), 5);

        let data = store.read().unwrap();
        let gauge = Gauge::from_bytes(data.gauge.as_ref().unwrap()).unwrap();
        // the gauge carries the watermark from before this write
        assert_eq!(gauge.height, 0);
        assert_eq!(gauge.current_index, 0);
    }

    #[test]
    fn test_rotation_queues_sealed_filter() {
        let store = Arc::new(MemorySnapshot::new());
        let nest = BirdsNest::builder(config(2, 3))
            .snapshot_store(store)
            .open()
            .unwrap();
        nest.adds(&keys(4)).unwrap();
        assert_eq!(nest.take_sealed(), BTreeSet::from([0]));
        assert!(nest.take_sealed().is_empty());
    }

    #[test]
    fn test_in_memory_serialize_checks_index() {
        let nest = BirdsNest::builder(config(2, 10)).in_memory().open().unwrap();
        assert!(nest.serialize(2).is_ok());
        assert!(matches!(
            nest.serialize(5_000),
            Err(BirdsNestError::IndexOutOfBounds { index: 5_000, capacity: 3 })
        ));
    }

    #[test]
    fn test_durable_height_never_moves_back() {
        let store = Arc::new(MemorySnapshot::new());
        let nest = BirdsNest::builder(config(2, 10))
            .snapshot_store(store)
            .open()
            .unwrap();
        nest.set_height(9);
        nest.serialize_current().unwrap();
        assert_eq!(nest.durable_height(), 9);

        // a write that captured an older height lands last
        nest.set_height(4);
        nest.serialize_current().unwrap();
        assert_eq!(nest.durable_height(), 9);
    }

    #[test]
    fn test_flush_writes_sealed_and_current() {
        let store = Arc::new(MemorySnapshot::new());
        let nest = BirdsNest::builder(config(3, 10))
            .snapshot_store(store.clone())
            .open()
            .unwrap();
        nest.adds(&keys(25)).unwrap();
        assert_eq!(nest.current_index().unwrap(), 2);

        nest.flush().unwrap();
        assert!(nest.take_sealed().is_empty());
        let data = store.read().unwrap();
        assert_eq!(
            data.filters.keys().copied().collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_in_memory_nest_queues_nothing() {
        let nest = BirdsNest::builder(config(2, 3)).in_memory().open().unwrap();
        nest.adds(&keys(10)).unwrap();
        assert!(nest.take_sealed().is_empty());
        assert!(nest.serialize_current().is_ok());
    }
}
