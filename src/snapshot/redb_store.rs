use super::{CFG_FILE, GAUGE_FILE, SnapshotData, SnapshotStore};
use crate::error::Result;
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::BTreeMap;
use std::path::Path;

const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");
const FILTERS_TABLE: TableDefinition<u16, &[u8]> =
    TableDefinition::new("filters");

/// Snapshot store kept in a single redb database file.
///
/// The gauge and filter of one `write` share a transaction, so they commit
/// together.
pub struct RedbSnapshot {
    db: Database,
}

impl RedbSnapshot {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(redb::Error::from)?;

        // make sure both tables exist so readers never see a missing table
        let write_txn = db.begin_write().map_err(redb::Error::from)?;
        {
            write_txn.open_table(META_TABLE).map_err(redb::Error::from)?;
            write_txn
                .open_table(FILTERS_TABLE)
                .map_err(redb::Error::from)?;
        }
        write_txn.commit().map_err(redb::Error::from)?;

        Ok(Self { db })
    }

    fn read_meta(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read().map_err(redb::Error::from)?;
        let table = read_txn.open_table(META_TABLE).map_err(redb::Error::from)?;
        let value = table.get(name).map_err(redb::Error::from)?;
        Ok(value.map(|v| v.value().to_vec()))
    }
}

impl SnapshotStore for RedbSnapshot {
    fn read_cfg(&self) -> Result<Option<Vec<u8>>> {
        self.read_meta(CFG_FILE)
    }

    fn write_cfg(&self, cfg: &[u8]) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(redb::Error::from)?;
        {
            let mut table =
                write_txn.open_table(META_TABLE).map_err(redb::Error::from)?;
            table.insert(CFG_FILE, cfg).map_err(redb::Error::from)?;
        }
        write_txn.commit().map_err(redb::Error::from)?;
        Ok(())
    }

    fn read(&self) -> Result<SnapshotData> {
        let read_txn = self.db.begin_read().map_err(redb::Error::from)?;

        let meta = read_txn.open_table(META_TABLE).map_err(redb::Error::from)?;
        let gauge = meta
            .get(GAUGE_FILE)
            .map_err(redb::Error::from)?
            .map(|v| v.value().to_vec());

        let table = read_txn
            .open_table(FILTERS_TABLE)
            .map_err(redb::Error::from)?;
        let mut filters = BTreeMap::new();
        for item in table.iter().map_err(redb::Error::from)? {
            let (index, bytes) = item.map_err(redb::Error::from)?;
            filters.insert(index.value(), bytes.value().to_vec());
        }

        Ok(SnapshotData { gauge, filters })
    }

    fn write(&self, gauge: &[u8], filter: &[u8], index: u16) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(redb::Error::from)?;
        {
            let mut meta =
                write_txn.open_table(META_TABLE).map_err(redb::Error::from)?;
            meta.insert(GAUGE_FILE, gauge).map_err(redb::Error::from)?;

            let mut filters = write_txn
                .open_table(FILTERS_TABLE)
                .map_err(redb::Error::from)?;
            filters.insert(index, filter).map_err(redb::Error::from)?;
        }
        write_txn.commit().map_err(redb::Error::from)?;
        Ok(())
    }
}
