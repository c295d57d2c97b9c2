use super::{
    CFG_FILE, GAUGE_FILE, SnapshotData, SnapshotStore, TMP_SUFFIX,
    filter_file_name, parse_filter_file_name,
};
use crate::error::{BirdsNestError, Result};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Directory of small files, each replaced atomically.
///
/// Every record is written to `<name>.tmp`, synced, then renamed over
/// `<name>`. A crash leaves at worst a stale `.tmp` next to the previous
/// committed file; stale temporaries are removed when the store is opened.
#[derive(Debug)]
pub struct FileSnapshot {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileSnapshot {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            BirdsNestError::StorageError(format!(
                "Failed to create snapshot directory {}: {e}",
                dir.display()
            ))
        })?;

        let snapshot = Self {
            dir,
            lock: Mutex::new(()),
        };
        snapshot.remove_stale_tmp_files()?;
        Ok(snapshot)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock.lock().map_err(|_| {
            BirdsNestError::LockError("Failed to lock snapshot directory".to_string())
        })
    }

    fn write_atomic(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let target = self.dir.join(name);
        let tmp = self.dir.join(format!("{name}{TMP_SUFFIX}"));

        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);

        // rename replaces the target in one step, the previous version stays
        // readable until then
        fs::rename(&tmp, &target).map_err(|e| {
            BirdsNestError::StorageError(format!(
                "Failed to move {} into place: {e}",
                tmp.display()
            ))
        })?;
        debug!("wrote {} ({} bytes)", target.display(), bytes.len());
        Ok(())
    }

    fn read_file(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.dir.join(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove_stale_tmp_files(&self) -> Result<()> {
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.ends_with(TMP_SUFFIX) {
                warn!("removing incomplete snapshot write {name}");
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }
}

impl SnapshotStore for FileSnapshot {
    fn read_cfg(&self) -> Result<Option<Vec<u8>>> {
        let _guard = self.lock()?;
        self.read_file(CFG_FILE)
    }

    fn write_cfg(&self, cfg: &[u8]) -> Result<()> {
        let _guard = self.lock()?;
        self.write_atomic(CFG_FILE, cfg)
    }

    fn read(&self) -> Result<SnapshotData> {
        let _guard = self.lock()?;
        let gauge = self.read_file(GAUGE_FILE)?;

        let mut filters = BTreeMap::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(index) = name.to_str().and_then(parse_filter_file_name)
            else {
                continue;
            };
            filters.insert(index, fs::read(entry.path())?);
        }

        Ok(SnapshotData { gauge, filters })
    }

    fn write(&self, gauge: &[u8], filter: &[u8], index: u16) -> Result<()> {
        let _guard = self.lock()?;
        self.write_atomic(GAUGE_FILE, gauge)?;
        self.write_atomic(&filter_file_name(index), filter)
    }
}
