use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::{OrchestratorError, Result};
use crate::mirror::SavedStatus;
use crate::store::StatusStore;

/// In-memory status store. Not durable; used by tests and `--db :memory:`.
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    records: Mutex<BTreeMap<String, SavedStatus>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = SavedStatus>) -> Self {
        let store = Self::default();
        {
            let mut map = store.records.lock();
            for record in records {
                map.insert(record.id.clone(), record);
            }
        }
        store
    }

    /// Make every following write fail, to exercise error paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of records successfully written so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(OrchestratorError::Internal("write rejected".to_string()));
        }
        Ok(())
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(OrchestratorError::Internal("read rejected".to_string()));
        }
        Ok(())
    }
}

impl StatusStore for MemoryStatusStore {
    fn load_all(&self) -> Result<Vec<SavedStatus>> {
        self.check_read()?;
        Ok(self.records.lock().values().cloned().collect())
    }

    fn upsert(&self, status: &SavedStatus) -> Result<()> {
        self.check_write()?;
        self.records.lock().insert(status.id.clone(), status.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn upsert_many(&self, statuses: &[SavedStatus]) -> Result<()> {
        self.check_write()?;
        let mut records = self.records.lock();
        for status in statuses {
            records.insert(status.id.clone(), status.clone());
        }
        self.writes.fetch_add(statuses.len(), Ordering::SeqCst);
        Ok(())
    }
}
