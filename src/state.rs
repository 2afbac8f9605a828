//! Authoritative in-memory view of every mirror.
//!
//! The [`StateStore`] merges the mirror configuration (re-read on every reload)
//! with the durable sync history, and is the only writer of that history.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::mirror::loader::{check_snapshot, ConfigSource};
use crate::mirror::{MirrorItem, MirrorRecord, MirrorStatus, SavedStatus, SyncType};
use crate::store::StatusStore;

pub struct StateStore {
    source: Arc<dyn ConfigSource>,
    store: Arc<dyn StatusStore>,
    records: RwLock<HashMap<String, Arc<MirrorRecord>>>,
}

impl StateStore {
    /// Create an empty state store. Call [`StateStore::reload`] to populate it.
    pub fn new(source: Arc<dyn ConfigSource>, store: Arc<dyn StatusStore>) -> Self {
        Self {
            source,
            store,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Rebuild every mirror record from configuration and durable history.
    ///
    /// The new map replaces the old one in a single step. If the configuration
    /// or the durable store cannot be read, nothing changes and the error is
    /// returned. Failing to persist records for brand new mirrors is only
    /// logged. Returns the number of mirrors loaded.
    pub fn reload(&self) -> Result<usize> {
        let configs = self
            .source
            .load()
            .and_then(|configs| check_snapshot(&configs).map(|_| configs))
            .inspect_err(|e| {
                tracing::error!(source = %self.source.describe(), error = %e, "Mirror config reload failed");
            })?;

        let saved: HashMap<String, SavedStatus> = self
            .store
            .load_all()
            .inspect_err(|e| tracing::error!(error = %e, "Failed to read saved mirror status"))?
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();

        let mut created = Vec::new();
        let mut records = HashMap::with_capacity(configs.len());
        for config in configs {
            let mut status = match saved.get(&config.id) {
                Some(existing) => existing.clone(),
                None => {
                    let fresh = SavedStatus::unknown(config.id.clone());
                    created.push(fresh.clone());
                    fresh
                }
            };
            if config.sync_type() == SyncType::Cached {
                status.status = MirrorStatus::Cached;
            }
            records.insert(
                config.id.clone(),
                Arc::new(MirrorRecord::new(config, status)),
            );
        }

        if !created.is_empty() {
            if let Err(e) = self.store.upsert_many(&created) {
                tracing::error!(count = created.len(), error = %e, "Failed to save new mirror records");
            }
        }

        let count = records.len();
        *self.records.write() = records;
        tracing::info!(mirrors = count, new = created.len(), "Mirror state reloaded");
        Ok(count)
    }

    /// Copies of every mirror, ordered by id.
    pub fn get_all(&self) -> Vec<MirrorItem> {
        let records = self.records.read();
        let mut items: Vec<MirrorItem> = records.values().map(|r| r.snapshot()).collect();
        items.sort_by(|a, b| a.config.id.cmp(&b.config.id));
        items
    }

    pub fn get_by_id(&self, id: &str) -> Option<MirrorItem> {
        self.records.read().get(id).map(|r| r.snapshot())
    }

    /// Current saved status of one mirror.
    pub fn saved_status(&self, id: &str) -> Option<SavedStatus> {
        self.records.read().get(id).map(|r| r.saved())
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Replace a mirror's saved status and persist it.
    ///
    /// Returns `false` when no mirror has that id. Storage failures are logged;
    /// memory already holds the new value and the next successful write
    /// brings storage back in line.
    pub fn set_status(&self, status: SavedStatus) -> bool {
        let status = status.canonical();
        {
            let records = self.records.write();
            let Some(record) = records.get(&status.id) else {
                tracing::debug!(mirror_id = %status.id, "Ignoring status for unknown mirror");
                return false;
            };
            record.replace_saved(status.clone());
        }

        if let Err(e) = self.store.upsert(&status) {
            tracing::error!(mirror_id = %status.id, error = %e, "Failed to save mirror status");
        }
        true
    }

    /// Live records, shared with the jobs scheduled for them.
    pub(crate) fn records(&self) -> Vec<Arc<MirrorRecord>> {
        let records = self.records.read();
        let mut out: Vec<Arc<MirrorRecord>> = records.values().cloned().collect();
        out.sort_by(|a, b| a.id().cmp(b.id()));
        out
    }
}
