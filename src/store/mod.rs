//! Durable storage for mirror sync history.
//!
//! The state store only needs an upsert/query service keyed by mirror id;
//! [`StatusStore`] is that seam. [`MemoryStatusStore`] backs tests and
//! throwaway runs, [`SqliteStatusStore`] is the production backend.

pub mod memory;
pub mod sqlite;

use crate::error::Result;
use crate::mirror::SavedStatus;

pub use memory::MemoryStatusStore;
pub use sqlite::SqliteStatusStore;

pub trait StatusStore: Send + Sync {
    /// Every saved record.
    fn load_all(&self) -> Result<Vec<SavedStatus>>;

    /// Insert or fully replace one record.
    fn upsert(&self, status: &SavedStatus) -> Result<()>;

    /// Insert or replace several records atomically.
    fn upsert_many(&self, statuses: &[SavedStatus]) -> Result<()>;
}

#[cfg(test)]
pub(crate) fn stored(store: &impl StatusStore, id: &str) -> Option<SavedStatus> {
    store
        .load_all()
        .ok()?
        .into_iter()
        .find(|status| status.id == id)
}
