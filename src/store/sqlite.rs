use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::mirror::{Artifact, MirrorStatus, SavedStatus, EPOCH};
use crate::store::StatusStore;

const UPSERT_SQL: &str = "INSERT INTO saved_infos(id, status, last_sync_at, last_success_at, size, artifacts)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
     ON CONFLICT(id) DO UPDATE SET
        status = excluded.status,
        last_sync_at = excluded.last_sync_at,
        last_success_at = excluded.last_success_at,
        size = excluded.size,
        artifacts = excluded.artifacts";

const SELECT_SQL: &str =
    "SELECT id, status, last_sync_at, last_success_at, size, artifacts FROM saved_infos ORDER BY id";

/// Artifacts are kept as one JSON sub-document per row.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ArtifactList {
    #[serde(default)]
    value: Vec<Artifact>,
}

type RawRow = (String, String, i64, i64, i64, String);

/// SQLite-backed status store. One row per mirror in `saved_infos`.
pub struct SqliteStatusStore {
    conn: Mutex<Connection>,
}

impl SqliteStatusStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    crate::error::OrchestratorError::Internal(format!(
                        "create database directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }
        let conn = Connection::open(db_path)?;
        tracing::info!(path = %db_path.display(), "Opened status database");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(include_str!("../../migrations/0001_init.sql"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
        ))
    }

    fn decode(raw: RawRow) -> Result<SavedStatus> {
        let (id, status, last_sync_at, last_success_at, size, artifacts) = raw;
        let status = status.parse().unwrap_or_else(|_| {
            tracing::warn!(mirror_id = %id, status = %status, "Unrecognized stored status");
            MirrorStatus::Unknown
        });
        let artifacts: ArtifactList = serde_json::from_str(&artifacts)?;
        Ok(SavedStatus {
            id,
            status,
            last_sync_at: from_millis(last_sync_at),
            last_success_at: from_millis(last_success_at),
            size,
            artifacts: artifacts.value,
        })
    }

    fn write(conn: &Connection, status: &SavedStatus) -> Result<()> {
        let artifacts = serde_json::to_string(&ArtifactList {
            value: status.artifacts.clone(),
        })?;
        conn.execute(
            UPSERT_SQL,
            params![
                status.id,
                status.status.as_str(),
                status.last_sync_at.timestamp_millis(),
                status.last_success_at.timestamp_millis(),
                status.size,
                artifacts,
            ],
        )?;
        Ok(())
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(EPOCH)
}

impl StatusStore for SqliteStatusStore {
    fn load_all(&self) -> Result<Vec<SavedStatus>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(SELECT_SQL)?;
        let rows = stmt.query_map([], Self::read_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(Self::decode(row?)?);
        }
        Ok(out)
    }

    fn upsert(&self, status: &SavedStatus) -> Result<()> {
        let conn = self.conn.lock();
        Self::write(&conn, status)
    }

    fn upsert_many(&self, statuses: &[SavedStatus]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for status in statuses {
            Self::write(&tx, status)?;
        }
        tx.commit()?;
        Ok(())
    }
}
