use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::mirror::{MirrorRecord, MirrorStatus, SyncConfig, VolumeInfo, EPOCH};

/// One scheduled run of a mirror's sync job.
///
/// A job is pending until a worker leases it, then syncing until the worker
/// reports back or the lease expires. Jobs are never reused: every new cycle
/// gets a new job with a new id.
#[derive(Debug, Clone)]
pub struct SyncJob {
    pub id: Uuid,
    record: Arc<MirrorRecord>,
    schedule: SyncConfig,
    /// Set when a reload superseded the schedule this job belongs to.
    /// Stale jobs may finish but are never scheduled again.
    pub stale: bool,
    pub task_should_start_at: DateTime<Utc>,
    /// When a worker leased the job, [`EPOCH`] before that
    pub task_started_at: DateTime<Utc>,
    /// Empty until leased
    pub worker_id: String,
}

impl SyncJob {
    /// Job for a mirror record, or `None` if the mirror is not scheduled.
    pub fn new(record: Arc<MirrorRecord>, should_start_at: DateTime<Utc>) -> Option<Self> {
        let schedule = record.config.schedule()?.clone();
        Some(Self {
            id: Uuid::new_v4(),
            record,
            schedule,
            stale: false,
            task_should_start_at: should_start_at,
            task_started_at: EPOCH,
            worker_id: String::new(),
        })
    }

    fn successor(&self, should_start_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            record: self.record.clone(),
            schedule: self.schedule.clone(),
            stale: false,
            task_should_start_at: should_start_at,
            task_started_at: EPOCH,
            worker_id: String::new(),
        }
    }

    /// The job for the following cycle, due one interval after `now`.
    pub fn next_cycle(&self, now: DateTime<Utc>) -> Self {
        self.successor(self.schedule.interval.next_sync_time(now))
    }

    /// A replacement job that may start immediately.
    pub fn retry_at(&self, now: DateTime<Utc>) -> Self {
        self.successor(now)
    }

    pub fn mirror_id(&self) -> &str {
        self.record.id()
    }

    pub fn record(&self) -> &Arc<MirrorRecord> {
        &self.record
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.task_should_start_at <= now
    }

    /// Point after which a leased job is considered lost. Saturates at the
    /// end of time for timeouts too large to represent.
    pub fn lease_expires_at(&self, cool_down: TimeDelta) -> DateTime<Utc> {
        self.schedule
            .timeout
            .checked_add(&cool_down)
            .and_then(|grace| self.task_started_at.checked_add_signed(grace))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Timeout as whole minutes for the worker, rounded up.
    fn timeout_minutes(&self) -> i64 {
        let secs = self.schedule.timeout.num_seconds();
        secs / 60 + i64::from(secs % 60 != 0)
    }

    /// What the worker needs to run the job.
    pub fn lease(&self) -> JobLease {
        JobLease {
            job_id: self.id,
            mirror_id: self.mirror_id().to_string(),
            job_name: self.schedule.job_name.clone(),
            image: self.schedule.image.clone(),
            timeout: format!("{}m", self.timeout_minutes()),
            volumes: self.schedule.volumes.clone(),
            command: self.schedule.command.clone(),
            environments: self.schedule.environments.clone(),
        }
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            mirror_id: self.mirror_id().to_string(),
            stale: self.stale,
            task_should_start_at: self.task_should_start_at,
            task_started_at: self.task_started_at,
            worker_id: self.worker_id.clone(),
            mirror_status: self.record.saved().status,
        }
    }
}

/// Lease handed to a worker on fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobLease {
    pub job_id: Uuid,
    pub mirror_id: String,
    pub job_name: String,
    pub image: String,
    /// Timeout in whole minutes, e.g. `"30m"`
    pub timeout: String,
    pub volumes: Vec<VolumeInfo>,
    pub command: Vec<String>,
    pub environments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: Uuid,
    pub mirror_id: String,
    pub stale: bool,
    pub task_should_start_at: DateTime<Utc>,
    pub task_started_at: DateTime<Utc>,
    pub worker_id: String,
    pub mirror_status: MirrorStatus,
}
