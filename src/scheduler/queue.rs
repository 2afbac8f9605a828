use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::Result;
use crate::mirror::{Artifact, MirrorStatus, SavedStatus, EPOCH};
use crate::scheduler::job::{JobLease, JobSummary, SyncJob};
use crate::state::StateStore;

/// Grace period added on top of a job's timeout before its lease is given up.
pub const DEFAULT_COOL_DOWN_SECS: i64 = 300;

/// Outcome of a worker's job report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Accepted; the next cycle is pending.
    Requeued { next_run_at: DateTime<Utc> },
    /// Accepted, but the job belonged to a superseded schedule.
    Discarded,
    /// No syncing job has that id (already reported or declared lost).
    UnknownJob,
    /// Not a final status; the job stays leased.
    Rejected,
}

/// What a worker reports when a job ends.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub status: MirrorStatus,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub artifacts: Option<Vec<Artifact>>,
}

impl JobReport {
    pub fn with_status(status: MirrorStatus) -> Self {
        Self {
            status,
            size: None,
            artifacts: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub syncing: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobsSnapshot {
    /// In queue order
    pub pending: Vec<JobSummary>,
    /// Oldest lease first
    pub syncing: Vec<JobSummary>,
}

/// Lease-based scheduler for mirror sync jobs.
///
/// Pending jobs wait in a FIFO queue; a fetch only ever looks at its head.
/// Leased jobs live in the syncing set until the worker reports back or the
/// lease runs out (`timeout + cool_down`), which is checked on every fetch.
///
/// `gate` orders whole-queue operations: reload and the lost-job sweep hold
/// it exclusively, fetches, reports and snapshots share it. Status writes to
/// the [`StateStore`] always happen after the gate is released.
pub struct JobQueue {
    state: Arc<StateStore>,
    clock: Arc<dyn Clock>,
    cool_down: TimeDelta,
    gate: RwLock<()>,
    pending: Mutex<VecDeque<SyncJob>>,
    syncing: DashMap<Uuid, SyncJob>,
    refresh_requests: DashSet<String>,
    last_active: Mutex<DateTime<Utc>>,
}

impl JobQueue {
    pub fn new(state: Arc<StateStore>, clock: Arc<dyn Clock>, cool_down: TimeDelta) -> Self {
        Self {
            state,
            clock,
            cool_down,
            gate: RwLock::new(()),
            pending: Mutex::new(VecDeque::new()),
            syncing: DashMap::new(),
            refresh_requests: DashSet::new(),
            last_active: Mutex::new(EPOCH),
        }
    }

    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    /// Reload mirror state and rebuild the pending queue from it.
    ///
    /// Every syncing job is marked stale: it may still report, but it will not
    /// be scheduled again. On error the queue is left as it was.
    pub fn reload(&self) -> Result<()> {
        self.state.reload()?;

        let mut jobs: Vec<SyncJob> = self
            .state
            .records()
            .into_iter()
            .filter_map(|record| {
                let at = record.next_sync_at();
                SyncJob::new(record, at)
            })
            .collect();
        jobs.sort_by_key(|job| job.task_should_start_at);

        let pending = jobs.len();
        let stale = {
            let _gate = self.gate.write();
            *self.pending.lock() = jobs.into();
            let mut stale = 0;
            for mut job in self.syncing.iter_mut() {
                job.stale = true;
                stale += 1;
            }
            stale
        };

        tracing::info!(pending, stale, "Job queue rebuilt");
        Ok(())
    }

    /// Lease the job at the head of the queue to `worker_id`, if it is due.
    ///
    /// Only the head is considered. A head that is not yet due stays at the
    /// head unless a force refresh was requested for its mirror.
    pub fn try_get_new_job(&self, worker_id: &str) -> Option<JobLease> {
        let now = self.touch();
        self.check_lost_jobs();

        let (lease, mut saved) = {
            let _gate = self.gate.read();
            let mut job = self.pending.lock().pop_front()?;

            if !job.is_due(now) {
                if self.refresh_requests.remove(job.mirror_id()).is_none() {
                    tracing::debug!(
                        mirror_id = %job.mirror_id(),
                        due_at = %job.task_should_start_at,
                        "Head job not due yet"
                    );
                    self.pending.lock().push_front(job);
                    return None;
                }
                tracing::info!(mirror_id = %job.mirror_id(), "Force refresh consumed");
                job.task_should_start_at = now;
            }

            job.task_started_at = now;
            job.worker_id = worker_id.to_string();
            let lease = job.lease();
            let saved = self.saved_status(&job);
            self.syncing.insert(job.id, job);
            (lease, saved)
        };

        tracing::info!(
            job_id = %lease.job_id,
            mirror_id = %lease.mirror_id,
            worker_id = %worker_id,
            "Job leased"
        );

        saved.status = MirrorStatus::Syncing;
        saved.last_sync_at = now;
        self.state.set_status(saved);
        Some(lease)
    }

    /// Record the final status of a leased job.
    pub fn update_job_status(&self, job_id: Uuid, status: MirrorStatus) -> ReportOutcome {
        self.report_job(job_id, JobReport::with_status(status))
    }

    /// Record the final status of a leased job together with any size or
    /// artifact update, then schedule the mirror's next cycle.
    pub fn report_job(&self, job_id: Uuid, report: JobReport) -> ReportOutcome {
        let now = self.touch();

        let (outcome, saved) = {
            let _gate = self.gate.read();
            let Some((_, job)) = self.syncing.remove(&job_id) else {
                tracing::warn!(job_id = %job_id, status = %report.status, "Report for unknown job");
                return ReportOutcome::UnknownJob;
            };

            if !report.status.is_terminal() {
                tracing::warn!(
                    job_id = %job_id,
                    mirror_id = %job.mirror_id(),
                    status = %report.status,
                    "Rejected non-final job status"
                );
                self.syncing.insert(job_id, job);
                return ReportOutcome::Rejected;
            }

            let mut saved = self.saved_status(&job);
            saved.status = report.status;
            if report.status == MirrorStatus::Succeeded {
                saved.last_success_at = now;
            }
            if let Some(size) = report.size {
                saved.size = size;
            }
            if let Some(artifacts) = report.artifacts {
                saved.artifacts = artifacts;
            }

            let outcome = if job.stale {
                ReportOutcome::Discarded
            } else {
                let next = job.next_cycle(now);
                let next_run_at = next.task_should_start_at;
                self.pending.lock().push_back(next);
                ReportOutcome::Requeued { next_run_at }
            };
            (outcome, saved)
        };

        match outcome {
            ReportOutcome::Requeued { next_run_at } => tracing::info!(
                job_id = %job_id,
                mirror_id = %saved.id,
                status = %saved.status,
                next_run_at = %next_run_at,
                "Job finished"
            ),
            _ => tracing::info!(
                job_id = %job_id,
                mirror_id = %saved.id,
                status = %saved.status,
                "Stale job finished"
            ),
        }
        self.state.set_status(saved);
        outcome
    }

    /// Give up every lease older than `timeout + cool_down`.
    ///
    /// Lost jobs are recorded as failed at the time they were leased, and
    /// unless stale, retried immediately. Returns how many leases expired.
    pub fn check_lost_jobs(&self) -> usize {
        let now = self.clock.now();

        let lost: Vec<SyncJob> = {
            let _gate = self.gate.write();
            let expired: Vec<Uuid> = self
                .syncing
                .iter()
                .filter(|job| job.lease_expires_at(self.cool_down) < now)
                .map(|job| job.id)
                .collect();

            let mut lost = Vec::with_capacity(expired.len());
            for id in expired {
                let Some((_, job)) = self.syncing.remove(&id) else {
                    continue;
                };
                if !job.stale {
                    self.pending.lock().push_back(job.retry_at(now));
                }
                lost.push(job);
            }
            lost
        };

        for job in &lost {
            tracing::warn!(
                job_id = %job.id,
                mirror_id = %job.mirror_id(),
                worker_id = %job.worker_id,
                started_at = %job.task_started_at,
                retry = !job.stale,
                "Job lease expired"
            );
            let mut saved = self.saved_status(job);
            saved.status = MirrorStatus::Failed;
            saved.last_sync_at = job.task_started_at;
            self.state.set_status(saved);
        }
        lost.len()
    }

    /// Let the named mirror's next job skip its due check once.
    ///
    /// A blank id clears every outstanding request.
    pub fn force_refresh(&self, mirror_id: &str) {
        let mirror_id = mirror_id.trim();
        if mirror_id.is_empty() {
            self.clear_refresh_requests();
        } else {
            self.request_refresh(mirror_id);
        }
    }

    pub fn request_refresh(&self, mirror_id: &str) {
        tracing::info!(mirror_id = %mirror_id, "Force refresh requested");
        self.refresh_requests.insert(mirror_id.to_string());
    }

    pub fn clear_refresh_requests(&self) {
        tracing::info!(cleared = self.refresh_requests.len(), "Force refresh requests cleared");
        self.refresh_requests.clear();
    }

    pub fn get_jobs(&self) -> JobsSnapshot {
        let _gate = self.gate.read();
        let pending = self.pending.lock().iter().map(SyncJob::summary).collect();
        let mut syncing: Vec<JobSummary> = self.syncing.iter().map(|job| job.summary()).collect();
        syncing.sort_by(|a, b| {
            a.task_started_at
                .cmp(&b.task_started_at)
                .then_with(|| a.mirror_id.cmp(&b.mirror_id))
        });
        JobsSnapshot { pending, syncing }
    }

    pub fn get_queue_status(&self) -> QueueStatus {
        let _gate = self.gate.read();
        QueueStatus {
            pending: self.pending.lock().len(),
            syncing: self.syncing.len(),
        }
    }

    /// Time of the last fetch or report from any worker.
    pub fn last_active(&self) -> DateTime<Utc> {
        *self.last_active.lock()
    }

    /// Latest saved status of the job's mirror. A stale job's record may
    /// have been replaced by a reload since it was scheduled.
    fn saved_status(&self, job: &SyncJob) -> SavedStatus {
        self.state
            .saved_status(job.mirror_id())
            .unwrap_or_else(|| job.record().saved())
    }

    fn touch(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        *self.last_active.lock() = now;
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::mirror::loader::MemoryConfigSource;
    use crate::mirror::tests::sync_config;
    use crate::store::MemoryStatusStore;
    use chrono::TimeZone;

    fn queue() -> (Arc<ManualClock>, JobQueue) {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let source = Arc::new(MemoryConfigSource::new(vec![sync_config("arch", "1h", "30m")]));
        let state = Arc::new(StateStore::new(source, Arc::new(MemoryStatusStore::new())));
        let queue = JobQueue::new(state, clock.clone(), TimeDelta::seconds(DEFAULT_COOL_DOWN_SECS));
        queue.reload().unwrap();
        (clock, queue)
    }

    #[test]
    fn fetch_and_report_cycle() {
        let (clock, queue) = queue();
        let lease = queue.try_get_new_job("w1").unwrap();
        assert_eq!(queue.get_queue_status(), QueueStatus { pending: 0, syncing: 1 });
        assert_eq!(queue.last_active(), clock.now());

        clock.advance(TimeDelta::minutes(10));
        let outcome = queue.update_job_status(lease.job_id, MirrorStatus::Succeeded);
        assert_eq!(
            outcome,
            ReportOutcome::Requeued {
                next_run_at: clock.now() + TimeDelta::hours(1)
            }
        );
        assert_eq!(queue.get_queue_status(), QueueStatus { pending: 1, syncing: 0 });
    }

    #[test]
    fn non_final_status_keeps_lease() {
        let (_clock, queue) = queue();
        let lease = queue.try_get_new_job("w1").unwrap();
        assert_eq!(
            queue.update_job_status(lease.job_id, MirrorStatus::Syncing),
            ReportOutcome::Rejected
        );
        assert_eq!(queue.get_queue_status().syncing, 1);
    }

    #[test]
    fn blank_force_refresh_clears_requests() {
        let (_clock, queue) = queue();
        queue.force_refresh("arch");
        queue.force_refresh("debian");
        assert_eq!(queue.refresh_requests.len(), 2);
        queue.force_refresh("   ");
        assert!(queue.refresh_requests.is_empty());
    }
}
