pub mod job;
pub mod queue;

pub use job::{JobLease, JobSummary, SyncJob};
pub use queue::{JobQueue, JobReport, JobsSnapshot, QueueStatus, ReportOutcome};
