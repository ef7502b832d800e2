//! Render job queue: bounded workers, rate-limited starts, recent-result history.

mod history;
mod limiter;
mod queue;

pub use history::{JobOutcome, JobRecord};
pub use queue::{AwaitError, JobHandle, JobStatus, QueueConfig, QueueError, RenderQueue};

pub const METRIC_JOBS_SUBMITTED: &str = "meshworks_jobs_submitted_total";
pub const METRIC_JOBS_COMPLETED: &str = "meshworks_jobs_completed_total";
pub const METRIC_JOBS_FAILED: &str = "meshworks_jobs_failed_total";
pub const METRIC_JOBS_RATE_LIMITED: &str = "meshworks_queue_rate_limited_total";
pub const METRIC_JOBS_RUNNING: &str = "meshworks_jobs_running";
pub const METRIC_JOB_DURATION_MS: &str = "meshworks_job_duration_ms";
