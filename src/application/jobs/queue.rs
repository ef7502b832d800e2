use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::{
    application::pipeline::{JobError, RenderPipeline},
    config::JobsSettings,
    domain::jobs::{Job, JobId, JobRequest, JobResult},
};

use super::{
    METRIC_JOB_DURATION_MS, METRIC_JOBS_COMPLETED, METRIC_JOBS_FAILED, METRIC_JOBS_RATE_LIMITED,
    METRIC_JOBS_RUNNING, METRIC_JOBS_SUBMITTED,
    history::{JobHistory, JobOutcome, JobRecord},
    limiter::SubmissionLimiter,
};

const DEFAULT_CONCURRENCY: usize = 2;
const DEFAULT_RATE_LIMIT_MAX: u32 = 5;
const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_millis(1000);
const DEFAULT_HISTORY_COMPLETED: usize = 100;
const DEFAULT_HISTORY_FAILED: usize = 200;

/// Scheduling limits of a [`RenderQueue`].
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Jobs allowed to run at once.
    pub concurrency: usize,
    /// Job starts allowed per `rate_limit_window`.
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
    pub history_completed: usize,
    pub history_failed: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            rate_limit_max: DEFAULT_RATE_LIMIT_MAX,
            rate_limit_window: DEFAULT_RATE_LIMIT_WINDOW,
            history_completed: DEFAULT_HISTORY_COMPLETED,
            history_failed: DEFAULT_HISTORY_FAILED,
        }
    }
}

impl From<&JobsSettings> for QueueConfig {
    fn from(settings: &JobsSettings) -> Self {
        Self {
            concurrency: settings.concurrency.get() as usize,
            rate_limit_max: settings.rate_limit_max.get(),
            rate_limit_window: settings.rate_limit_window,
            history_completed: settings.history_completed,
            history_failed: settings.history_failed,
        }
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("render queue is shut down")]
    Closed,
}

#[derive(Debug, Error)]
pub enum AwaitError {
    #[error("job `{job_id}` did not finish within {timeout:?}")]
    Timeout { job_id: JobId, timeout: Duration },
    #[error("job `{job_id}` was dropped before it settled")]
    Abandoned { job_id: JobId },
    #[error(transparent)]
    Failed(#[from] JobError),
}

/// Where a job currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Settled(JobRecord),
}

type Reply = oneshot::Sender<Result<JobResult, JobError>>;

/// Caller's side of a submitted job.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    reply: oneshot::Receiver<Result<JobResult, JobError>>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }
}

struct Shared {
    pipeline: RenderPipeline,
    slots: Arc<Semaphore>,
    live: DashMap<JobId, JobStatus>,
    history: JobHistory,
}

/// Bounded-concurrency, rate-limited job queue in front of a [`RenderPipeline`].
///
/// Jobs start in submission order. Each job runs at most once; a caller that
/// stops waiting does not stop the job.
pub struct RenderQueue {
    shared: Arc<Shared>,
    submissions: mpsc::UnboundedSender<(Job, Reply)>,
    stop: watch::Sender<bool>,
}

impl RenderQueue {
    /// Start the dispatcher on the current runtime.
    pub fn start(pipeline: RenderPipeline, config: QueueConfig) -> Self {
        let shared = Arc::new(Shared {
            pipeline,
            slots: Arc::new(Semaphore::new(config.concurrency.max(1))),
            live: DashMap::new(),
            history: JobHistory::new(config.history_completed, config.history_failed),
        });
        let limiter = SubmissionLimiter::new(config.rate_limit_window, config.rate_limit_max);
        let (submissions, receiver) = mpsc::unbounded_channel();
        let (stop, stopped) = watch::channel(false);
        tokio::spawn(dispatch(Arc::clone(&shared), receiver, limiter, stopped));

        info!(
            target = "application::jobs::queue",
            op = "queue::start",
            concurrency = config.concurrency.max(1),
            rate_limit_max = config.rate_limit_max,
            rate_limit_window_ms = config.rate_limit_window.as_millis() as u64,
            "Render queue started"
        );

        Self {
            shared,
            submissions,
            stop,
        }
    }

    /// Accept a job. The queue assigns its identity; the job runs once a worker
    /// slot and a rate-limit slot are both free.
    pub fn submit(&self, request: JobRequest) -> Result<JobHandle, QueueError> {
        let job = Job::new(JobId::new(), request);
        let id = job.id();
        let kind = job.output();
        let (reply, receiver) = oneshot::channel();

        self.shared.live.insert(id, JobStatus::Queued);
        if self.submissions.send((job, reply)).is_err() {
            self.shared.live.remove(&id);
            return Err(QueueError::Closed);
        }

        counter!(METRIC_JOBS_SUBMITTED).increment(1);
        debug!(
            target = "application::jobs::queue",
            op = "queue::submit",
            job_id = %id,
            kind = kind.as_str(),
            "Job queued"
        );

        Ok(JobHandle {
            id,
            reply: receiver,
        })
    }

    /// Wait up to `timeout` for the job behind `handle`. Timing out only stops
    /// the wait; the job keeps running and its result is discarded.
    pub async fn await_result(
        &self,
        handle: JobHandle,
        timeout: Duration,
    ) -> Result<JobResult, AwaitError> {
        let JobHandle { id, reply } = handle;
        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(outcome)) => outcome.map_err(AwaitError::Failed),
            Ok(Err(_)) => Err(AwaitError::Abandoned { job_id: id }),
            Err(_) => {
                warn!(
                    target = "application::jobs::queue",
                    op = "queue::await_result",
                    result = "timeout",
                    job_id = %id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Stopped waiting for job; it keeps running"
                );
                Err(AwaitError::Timeout {
                    job_id: id,
                    timeout,
                })
            }
        }
    }

    /// Current status of a live job, or its record if it is still in the history window.
    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        if let Some(status) = self.shared.live.get(&id) {
            return Some(status.clone());
        }
        self.shared.history.find(id).map(JobStatus::Settled)
    }

    /// Settled jobs still in the history window, newest first.
    pub fn recent(&self) -> Vec<JobRecord> {
        self.shared.history.recent()
    }

    /// Worker slots not currently held by a running job.
    pub fn idle_workers(&self) -> usize {
        self.shared.slots.available_permits()
    }

    /// Stop accepting and dispatching jobs. Jobs already running finish; queued
    /// jobs are dropped, leave the live set, and their callers see
    /// [`AwaitError::Abandoned`].
    pub fn shutdown(&self) {
        self.stop.send_replace(true);
        info!(
            target = "application::jobs::queue",
            op = "queue::shutdown",
            live = self.shared.live.len(),
            "Render queue stopped"
        );
    }
}

/// Runs until the queue is shut down or dropped. Jobs that never started are
/// taken out of the live set before their reply channel closes.
async fn dispatch(
    shared: Arc<Shared>,
    mut submissions: mpsc::UnboundedReceiver<(Job, Reply)>,
    mut limiter: SubmissionLimiter,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let (job, reply) = tokio::select! {
            biased;
            _ = stop.changed() => break,
            next = submissions.recv() => match next {
                Some(submission) => submission,
                None => break,
            },
        };

        let permit = tokio::select! {
            biased;
            _ = stop.changed() => None,
            permit = admit(&shared, &mut limiter, job.id()) => permit,
        };
        let Some(permit) = permit else {
            abandon(&shared, job, reply);
            break;
        };

        let shared = Arc::clone(&shared);
        tokio::spawn(async move {
            let _permit = permit;
            work(&shared, job, reply).await;
        });
    }

    submissions.close();
    while let Ok((job, reply)) = submissions.try_recv() {
        abandon(&shared, job, reply);
    }
}

/// Wait for a rate-limit slot and then a worker slot.
async fn admit(
    shared: &Shared,
    limiter: &mut SubmissionLimiter,
    id: JobId,
) -> Option<OwnedSemaphorePermit> {
    if limiter.acquire().await {
        counter!(METRIC_JOBS_RATE_LIMITED).increment(1);
        debug!(
            target = "application::jobs::queue",
            op = "queue::dispatch",
            result = "rate_limited",
            job_id = %id,
            "Job start delayed by rate limit"
        );
    }
    Arc::clone(&shared.slots).acquire_owned().await.ok()
}

fn abandon(shared: &Shared, job: Job, reply: Reply) {
    shared.live.remove(&job.id());
    drop(reply);
    debug!(
        target = "application::jobs::queue",
        op = "queue::dispatch",
        result = "abandoned",
        job_id = %job.id(),
        "Queued job dropped at shutdown"
    );
}

async fn work(shared: &Shared, job: Job, reply: Reply) {
    let id = job.id();
    shared.live.insert(id, JobStatus::Running);
    gauge!(METRIC_JOBS_RUNNING).increment(1.0);
    let started_at = Instant::now();

    let outcome = shared.pipeline.execute(&job).await;

    let elapsed = started_at.elapsed();
    gauge!(METRIC_JOBS_RUNNING).decrement(1.0);
    histogram!(METRIC_JOB_DURATION_MS).record(elapsed.as_secs_f64() * 1000.0);
    match &outcome {
        Ok(_) => counter!(METRIC_JOBS_COMPLETED).increment(1),
        Err(err) => counter!(METRIC_JOBS_FAILED, "classification" => err.label()).increment(1),
    }

    shared.history.record(JobRecord {
        id,
        kind: job.output(),
        finished_at: OffsetDateTime::now_utc(),
        duration_ms: elapsed.as_millis() as u64,
        outcome: JobOutcome::from_result(&outcome),
    });
    shared.live.remove(&id);

    if reply.send(outcome).is_err() {
        debug!(
            target = "application::jobs::queue",
            op = "queue::deliver",
            result = "discarded",
            job_id = %id,
            "Caller stopped waiting; result discarded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        application::pipeline::{EngineConfig, Invocation, ProcessExit, ProcessRunner},
        domain::jobs::{InputSource, OutputKind},
        infra::storage::StorageLayout,
    };
    use async_trait::async_trait;
    use std::io;
    use tempfile::TempDir;

    struct SlowRunner {
        delay: Duration,
        exit_code: i32,
    }

    #[async_trait]
    impl ProcessRunner for SlowRunner {
        async fn run(&self, invocation: &Invocation) -> io::Result<ProcessExit> {
            tokio::time::sleep(self.delay).await;
            std::fs::write(&invocation.expected_output, "artifact")?;
            Ok(ProcessExit {
                code: Some(self.exit_code),
                ..Default::default()
            })
        }
    }

    fn queue(dir: &TempDir, runner: SlowRunner) -> RenderQueue {
        queue_with(dir, runner, QueueConfig::default())
    }

    fn queue_with(dir: &TempDir, runner: SlowRunner, config: QueueConfig) -> RenderQueue {
        let storage = StorageLayout::new(dir.path().join("designs"), dir.path().join("renders"))
            .expect("layout");
        let pipeline =
            RenderPipeline::with_runner(storage, EngineConfig::default(), Arc::new(runner));
        RenderQueue::start(pipeline, config)
    }

    fn preview() -> JobRequest {
        JobRequest::new(
            OutputKind::Preview,
            InputSource::Inline("cube(1);".to_string()),
        )
    }

    async fn wait_until_settled(queue: &RenderQueue, id: JobId) -> JobRecord {
        for _ in 0..200 {
            if let Some(JobStatus::Settled(record)) = queue.status(id) {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never settled");
    }

    #[tokio::test]
    async fn delivers_results_and_records_history() {
        let dir = TempDir::new().expect("temp dir");
        let queue = queue(
            &dir,
            SlowRunner {
                delay: Duration::ZERO,
                exit_code: 0,
            },
        );

        let handle = queue.submit(preview()).expect("submitted");
        let id = handle.id();
        let result = queue
            .await_result(handle, Duration::from_secs(5))
            .await
            .expect("result");

        assert_eq!(result.output_filename, id.output_filename("png"));
        let record = wait_until_settled(&queue, id).await;
        assert!(matches!(record.outcome, JobOutcome::Completed { .. }));
        assert_eq!(queue.recent().len(), 1);
    }

    #[tokio::test]
    async fn failures_reach_the_caller_classified() {
        let dir = TempDir::new().expect("temp dir");
        let queue = queue(
            &dir,
            SlowRunner {
                delay: Duration::ZERO,
                exit_code: 4,
            },
        );

        let handle = queue.submit(preview()).expect("submitted");
        let err = queue
            .await_result(handle, Duration::from_secs(5))
            .await
            .expect_err("failure");
        match err {
            AwaitError::Failed(job_error) => {
                assert_eq!(job_error.classification(), "Exit Code 4");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn timing_out_does_not_cancel_the_job() {
        let dir = TempDir::new().expect("temp dir");
        let queue = queue(
            &dir,
            SlowRunner {
                delay: Duration::from_millis(200),
                exit_code: 0,
            },
        );

        let handle = queue.submit(preview()).expect("submitted");
        let id = handle.id();
        let err = queue
            .await_result(handle, Duration::from_millis(20))
            .await
            .expect_err("timeout");
        assert!(matches!(err, AwaitError::Timeout { job_id, .. } if job_id == id));
        assert!(matches!(
            queue.status(id),
            Some(JobStatus::Queued | JobStatus::Running)
        ));

        let record = wait_until_settled(&queue, id).await;
        assert!(matches!(record.outcome, JobOutcome::Completed { .. }));
        assert!(dir
            .path()
            .join("renders")
            .join(id.output_filename("png"))
            .exists());
    }

    #[tokio::test]
    async fn shut_down_queues_reject_submissions() {
        let dir = TempDir::new().expect("temp dir");
        let queue = queue(
            &dir,
            SlowRunner {
                delay: Duration::ZERO,
                exit_code: 0,
            },
        );
        queue.shutdown();

        let mut rejected = false;
        for _ in 0..50 {
            if matches!(queue.submit(preview()), Err(QueueError::Closed)) {
                rejected = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(rejected);
    }

    #[tokio::test]
    async fn shutdown_clears_jobs_that_never_started() {
        let dir = TempDir::new().expect("temp dir");
        let queue = queue_with(
            &dir,
            SlowRunner {
                delay: Duration::from_millis(300),
                exit_code: 0,
            },
            QueueConfig {
                concurrency: 1,
                ..QueueConfig::default()
            },
        );

        let running = queue.submit(preview()).expect("submitted");
        let waiting = queue.submit(preview()).expect("submitted");
        let (running_id, waiting_id) = (running.id(), waiting.id());
        for _ in 0..200 {
            if matches!(queue.status(running_id), Some(JobStatus::Running)) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(matches!(queue.status(running_id), Some(JobStatus::Running)));

        queue.shutdown();

        let err = queue
            .await_result(waiting, Duration::from_secs(5))
            .await
            .expect_err("abandoned");
        assert!(matches!(err, AwaitError::Abandoned { job_id } if job_id == waiting_id));
        assert!(queue.status(waiting_id).is_none());

        queue
            .await_result(running, Duration::from_secs(5))
            .await
            .expect("running job finishes");
        let record = wait_until_settled(&queue, running_id).await;
        assert!(matches!(record.outcome, JobOutcome::Completed { .. }));
        assert!(queue.status(waiting_id).is_none());
        assert_eq!(queue.recent().len(), 1);
    }
}
