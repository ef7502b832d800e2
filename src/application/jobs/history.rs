use std::{collections::VecDeque, sync::Mutex};

use serde::Serialize;
use time::OffsetDateTime;

use crate::{
    application::pipeline::JobError,
    domain::jobs::{JobId, JobResult, OutputKind},
    util::lock::mutex_lock,
};

/// Terminal outcome kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed {
        result: JobResult,
    },
    Failed {
        error_code: String,
        classification: String,
        message: String,
    },
}

impl JobOutcome {
    pub fn from_result(result: &Result<JobResult, JobError>) -> Self {
        match result {
            Ok(result) => JobOutcome::Completed {
                result: result.clone(),
            },
            Err(err) => JobOutcome::Failed {
                error_code: err.label().to_string(),
                classification: err.classification(),
                message: err.to_string(),
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, JobOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    pub kind: OutputKind,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    pub duration_ms: u64,
    pub outcome: JobOutcome,
}

/// Bounded windows of recently settled jobs. Completed and failed jobs are kept
/// separately so a burst of failures cannot evict successes, and vice versa.
#[derive(Debug)]
pub(crate) struct JobHistory {
    completed: Mutex<VecDeque<JobRecord>>,
    failed: Mutex<VecDeque<JobRecord>>,
    completed_limit: usize,
    failed_limit: usize,
}

impl JobHistory {
    pub(crate) fn new(completed_limit: usize, failed_limit: usize) -> Self {
        Self {
            completed: Mutex::new(VecDeque::with_capacity(completed_limit)),
            failed: Mutex::new(VecDeque::with_capacity(failed_limit)),
            completed_limit,
            failed_limit,
        }
    }

    pub(crate) fn record(&self, record: JobRecord) {
        let (window, limit) = if record.outcome.is_failure() {
            (&self.failed, self.failed_limit)
        } else {
            (&self.completed, self.completed_limit)
        };
        if limit == 0 {
            return;
        }

        let mut guard = mutex_lock(window, "application::jobs::history", "history::record");
        while guard.len() >= limit {
            guard.pop_front();
        }
        guard.push_back(record);
    }

    pub(crate) fn find(&self, id: JobId) -> Option<JobRecord> {
        for window in [&self.completed, &self.failed] {
            let guard = mutex_lock(window, "application::jobs::history", "history::find");
            if let Some(record) = guard.iter().rev().find(|record| record.id == id) {
                return Some(record.clone());
            }
        }
        None
    }

    /// Every retained record, newest first.
    pub(crate) fn recent(&self) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = Vec::new();
        for window in [&self.completed, &self.failed] {
            let guard = mutex_lock(window, "application::jobs::history", "history::recent");
            records.extend(guard.iter().cloned());
        }
        records.sort_by(|a, b| b.finished_at.cmp(&a.finished_at));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::pipeline::Tool;

    fn record(outcome: JobOutcome, offset_secs: i64) -> JobRecord {
        JobRecord {
            id: JobId::new(),
            kind: OutputKind::Preview,
            finished_at: OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(offset_secs),
            duration_ms: 5,
            outcome,
        }
    }

    fn completed(offset_secs: i64) -> JobRecord {
        record(
            JobOutcome::Completed {
                result: JobResult::artifact("job.png"),
            },
            offset_secs,
        )
    }

    fn failed(offset_secs: i64) -> JobRecord {
        let err = JobError::ToolExitFailure {
            tool: Tool::GeometryEngine,
            code: 1,
            stderr: String::new(),
        };
        record(JobOutcome::from_result(&Err(err)), offset_secs)
    }

    #[test]
    fn windows_are_bounded_independently() {
        let history = JobHistory::new(2, 3);
        let oldest = completed(0);
        history.record(oldest.clone());
        for offset in 1..=2 {
            history.record(completed(offset));
        }
        for offset in 3..=7 {
            history.record(failed(offset));
        }

        let recent = history.recent();
        assert_eq!(recent.len(), 5);
        assert_eq!(
            recent.iter().filter(|record| record.outcome.is_failure()).count(),
            3
        );
        assert!(history.find(oldest.id).is_none());
        assert_eq!(recent[0].finished_at, OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(7));
    }

    #[test]
    fn failed_outcomes_carry_the_classification() {
        let record = failed(0);
        match record.outcome {
            JobOutcome::Failed {
                error_code,
                classification,
                ..
            } => {
                assert_eq!(error_code, "tool_exit_failure");
                assert_eq!(classification, "Exit Code 1");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
