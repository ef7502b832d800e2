//! Per-job bookkeeping of files that must not outlive the job.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tracing::warn;

use crate::domain::jobs::JobId;

/// Files created on behalf of one job.
///
/// Temporary files are removed when the job ends, whatever the outcome. Pending
/// outputs are removed only when the job fails, so a failed job never leaves a
/// partial artifact behind. Dropping a workspace without calling
/// [`JobWorkspace::finish`] removes everything it tracks.
#[derive(Debug)]
pub struct JobWorkspace {
    job_id: JobId,
    temporary: Vec<PathBuf>,
    pending_outputs: Vec<PathBuf>,
    finished: bool,
}

impl JobWorkspace {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            temporary: Vec::new(),
            pending_outputs: Vec::new(),
            finished: false,
        }
    }

    /// Track a file that is always deleted at job end.
    pub fn track_temporary(&mut self, path: impl Into<PathBuf>) {
        self.temporary.push(path.into());
    }

    /// Track a result file that is deleted only if the job fails.
    pub fn track_output(&mut self, path: impl Into<PathBuf>) {
        self.pending_outputs.push(path.into());
    }

    pub fn temporary_files(&self) -> &[PathBuf] {
        &self.temporary
    }

    /// Delete tracked files according to the job outcome.
    pub async fn finish(mut self, succeeded: bool) {
        self.finished = true;
        let mut doomed = std::mem::take(&mut self.temporary);
        if !succeeded {
            doomed.append(&mut self.pending_outputs);
        }
        for path in doomed {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => log_cleanup_failure(self.job_id, &path, &err),
            }
        }
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        for path in self.temporary.iter().chain(self.pending_outputs.iter()) {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => log_cleanup_failure(self.job_id, path, &err),
            }
        }
    }
}

fn log_cleanup_failure(job_id: JobId, path: &Path, err: &std::io::Error) {
    warn!(
        target = "application::pipeline::workspace",
        op = "workspace::cleanup",
        result = "error",
        job_id = %job_id,
        path = %path.display(),
        error = %err,
        "Failed to remove job file"
    );
}
