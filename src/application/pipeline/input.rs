//! Mapping a job's input source to a concrete file on disk.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::{
    domain::jobs::{InputSource, Job},
    infra::storage::StorageLayout,
};

use super::{error::JobError, workspace::JobWorkspace};

/// The file a job consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedInput {
    /// Parametric source for the geometry engine.
    Source(PathBuf),
    /// A mesh that can go straight to the slicer.
    Mesh(PathBuf),
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Source(path) | ResolvedInput::Mesh(path) => path,
        }
    }
}

/// Resolve `job`'s input. Inline source is written to a job-scoped scratch file
/// registered with `workspace`; stored inputs are only checked for existence.
pub async fn resolve_input(
    storage: &StorageLayout,
    job: &Job,
    workspace: &mut JobWorkspace,
) -> Result<ResolvedInput, JobError> {
    match job.input() {
        InputSource::Inline(text) => {
            let path = storage.scratch_path(&job.id().temp_input_filename());
            workspace.track_temporary(&path);
            tokio::fs::write(&path, text)
                .await
                .map_err(|err| JobError::workspace(&path, err))?;
            Ok(ResolvedInput::Source(path))
        }
        InputSource::StoredDesign(reference) => {
            let path = storage
                .stored_design_path(reference)
                .map_err(|_| input_not_found(job, reference))?;
            ensure_exists(job, reference, &path).await?;
            Ok(ResolvedInput::Source(path))
        }
        InputSource::StoredMesh(reference) => {
            let path = storage
                .stored_mesh_path(reference)
                .map_err(|_| input_not_found(job, reference))?;
            ensure_exists(job, reference, &path).await?;
            Ok(ResolvedInput::Mesh(path))
        }
    }
}

async fn ensure_exists(job: &Job, reference: &str, path: &Path) -> Result<(), JobError> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => Ok(()),
        _ => Err(input_not_found(job, reference)),
    }
}

fn input_not_found(job: &Job, reference: &str) -> JobError {
    warn!(
        target = "application::pipeline::input",
        op = "input::resolve",
        result = "error",
        job_id = %job.id(),
        error_code = "input_not_found",
        reference,
        "Job input could not be resolved"
    );
    JobError::InputNotFound {
        reference: reference.to_string(),
    }
}
