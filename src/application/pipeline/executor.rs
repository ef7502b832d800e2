//! Running one job end to end: resolve input, invoke engines, collect results.

use std::{path::Path, sync::Arc, time::Instant};

use tracing::{info, warn};

use crate::{
    domain::jobs::{Job, JobResult, OutputKind},
    infra::storage::StorageLayout,
};

use super::{
    error::JobError,
    input::{ResolvedInput, resolve_input},
    invocation::{EngineConfig, geometry_invocation, slicer_invocation},
    metadata::read_print_metadata,
    process::{ProcessRunner, SystemProcessRunner, run_tool},
    workspace::JobWorkspace,
};

/// Executes jobs against the configured engines. Holds no per-job state and can
/// be shared by every worker.
#[derive(Clone)]
pub struct RenderPipeline {
    storage: StorageLayout,
    engines: EngineConfig,
    runner: Arc<dyn ProcessRunner>,
}

impl std::fmt::Debug for RenderPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPipeline")
            .field("storage", &self.storage)
            .field("engines", &self.engines)
            .finish_non_exhaustive()
    }
}

impl RenderPipeline {
    pub fn new(storage: StorageLayout, engines: EngineConfig) -> Self {
        Self::with_runner(storage, engines, Arc::new(SystemProcessRunner))
    }

    pub fn with_runner(
        storage: StorageLayout,
        engines: EngineConfig,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            storage,
            engines,
            runner,
        }
    }

    pub fn storage(&self) -> &StorageLayout {
        &self.storage
    }

    pub fn engines(&self) -> &EngineConfig {
        &self.engines
    }

    /// Run `job` to a terminal outcome. Temporary files are removed before this
    /// returns, whichever way the job ended.
    pub async fn execute(&self, job: &Job) -> Result<JobResult, JobError> {
        let started_at = Instant::now();
        let mut workspace = JobWorkspace::new(job.id());
        let outcome = self.run(job, &mut workspace).await;
        workspace.finish(outcome.is_ok()).await;

        match &outcome {
            Ok(result) => info!(
                target = "application::pipeline::executor",
                op = "pipeline::execute",
                result = "ok",
                job_id = %job.id(),
                kind = job.output().as_str(),
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                output = %result.output_filename,
                "Job finished"
            ),
            Err(err) => warn!(
                target = "application::pipeline::executor",
                op = "pipeline::execute",
                result = "error",
                job_id = %job.id(),
                kind = job.output().as_str(),
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                error_code = err.label(),
                error = %err,
                "Job failed"
            ),
        }
        outcome
    }

    async fn run(&self, job: &Job, workspace: &mut JobWorkspace) -> Result<JobResult, JobError> {
        let input = resolve_input(&self.storage, job, workspace).await?;

        match (input, job.output()) {
            (ResolvedInput::Mesh(mesh), OutputKind::Gcode) => {
                self.slice(job, &mesh, workspace).await
            }
            (ResolvedInput::Mesh(mesh), _) => Ok(JobResult::artifact(self.render_filename(&mesh))),
            (ResolvedInput::Source(source), OutputKind::Gcode) => {
                let mesh = self
                    .storage
                    .render_path(&job.id().output_filename(OutputKind::Gcode.geometry_extension()));
                workspace.track_temporary(&mesh);
                self.render_geometry(job, &source, &mesh).await?;
                self.slice(job, &mesh, workspace).await
            }
            (ResolvedInput::Source(source), kind) => {
                let filename = job.id().output_filename(kind.geometry_extension());
                let output = self.storage.render_path(&filename);
                workspace.track_output(&output);
                self.render_geometry(job, &source, &output).await?;
                Ok(JobResult::artifact(filename))
            }
        }
    }

    /// Name of a file under the render directory, relative to it.
    fn render_filename(&self, path: &Path) -> String {
        path.strip_prefix(self.storage.render_dir())
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }

    async fn render_geometry(&self, job: &Job, source: &Path, output: &Path) -> Result<(), JobError> {
        let invocation = geometry_invocation(&self.engines, job, source, output);
        run_tool(self.runner.as_ref(), &invocation, job.id()).await
    }

    async fn slice(
        &self,
        job: &Job,
        mesh: &Path,
        workspace: &mut JobWorkspace,
    ) -> Result<JobResult, JobError> {
        let config = match job.options().printer_config.as_deref() {
            Some(text) => {
                let path = self
                    .storage
                    .scratch_path(&job.id().temp_config_filename());
                workspace.track_temporary(&path);
                tokio::fs::write(&path, text)
                    .await
                    .map_err(|err| JobError::workspace(&path, err))?;
                path
            }
            None => self.engines.slicer_config.clone(),
        };

        let filename = job.id().gcode_filename();
        let output = self.storage.render_path(&filename);
        workspace.track_output(&output);

        let invocation = slicer_invocation(&self.engines, &config, mesh, &output);
        run_tool(self.runner.as_ref(), &invocation, job.id()).await?;

        let metadata = read_print_metadata(&output).await;
        if !metadata.is_complete() {
            warn!(
                target = "application::pipeline::executor",
                op = "pipeline::metadata",
                result = "degraded",
                job_id = %job.id(),
                filament_used = %metadata.filament_used,
                estimated_time = %metadata.estimated_time,
                "Slicer output lacked print metadata"
            );
        }
        Ok(JobResult::sliced(filename, metadata))
    }
}
